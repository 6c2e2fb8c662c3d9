use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::task::{Priority, Task, TaskRow, TaskStats, TaskStatus},
    models::MessageResponse,
    utils::db_utils::{build_update_sql, execute_update},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

pub(crate) const TASK_SELECT: &str = r#"
    SELECT t.id, t.title, t.description, t.assigned_to, t.created_by,
           t.start_date, t.due_date, t.priority, t.status, t.work_link,
           t.leader_comments, t.review_notes, t.created_at, t.updated_at,
           a.full_name AS assignee_name, a.email AS assignee_email,
           c.full_name AS creator_name
    FROM tasks t
    LEFT JOIN users a ON a.id = t.assigned_to
    LEFT JOIN users c ON c.id = t.created_by
"#;

const EDITABLE_COLUMNS: &[&str] = &[
    "title",
    "description",
    "assigned_to",
    "start_date",
    "due_date",
    "priority",
    "work_link",
    "leader_comments",
];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskReq {
    #[schema(example = "Build login page")]
    pub title: String,
    #[schema(example = "Email + password form wired to /auth/login")]
    pub description: Option<String>,
    #[schema(example = 3)]
    pub assigned_to: u64,
    #[schema(value_type = String, example = "2025-03-10")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, example = "2025-03-14")]
    pub due_date: NaiveDate,
    pub priority: Option<Priority>,
    #[schema(example = "https://github.com/acme/portal")]
    pub work_link: Option<String>,
    pub leader_comments: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TaskListQuery {
    /// one of assigned, in_progress, submitted, under_review, completed
    #[param(example = "in_progress")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChangeReq {
    pub status: TaskStatus,
}

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn validate_dates(start: NaiveDate, due: NaiveDate) -> AppResult<()> {
    if start > due {
        return Err(AppError::validation("Start date cannot be after due date"));
    }
    Ok(())
}

fn validate_new_task(task: &CreateTaskReq) -> AppResult<()> {
    if task.title.trim().is_empty() {
        return Err(AppError::validation("Task title is required"));
    }
    validate_dates(task.start_date, task.due_date)
}

fn parse_status_filter(raw: Option<&str>) -> AppResult<Option<TaskStatus>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<TaskStatus>()
                .map_err(|_| AppError::validation(format!("Unknown task status '{}'", s)))
        })
        .transpose()
}

/// Field-level checks on an edit payload that the column whitelist alone
/// does not cover.
fn validate_edit(payload: &Value) -> AppResult<()> {
    if let Some(title) = payload.get("title") {
        match title.as_str() {
            Some(t) if !t.trim().is_empty() => {}
            _ => return Err(AppError::validation("Task title is required")),
        }
    }

    if let Some(priority) = payload.get("priority") {
        let ok = priority
            .as_str()
            .map(|p| p.parse::<Priority>().is_ok())
            .unwrap_or(false);
        if !ok {
            return Err(AppError::validation("Priority must be low, medium or high"));
        }
    }

    if let Some(assignee) = payload.get("assigned_to") {
        if assignee.as_u64().is_none() {
            return Err(AppError::validation("assigned_to must be a user id"));
        }
    }

    for column in ["start_date", "due_date"] {
        if let Some(value) = payload.get(column) {
            let ok = value
                .as_str()
                .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok())
                .unwrap_or(false);
            if !ok {
                return Err(AppError::validation(format!("{} must be YYYY-MM-DD", column)));
            }
        }
    }

    Ok(())
}

fn date_field(payload: &Value, column: &str) -> Option<NaiveDate> {
    payload
        .get(column)
        .and_then(Value::as_str)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn task_list_sql(scope_column: &str, filter_by_status: bool) -> String {
    let mut sql = format!("{TASK_SELECT} WHERE {scope_column} = ?");
    if filter_by_status {
        sql.push_str(" AND t.status = ?");
    }
    sql.push_str(" ORDER BY t.created_at DESC, t.id DESC");
    sql
}

/// Status writes are conditioned on the status that was read; zero rows
/// means someone moved the task in between.
pub(crate) fn ensure_status_written(rows_affected: u64) -> AppResult<()> {
    if rows_affected == 0 {
        return Err(AppError::conflict("Task status changed, reload and retry"));
    }
    Ok(())
}

pub(crate) async fn find_task(pool: &MySqlPool, task_id: u64) -> AppResult<TaskRow> {
    let sql = format!("{TASK_SELECT} WHERE t.id = ?");
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))
}

/// Loads a task the caller created or is assigned to.
pub(crate) async fn find_visible_task(
    pool: &MySqlPool,
    task_id: u64,
    auth: &AuthUser,
) -> AppResult<TaskRow> {
    let task = find_task(pool, task_id).await?;
    if !task.is_visible_to(auth.user_id) {
        return Err(AppError::forbidden("You do not have access to this task"));
    }
    Ok(task)
}

pub(crate) fn require_creator(task: &TaskRow, auth: &AuthUser) -> AppResult<()> {
    auth.require_leader()?;
    if task.created_by != auth.user_id {
        return Err(AppError::forbidden("Only the task creator can do this"));
    }
    Ok(())
}

pub(crate) fn require_assignee(task: &TaskRow, auth: &AuthUser) -> AppResult<()> {
    auth.require_intern()?;
    if task.assigned_to != auth.user_id {
        return Err(AppError::forbidden("Task is not assigned to you"));
    }
    Ok(())
}

async fn ensure_active_intern(pool: &MySqlPool, user_id: u64) -> AppResult<()> {
    let is_intern = sqlx::query_scalar::<_, i64>(
        "SELECT CAST(EXISTS(SELECT 1 FROM users WHERE id = ? AND role_id = 2 AND is_active = TRUE) AS SIGNED)",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    if is_intern == 0 {
        return Err(AppError::validation("Assignee must be an active intern"));
    }
    Ok(())
}

/// Create a task and assign it to an intern
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTaskReq,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid task", body = MessageResponse),
        (status = 403, description = "Leaders only")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn create_task(
    auth: AuthUser,
    payload: web::Json<CreateTaskReq>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    auth.require_leader()?;
    validate_new_task(&payload)?;
    ensure_active_intern(pool.get_ref(), payload.assigned_to).await?;

    let priority = payload.priority.unwrap_or_default();

    let result = sqlx::query(
        r#"
        INSERT INTO tasks
            (title, description, assigned_to, created_by, start_date, due_date,
             priority, status, work_link, leader_comments)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(blank_to_none(&payload.description))
    .bind(payload.assigned_to)
    .bind(auth.user_id)
    .bind(payload.start_date)
    .bind(payload.due_date)
    .bind(priority.as_ref())
    .bind(TaskStatus::Assigned.as_ref())
    .bind(blank_to_none(&payload.work_link))
    .bind(blank_to_none(&payload.leader_comments))
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, leader_id = auth.user_id, "Failed to create task");
        e
    })?;

    let task = find_task(pool.get_ref(), result.last_insert_id()).await?;
    info!(task_id = task.id, assigned_to = task.assigned_to, "Task created");

    Ok(HttpResponse::Created().json(task.into_task()))
}

/// Tasks the caller created (leader) or is assigned (intern), newest first
#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Task list", body = Vec<Task>),
        (status = 400, description = "Unknown status filter")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn list_tasks(
    auth: AuthUser,
    query: web::Query<TaskListQuery>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    let status = parse_status_filter(query.status.as_deref())?;
    let scope_column = if auth.is_leader() { "t.created_by" } else { "t.assigned_to" };

    let sql = task_list_sql(scope_column, status.is_some());

    let mut q = sqlx::query_as::<_, TaskRow>(&sql).bind(auth.user_id);
    if let Some(status) = status {
        q = q.bind(status.to_string());
    }

    let rows = q.fetch_all(pool.get_ref()).await?;
    debug!(count = rows.len(), "Tasks fetched");

    let tasks: Vec<Task> = rows.into_iter().map(TaskRow::into_task).collect();
    Ok(HttpResponse::Ok().json(tasks))
}

/// Per-status counts over the caller's tasks
#[utoipa::path(
    get,
    path = "/api/tasks/stats",
    responses((status = 200, description = "Counts per status", body = TaskStats)),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn task_stats(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<impl Responder> {
    let scope_column = if auth.is_leader() { "created_by" } else { "assigned_to" };
    let sql = format!("SELECT status, COUNT(*) FROM tasks WHERE {scope_column} = ? GROUP BY status");

    let rows = sqlx::query_as::<_, (String, i64)>(&sql)
        .bind(auth.user_id)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(TaskStats::from_counts(rows)))
}

/// Task detail
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = u64, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 403, description = "Not your task"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn get_task(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    let task = find_visible_task(pool.get_ref(), path.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(task.into_task()))
}

/// Partial edit; only whitelisted columns may be changed
#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(("id" = u64, Path, description = "Task id")),
    request_body(content = Object, example = json!({
        "title": "Build login page (v2)",
        "due_date": "2025-03-18",
        "priority": "high"
    })),
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 400, description = "Invalid payload", body = MessageResponse),
        (status = 403, description = "Only the creator can edit"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_task(
    auth: AuthUser,
    path: web::Path<u64>,
    payload: web::Json<Value>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    auth.require_leader()?;

    let task_id = path.into_inner();
    let update = build_update_sql("tasks", &payload, EDITABLE_COLUMNS, "id", task_id)?;
    validate_edit(&payload)?;

    let current = find_task(pool.get_ref(), task_id).await?;
    require_creator(&current, &auth)?;

    let start = date_field(&payload, "start_date").unwrap_or(current.start_date);
    let due = date_field(&payload, "due_date").unwrap_or(current.due_date);
    validate_dates(start, due)?;

    if let Some(assignee) = payload.get("assigned_to").and_then(Value::as_u64) {
        ensure_active_intern(pool.get_ref(), assignee).await?;
    }

    debug!(sql = %update.sql, "Executing task update");
    execute_update(pool.get_ref(), update).await.map_err(|e| {
        error!(error = %e, task_id, "Task update failed");
        e
    })?;

    let task = find_task(pool.get_ref(), task_id).await?;
    Ok(HttpResponse::Ok().json(task.into_task()))
}

/// Delete a task together with its submissions and time logs
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(("id" = u64, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task deleted", body = MessageResponse),
        (status = 403, description = "Only the creator can delete"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn delete_task(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    auth.require_leader()?;

    let task_id = path.into_inner();
    let task = find_task(pool.get_ref(), task_id).await?;
    require_creator(&task, &auth)?;

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(pool.get_ref())
        .await?;

    info!(task_id, "Task deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Task deleted")))
}

/// Move a task along its workflow
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/status",
    params(("id" = u64, Path, description = "Task id")),
    request_body = StatusChangeReq,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 400, description = "Transition not allowed", body = MessageResponse),
        (status = 403, description = "Not your task"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Status changed concurrently", body = MessageResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_status(
    auth: AuthUser,
    path: web::Path<u64>,
    payload: web::Json<StatusChangeReq>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    let task_id = path.into_inner();
    let next = payload.status;

    let task = find_task(pool.get_ref(), task_id).await?;
    if auth.is_leader() {
        require_creator(&task, &auth)?;
    } else {
        require_assignee(&task, &auth)?;
    }

    let current = task
        .status()
        .ok_or_else(|| AppError::Internal(format!("Task {} has unknown status", task_id)))?;

    if !current.can_transition(next, auth.role) {
        return Err(AppError::validation(format!(
            "Cannot move task from {} to {}",
            current, next
        )));
    }

    let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_ref())
        .bind(task_id)
        .bind(current.as_ref())
        .execute(pool.get_ref())
        .await?;

    ensure_status_written(result.rows_affected())?;

    info!(task_id, from = %current, to = %next, "Task status changed");

    let task = find_task(pool.get_ref(), task_id).await?;
    Ok(HttpResponse::Ok().json(task.into_task()))
}
