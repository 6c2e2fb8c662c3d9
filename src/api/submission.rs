use crate::{
    api::task::{ensure_status_written, find_task, find_visible_task, require_assignee, require_creator},
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        role::Role,
        submission::{SubmissionFile, SubmissionRow, TaskSubmission, clean_links},
        task::TaskStatus,
    },
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use sqlx::{MySqlPool, types::Json};
use tracing::{error, info, warn};
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SubmitWorkReq {
    #[schema(example = "Form done, validation messages still English only")]
    pub submission_note: Option<String>,
    #[serde(default)]
    #[schema(example = json!(["https://github.com/acme/portal/pull/12"]))]
    pub submission_links: Vec<String>,
    /// Metadata of files already uploaded to storage
    #[serde(default)]
    pub submission_files: Vec<SubmissionFile>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewReq {
    #[schema(example = "Looks good, merge after rebasing")]
    pub review_notes: Option<String>,
    /// `under_review` or `completed`
    pub status: TaskStatus,
}

fn validate_files(files: &[SubmissionFile]) -> AppResult<()> {
    if let Some(bad) = files
        .iter()
        .find(|f| f.name.trim().is_empty() || f.path.trim().is_empty())
    {
        return Err(AppError::validation(format!(
            "Submitted file '{}' is missing a name or storage path",
            bad.name
        )));
    }
    Ok(())
}

async fn find_submission(
    pool: &MySqlPool,
    task_id: u64,
    intern_id: u64,
) -> Result<Option<SubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRow>(
        r#"
        SELECT id, task_id, intern_id, submission_note, submission_links,
               submission_files, created_at, updated_at
        FROM task_submissions
        WHERE task_id = ? AND intern_id = ?
        "#,
    )
    .bind(task_id)
    .bind(intern_id)
    .fetch_optional(pool)
    .await
}

/// Submit or resubmit work; the task moves to `submitted`
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/submission",
    params(("id" = u64, Path, description = "Task id")),
    request_body = SubmitWorkReq,
    responses(
        (status = 200, description = "Submission stored", body = TaskSubmission),
        (status = 400, description = "Task no longer accepts submissions", body = crate::models::MessageResponse),
        (status = 403, description = "Task is not assigned to you"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Status changed concurrently", body = crate::models::MessageResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Submissions"
)]
pub async fn submit_work(
    auth: AuthUser,
    path: web::Path<u64>,
    payload: web::Json<SubmitWorkReq>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    auth.require_intern()?;
    validate_files(&payload.submission_files)?;

    let task_id = path.into_inner();
    let task = find_task(pool.get_ref(), task_id).await?;
    require_assignee(&task, &auth)?;

    let status = task
        .status()
        .ok_or_else(|| AppError::Internal(format!("Task {} has unknown status", task_id)))?;
    if !status.accepts_submission() {
        return Err(AppError::validation(format!(
            "Task is {} and no longer accepts submissions",
            status
        )));
    }

    let note = payload
        .submission_note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let links = clean_links(&payload.submission_links).map(Json);
    let files = if payload.submission_files.is_empty() {
        None
    } else {
        Some(Json(payload.submission_files.clone()))
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO task_submissions
            (task_id, intern_id, submission_note, submission_links, submission_files)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            submission_note = VALUES(submission_note),
            submission_links = VALUES(submission_links),
            submission_files = VALUES(submission_files)
        "#,
    )
    .bind(task_id)
    .bind(auth.user_id)
    .bind(note)
    .bind(links)
    .bind(files)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        error!(error = %e, task_id, intern_id = auth.user_id, "Failed to store submission");
        e
    })?;

    // a leader may have moved the task to review since it was read
    let marked = sqlx::query("UPDATE tasks SET status = ? WHERE id = ? AND status = ?")
        .bind(TaskStatus::Submitted.as_ref())
        .bind(task_id)
        .bind(status.as_ref())
        .execute(&mut *tx)
        .await?;

    // dropping tx on error rolls the submission back
    ensure_status_written(marked.rows_affected())?;

    tx.commit().await?;

    let submission = find_submission(pool.get_ref(), task_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Submission missing after upsert".into()))?;

    info!(task_id, intern_id = auth.user_id, "Work submitted");
    Ok(HttpResponse::Ok().json(TaskSubmission::from(submission)))
}

/// The assignee's submission for a task
#[utoipa::path(
    get,
    path = "/api/tasks/{id}/submission",
    params(("id" = u64, Path, description = "Task id")),
    responses(
        (status = 200, description = "Submission", body = TaskSubmission),
        (status = 403, description = "Not your task"),
        (status = 404, description = "Nothing submitted yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Submissions"
)]
pub async fn get_submission(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    let task_id = path.into_inner();
    let task = find_visible_task(pool.get_ref(), task_id, &auth).await?;

    let row = match find_submission(pool.get_ref(), task_id, task.assigned_to).await {
        Ok(Some(row)) => row,
        Ok(None) => return Err(AppError::not_found("No submission for this task")),
        Err(e) => {
            warn!(error = %e, task_id, "Error loading submission");
            return Err(AppError::not_found("No submission for this task"));
        }
    };

    Ok(HttpResponse::Ok().json(TaskSubmission::from(row)))
}

/// Record review notes and move the task to `under_review` or `completed`
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/review",
    params(("id" = u64, Path, description = "Task id")),
    request_body = ReviewReq,
    responses(
        (status = 200, description = "Reviewed task", body = crate::model::task::Task),
        (status = 400, description = "Task is not awaiting review", body = crate::models::MessageResponse),
        (status = 403, description = "Only the creator can review"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Status changed concurrently", body = crate::models::MessageResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Submissions"
)]
pub async fn review_task(
    auth: AuthUser,
    path: web::Path<u64>,
    payload: web::Json<ReviewReq>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    auth.require_leader()?;

    let next = payload.status;
    if !matches!(next, TaskStatus::UnderReview | TaskStatus::Completed) {
        return Err(AppError::validation(
            "Review can only move a task to under_review or completed",
        ));
    }

    let task_id = path.into_inner();
    let task = find_task(pool.get_ref(), task_id).await?;
    require_creator(&task, &auth)?;

    let current = task
        .status()
        .ok_or_else(|| AppError::Internal(format!("Task {} has unknown status", task_id)))?;
    if !current.can_transition(next, Role::Leader) {
        return Err(AppError::validation(format!(
            "Cannot move task from {} to {}",
            current, next
        )));
    }

    let notes = payload
        .review_notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let result = sqlx::query(
        "UPDATE tasks SET status = ?, review_notes = ? WHERE id = ? AND status = ?",
    )
    .bind(next.as_ref())
    .bind(notes)
    .bind(task_id)
    .bind(current.as_ref())
    .execute(pool.get_ref())
    .await?;

    ensure_status_written(result.rows_affected())?;

    info!(task_id, to = %next, "Task reviewed");

    let task = find_task(pool.get_ref(), task_id).await?;
    Ok(HttpResponse::Ok().json(task.into_task()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_config, bearer_for, lazy_pool};
    use actix_web::{App, http::StatusCode, test as atest};
    use serde_json::json;

    fn file(name: &str, path: &str) -> SubmissionFile {
        SubmissionFile {
            name: name.into(),
            path: path.into(),
            size: 10,
            content_type: "text/plain".into(),
        }
    }

    #[test]
    fn files_need_name_and_path() {
        assert!(validate_files(&[]).is_ok());
        assert!(validate_files(&[file("notes.txt", "3/7/notes.txt")]).is_ok());
        assert!(validate_files(&[file("", "3/7/x")]).is_err());
        assert!(validate_files(&[file("x.txt", " ")]).is_err());
    }

    #[test]
    fn submission_body_defaults_to_empty_lists() {
        let req: SubmitWorkReq = serde_json::from_value(json!({"submission_note": "done"})).unwrap();
        assert!(req.submission_links.is_empty());
        assert!(req.submission_files.is_empty());
    }

    #[actix_web::test]
    async fn review_rejects_non_review_targets() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .route("/tasks/{id}/review", web::put().to(review_task)),
        )
        .await;

        let req = atest::TestRequest::put()
            .uri("/tasks/7/review")
            .insert_header(("Authorization", bearer_for(1, Role::Leader, &config)))
            .set_json(json!({"status": "in_progress", "review_notes": "redo"}))
            .to_request();

        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn leaders_cannot_submit_work() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .route("/tasks/{id}/submission", web::post().to(submit_work)),
        )
        .await;

        let req = atest::TestRequest::post()
            .uri("/tasks/7/submission")
            .insert_header(("Authorization", bearer_for(1, Role::Leader, &config)))
            .set_json(json!({"submission_note": "done"}))
            .to_request();

        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
