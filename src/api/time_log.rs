use crate::{
    api::task::{find_task, find_visible_task, require_assignee},
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult, is_duplicate_key},
    model::time_log::TimeLog,
    rules::time_accumulator::{TimeAccumulator, TrackingError, format_elapsed, total_hours},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{Executor, MySql, MySqlPool};
use tracing::{error, info};
use utoipa::ToSchema;

const TIME_LOG_COLUMNS: &str =
    "id, task_id, intern_id, start_time, end_time, total_hours, created_at";

#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveSession {
    #[schema(example = 12)]
    pub log_id: u64,
    #[schema(value_type = String, example = "2025-03-12T13:00:00")]
    pub started_at: NaiveDateTime,
    #[schema(example = 754)]
    pub elapsed_seconds: u64,
    #[schema(example = "00:12:34")]
    pub elapsed: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TimeLogSummary {
    pub logs: Vec<TimeLog>,
    /// closed sessions only
    #[schema(example = 2.0)]
    pub total_hours: f64,
    pub active: Option<ActiveSession>,
}

async fn find_open_log<'e, E>(
    executor: E,
    task_id: u64,
    intern_id: u64,
    for_update: bool,
) -> Result<Option<TimeLog>, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let sql = format!(
        "SELECT {TIME_LOG_COLUMNS} FROM time_logs WHERE task_id = ? AND intern_id = ? AND end_time IS NULL{}",
        if for_update { " FOR UPDATE" } else { "" }
    );

    sqlx::query_as::<_, TimeLog>(&sql)
        .bind(task_id)
        .bind(intern_id)
        .fetch_optional(executor)
        .await
}

async fn find_log<'e, E>(executor: E, log_id: u64) -> Result<Option<TimeLog>, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let sql = format!("SELECT {TIME_LOG_COLUMNS} FROM time_logs WHERE id = ?");
    sqlx::query_as::<_, TimeLog>(&sql)
        .bind(log_id)
        .fetch_optional(executor)
        .await
}

fn summarize(logs: Vec<TimeLog>, now: NaiveDateTime) -> TimeLogSummary {
    let total = total_hours(&logs);

    let active = logs.iter().find(|log| log.is_open()).map(|log| {
        let tracker = TimeAccumulator::resume(log.start_time, now);
        ActiveSession {
            log_id: log.id,
            started_at: log.start_time,
            elapsed_seconds: tracker.elapsed_seconds(),
            elapsed: format_elapsed(tracker.elapsed_seconds()),
        }
    });

    TimeLogSummary {
        logs,
        total_hours: total,
        active,
    }
}

/// Open a tracking session on an in-progress task
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/time-logs/start",
    params(("id" = u64, Path, description = "Task id")),
    responses(
        (status = 201, description = "Session opened", body = TimeLog),
        (status = 400, description = "Task is not in progress", body = crate::models::MessageResponse),
        (status = 403, description = "Task is not assigned to you"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "A session is already open", body = crate::models::MessageResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Time tracking"
)]
pub async fn start_tracking(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_intern()?;

    let task_id = path.into_inner();
    let task = find_task(pool.get_ref(), task_id).await?;
    require_assignee(&task, &auth)?;

    let accepts = task.status().map(|s| s.accepts_time_tracking()).unwrap_or(false);
    if !accepts {
        return Err(AppError::validation(
            "Time can only be tracked on a task in progress",
        ));
    }

    let now = config.now();
    let mut tracker = match find_open_log(pool.get_ref(), task_id, auth.user_id, false).await? {
        Some(open) => TimeAccumulator::resume(open.start_time, now),
        None => TimeAccumulator::new(),
    };
    tracker.start(now)?;

    let result = sqlx::query("INSERT INTO time_logs (task_id, intern_id, start_time) VALUES (?, ?, ?)")
        .bind(task_id)
        .bind(auth.user_id)
        .bind(now)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                // lost a race with a concurrent start
                AppError::from(TrackingError::AlreadyTracking)
            } else {
                error!(error = %e, task_id, intern_id = auth.user_id, "Failed to start tracking");
                AppError::Database(e)
            }
        })?;

    let log = find_log(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or_else(|| AppError::Internal("Time log missing after insert".into()))?;

    info!(task_id, intern_id = auth.user_id, log_id = log.id, "Time tracking started");
    Ok(HttpResponse::Created().json(log))
}

/// Close the caller's open session on a task
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/time-logs/stop",
    params(("id" = u64, Path, description = "Task id")),
    responses(
        (status = 200, description = "Session closed", body = TimeLog),
        (status = 400, description = "No session is open", body = crate::models::MessageResponse),
        (status = 403, description = "Task is not assigned to you"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Time tracking"
)]
pub async fn stop_tracking(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_intern()?;

    let task_id = path.into_inner();
    let task = find_task(pool.get_ref(), task_id).await?;
    require_assignee(&task, &auth)?;

    let now = config.now();
    let mut tx = pool.begin().await?;

    let open = find_open_log(&mut *tx, task_id, auth.user_id, true)
        .await?
        .ok_or(TrackingError::NotTracking)?;

    let session = TimeAccumulator::resume(open.start_time, now).stop(now)?;

    sqlx::query("UPDATE time_logs SET end_time = ?, total_hours = ? WHERE id = ? AND end_time IS NULL")
        .bind(session.end_time)
        .bind(session.total_hours)
        .bind(open.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, log_id = open.id, "Failed to stop tracking");
            e
        })?;

    let log = find_log(&mut *tx, open.id)
        .await?
        .ok_or_else(|| AppError::Internal("Time log missing after update".into()))?;

    tx.commit().await?;

    info!(
        task_id,
        log_id = log.id,
        elapsed_seconds = session.elapsed_seconds,
        "Time tracking stopped"
    );
    Ok(HttpResponse::Ok().json(log))
}

/// Every session logged on a task with the running total
#[utoipa::path(
    get,
    path = "/api/tasks/{id}/time-logs",
    params(("id" = u64, Path, description = "Task id")),
    responses(
        (status = 200, description = "Logs, newest first", body = TimeLogSummary),
        (status = 403, description = "Not your task"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Time tracking"
)]
pub async fn list_time_logs(
    auth: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let task_id = path.into_inner();
    find_visible_task(pool.get_ref(), task_id, &auth).await?;

    let sql = format!(
        "SELECT {TIME_LOG_COLUMNS} FROM time_logs WHERE task_id = ? ORDER BY created_at DESC, id DESC"
    );
    let logs = sqlx::query_as::<_, TimeLog>(&sql)
        .bind(task_id)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(summarize(logs, config.now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use crate::test_support::{app_config, bearer_for, lazy_pool};
    use actix_web::{App, http::StatusCode, test as atest};
    use chrono::NaiveDate;

    fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 12)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn log(id: u64, start: NaiveDateTime, end: Option<NaiveDateTime>, hours: Option<f64>) -> TimeLog {
        TimeLog {
            id,
            task_id: 7,
            intern_id: 3,
            start_time: start,
            end_time: end,
            total_hours: hours,
            created_at: None,
        }
    }

    #[test]
    fn summary_totals_closed_sessions_and_reports_the_open_one() {
        let logs = vec![
            log(3, t(14, 0, 0), None, None),
            log(2, t(11, 0, 0), Some(t(11, 30, 0)), Some(0.5)),
            log(1, t(9, 0, 0), Some(t(10, 30, 0)), Some(1.5)),
        ];

        let summary = summarize(logs, t(14, 12, 34));

        assert_eq!(summary.total_hours, 2.0);
        let active = summary.active.unwrap();
        assert_eq!(active.log_id, 3);
        assert_eq!(active.elapsed_seconds, 754);
        assert_eq!(active.elapsed, "00:12:34");
    }

    #[test]
    fn summary_without_open_session() {
        let summary = summarize(vec![log(1, t(9, 0, 0), Some(t(10, 0, 0)), Some(1.0))], t(12, 0, 0));
        assert!(summary.active.is_none());
        assert_eq!(summary.total_hours, 1.0);
    }

    #[actix_web::test]
    async fn leaders_cannot_track_time() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .route("/tasks/{id}/time-logs/start", web::post().to(start_tracking)),
        )
        .await;

        let req = atest::TestRequest::post()
            .uri("/tasks/7/time-logs/start")
            .insert_header(("Authorization", bearer_for(1, Role::Leader, &config)))
            .to_request();

        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
