use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::attendance::{AttendanceRecord, AttendanceRow},
    rules::{
        attendance_status::{AttendanceSummary, ShiftPolicy},
        time_accumulator::{elapsed_between, hours_from_seconds},
    },
    utils::date_range::DateRange,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, MySql, MySqlPool};
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

const ATTENDANCE_COLUMNS: &str =
    "id, intern_id, attendance_date, check_in, check_out, total_hours";

#[derive(Debug, Deserialize, IntoParams)]
pub struct MonthQuery {
    /// `YYYY-MM`, defaults to the current month
    #[param(example = "2025-03")]
    pub month: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OverviewQuery {
    /// defaults to today
    #[param(value_type = Option<String>, example = "2025-03-12")]
    pub date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceMonth {
    pub intern_id: u64,
    #[schema(value_type = String, example = "2025-03-01")]
    pub from: NaiveDate,
    #[schema(value_type = String, example = "2025-03-31")]
    pub to: NaiveDate,
    pub records: Vec<AttendanceRecord>,
    pub summary: AttendanceSummary,
}

#[derive(Serialize, ToSchema)]
pub struct OverviewEntry {
    #[schema(example = "Nadia Rahman")]
    pub full_name: String,
    #[schema(example = "nadia@company.com")]
    pub email: String,
    #[serde(flatten)]
    pub record: AttendanceRecord,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceOverview {
    #[schema(value_type = String, example = "2025-03-12")]
    pub date: NaiveDate,
    pub summary: AttendanceSummary,
    pub records: Vec<OverviewEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct PolicyResponse {
    #[schema(example = "Asia/Dhaka")]
    pub office_timezone: String,
    pub shift: ShiftPolicy,
}

#[derive(sqlx::FromRow)]
struct OverviewRow {
    id: u64,
    intern_id: u64,
    attendance_date: NaiveDate,
    check_in: Option<chrono::NaiveDateTime>,
    check_out: Option<chrono::NaiveDateTime>,
    total_hours: Option<f64>,
    full_name: String,
    email: String,
}

pub(crate) async fn fetch_day<'e, E>(
    executor: E,
    intern_id: u64,
    date: NaiveDate,
    for_update: bool,
) -> Result<Option<AttendanceRow>, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE intern_id = ? AND attendance_date = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );

    sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(intern_id)
        .bind(date)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn fetch_range(
    pool: &MySqlPool,
    intern_id: u64,
    range: DateRange,
) -> Result<Vec<AttendanceRow>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS}
        FROM attendances
        WHERE intern_id = ? AND attendance_date BETWEEN ? AND ?
        ORDER BY attendance_date
        "#
    );

    sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(intern_id)
        .bind(range.first)
        .bind(range.last)
        .fetch_all(pool)
        .await
}

fn month_view(
    intern_id: u64,
    range: DateRange,
    rows: Vec<AttendanceRow>,
    policy: &ShiftPolicy,
) -> AttendanceMonth {
    let records: Vec<AttendanceRecord> = rows.into_iter().map(|r| r.classify(policy)).collect();
    let summary = AttendanceSummary::from_statuses(records.iter().map(|r| r.status));

    AttendanceMonth {
        intern_id,
        from: range.first,
        to: range.last,
        records,
        summary,
    }
}

/// Check-in endpoint; the first check-in of the day is kept
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in", body = AttendanceRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Interns only"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_intern()?;

    let now = config.now();
    let today = now.date();

    sqlx::query(
        r#"
        INSERT INTO attendances (intern_id, attendance_date, check_in)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE check_in = COALESCE(check_in, VALUES(check_in))
        "#,
    )
    .bind(auth.user_id)
    .bind(today)
    .bind(now)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, intern_id = auth.user_id, "Check-in failed");
        e
    })?;

    let row = fetch_day(pool.get_ref(), auth.user_id, today, false)
        .await?
        .ok_or_else(|| AppError::Internal("Attendance record vanished after check-in".into()))?;

    info!(intern_id = auth.user_id, check_in = ?row.check_in, "Checked in");
    Ok(HttpResponse::Ok().json(row.classify(&config.shift)))
}

/// Check-out endpoint; records the time and the hours worked
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out", body = AttendanceRecord),
        (status = 400, description = "No check-in found for today", body = crate::models::MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Interns only"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_intern()?;

    let now = config.now();
    let today = now.date();

    let mut tx = pool.begin().await?;

    let check_in = fetch_day(&mut *tx, auth.user_id, today, true)
        .await?
        .and_then(|row| row.check_in)
        .ok_or_else(|| AppError::validation("No check-in found for today"))?;

    let total_hours = hours_from_seconds(elapsed_between(check_in, now));

    sqlx::query(
        r#"
        UPDATE attendances
        SET check_out = ?, total_hours = ?
        WHERE intern_id = ? AND attendance_date = ?
        "#,
    )
    .bind(now)
    .bind(total_hours)
    .bind(auth.user_id)
    .bind(today)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        error!(error = %e, intern_id = auth.user_id, "Check-out failed");
        e
    })?;

    let row = fetch_day(&mut *tx, auth.user_id, today, false)
        .await?
        .ok_or_else(|| AppError::Internal("Attendance record vanished after check-out".into()))?;

    tx.commit().await?;

    info!(intern_id = auth.user_id, total_hours, "Checked out");
    Ok(HttpResponse::Ok().json(row.classify(&config.shift)))
}

/// Today's record for the calling intern, `null` before check-in
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record, null before check-in", body = AttendanceRecord),
        (status = 403, description = "Interns only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_intern()?;

    let record = fetch_day(pool.get_ref(), auth.user_id, config.today(), false)
        .await?
        .map(|row| row.classify(&config.shift));

    Ok(HttpResponse::Ok().json(record))
}

/// Month calendar for the calling intern
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(MonthQuery),
    responses(
        (status = 200, description = "Records in the month", body = AttendanceMonth),
        (status = 400, description = "Malformed month"),
        (status = 403, description = "Interns only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_month(
    auth: AuthUser,
    query: web::Query<MonthQuery>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_intern()?;

    let range = DateRange::parse_month(query.month.as_deref(), config.today())?;
    let rows = fetch_range(pool.get_ref(), auth.user_id, range).await?;

    Ok(HttpResponse::Ok().json(month_view(auth.user_id, range, rows, &config.shift)))
}

/// Month calendar for any intern
#[utoipa::path(
    get,
    path = "/api/attendance/interns/{id}",
    params(
        ("id" = u64, Path, description = "Intern id"),
        MonthQuery
    ),
    responses(
        (status = 200, description = "Records in the month", body = AttendanceMonth),
        (status = 400, description = "Malformed month"),
        (status = 403, description = "Leaders only"),
        (status = 404, description = "Intern not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn intern_month(
    auth: AuthUser,
    path: web::Path<u64>,
    query: web::Query<MonthQuery>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_leader()?;

    let intern_id = path.into_inner();
    let range = DateRange::parse_month(query.month.as_deref(), config.today())?;

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT CAST(EXISTS(SELECT 1 FROM users WHERE id = ? AND role_id = 2) AS SIGNED)",
    )
    .bind(intern_id)
    .fetch_one(pool.get_ref())
    .await?;

    if exists == 0 {
        return Err(AppError::not_found("Intern not found"));
    }

    let rows = fetch_range(pool.get_ref(), intern_id, range).await?;
    Ok(HttpResponse::Ok().json(month_view(intern_id, range, rows, &config.shift)))
}

/// Summary of one day's records across interns
#[utoipa::path(
    get,
    path = "/api/attendance/overview",
    params(OverviewQuery),
    responses(
        (status = 200, description = "Counts per status and the day's records", body = AttendanceOverview),
        (status = 403, description = "Leaders only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn overview(
    auth: AuthUser,
    query: web::Query<OverviewQuery>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_leader()?;

    let date = query.date.unwrap_or_else(|| config.today());
    debug!(%date, "Building attendance overview");

    let rows = sqlx::query_as::<_, OverviewRow>(
        r#"
        SELECT a.id, a.intern_id, a.attendance_date, a.check_in, a.check_out, a.total_hours,
               u.full_name, u.email
        FROM attendances a
        JOIN users u ON u.id = a.intern_id
        WHERE a.attendance_date = ?
        ORDER BY u.full_name
        "#,
    )
    .bind(date)
    .fetch_all(pool.get_ref())
    .await?;

    let records: Vec<OverviewEntry> = rows
        .into_iter()
        .map(|r| {
            let record = AttendanceRow {
                id: r.id,
                intern_id: r.intern_id,
                attendance_date: r.attendance_date,
                check_in: r.check_in,
                check_out: r.check_out,
                total_hours: r.total_hours,
            }
            .classify(&config.shift);

            OverviewEntry {
                full_name: r.full_name,
                email: r.email,
                record,
            }
        })
        .collect();

    let summary = AttendanceSummary::from_statuses(records.iter().map(|e| e.record.status));

    Ok(HttpResponse::Ok().json(AttendanceOverview {
        date,
        summary,
        records,
    }))
}

/// Shift thresholds in effect
#[utoipa::path(
    get,
    path = "/api/attendance/policy",
    responses((status = 200, description = "Current policy", body = PolicyResponse)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn policy(_auth: AuthUser, config: web::Data<Config>) -> impl Responder {
    HttpResponse::Ok().json(PolicyResponse {
        office_timezone: config.office_timezone.to_string(),
        shift: config.shift,
    })
}
