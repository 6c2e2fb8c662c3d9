use std::collections::HashMap;

use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::{
        attendance::{AttendanceRecord, AttendanceRow},
        user::{Profile, ProfileRow},
    },
    rules::attendance_status::{AttendanceSummary, ShiftPolicy},
    utils::date_range::DateRange,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

const PROFILE_COLUMNS: &str = "id, full_name, email, role_id, is_active, last_login_at, created_at";

#[derive(Debug, Deserialize, IntoParams)]
pub struct RosterQuery {
    /// defaults to the first day of the current month
    #[param(value_type = Option<String>, example = "2025-03-01")]
    pub from: Option<NaiveDate>,
    /// defaults to the last day of the current month
    #[param(value_type = Option<String>, example = "2025-03-31")]
    pub to: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct InternAttendance {
    pub intern: Profile,
    pub attendance: Vec<AttendanceRecord>,
    pub summary: AttendanceSummary,
}

fn roster_range(query: &RosterQuery, today: NaiveDate) -> AppResult<DateRange> {
    let month = DateRange::month_of(today);
    DateRange::new(
        query.from.unwrap_or(month.first),
        query.to.unwrap_or(month.last),
    )
}

fn build_roster(
    interns: Vec<Profile>,
    rows: Vec<AttendanceRow>,
    policy: &ShiftPolicy,
) -> Vec<InternAttendance> {
    let mut by_intern: HashMap<u64, Vec<AttendanceRecord>> = HashMap::new();
    for row in rows {
        by_intern
            .entry(row.intern_id)
            .or_default()
            .push(row.classify(policy));
    }

    interns
        .into_iter()
        .map(|intern| {
            let attendance = by_intern.remove(&intern.id).unwrap_or_default();
            let summary = AttendanceSummary::from_statuses(attendance.iter().map(|r| r.status));
            InternAttendance {
                intern,
                attendance,
                summary,
            }
        })
        .collect()
}

/// Profile of the calling user
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current profile", body = Profile),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account no longer exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Interns"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<impl Responder> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM users WHERE id = ?");
    let profile = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .and_then(ProfileRow::into_profile)
        .ok_or_else(|| AppError::not_found("Account not found"))?;

    Ok(HttpResponse::Ok().json(profile))
}

/// Every intern with their attendance in a date range
#[utoipa::path(
    get,
    path = "/api/interns",
    params(RosterQuery),
    responses(
        (status = 200, description = "Intern roster", body = Vec<InternAttendance>),
        (status = 400, description = "'from' after 'to'"),
        (status = 403, description = "Leaders only")
    ),
    security(("bearer_auth" = [])),
    tag = "Interns"
)]
pub async fn list_interns(
    auth: AuthUser,
    query: web::Query<RosterQuery>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    auth.require_leader()?;

    let range = roster_range(&query, config.today())?;

    let sql = format!("SELECT {PROFILE_COLUMNS} FROM users WHERE role_id = 2 ORDER BY full_name");
    let interns: Vec<Profile> = sqlx::query_as::<_, ProfileRow>(&sql)
        .fetch_all(pool.get_ref())
        .await?
        .into_iter()
        .filter_map(ProfileRow::into_profile)
        .collect();

    let rows = sqlx::query_as::<_, AttendanceRow>(
        r#"
        SELECT a.id, a.intern_id, a.attendance_date, a.check_in, a.check_out, a.total_hours
        FROM attendances a
        JOIN users u ON u.id = a.intern_id AND u.role_id = 2
        WHERE a.attendance_date BETWEEN ? AND ?
        ORDER BY a.attendance_date
        "#,
    )
    .bind(range.first)
    .bind(range.last)
    .fetch_all(pool.get_ref())
    .await?;

    debug!(interns = interns.len(), records = rows.len(), "Roster loaded");

    Ok(HttpResponse::Ok().json(build_roster(interns, rows, &config.shift)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use crate::rules::attendance_status::AttendanceStatus;
    use crate::test_support::{app_config, bearer_for, lazy_pool};
    use actix_web::{App, http::StatusCode, test as atest};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn profile(id: u64, name: &str) -> Profile {
        Profile {
            id,
            full_name: name.into(),
            email: format!("{}@company.com", name.to_lowercase()),
            role: Role::Intern,
            is_active: true,
            last_login_at: None,
            created_at: None,
        }
    }

    fn row(id: u64, intern_id: u64, day: u32, check_in: (u32, u32)) -> AttendanceRow {
        AttendanceRow {
            id,
            intern_id,
            attendance_date: d(day),
            check_in: d(day).and_hms_opt(check_in.0, check_in.1, 0),
            check_out: None,
            total_hours: None,
        }
    }

    #[test]
    fn roster_groups_records_per_intern() {
        let roster = build_roster(
            vec![profile(3, "Nadia"), profile(4, "Omar")],
            vec![row(1, 3, 10, (8, 40)), row(2, 3, 11, (9, 10)), row(3, 9, 11, (8, 0))],
            &ShiftPolicy::default(),
        );

        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].attendance.len(), 2);
        assert_eq!(roster[0].summary.count(AttendanceStatus::Late), 1);
        assert_eq!(roster[0].summary.count(AttendanceStatus::HalfDay), 1);
        assert!(roster[1].attendance.is_empty());
        assert_eq!(roster[1].summary.total, 0);
    }

    #[test]
    fn range_defaults_to_current_month() {
        let query = RosterQuery { from: None, to: None };
        let range = roster_range(&query, d(17)).unwrap();
        assert_eq!(range.first, d(1));
        assert_eq!(range.last, d(31));

        let backwards = RosterQuery {
            from: Some(d(20)),
            to: Some(d(5)),
        };
        assert!(roster_range(&backwards, d(17)).is_err());
    }

    #[actix_web::test]
    async fn interns_cannot_list_the_roster() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .route("/interns", web::get().to(list_interns)),
        )
        .await;

        let req = atest::TestRequest::get()
            .uri("/interns")
            .insert_header(("Authorization", bearer_for(3, Role::Intern, &config)))
            .to_request();

        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
