use crate::api::attendance::{AttendanceMonth, AttendanceOverview, OverviewEntry, PolicyResponse};
use crate::api::intern::InternAttendance;
use crate::api::submission::{ReviewReq, SubmitWorkReq};
use crate::api::task::{CreateTaskReq, StatusChangeReq};
use crate::api::time_log::{ActiveSession, TimeLogSummary};
use crate::model::attendance::AttendanceRecord;
use crate::model::role::Role;
use crate::model::submission::{SubmissionFile, TaskSubmission};
use crate::model::task::{PersonRef, Priority, Task, TaskStats, TaskStatus};
use crate::model::time_log::TimeLog;
use crate::model::user::Profile;
use crate::models::{LoginReqDto, MessageResponse, RegisterReq, TokenPair};
use crate::rules::attendance_status::{AttendanceStatus, AttendanceSummary, ShiftPolicy};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Intern Desk API",
        version = "1.0.0",
        description = r#"
## Intern task & attendance tracker

Leaders assign tasks to interns and review submitted work. Interns check in
and out every day, track time against their tasks and submit results.

### 🔹 Key Features
- **Attendance**
  - Daily check-in / check-out, status derived from the shift policy
  - Monthly calendars and a per-day overview for leaders
- **Tasks**
  - Create, edit, assign and move tasks through their workflow
- **Submissions & Review**
  - Notes, links and file metadata; leader review notes
- **Time Tracking**
  - One open session per task, hours summed over closed sessions

### 🔐 Security
Everything under `/api` requires a **JWT Bearer** access token.
Roles are **leader** and **intern**.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::intern::me,
        crate::api::intern::list_interns,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::my_month,
        crate::api::attendance::intern_month,
        crate::api::attendance::overview,
        crate::api::attendance::policy,

        crate::api::task::create_task,
        crate::api::task::list_tasks,
        crate::api::task::task_stats,
        crate::api::task::get_task,
        crate::api::task::update_task,
        crate::api::task::delete_task,
        crate::api::task::update_status,

        crate::api::submission::submit_work,
        crate::api::submission::get_submission,
        crate::api::submission::review_task,

        crate::api::time_log::start_tracking,
        crate::api::time_log::stop_tracking,
        crate::api::time_log::list_time_logs
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            TokenPair,
            MessageResponse,
            Role,
            Profile,
            InternAttendance,
            AttendanceStatus,
            AttendanceRecord,
            AttendanceSummary,
            AttendanceMonth,
            AttendanceOverview,
            OverviewEntry,
            ShiftPolicy,
            PolicyResponse,
            TaskStatus,
            Priority,
            PersonRef,
            Task,
            TaskStats,
            CreateTaskReq,
            StatusChangeReq,
            SubmissionFile,
            TaskSubmission,
            SubmitWorkReq,
            ReviewReq,
            TimeLog,
            ActiveSession,
            TimeLogSummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Interns", description = "Profiles and the intern roster"),
        (name = "Attendance", description = "Check-in/out and attendance reports"),
        (name = "Tasks", description = "Task management APIs"),
        (name = "Submissions", description = "Work submission and review"),
        (name = "Time tracking", description = "Per-task time logs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        let paths = json["paths"].as_object().unwrap();
        for path in [
            "/auth/login",
            "/api/attendance/check-in",
            "/api/attendance/overview",
            "/api/tasks/{id}/status",
            "/api/tasks/{id}/time-logs/stop",
            "/api/interns",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }

        assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
    }
}
