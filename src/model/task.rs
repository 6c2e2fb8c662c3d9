use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use super::role::Role;

/// Task lifecycle, in order.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Assigned,
    InProgress,
    Submitted,
    UnderReview,
    Completed,
}

impl TaskStatus {
    /// Whether `role` may move a task from `self` to `next`.
    pub fn can_transition(self, next: TaskStatus, role: Role) -> bool {
        use TaskStatus::*;
        match role {
            Role::Intern => matches!((self, next), (Assigned, InProgress) | (InProgress, Submitted)),
            Role::Leader => matches!(
                (self, next),
                (Submitted, UnderReview) | (Submitted, Completed) | (UnderReview, Completed)
            ),
        }
    }

    /// Work can be (re)submitted until a leader picks it up for review.
    pub fn accepts_submission(self) -> bool {
        matches!(
            self,
            TaskStatus::Assigned | TaskStatus::InProgress | TaskStatus::Submitted
        )
    }

    pub fn accepts_time_tracking(self) -> bool {
        self == TaskStatus::InProgress
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Raw `tasks` row joined with the assignee and creator names.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: u64,
    pub created_by: u64,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub priority: String,
    pub status: String,
    pub work_link: Option<String>,
    pub leader_comments: Option<String>,
    pub review_notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub assignee_name: Option<String>,
    pub assignee_email: Option<String>,
    pub creator_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PersonRef {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "Nadia Rahman")]
    pub full_name: Option<String>,
    #[schema(example = "nadia@company.com")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Task {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "Build login page")]
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: PersonRef,
    pub created_by: PersonRef,
    #[schema(example = "2025-03-10")]
    pub start_date: NaiveDate,
    #[schema(example = "2025-03-14")]
    pub due_date: NaiveDate,
    pub priority: Priority,
    pub status: TaskStatus,
    pub work_link: Option<String>,
    pub leader_comments: Option<String>,
    pub review_notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    pub fn status(&self) -> Option<TaskStatus> {
        self.status.parse().ok()
    }

    pub fn is_visible_to(&self, user_id: u64) -> bool {
        self.created_by == user_id || self.assigned_to == user_id
    }

    /// Unknown labels in the database fall back to the lifecycle start and
    /// the default priority rather than failing the whole listing.
    pub fn into_task(self) -> Task {
        let status = self.status().unwrap_or(TaskStatus::Assigned);
        let priority = self.priority.parse().unwrap_or_default();
        Task {
            id: self.id,
            title: self.title,
            description: self.description,
            assigned_to: PersonRef {
                id: self.assigned_to,
                full_name: self.assignee_name,
                email: self.assignee_email,
            },
            created_by: PersonRef {
                id: self.created_by,
                full_name: self.creator_name,
                email: None,
            },
            start_date: self.start_date,
            due_date: self.due_date,
            priority,
            status,
            work_link: self.work_link,
            leader_comments: self.leader_comments,
            review_notes: self.review_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Count of tasks per status; every status is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TaskStats {
    #[schema(value_type = Object, example = json!({
        "assigned": 2, "in_progress": 1, "submitted": 0, "under_review": 1, "completed": 4
    }))]
    pub counts: BTreeMap<TaskStatus, i64>,
    pub total: i64,
}

impl TaskStats {
    pub fn from_counts<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let mut counts: BTreeMap<TaskStatus, i64> = TaskStatus::iter().map(|s| (s, 0)).collect();
        let mut total = 0;

        for (label, count) in rows {
            if let Ok(status) = label.parse::<TaskStatus>() {
                *counts.entry(status).or_insert(0) += count;
                total += count;
            }
        }

        Self { counts, total }
    }
}
