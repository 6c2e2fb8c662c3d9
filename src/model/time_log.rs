use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema, sqlx::FromRow)]
pub struct TimeLog {
    #[schema(example = 11)]
    pub id: u64,
    #[schema(example = 7)]
    pub task_id: u64,
    #[schema(example = 3)]
    pub intern_id: u64,
    #[schema(example = "2025-03-12T09:05:00")]
    pub start_time: NaiveDateTime,
    #[schema(example = "2025-03-12T10:35:00")]
    pub end_time: Option<NaiveDateTime>,
    #[schema(example = 1.5)]
    pub total_hours: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TimeLog {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}
