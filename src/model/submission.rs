use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

/// Metadata for a file the intern uploaded to object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SubmissionFile {
    #[schema(example = "report.pdf")]
    pub name: String,
    #[schema(example = "3/7/report.pdf")]
    pub path: String,
    #[schema(example = 20480)]
    pub size: u64,
    #[serde(rename = "type")]
    #[schema(example = "application/pdf")]
    pub content_type: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionRow {
    pub id: u64,
    pub task_id: u64,
    pub intern_id: u64,
    pub submission_note: Option<String>,
    pub submission_links: Option<Json<Vec<String>>>,
    pub submission_files: Option<Json<Vec<SubmissionFile>>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskSubmission {
    pub id: u64,
    pub task_id: u64,
    pub intern_id: u64,
    pub submission_note: Option<String>,
    pub submission_links: Vec<String>,
    pub submission_files: Vec<SubmissionFile>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<SubmissionRow> for TaskSubmission {
    fn from(row: SubmissionRow) -> Self {
        Self {
            id: row.id,
            task_id: row.task_id,
            intern_id: row.intern_id,
            submission_note: row.submission_note,
            submission_links: row.submission_links.map(|j| j.0).unwrap_or_default(),
            submission_files: row.submission_files.map(|j| j.0).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Trims links and drops blank ones; `None` when nothing is left.
pub fn clean_links(links: &[String]) -> Option<Vec<String>> {
    let cleaned: Vec<String> = links
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if cleaned.is_empty() { None } else { Some(cleaned) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_links_are_dropped() {
        let links = vec![
            " https://github.com/acme/pr/1 ".to_string(),
            "".to_string(),
            "   ".to_string(),
        ];
        assert_eq!(
            clean_links(&links),
            Some(vec!["https://github.com/acme/pr/1".to_string()])
        );
        assert_eq!(clean_links(&["  ".to_string()]), None);
        assert_eq!(clean_links(&[]), None);
    }

    #[test]
    fn file_metadata_uses_type_key() {
        let file: SubmissionFile = serde_json::from_value(serde_json::json!({
            "name": "a.png", "path": "3/7/a.png", "size": 12, "type": "image/png"
        }))
        .unwrap();
        assert_eq!(file.content_type, "image/png");
        assert_eq!(serde_json::to_value(&file).unwrap()["type"], "image/png");
    }

    #[test]
    fn missing_json_columns_become_empty_lists() {
        let row = SubmissionRow {
            id: 1,
            task_id: 7,
            intern_id: 3,
            submission_note: Some("done".into()),
            submission_links: None,
            submission_files: Some(Json(vec![])),
            created_at: None,
            updated_at: None,
        };
        let submission = TaskSubmission::from(row);
        assert!(submission.submission_links.is_empty());
        assert!(submission.submission_files.is_empty());
    }
}
