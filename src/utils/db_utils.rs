use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::MySqlPool;

use crate::error::AppError;

/// SQL bindable value
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn to_sql_value(value: &Value) -> Result<SqlValue, AppError> {
    Ok(match value {
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                SqlValue::Date(d)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                SqlValue::U64(u)
            } else if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::F64(f)
            } else {
                return Err(AppError::validation("Unsupported number"));
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => return Err(AppError::validation("Unsupported JSON value type")),
    })
}

/// Builds `UPDATE <table> SET ... WHERE <id_column> = ?` from a JSON object.
///
/// Only keys listed in `allowed_columns` may appear; column names never come
/// from the request, they are taken from the whitelist. Keys are processed in
/// whitelist order so the generated SQL is stable.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed_columns: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::validation("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::validation("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed_columns.contains(&k.as_str())) {
        return Err(AppError::validation(format!("Field '{}' cannot be updated", unknown)));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for column in allowed_columns {
        if let Some(value) = obj.get(*column) {
            columns.push(format!("{} = ?", column));
            values.push(to_sql_value(value)?);
        }
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );

    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &["title", "due_date", "assigned_to", "description"];

    #[test]
    fn builds_set_clause_in_whitelist_order() {
        let update = build_update_sql(
            "tasks",
            &json!({"due_date": "2025-03-20", "title": "Polish UI"}),
            COLUMNS,
            "id",
            7,
        )
        .unwrap();

        assert_eq!(update.sql, "UPDATE tasks SET title = ?, due_date = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("Polish UI".into()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()),
                SqlValue::U64(7),
            ]
        );
    }

    #[test]
    fn rejects_columns_outside_whitelist() {
        let err = build_update_sql("tasks", &json!({"status": "completed"}), COLUMNS, "id", 7)
            .unwrap_err();
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("tasks", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("tasks", &json!([1, 2]), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("tasks", &json!({"title": ["a"]}), COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn null_clears_a_column() {
        let update =
            build_update_sql("tasks", &json!({"description": null}), COLUMNS, "id", 3).unwrap();
        assert_eq!(update.values[0], SqlValue::Null);
    }
}
