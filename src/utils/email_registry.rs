//! In-memory index of registered account emails.
//!
//! A cuckoo filter answers "definitely free" without touching the database,
//! and a moka cache remembers recently seen taken emails. Anything the two
//! cannot settle falls through to the `users` table.

use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;
use std::time::Duration;

const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static EMAIL_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Present => email is TAKEN
static TAKEN_CACHE: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(200_000)
        .time_to_live(Duration::from_secs(86_400))
        .build()
});

#[inline]
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn filter_contains(email: &str) -> bool {
    let email = email.to_owned();
    match EMAIL_FILTER.read() {
        Ok(filter) => filter.contains(&email),
        // a poisoned filter can't prove absence
        Err(_) => true,
    }
}

fn filter_add_all<'a>(emails: impl IntoIterator<Item = &'a String>) {
    if let Ok(mut filter) = EMAIL_FILTER.write() {
        for email in emails {
            filter.add(email);
        }
    }
}

/// Record a freshly registered email in both layers.
pub async fn mark_taken(email: &str) {
    let email = normalize(email);
    filter_add_all([&email]);
    TAKEN_CACHE.insert(email, ()).await;
}

/// true => AVAILABLE, false => TAKEN
pub async fn is_available(email: &str, pool: &MySqlPool) -> bool {
    let email = normalize(email);

    // fast negative
    if !filter_contains(&email) {
        return true;
    }

    // fast positive
    if TAKEN_CACHE.contains_key(&email) {
        return false;
    }

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT CAST(EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1) AS SIGNED)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .unwrap_or(1); // fail closed

    if exists != 0 {
        TAKEN_CACHE.insert(email, ()).await;
        return false;
    }

    true
}

/// Streams every account email into the filter and the most recently active
/// ones into the cache.
pub async fn warmup(pool: &MySqlPool, batch_size: usize, recent_days: u32) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT email,
               CAST(COALESCE(last_login_at >= NOW() - INTERVAL ? DAY, 0) AS SIGNED) AS recent
        FROM users
        "#,
    )
    .bind(recent_days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut recent = Vec::new();
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (email, is_recent) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;
        let email = normalize(&email);
        if is_recent != 0 {
            recent.push(email.clone());
        }
        batch.push(email);
        total += 1;

        if batch.len() == batch_size {
            filter_add_all(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        filter_add_all(&batch);
    }

    let recent_count = recent.len();
    futures::future::join_all(recent.into_iter().map(|email| TAKEN_CACHE.insert(email, ()))).await;

    log::info!(
        "Email registry warmup complete: {} accounts, {} recently active",
        total,
        recent_count
    );
    Ok(())
}
