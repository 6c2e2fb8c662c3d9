use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use dotenvy::dotenv;

use crate::rules::attendance_status::ShiftPolicy;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub run_migrations: bool,
    pub log_dir: String,

    /// Wall clock used for check-in/out and time logs.
    pub office_timezone: Tz,
    pub shift: ShiftPolicy,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} is invalid ({raw}): {e}")),
        Err(_) => Ok(default),
    }
}

fn time_or(key: &str, default: NaiveTime) -> Result<NaiveTime> {
    match env::var(key) {
        Ok(raw) => parse_clock(&raw).with_context(|| format!("{key} must be HH:MM, got {raw}")),
        Err(_) => Ok(default),
    }
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_clock(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| anyhow!(e))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let defaults = ShiftPolicy::default();
        let shift = ShiftPolicy {
            office_start: time_or("OFFICE_START", defaults.office_start)?,
            late_cutoff: time_or("LATE_CUTOFF", defaults.late_cutoff)?,
            absent_cutoff: time_or("ABSENT_CUTOFF", defaults.absent_cutoff)?,
            half_day_end: time_or("HALF_DAY_END", defaults.half_day_end)?,
            full_day_end: time_or("FULL_DAY_END", defaults.full_day_end)?,
        };
        if !shift.is_ordered() {
            bail!("shift thresholds must be in day order: OFFICE_START <= LATE_CUTOFF <= ABSENT_CUTOFF <= HALF_DAY_END <= FULL_DAY_END");
        }

        let office_timezone: Tz = parsed_or("OFFICE_TIMEZONE", Tz::UTC)?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parsed_or("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parsed_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            run_migrations: parsed_or("RUN_MIGRATIONS", true)?,
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            office_timezone,
            shift,
        })
    }

    /// Current office-local wall clock.
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.office_timezone).naive_local()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}
