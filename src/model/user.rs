use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::role::Role;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: u64,
    pub full_name: String,
    pub email: String,
    pub role_id: u8,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Public view of an account, never carries the password hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Profile {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "Nadia Rahman")]
    pub full_name: String,
    #[schema(example = "nadia@company.com")]
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    pub fn into_profile(self) -> Option<Profile> {
        let role = Role::from_id(self.role_id)?;
        Some(Profile {
            id: self.id,
            full_name: self.full_name,
            email: self.email,
            role,
            is_active: self.is_active,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        })
    }
}
