use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult},
    model::role::Role,
    models::{LoginReqDto, MessageResponse, RegisterReq, TokenPair, TokenType, UserSql},
    utils::email_registry,
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

const MIN_PASSWORD_LEN: usize = 8;

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn validate_registration(user: &RegisterReq) -> AppResult<()> {
    if user.full_name.trim().is_empty() {
        return Err(AppError::validation("Full name must not be empty"));
    }
    let email = user.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("A valid email is required"));
    }
    if user.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Interns may self-register; only a signed-in leader can create another leader.
fn resolve_role(requested: Option<Role>, caller: Option<&AuthUser>) -> AppResult<Role> {
    match requested.unwrap_or(Role::Intern) {
        Role::Intern => Ok(Role::Intern),
        Role::Leader if caller.is_some_and(AuthUser::is_leader) => Ok(Role::Leader),
        Role::Leader => Err(AppError::forbidden(
            "Only a leader can register another leader",
        )),
    }
}

async fn store_refresh_token(
    pool: &MySqlPool,
    user_id: u64,
    jti: &str,
    exp: usize,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(jti)
    .bind(exp as i64)
    .execute(pool)
    .await
    .map(|_| ())
}

fn sign_pair(config: &Config, user_id: u64, email: &str, role: u8) -> AppResult<(TokenPair, String, usize)> {
    let access_token = generate_access_token(
        user_id,
        email.to_string(),
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign access token: {e}")))?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        email.to_string(),
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign refresh token: {e}")))?;

    Ok((
        TokenPair {
            access_token,
            refresh_token,
        },
        refresh_claims.jti,
        refresh_claims.exp,
    ))
}

/// Register an intern account, or a leader account when called by a leader
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = MessageResponse),
        (status = 400, description = "Invalid payload", body = MessageResponse),
        (status = 403, description = "Leader accounts need a leader's token", body = MessageResponse),
        (status = 409, description = "Email already registered", body = MessageResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    caller: Option<AuthUser>,
    user: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    validate_registration(&user)?;
    let role = resolve_role(user.role, caller.as_ref())?;

    let email = email_registry::normalize(&user.email);

    if !email_registry::is_available(&email, pool.get_ref()).await {
        return Err(AppError::conflict("Email already registered"));
    }

    let hashed = hash_password(&user.password)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))?;

    sqlx::query(r#"INSERT INTO users (full_name, email, password, role_id) VALUES (?, ?, ?, ?)"#)
        .bind(user.full_name.trim())
        .bind(&email)
        .bind(hashed)
        .bind(role.id())
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db_with_conflict(e, "Email already registered"))?;

    email_registry::mark_taken(&email).await;
    info!(%email, role = %role, "Account registered");

    Ok(HttpResponse::Created().json(MessageResponse::new("Account registered successfully")))
}

/// Exchange credentials for an access/refresh token pair
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = TokenPair),
        (status = 400, description = "Missing credentials", body = MessageResponse),
        (status = 401, description = "Invalid credentials", body = MessageResponse)
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, user), fields(email = %user.email))]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let email = email_registry::normalize(&user.email);

    debug!("Fetching user from database");
    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, email, password, role_id, is_active
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        AppError::Unauthorized("Invalid credentials".into())
    })?;

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account disabled");
        return Err(AppError::Unauthorized("Account disabled".into()));
    }

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let (pair, jti, exp) = sign_pair(&config, db_user.id, &db_user.email, db_user.role_id)?;

    debug!(user_id = db_user.id, %jti, "Storing refresh token");
    store_refresh_token(pool.get_ref(), db_user.id, &jti, exp).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        // not fatal for the login itself
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");
    Ok(HttpResponse::Ok().json(pair))
}

/// Rotate a refresh token: the presented one is revoked and a new pair issued
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token", body = MessageResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let unauthorized = || AppError::Unauthorized("Invalid refresh token".into());

    let token = bearer(&req).ok_or_else(unauthorized)?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|_| unauthorized())?;

    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized());
    }

    let mut tx = pool.begin().await?;

    // revoke first; zero rows means unknown, expired or already rotated
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(&mut *tx)
    .await?;

    if revoked.rows_affected() == 0 {
        return Err(unauthorized());
    }

    let (pair, jti, exp) = sign_pair(&config, claims.user_id, &claims.sub, claims.role)?;

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&jti)
    .bind(exp as i64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().json(pair))
}

/// Revoke a refresh token; always answers 204
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_config, bearer_for, lazy_pool};
    use actix_web::{App, ResponseError, http::StatusCode, test as atest};
    use serde_json::json;

    fn req(full_name: &str, email: &str, password: &str) -> RegisterReq {
        RegisterReq {
            full_name: full_name.into(),
            email: email.into(),
            password: password.into(),
            role: None,
        }
    }

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "lead@company.com".into(),
            role,
        }
    }

    #[test]
    fn registration_requires_every_field() {
        assert!(validate_registration(&req("Nadia", "nadia@company.com", "longenough")).is_ok());
        assert!(validate_registration(&req(" ", "nadia@company.com", "longenough")).is_err());
        assert!(validate_registration(&req("Nadia", "not-an-email", "longenough")).is_err());
        assert!(validate_registration(&req("Nadia", "nadia@company.com", "short")).is_err());
    }

    #[test]
    fn self_registration_is_intern_only() {
        assert_eq!(resolve_role(None, None).unwrap(), Role::Intern);
        assert_eq!(resolve_role(Some(Role::Intern), None).unwrap(), Role::Intern);

        let err = resolve_role(Some(Role::Leader), None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let intern = caller(Role::Intern);
        assert!(resolve_role(Some(Role::Leader), Some(&intern)).is_err());
    }

    #[test]
    fn leaders_can_register_leaders() {
        let leader = caller(Role::Leader);
        assert_eq!(resolve_role(Some(Role::Leader), Some(&leader)).unwrap(), Role::Leader);
        assert_eq!(resolve_role(None, Some(&leader)).unwrap(), Role::Intern);
    }

    #[actix_web::test]
    async fn anonymous_leader_registration_is_forbidden() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .route("/auth/register", web::post().to(register)),
        )
        .await;

        let body = json!({
            "full_name": "Mallory",
            "email": "mallory@company.com",
            "password": "longenough",
            "role": "leader"
        });

        let req = atest::TestRequest::post()
            .uri("/auth/register")
            .set_json(&body)
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // an intern's token does not unlock it either
        let req = atest::TestRequest::post()
            .uri("/auth/register")
            .insert_header(("Authorization", bearer_for(3, Role::Intern, &config)))
            .set_json(&body)
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
