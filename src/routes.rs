use crate::{
    api::{attendance, intern, submission, task, time_log},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(web::resource("/me").route(web::get().to(intern::me)))
            .service(web::resource("/interns").route(web::get().to(intern::list_interns)))
            .service(
                web::scope("/attendance")
                    .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
                    .service(
                        web::resource("/check-out").route(web::post().to(attendance::check_out)),
                    )
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/me").route(web::get().to(attendance::my_month)))
                    .service(
                        web::resource("/interns/{id}")
                            .route(web::get().to(attendance::intern_month)),
                    )
                    .service(web::resource("/overview").route(web::get().to(attendance::overview)))
                    .service(web::resource("/policy").route(web::get().to(attendance::policy))),
            )
            .service(
                web::scope("/tasks")
                    // /tasks
                    .service(
                        web::resource("")
                            .route(web::post().to(task::create_task))
                            .route(web::get().to(task::list_tasks)),
                    )
                    // /tasks/stats, registered before /tasks/{id}
                    .service(web::resource("/stats").route(web::get().to(task::task_stats)))
                    // /tasks/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(task::get_task))
                            .route(web::put().to(task::update_task))
                            .route(web::delete().to(task::delete_task)),
                    )
                    .service(
                        web::resource("/{id}/status").route(web::put().to(task::update_status)),
                    )
                    .service(
                        web::resource("/{id}/submission")
                            .route(web::post().to(submission::submit_work))
                            .route(web::get().to(submission::get_submission)),
                    )
                    .service(
                        web::resource("/{id}/review").route(web::put().to(submission::review_task)),
                    )
                    .service(
                        web::resource("/{id}/time-logs")
                            .route(web::get().to(time_log::list_time_logs)),
                    )
                    .service(
                        web::resource("/{id}/time-logs/start")
                            .route(web::post().to(time_log::start_tracking)),
                    )
                    .service(
                        web::resource("/{id}/time-logs/stop")
                            .route(web::post().to(time_log::stop_tracking)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new token pair, the old refresh token is revoked

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use crate::test_support::{app_config, bearer_for, lazy_pool, refresh_bearer_for};
    use actix_web::{App, http::StatusCode, test as atest};
    use std::net::SocketAddr;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[actix_web::test]
    async fn protected_scope_requires_a_token() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        let req = atest::TestRequest::get()
            .uri("/api/tasks")
            .peer_addr(peer())
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_tokens_do_not_open_the_api() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        let req = atest::TestRequest::get()
            .uri("/api/attendance/policy")
            .peer_addr(peer())
            .insert_header(("Authorization", refresh_bearer_for(3, Role::Intern, &config)))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn access_token_reaches_handlers() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        let req = atest::TestRequest::get()
            .uri("/api/attendance/policy")
            .peer_addr(peer())
            .insert_header(("Authorization", bearer_for(3, Role::Intern, &config)))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn registration_validates_before_touching_the_database() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        let req = atest::TestRequest::post()
            .uri("/auth/register")
            .peer_addr(peer())
            .set_json(serde_json::json!({
                "full_name": "Nadia", "email": "nadia@company.com", "password": "short"
            }))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn logout_without_token_is_a_no_op() {
        let config = app_config();
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        let req = atest::TestRequest::post()
            .uri("/auth/logout")
            .peer_addr(peer())
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
