pub mod auth;
pub mod company;
pub mod profiles;
pub mod projects;
pub mod tasks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/signup", post(auth::signup))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/user", get(auth::current_user))
        // Profiles
        .route("/api/v1/profiles/{id}", get(profiles::get))
        // Company
        .route("/api/v1/company", get(company::get_company))
        .route(
            "/api/v1/companies/{id}/members/count",
            get(company::member_count),
        )
        // Projects
        .route("/api/v1/projects", get(projects::list).post(projects::create))
        .route(
            "/api/v1/projects/{id}",
            get(projects::get)
                .put(projects::update)
                .delete(projects::delete),
        )
        // Tasks
        .route("/api/v1/tasks", get(tasks::list).post(tasks::create))
        .route(
            "/api/v1/tasks/{id}",
            get(tasks::get).put(tasks::update).delete(tasks::delete),
        )
}
