use crate::api::handlers::{apps, auth, health};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        server::Server,
    },
    Modify, OpenApi,
};

/// Handlers listed here are both served and documented. `/health` lives at
/// the root; every other path is relative to the configured base path.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::session::verify,
        auth::session::revoke,
        apps::register::register,
        apps::admin::list_apps,
        apps::admin::get_app,
        apps::admin::approve_app,
        apps::admin::reject_app,
        apps::admin::suspend_app,
    ),
    modifiers(&AdminBearer),
    tags(
        (name = "auth", description = "World ID login and session checks"),
        (name = "apps", description = "Third-party app registration and review"),
        (name = "health", description = "Liveness and dependency status"),
    )
)]
pub struct ApiDoc;

struct AdminBearer;

impl Modify for AdminBearer {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// `OpenAPI` document with the server URL set to `base_path`.
#[must_use]
pub fn openapi(base_path: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let server = if base_path.is_empty() { "/" } else { base_path };
    doc.servers = Some(vec![Server::new(server)]);
    doc
}
