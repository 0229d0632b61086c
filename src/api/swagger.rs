use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "User Directory Service API",
        version = "1.0.0",
        description = "REST backend for the user-management dashboard.\n\n**Authentication:** The admin endpoints (`POST /users/addAnotherUser`, `PUT /users/admin`) require a Firebase bearer ID token belonging to an admin user. All other endpoints are open to the dashboard.",
        contact(
            name = "User Directory Team"
        )
    ),
    paths(
        crate::api::users::register_user,
        crate::api::users::add_another_user,
        crate::api::users::update_user,
        crate::api::users::delete_user,
        crate::api::users::get_user,
        crate::api::users::list_users,
        crate::api::users::check_admin,
        crate::api::users::promote_to_admin,
        crate::api::health::health_check,
    ),
    components(
        schemas(
            crate::services::user_service::RegisterUserRequest,
            crate::services::user_service::UpdateUserRequest,
            crate::services::user_service::PromoteAdminRequest,
            crate::services::user_service::InsertReply,
            crate::services::user_service::UpdateReply,
            crate::services::user_service::DeleteReply,
            crate::api::health::HealthResponse,
        )
    ),
    tags(
        (name = "Users", description = "User directory CRUD, admin-role checks and admin-gated management endpoints."),
        (name = "Health", description = "Liveness and health endpoints for monitoring."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Firebase ID token of an admin user"))
                        .build(),
                ),
            );
        }
    }
}
