use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};

use crate::database::MongoDB;
use crate::middleware::auth::RequesterEmail;
use crate::services::firebase_service::FirebaseAuth;
use crate::services::user_service::{
    self, CreateUserOutcome, ListUsersQuery, PromoteAdminRequest, PromoteOutcome,
    RegisterUserRequest, UpdateUserOutcome, UpdateUserRequest,
};

fn requester_email(req: &HttpRequest) -> Option<String> {
    req.extensions()
        .get::<RequesterEmail>()
        .map(|requester| requester.0.clone())
}

fn conflict_message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "message": message }))
}

fn internal_error(error: String) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "success": false,
        "error": error
    }))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "User registered, or a conflict message for duplicate email/username", body = user_service::InsertReply),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_user(
    db: web::Data<MongoDB>,
    request: web::Json<RegisterUserRequest>,
) -> HttpResponse {
    log::info!("📝 POST /users - email: {}", request.email);

    match user_service::create_user(&db, request.into_inner()).await {
        Ok(CreateUserOutcome::Created(reply)) => {
            log::info!("✅ User registered: {}", reply.inserted_id);
            HttpResponse::Ok().json(reply)
        }
        Ok(CreateUserOutcome::EmailTaken) => {
            log::warn!("❌ Registration rejected: duplicate email");
            conflict_message("This user is already registered")
        }
        Ok(CreateUserOutcome::UsernameTaken) => {
            log::warn!("❌ Registration rejected: duplicate username");
            conflict_message("This username is already taken")
        }
        Err(e) => {
            log::error!("❌ Registration failed: {}", e);
            internal_error(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/users/addAnotherUser",
    tag = "Users",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "User created and identity provisioned, or a conflict message", body = user_service::InsertReply),
        (status = 401, description = "No verified caller identity"),
        (status = 403, description = "Caller is not an admin"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn add_another_user(
    req: HttpRequest,
    db: web::Data<MongoDB>,
    firebase: web::Data<FirebaseAuth>,
    request: web::Json<RegisterUserRequest>,
) -> HttpResponse {
    log::info!("📝 POST /users/addAnotherUser - email: {}", request.email);

    let requester = match requester_email(&req) {
        Some(email) => email,
        None => {
            log::warn!("❌ Admin creation attempted without a verified caller");
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Authorization required" }));
        }
    };

    match user_service::check_admin(&db, &requester).await {
        Ok(true) => {}
        Ok(false) => {
            log::warn!("❌ Non-admin {} tried to add another user", requester);
            return HttpResponse::Forbidden().json(serde_json::json!({
                "message": "You do not have access to add another user"
            }));
        }
        Err(e) => {
            log::error!("❌ Requester lookup failed: {}", e);
            return internal_error(e);
        }
    }

    match user_service::create_user_by_admin(&db, &firebase, request.into_inner()).await {
        Ok(CreateUserOutcome::Created(reply)) => {
            log::info!("✅ User created by {}: {}", requester, reply.inserted_id);
            HttpResponse::Ok().json(reply)
        }
        Ok(CreateUserOutcome::EmailTaken) => {
            log::warn!("❌ Admin creation rejected: duplicate email");
            conflict_message("This user is already registered")
        }
        Ok(CreateUserOutcome::UsernameTaken) => {
            log::warn!("❌ Admin creation rejected: duplicate username");
            conflict_message("This username is already taken")
        }
        Err(e) => {
            log::error!("❌ Admin creation failed: {}", e);
            internal_error(e)
        }
    }
}

#[utoipa::path(
    put,
    path = "/users/update/{id}",
    tag = "Users",
    params(
        ("id" = String, Path, description = "User record id")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Update result, or a username-taken message", body = user_service::UpdateReply),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_user(
    db: web::Data<MongoDB>,
    firebase: web::Data<FirebaseAuth>,
    path: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
) -> HttpResponse {
    let id = path.into_inner();
    log::info!("🔧 PUT /users/update/{}", id);

    match user_service::update_user(&db, &firebase, &id, request.into_inner()).await {
        Ok(UpdateUserOutcome::Updated(reply)) => {
            log::info!("✅ User {} updated", id);
            HttpResponse::Ok().json(reply)
        }
        Ok(UpdateUserOutcome::UsernameTaken) => {
            log::warn!("❌ Update rejected for {}: username taken", id);
            conflict_message("This username is already taken")
        }
        Err(e) => {
            log::error!("❌ Update failed for {}: {}", id, e);
            internal_error(e)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/users/delete/{id}",
    tag = "Users",
    params(
        ("id" = String, Path, description = "User record id")
    ),
    responses(
        (status = 200, description = "Delete result", body = user_service::DeleteReply),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_user(
    db: web::Data<MongoDB>,
    firebase: web::Data<FirebaseAuth>,
    path: web::Path<String>,
) -> HttpResponse {
    let id = path.into_inner();
    log::info!("🗑️  DELETE /users/delete/{}", id);

    match user_service::delete_user(&db, &firebase, &id).await {
        Ok(reply) => {
            log::info!("✅ User {} deleted ({} record)", id, reply.deleted_count);
            HttpResponse::Ok().json(reply)
        }
        Err(e) => {
            log::error!("❌ Delete failed for {}: {}", id, e);
            internal_error(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(
        ("id" = String, Path, description = "User record id")
    ),
    responses(
        (status = 200, description = "The user record, or null when not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_user(db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    log::info!("👤 GET /users/{}", id);

    match user_service::get_user(&db, &id).await {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(e) => {
            log::error!("❌ Lookup failed for {}: {}", id, e);
            internal_error(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "All non-admin users, optionally sorted and paginated"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_users(
    db: web::Data<MongoDB>,
    query: web::Query<ListUsersQuery>,
) -> HttpResponse {
    log::info!(
        "📋 GET /users - page: {:?}, size: {:?}, sort: {:?} {:?}",
        query.page,
        query.size,
        query.property,
        query.order
    );

    match user_service::list_users(&db, &query).await {
        Ok(users) => {
            log::info!("✅ Listed {} users", users.len());
            HttpResponse::Ok().json(users)
        }
        Err(e) => {
            log::error!("❌ Listing failed: {}", e);
            internal_error(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/users/checkAdmin/{email}",
    tag = "Users",
    params(
        ("email" = String, Path, description = "Email to check")
    ),
    responses(
        (status = 200, description = "Whether the record holds the admin role"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn check_admin(db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    let email = path.into_inner();
    log::info!("🛡️  GET /users/checkAdmin/{}", email);

    match user_service::check_admin(&db, &email).await {
        Ok(admin) => HttpResponse::Ok().json(serde_json::json!({ "admin": admin })),
        Err(e) => {
            log::error!("❌ Admin check failed for {}: {}", email, e);
            internal_error(e)
        }
    }
}

#[utoipa::path(
    put,
    path = "/users/admin",
    tag = "Users",
    request_body = PromoteAdminRequest,
    responses(
        (status = 200, description = "Update result, or an already-admin message", body = user_service::UpdateReply),
        (status = 401, description = "No verified caller identity"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Target email has no record"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn promote_to_admin(
    req: HttpRequest,
    db: web::Data<MongoDB>,
    request: web::Json<PromoteAdminRequest>,
) -> HttpResponse {
    log::info!("🛡️  PUT /users/admin - target: {}", request.email);

    let requester = match requester_email(&req) {
        Some(email) => email,
        None => {
            log::warn!("❌ Promotion attempted without a verified caller");
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({ "message": "Authorization required" }));
        }
    };

    match user_service::check_admin(&db, &requester).await {
        Ok(true) => {}
        Ok(false) => {
            log::warn!("❌ Non-admin {} tried to promote {}", requester, request.email);
            return HttpResponse::Forbidden().json(serde_json::json!({
                "message": "You do not have access to make admin"
            }));
        }
        Err(e) => {
            log::error!("❌ Requester lookup failed: {}", e);
            return internal_error(e);
        }
    }

    match user_service::promote_to_admin(&db, &request.email).await {
        Ok(PromoteOutcome::Promoted(reply)) => {
            log::info!("✅ {} promoted to admin by {}", request.email, requester);
            HttpResponse::Ok().json(reply)
        }
        Ok(PromoteOutcome::AlreadyAdmin) => {
            log::warn!("❌ {} already holds a role", request.email);
            conflict_message("This user is already an admin")
        }
        Ok(PromoteOutcome::NotFound) => {
            log::warn!("❌ No record for {}", request.email);
            HttpResponse::NotFound()
                .json(serde_json::json!({ "message": "No user found with this email" }))
        }
        Err(e) => {
            log::error!("❌ Promotion failed for {}: {}", request.email, e);
            internal_error(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;
    use mongodb::bson::doc;
    use uuid::Uuid;

    use crate::database::USERS_COLLECTION;
    use crate::models::User;
    use crate::services::user_service::CreateUserOutcome;

    fn unique(tag: &str) -> String {
        format!("{}-{}", tag, Uuid::new_v4().simple())
    }

    async fn test_db() -> web::Data<MongoDB> {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/user_dashboard_test".to_string());
        web::Data::new(MongoDB::new(&uri).await.expect("MongoDB must be running"))
    }

    fn payload(tag: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            email: format!("{}@example.com", unique(tag)),
            username: unique(tag),
            name: "Handler Test".to_string(),
            age: "31".to_string(),
            gender: "other".to_string(),
            country: "Norway".to_string(),
            device: "web".to_string(),
            password: None,
        }
    }

    async fn register(db: &web::Data<MongoDB>, tag: &str) -> String {
        let request = payload(tag);
        let email = request.email.clone();
        let outcome = user_service::create_user(db, request).await.unwrap();
        assert!(matches!(outcome, CreateUserOutcome::Created(_)));
        email
    }

    async fn json_body(response: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn non_admin_caller_cannot_promote() {
        let db = test_db().await;
        let caller_email = register(&db, "caller").await;
        let target_email = register(&db, "target").await;

        let req = TestRequest::put().uri("/users/admin").to_http_request();
        req.extensions_mut().insert(RequesterEmail(caller_email));

        let response = promote_to_admin(
            req,
            db.clone(),
            web::Json(PromoteAdminRequest {
                email: target_email.clone(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["message"], "You do not have access to make admin");

        // Target role untouched
        assert!(!user_service::check_admin(&db, &target_email).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn promotion_without_verified_caller_is_unauthorized() {
        let db = test_db().await;
        let target_email = register(&db, "orphan").await;

        let req = TestRequest::put().uri("/users/admin").to_http_request();

        let response = promote_to_admin(
            req,
            db.clone(),
            web::Json(PromoteAdminRequest {
                email: target_email.clone(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Authorization required");

        assert!(!user_service::check_admin(&db, &target_email).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn non_admin_caller_cannot_add_another_user() {
        let db = test_db().await;
        let firebase = web::Data::new(FirebaseAuth::new("test-project", "test-key"));
        let caller_email = register(&db, "helper").await;

        let req = TestRequest::post()
            .uri("/users/addAnotherUser")
            .to_http_request();
        req.extensions_mut().insert(RequesterEmail(caller_email));

        let request = payload("recruit");
        let recruit_email = request.email.clone();

        let response = add_another_user(req, db.clone(), firebase, web::Json(request)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["message"], "You do not have access to add another user");

        // No record was created for the rejected payload
        let users = db.collection::<User>(USERS_COLLECTION);
        let created = users
            .find_one(doc! { "email": &recruit_email })
            .await
            .unwrap();
        assert!(created.is_none());
    }
}
