mod api;
mod database;
mod middleware;
mod models;
mod services;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use services::firebase_service::FirebaseAuth;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Get configuration from environment
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "5000".to_string());
    let database_url = env::var("MONGODB_URI").expect("MONGODB_URI must be set");

    log::info!("🚀 Starting User Directory Service...");

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&database_url)
        .await
        .expect("Failed to connect to MongoDB");

    log::info!("✅ MongoDB connected: {}", db.database().name());

    let db_data = web::Data::new(db.clone());

    // External auth provider (Firebase / Identity Toolkit)
    let firebase = FirebaseAuth::from_env().expect("Firebase configuration missing");
    let firebase_data = web::Data::new(firebase);

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(firebase_data.clone())
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
            // Liveness
            .route("/", web::get().to(api::health::index))
            .route("/health", web::get().to(api::health::health_check))
            // User directory
            .service(
                web::scope("/users")
                    // Admin-gated routes carry the token-decoration middleware
                    .service(
                        web::resource("/addAnotherUser")
                            .wrap(middleware::auth::VerifyToken)
                            .route(web::post().to(api::users::add_another_user)),
                    )
                    .service(
                        web::resource("/admin")
                            .wrap(middleware::auth::VerifyToken)
                            .route(web::put().to(api::users::promote_to_admin)),
                    )
                    .route("/update/{id}", web::put().to(api::users::update_user))
                    .route("/delete/{id}", web::delete().to(api::users::delete_user))
                    .route("/checkAdmin/{email}", web::get().to(api::users::check_admin))
                    .route("", web::get().to(api::users::list_users))
                    .route("", web::post().to(api::users::register_user))
                    // Catch-all id lookup stays last
                    .route("/{id}", web::get().to(api::users::get_user)),
            )
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
