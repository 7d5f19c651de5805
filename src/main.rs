use actix_web::{App, HttpServer, middleware::Compress};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use ireporter::openapi::ApiDoc;
use ireporter::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use ireporter::routes::{config, AppState, DeletePolicy};
use ireporter::security::SecurityHeaders;
use ireporter::storage::build_media_store;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker, etc.)
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping iReporter server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = {
        info!("Using in-memory repository backend");
        ireporter::repo::inmem::InMemRepo::new()
    };

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let max_conns: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        let pool = PgPoolOptions::new()
            .max_connections(max_conns)
            // A saturated pool surfaces as a retryable failure, not a hang.
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        match sqlx::migrate!().run(&pool).await {
            Ok(()) => info!("Database migrations applied"),
            Err(e) => tracing::warn!("migrations not applied yet (database unreachable?): {e}"),
        }
        info!("Using Postgres repository backend");
        ireporter::repo::pg::PgRepo::new(pool)
    };

    let openapi = ApiDoc::openapi();
    let media_store = build_media_store();
    let rate_limit_enabled = std::env::var("RL_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(true);
    let rate_limiter = RateLimiterFacade::new(
        InMemoryRateLimiter::new(rate_limit_enabled),
        RateLimitConfig::from_env(),
    );
    let delete_policy = DeletePolicy::from_env();
    info!("Delete policy: {:?}", delete_policy);

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local React/Vite dev ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                // containerized nginx frontend (served on 3000)
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                media_store: media_store.clone(),
                rate_limiter: Some(rate_limiter.clone()),
                delete_policy,
            }))
    })
    .bind(("0.0.0.0", 8080))?; // listen on all interfaces so a frontend container can reach it

    info!("Listening on http://0.0.0.0:8080 (all interfaces)");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut missing = Vec::new();
    if env::var("JWT_SECRET").is_err() {
        missing.push("JWT_SECRET");
    }
    if cfg!(feature = "postgres-store") && env::var("DATABASE_URL").is_err() {
        missing.push("DATABASE_URL");
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }
}
