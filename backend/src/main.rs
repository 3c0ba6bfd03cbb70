use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use chrono::Duration;
use pneumo_backend::classifier::load_classifier;
use pneumo_backend::config::AppConfig;
use pneumo_backend::pipeline::InferencePipeline;
use pneumo_backend::routes::{UploadLimits, configure_routes};
use pneumo_backend::sessions::SessionStore;
use std::env;

// chrono::Duration::seconds panics beyond i64::MAX / 1000
const MAX_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(format!("Configuration failed: {e}"))
    })?;

    // loaded once, shared read-only by every worker until exit
    let classifier = load_classifier(&config.model).map_err(|e| {
        log::error!("Failed to load model at startup: {}", e);
        std::io::Error::other(format!("Model loading failed: {e}"))
    })?;

    let pipeline = InferencePipeline::new(classifier, config.pipeline);
    log::info!("Classifier backend '{}' ready", pipeline.classifier_name());
    if config.pipeline.plausibility_check {
        log::info!("X-ray plausibility check enabled");
    } else {
        log::warn!("X-ray plausibility check disabled; every upload will be scored");
    }

    let ttl_secs = i64::try_from(config.sessions.ttl_secs)
        .unwrap_or(MAX_SESSION_TTL_SECS)
        .min(MAX_SESSION_TTL_SECS);
    let store = SessionStore::new(Duration::seconds(ttl_secs));
    let limits = UploadLimits {
        max_bytes: config.server.max_upload_bytes,
    };

    let static_dir = config.server.static_dir.clone();
    match &static_dir {
        Some(dir) if dir.is_dir() => log::info!("Serving static files from {}", dir.display()),
        Some(dir) => log::warn!("Static directory {} does not exist", dir.display()),
        None => log::info!("No static directory configured; serving the API only"),
    }

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(pipeline.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(limits))
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
