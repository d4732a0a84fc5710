use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use quackstack::media::build_media_store;
use quackstack::openapi::ApiDoc;
use quackstack::repo::build_repo;
use quackstack::{config, AppConfig, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment itself.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let app_config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping quackstack");
    info!("Frontend URL: {}", app_config.frontend_url);

    let repo = build_repo(&app_config).await.map_err(to_io)?;
    let media_store = build_media_store(&app_config).await.map_err(to_io)?;
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let bind = (app_config.bind_addr.clone(), app_config.port);
    let state = web::Data::new(AppState { repo, media_store, config: Arc::new(app_config) });

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // during local dev allow React/Vite default ports
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_origin(&state.config.frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_config(&state.config))
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind)?;

    info!("Listening on http://{}:{}", bind.0, bind.1);
    server.run().await
}

fn to_io(e: anyhow::Error) -> std::io::Error {
    tracing::error!("startup failed: {e:#}");
    std::io::Error::new(std::io::ErrorKind::Other, format!("{e:#}"))
}
