//! # Rusty-Forum Binary
//!
//! The entry point that assembles the application based on compile-time features.

mod settings;

use std::io;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use rf_api::handlers::AppState;
use rf_api::middleware::{cors_policy, standard_middleware};
use rf_core::Forum;
use settings::Settings;

// Feature-gated imports: each port is filled by exactly one plugin
#[cfg(feature = "db-sqlite")]
use rf_db_sqlite::SqliteForumRepo;

#[cfg(feature = "auth-simple")]
use rf_auth_simple::SimpleAuthProvider;

#[cfg(not(all(feature = "db-sqlite", feature = "auth-simple")))]
compile_error!("rusty-forum needs a database plugin (db-sqlite) and an auth plugin (auth-simple)");

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::load().map_err(io::Error::other)?;

    // 1. Initialize Database Implementation
    let repo = SqliteForumRepo::new(&settings.database_url).await.map_err(io::Error::other)?;

    // 2. Initialize Auth Implementation
    if settings.auth_pepper.is_empty() {
        log::warn!("FORUM_AUTH_PEPPER is not set; session digests are unpeppered");
    }
    let auth = SimpleAuthProvider::new(&settings.auth_pepper);

    // 3. Wrap in AppState (Using dynamic dispatch for maximum flexibility)
    let forum = Forum::new(Arc::new(repo), Arc::new(auth), settings.forum_settings().map_err(io::Error::other)?);
    let state = web::Data::new(AppState { forum });

    log::info!("🚀 Rusty-Forum starting on http://{}:{}", settings.bind_host, settings.bind_port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors_policy())
            .wrap(standard_middleware())
            .configure(rf_api::configure_routes)
    })
    .bind((settings.bind_host.as_str(), settings.bind_port))?
    .run()
    .await
}
