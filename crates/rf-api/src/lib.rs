//! # rf-api
//!
//! The web routing and orchestration layer for Rusty-Forum.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;

use actix_web::web;

/// Configures the routes for the forum.
///
/// # Developer Note
/// We use a scoped configuration to allow the main binary to mount
/// the API under different paths if needed (e.g., /api/v1/).
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(error::json_error))
        .app_data(web::QueryConfig::default().error_handler(error::query_error))
        .app_data(web::PathConfig::default().error_handler(error::path_error));

    cfg.service(
        web::scope("")
            // Accounts
            .route("/users", web::post().to(handlers::register))
            .route("/users/login", web::post().to(handlers::login))
            .service(
                web::resource("/user")
                    .route(web::get().to(handlers::current_user))
                    .route(web::put().to(handlers::update_user))
                    .route(web::delete().to(handlers::redact_user)),
            )
            // Communities (e.g., /r/rust)
            .route("/subreddits", web::post().to(handlers::create_subreddit))
            .route("/r/{name}", web::get().to(handlers::subreddit_posts))
            .route("/r/{name}/about", web::get().to(handlers::subreddit_about))
            .service(
                web::resource("/r/{name}/subscription")
                    .route(web::post().to(handlers::subscribe))
                    .route(web::delete().to(handlers::unsubscribe)),
            )
            // Posts
            .route("/posts", web::get().to(handlers::list_posts))
            .route("/r/{name}/posts", web::post().to(handlers::create_post))
            .route("/r/{name}/{post_id}/{slug}/comments", web::get().to(handlers::post_comments))
            .service(
                web::resource("/posts/{id}")
                    .route(web::put().to(handlers::edit_post))
                    .route(web::delete().to(handlers::delete_post)),
            )
            // Comments
            .route("/comments", web::post().to(handlers::create_comment))
            .service(
                web::resource("/comments/{id}")
                    .route(web::get().to(handlers::view_comment))
                    .route(web::put().to(handlers::edit_comment))
                    .route(web::delete().to(handlers::delete_comment)),
            )
            // Votes
            .route("/votes", web::post().to(handlers::cast_vote)),
    );
}
