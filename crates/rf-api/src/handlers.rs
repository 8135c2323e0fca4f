//! # rf-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the `Forum`
//! service. Handlers stay thin: extract, call the core, pick a status code.

use actix_web::{web, HttpResponse};
use rf_core::models::{CommentEdit, NewComment, NewPost, Page, PostEdit, User, UserUpdate, VoteRequest};
use rf_core::Forum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{Authenticated, Viewer};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub forum: Forum,
}

type ApiResult = Result<HttpResponse, ApiError>;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct NewSubreddit {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        Page::new(query.limit, query.offset)
    }
}

// ── Accounts ────────────────────────────────────────────────────────────────

pub async fn register(data: web::Data<AppState>, body: web::Json<RegisterRequest>) -> ApiResult {
    let body = body.into_inner();
    let (user, token) = data.forum.register(&body.username, &body.email, &body.password).await?;
    Ok(HttpResponse::Created().json(AuthResponse { user, token }))
}

pub async fn login(data: web::Data<AppState>, body: web::Json<LoginRequest>) -> ApiResult {
    let (user, token) = data.forum.login(&body.username, &body.password).await?;
    Ok(HttpResponse::Ok().json(AuthResponse { user, token }))
}

pub async fn current_user(data: web::Data<AppState>, auth: Authenticated) -> ApiResult {
    let user = data.forum.current_user(&auth.0).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn update_user(data: web::Data<AppState>, auth: Authenticated, body: web::Json<UserUpdate>) -> ApiResult {
    let user = data.forum.update_user(&auth.0, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn redact_user(data: web::Data<AppState>, auth: Authenticated) -> ApiResult {
    data.forum.redact_user(&auth.0).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ── Communities ─────────────────────────────────────────────────────────────

pub async fn create_subreddit(data: web::Data<AppState>, auth: Authenticated, body: web::Json<NewSubreddit>) -> ApiResult {
    let subreddit = data.forum.create_subreddit(&auth.0, &body.name).await?;
    let view = data.forum.subreddit_details(&subreddit.name).await?;
    Ok(HttpResponse::Created().json(view))
}

pub async fn subreddit_about(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let view = data.forum.subreddit_details(&path).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Ranked posts of one community (e.g., /r/rust?limit=10)
pub async fn subreddit_posts(
    data: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult {
    let posts = data
        .forum
        .list_posts(viewer.principal(), Some(path.as_str()), query.into_inner().into())
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn subscribe(data: web::Data<AppState>, auth: Authenticated, path: web::Path<String>) -> ApiResult {
    data.forum.set_subscription(&auth.0, &path, true).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn unsubscribe(data: web::Data<AppState>, auth: Authenticated, path: web::Path<String>) -> ApiResult {
    data.forum.set_subscription(&auth.0, &path, false).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn list_posts(data: web::Data<AppState>, viewer: Viewer, query: web::Query<PageQuery>) -> ApiResult {
    let posts = data.forum.list_posts(viewer.principal(), None, query.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn create_post(
    data: web::Data<AppState>,
    auth: Authenticated,
    path: web::Path<String>,
    body: web::Json<NewPost>,
) -> ApiResult {
    let subreddit = path.into_inner();
    let post = data.forum.create_post(&auth.0, &subreddit, body.into_inner()).await?;
    let view = data.forum.post_thread(Some(&auth.0), post.id, Some(subreddit.as_str())).await?;
    Ok(HttpResponse::Created().json(view))
}

/// A post with its comment tree (e.g., /r/rust/<uuid>/hello-world/comments).
/// The slug segment is cosmetic and not checked.
pub async fn post_comments(data: web::Data<AppState>, viewer: Viewer, path: web::Path<(String, Uuid, String)>) -> ApiResult {
    let (subreddit, post_id, _slug) = path.into_inner();
    let view = data.forum.post_thread(viewer.principal(), post_id, Some(subreddit.as_str())).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn edit_post(
    data: web::Data<AppState>,
    auth: Authenticated,
    path: web::Path<Uuid>,
    body: web::Json<PostEdit>,
) -> ApiResult {
    let post = data.forum.edit_post(&auth.0, path.into_inner(), body.into_inner()).await?;
    let view = data.forum.post_thread(Some(&auth.0), post.id, None).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn delete_post(data: web::Data<AppState>, auth: Authenticated, path: web::Path<Uuid>) -> ApiResult {
    data.forum.delete_post(&auth.0, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ── Comments ────────────────────────────────────────────────────────────────

pub async fn create_comment(data: web::Data<AppState>, auth: Authenticated, body: web::Json<NewComment>) -> ApiResult {
    let comment = data.forum.create_comment(&auth.0, body.into_inner()).await?;
    let view = data.forum.comment_thread(Some(&auth.0), comment.id).await?;
    Ok(HttpResponse::Created().json(view))
}

pub async fn view_comment(data: web::Data<AppState>, viewer: Viewer, path: web::Path<Uuid>) -> ApiResult {
    let view = data.forum.comment_thread(viewer.principal(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn edit_comment(
    data: web::Data<AppState>,
    auth: Authenticated,
    path: web::Path<Uuid>,
    body: web::Json<CommentEdit>,
) -> ApiResult {
    let comment = data.forum.edit_comment(&auth.0, path.into_inner(), body.into_inner()).await?;
    let view = data.forum.comment_thread(Some(&auth.0), comment.id).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn delete_comment(data: web::Data<AppState>, auth: Authenticated, path: web::Path<Uuid>) -> ApiResult {
    data.forum.delete_comment(&auth.0, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ── Votes ───────────────────────────────────────────────────────────────────

pub async fn cast_vote(data: web::Data<AppState>, auth: Authenticated, body: web::Json<VoteRequest>) -> ApiResult {
    let outcome = data.forum.cast_vote(&auth.0, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
