//! Principal extraction from `Authorization: Token <token>`.

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::{FutureExt, LocalBoxFuture};
use rf_core::error::AppError;
use rf_core::models::Principal;

use crate::error::ApiError;
use crate::handlers::AppState;

/// A request that must carry a valid session token.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Principal);

/// A request that may carry a session token. A token that is present but
/// invalid is still rejected.
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<Principal>);

impl Viewer {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

fn token_from(req: &HttpRequest) -> Result<Option<String>, AppError> {
    let Some(header) = req.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("malformed authorization header".into()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if (scheme == "Token" || scheme == "Bearer") && !token.trim().is_empty() => {
            Ok(Some(token.trim().to_string()))
        }
        _ => Err(AppError::Unauthorized("expected 'Authorization: Token <token>'".into())),
    }
}

async fn resolve(state: Option<web::Data<AppState>>, token: String) -> Result<Principal, ApiError> {
    let state = state.ok_or_else(|| AppError::Internal("application state is not configured".into()))?;
    Ok(state.forum.authenticate(&token).await?)
}

async fn require(
    state: Option<web::Data<AppState>>,
    token: Result<Option<String>, AppError>,
) -> Result<Authenticated, ApiError> {
    let token = token?.ok_or_else(|| AppError::Unauthorized("authentication credentials were not provided".into()))?;
    Ok(Authenticated(resolve(state, token).await?))
}

async fn observe(state: Option<web::Data<AppState>>, token: Result<Option<String>, AppError>) -> Result<Viewer, ApiError> {
    match token? {
        Some(token) => Ok(Viewer(Some(resolve(state, token).await?))),
        None => Ok(Viewer(None)),
    }
}

impl FromRequest for Authenticated {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        require(state, token_from(req)).boxed_local()
    }
}

impl FromRequest for Viewer {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        observe(state, token_from(req)).boxed_local()
    }
}
