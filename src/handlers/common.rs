use crate::{errors::ServiceError, services::carts::Actor};
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

/// Header carrying the guest session key. Requests send it back once they
/// have one; every cart response echoes the resolved key.
pub const SESSION_KEY_HEADER: &str = "x-session-key";
/// Set by the upstream identity layer for authenticated requests.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Success response that also echoes the actor's session key.
pub fn session_response<T: Serialize>(session_key: &str, data: T) -> Response {
    (
        StatusCode::OK,
        [(SESSION_KEY_HEADER, session_key.to_string())],
        Json(data),
    )
        .into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// Actor context assembled from headers instead of ambient session state.
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = match parts.headers.get(USER_ID_HEADER) {
            Some(value) => {
                let raw = value.to_str().map_err(|_| {
                    ServiceError::Validation(format!("invalid {USER_ID_HEADER} header"))
                })?;
                Some(Uuid::parse_str(raw).map_err(|_| {
                    ServiceError::Validation(format!("invalid {USER_ID_HEADER} header"))
                })?)
            }
            None => None,
        };

        let session_key = parts
            .headers
            .get(SESSION_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .filter(|key| !key.is_empty());

        Ok(Actor {
            user_id,
            session_key,
        })
    }
}

/// Pagination parameters for list operations
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}
