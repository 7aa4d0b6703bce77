use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use super::error::ApiError;
use crate::engine::access;
use crate::engine::{Operation, Principal, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller as asserted by the upstream auth gateway. `None` when the
/// identity headers are missing or the role is unknown.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Principal>);

impl Caller {
    /// Role gate for `op`.
    pub fn authorize(&self, op: Operation) -> Result<Principal, ApiError> {
        Ok(access::authorize(self.0.as_ref(), op)?.clone())
    }
}

pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let id = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim();
    if id.is_empty() {
        return None;
    }
    let role = Role::parse(headers.get(USER_ROLE_HEADER)?.to_str().ok()?)?;
    Some(Principal::new(id, role))
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(principal_from_headers(&parts.headers)))
    }
}
