//! Custom Axum extractors.
//!
//! - `RequestId`: the id assigned by [`request_id_layer`](crate::middleware::request_id_layer)
//! - `Identity`: the caller forwarded by the upstream authentication proxy
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     request_id: RequestId,
//!     Identity(caller): Identity,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(request_id = %request_id.0, user_id = %caller.id, "Processing request");
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::REQUEST_ID_HEADER;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ticketing_core::{AttendeeId, Caller, Role};
use uuid::Uuid;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Request id for log correlation.
///
/// Read from request extensions when the middleware is installed, else from
/// the `x-request-id` header, else freshly generated.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(id))
    }
}

/// Authenticated caller.
///
/// Rejects with 401 when `X-User-Id` is missing or not a UUID. An absent or
/// unknown `X-User-Role` means a regular user.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(AttendeeId::from_uuid)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .unwrap_or_default();

        Ok(Self(Caller { id, role }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn identity(req: Request<()>) -> Result<Identity, AppError> {
        let (mut parts, ()) = req.into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_request_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .header(REQUEST_ID_HEADER, uuid.to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let request_id = RequestId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(request_id.0, uuid);
    }

    #[tokio::test]
    async fn test_request_id_generates_new() {
        let req = Request::builder().body(()).expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let request_id = RequestId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_ne!(request_id.0, Uuid::nil());
    }

    #[tokio::test]
    async fn test_identity_defaults_to_user_role() {
        let user = Uuid::new_v4();
        let req = Request::builder()
            .header(USER_ID_HEADER, user.to_string())
            .body(())
            .expect("Valid request");

        let Identity(caller) = identity(req).await.expect("Should extract");
        assert_eq!(caller.id, AttendeeId::from_uuid(user));
        assert_eq!(caller.role, Role::User);
    }

    #[tokio::test]
    async fn test_identity_reads_admin_role() {
        let req = Request::builder()
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(USER_ROLE_HEADER, "Admin")
            .body(())
            .expect("Valid request");

        let Identity(caller) = identity(req).await.expect("Should extract");
        assert_eq!(caller.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_identity_missing_or_malformed_is_unauthorized() {
        let missing = Request::builder().body(()).expect("Valid request");
        let err = identity(missing).await.expect_err("Should reject");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let malformed = Request::builder()
            .header(USER_ID_HEADER, "alice")
            .body(())
            .expect("Valid request");
        let err = identity(malformed).await.expect_err("Should reject");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
