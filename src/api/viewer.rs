// Viewer identity extractor. Authentication happens upstream; this service
// trusts the `x-viewer-id` header. Absent header means an anonymous viewer,
// a malformed one is rejected outright.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::core::UserId;
use crate::error::AppError;

pub const VIEWER_HEADER: &str = "x-viewer-id";

/// The authenticated viewer, or `None` for anonymous requests.
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<UserId>);

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(VIEWER_HEADER) else {
            return Ok(Viewer(None));
        };
        let id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                AppError::Unauthorized(format!("invalid {} header", VIEWER_HEADER))
            })?;
        Ok(Viewer(Some(UserId::new(id))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Viewer, AppError> {
        let (mut parts, _) = request.into_parts();
        Viewer::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_header_is_anonymous() {
        let req = Request::builder().body(()).unwrap();
        let viewer = extract(req).await.unwrap();
        assert!(viewer.0.is_none());
    }

    #[tokio::test]
    async fn numeric_header_is_parsed() {
        let req = Request::builder()
            .header(VIEWER_HEADER, "42")
            .body(())
            .unwrap();
        let viewer = extract(req).await.unwrap();
        assert_eq!(viewer.0, Some(UserId::new(42)));
    }

    #[tokio::test]
    async fn garbage_header_is_rejected() {
        for bad in ["abc", "-3", "0", ""] {
            let req = Request::builder()
                .header(VIEWER_HEADER, bad)
                .body(())
                .unwrap();
            assert!(extract(req).await.is_err(), "expected rejection for {:?}", bad);
        }
    }
}
