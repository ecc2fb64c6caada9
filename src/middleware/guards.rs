//! Request guards for the management surface.
//!
//! Tokens are verified upstream; here a request only has to present one.
//! The token stays opaque and is never parsed.

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{FromRequest, HttpRequest};

use crate::error::AppError;

/// An authenticated management caller. Extraction fails with 401 when the
/// Authorization header is missing or blank.
#[derive(Debug, Clone)]
pub struct Caller {
    pub token: String,
}

impl FromRequest for Caller {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|raw| raw.strip_prefix("Bearer ").unwrap_or(raw))
            .map(str::trim)
            .unwrap_or_default();

        if token.is_empty() {
            return ready(Err(AppError::Unauthorized));
        }
        ready(Ok(Caller {
            token: token.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn bearer_token_is_accepted() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer opaque-token"))
            .to_http_request();
        let caller = Caller::extract(&req).await.unwrap();
        assert_eq!(caller.token, "opaque-token");
    }

    #[actix_web::test]
    async fn raw_token_is_accepted() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "opaque-token"))
            .to_http_request();
        let caller = Caller::extract(&req).await.unwrap();
        assert_eq!(caller.token, "opaque-token");
    }

    #[actix_web::test]
    async fn missing_or_blank_token_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(Caller::extract(&req).await.is_err());

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer   "))
            .to_http_request();
        assert!(Caller::extract(&req).await.is_err());
    }
}
