pub mod credentials;
pub mod password;
pub mod sessions;
pub mod token;
pub mod validation;

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use tracing::debug;

use crate::{error::AppError, state::AppState};

pub use credentials::CredentialService;
pub use sessions::{SessionManager, ValidatedSession};

/// Bearer token presented with a request, taken from the `Authorization`
/// header or, failing that, the `token` query parameter. Empty when neither
/// is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestToken(pub String);

impl RequestToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Ok(TypedHeader(Authorization(bearer))) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
        {
            return Ok(RequestToken(bearer.token().to_string()));
        }

        Ok(RequestToken(
            token_from_query(parts.uri.query()).unwrap_or_default(),
        ))
    }
}

fn token_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

/// Rejects requests whose token is missing, unknown or expired. The
/// validated session is left in the request extensions.
///
/// A multipart POST without a header or query token is let through: its
/// token travels inside the `meta` part and the upload handler checks it.
pub async fn require_session(
    State(state): State<AppState>,
    token: RequestToken,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if token.as_str().is_empty() && carries_form_token(&request) {
        return Ok(next.run(request).await);
    }

    let session = state
        .sessions
        .validate_token(token.as_str())
        .await
        .map_err(|err| {
            debug!(error = %err, path = %request.uri().path(), "request rejected");
            AppError::from(err)
        })?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

fn carries_form_token(request: &Request) -> bool {
    request.method() == Method::POST
        && request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value
                    .trim_start()
                    .to_ascii_lowercase()
                    .starts_with("multipart/form-data")
            })
}
