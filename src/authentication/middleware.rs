use warp::{reject::Rejection, Filter};

use crate::{
    constants::SESSION_COOKIE,
    error::{ApiError, HtmlError},
    schema::Id,
};

use super::jwt::{SessionData, SessionKeys};

/// Who is making the current request. Passed explicitly into every store
/// operation that depends on the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    session: Option<SessionData>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { session: None }
    }

    pub fn authenticated(session: SessionData) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn viewer_id(&self) -> Option<Id> {
        self.session.as_ref().map(|session| session.user_id)
    }

    pub fn require_session(&self) -> Result<&SessionData, ApiError> {
        self.session
            .as_ref()
            .ok_or_else(|| HtmlError::InvalidSession.default())
    }
}

/// Extracts the token of `Authorization: Token <jwt>` or `Authorization: Bearer <jwt>`.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    match scheme {
        "Token" | "Bearer" if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Builds the request context from the authorization header or the session
/// cookie. Invalid or expired tokens produce an anonymous context.
pub fn with_context(
    keys: SessionKeys,
) -> impl Filter<Extract = (RequestContext,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .map(move |header: Option<String>, cookie: Option<String>| {
            let token = header
                .as_deref()
                .and_then(bearer_token)
                .map(str::to_owned)
                .or(cookie);

            match token.map(|token| keys.verify_session_token(&token)) {
                Some(Ok(session)) => RequestContext::authenticated(session.into()),
                Some(Err(e)) => {
                    log::trace!("> Ignoring session: {}", e.info);
                    RequestContext::anonymous()
                }
                None => RequestContext::anonymous(),
            }
        })
}
