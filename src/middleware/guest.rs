//! Cart ownership resolution for signed-in users and anonymous guests.
//!
//! Guests are identified by the `guest_session` cookie. A shopper without a
//! valid cookie gets a fresh guest session minted on the spot, and the cookie
//! is returned alongside the handler's response.

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, header, request::Parts},
    response::{IntoResponseParts, ResponseParts},
};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};
use uuid::Uuid;

use crate::{
    error::AppError, middleware::auth::AuthUser, services::guest_service, state::AppState,
};

pub const GUEST_COOKIE: &str = "guest_session";
pub const GUEST_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Guest(String),
}

/// Resolved cart owner plus a cookie to send back when the guest session changed.
#[derive(Debug, Clone)]
pub struct CartSession {
    pub owner: CartOwner,
    pub cookie: Option<GuestCookie>,
}

impl FromRequestParts<AppState> for CartSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user =
            <AuthUser as axum::extract::OptionalFromRequestParts<AppState>>::from_request_parts(
                parts, state,
            )
            .await?;
        if let Some(user) = user {
            return Ok(CartSession {
                owner: CartOwner::User(user.user_id),
                cookie: None,
            });
        }

        let presented = guest_token(parts);
        let resolved = guest_service::resolve_guest(state, presented.as_deref()).await?;
        let cookie = resolved.created.then(|| GuestCookie::set(&resolved.token));

        Ok(CartSession {
            owner: CartOwner::Guest(resolved.token),
            cookie,
        })
    }
}

/// Cart owner for read-only routes: never mints a guest session, so a shopper
/// without a bearer token or a live guest cookie resolves to `None`.
#[derive(Debug, Clone)]
pub struct ExistingCartOwner(pub Option<CartOwner>);

impl FromRequestParts<AppState> for ExistingCartOwner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user =
            <AuthUser as axum::extract::OptionalFromRequestParts<AppState>>::from_request_parts(
                parts, state,
            )
            .await?;
        if let Some(user) = user {
            return Ok(ExistingCartOwner(Some(CartOwner::User(user.user_id))));
        }

        let owner = match guest_token(parts) {
            Some(token) => guest_service::find_live(state, &token)
                .await?
                .map(CartOwner::Guest),
            None => None,
        };
        Ok(ExistingCartOwner(owner))
    }
}

/// Reads the guest token from the request cookies, if any.
pub fn guest_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == GUEST_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Optional guest token extractor for routes that never mint sessions.
#[derive(Debug, Clone)]
pub struct GuestToken(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for GuestToken {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(GuestToken(guest_token(parts)))
    }
}

#[derive(Debug, Clone)]
pub struct GuestCookie(Cookie<'static>);

impl GuestCookie {
    pub fn set(token: &str) -> Self {
        let cookie = Cookie::build((GUEST_COOKIE, token.to_string()))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(Duration::days(GUEST_TTL_DAYS))
            .build();
        Self(cookie)
    }

    pub fn clear() -> Self {
        let mut cookie = Cookie::build((GUEST_COOKIE, ""))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .path("/")
            .build();
        cookie.make_removal();
        Self(cookie)
    }

    pub fn header_value(&self) -> String {
        self.0.to_string()
    }
}

impl IntoResponseParts for GuestCookie {
    type Error = std::convert::Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        match HeaderValue::from_str(&self.header_value()) {
            Ok(value) => {
                res.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => tracing::warn!(error = %err, "unable to encode guest cookie"),
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[test]
    fn set_cookie_carries_security_attributes() {
        let header = GuestCookie::set("abc").header_value();
        assert!(header.starts_with("guest_session=abc"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
        assert!(header.contains("SameSite=Strict"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=604800"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let header = GuestCookie::clear().header_value();
        assert!(header.starts_with("guest_session=;"));
        assert!(header.contains("Max-Age=0"));
    }

    #[test]
    fn token_is_found_among_other_cookies() {
        let (parts, _) = Request::builder()
            .header(header::COOKIE, "theme=dark; guest_session=tok-1; other=x")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(guest_token(&parts).as_deref(), Some("tok-1"));

        let (parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(guest_token(&parts), None);
    }
}
