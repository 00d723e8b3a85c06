// src/extractor.rs

use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::convert::Infallible;
use uuid::Uuid;

/// Nazwa ciasteczka z identyfikatorem sesji kasowej.
pub const SESSION_COOKIE: &str = "sesja_kasowa";

/// Jak długo bezczynna sesja kasowa żyje po stronie przeglądarki.
/// Wartość spięta z time-to-idle magazynu sesji w `AppState`.
pub const SESSION_COOKIE_HOURS: i64 = 2;

/// Identyfikator sesji kasowej wyciągnięty z ciasteczka.
/// Brak albo uszkodzone ciasteczko oznacza świeżą sesję (`is_new`);
/// handlery pełnych stron dokładają wtedy Set-Cookie do odpowiedzi.
pub struct CheckoutSessionId {
    pub id: Uuid,
    pub is_new: bool,
}

impl<S> FromRequestParts<S> for CheckoutSessionId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = match parts.extract::<CookieJar>().await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };

        let existing = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| Uuid::parse_str(cookie.value()).ok());

        match existing {
            Some(id) => Ok(CheckoutSessionId { id, is_new: false }),
            None => {
                let id = Uuid::new_v4();
                tracing::debug!("Brak ciasteczka sesji, przydzielam nowe: {}", id);
                Ok(CheckoutSessionId { id, is_new: true })
            }
        }
    }
}

/// Ciasteczko sesji do dołożenia w odpowiedzi dla świeżej sesji.
pub fn session_cookie(id: Uuid) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(time::Duration::hours(SESSION_COOKIE_HOURS));
    cookie
}
