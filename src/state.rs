// src/state.rs

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use uuid::Uuid;

use crate::api_client::ShopApi;
use crate::checkout_session::CheckoutSession;

/// Konfiguracja API zaplecza (adres bazowy + prefiks ścieżki + limit czasu).
/// Prefiks wersji/ścieżki to konfiguracja, nie logika.
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_path: String,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn ShopApi>,
    /// Sesje kasowe per odwiedzający; time-to-idle w cache'u wyznacza
    /// cykl życia sesji kasowej (nie proces, jak w globalnym singletonie).
    pub sessions: Cache<Uuid, Arc<CheckoutSession>>,
}

impl AppState {
    pub fn new(api: Arc<dyn ShopApi>, session_idle: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(session_idle)
            .build();
        Self { api, sessions }
    }

    /// Zwraca sesję kasową dla identyfikatora z ciasteczka; pierwsza
    /// wizyta dostaje świeżą sesję z wstrzykniętym klientem API.
    pub async fn checkout_session(&self, session_id: Uuid) -> Arc<CheckoutSession> {
        let api = self.api.clone();
        self.sessions
            .get_with(session_id, async move {
                tracing::debug!("Nowa sesja kasowa: {}", session_id);
                Arc::new(CheckoutSession::new(api))
            })
            .await
    }
}
