// src/main.rs

use axum::http::StatusCode;
use axum::response::Html;
use axum::{
    Router,
    routing::{get, post},
};
use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Deklaracje modułów
mod api_client; // dla src/api_client.rs
mod checkout_session; // dla src/checkout_session.rs
mod errors; // dla src/errors.rs
mod extractor; // dla src/extractor.rs
mod htmx_handlers;
mod models; // dla src/models.rs
mod order_flow; // dla src/order_flow.rs
mod pricing; // dla src/pricing.rs
mod response; // dla src/response.rs
mod state; // dla src/state.rs

use crate::api_client::HttpShopApi;
use crate::htmx_handlers::*;
use crate::state::{ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Inicjalizacja systemu logowania (tracing)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skincare_shop_frontend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Inicjalizacja witryny sklepu...");

    // --- Konfiguracja API zaplecza ---
    // Adres bazowy i prefiks ścieżki to czysta konfiguracja; walidujemy
    // adres na starcie, żeby literówka nie wyszła dopiero przy pierwszym
    // żądaniu.
    let base_url = env::var("SHOP_API_BASE_URL").expect("SHOP_API_BASE_URL must be set");
    if let Err(e) = url::Url::parse(&base_url) {
        tracing::error!("SHOP_API_BASE_URL nie jest poprawnym adresem: {}", e);
        std::process::exit(1);
    }
    let api_path = env::var("SHOP_API_PATH").expect("SHOP_API_PATH must be set");
    let timeout_secs = env::var("SHOP_API_TIMEOUT_SECS")
        .unwrap_or_else(|_| "15".to_string())
        .parse::<u64>()
        .expect("SHOP_API_TIMEOUT_SECS must be a valid number");

    let api_config = ApiConfig {
        base_url,
        api_path,
        request_timeout: Duration::from_secs(timeout_secs),
    };

    // Limit czasu siedzi na kliencie, więc obejmuje każdą mutację;
    // przekroczenie wraca jako zwykły błąd żądania.
    let http_client = reqwest::Client::builder()
        .timeout(api_config.request_timeout)
        .build()
        .expect("Nie można zbudować klienta HTTP");

    let api = Arc::new(HttpShopApi::new(http_client, api_config));

    // Cykl życia sesji kasowej spięty z ważnością ciasteczka.
    let session_idle = Duration::from_secs(60 * 60 * extractor::SESSION_COOKIE_HOURS as u64);
    let app_state = AppState::new(api, session_idle);

    // Definicja routingu aplikacji
    let app = Router::new()
        .route("/", get(serve_index))
        .route("/koszyk", get(cart_page_handler))
        .route("/kasa", get(checkout_page_handler))
        .route("/sukces/{order_id}", get(order_confirmation_handler))
        .route("/htmx/cart/details", get(get_cart_details_htmx_handler))
        .route("/htmx/cart/add/{product_id}", post(add_item_to_cart_htmx_handler))
        .route(
            "/htmx/cart/update/{line_id}",
            post(update_cart_line_htmx_handler),
        )
        .route(
            "/htmx/cart/remove/{line_id}",
            post(remove_cart_line_htmx_handler),
        )
        .route("/htmx/coupon/apply", post(apply_coupon_htmx_handler))
        .route("/htmx/checkout/submit", post(submit_checkout_htmx_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // Adres i port, na którym serwer będzie nasłuchiwał
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("Serwer nasłuchuje na {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Nie można powiązać adresu {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        tracing::error!("Błąd serwera: {}", e);
    }
}

async fn serve_index() -> Result<Html<String>, StatusCode> {
    match tokio::fs::read_to_string("static/index.html").await {
        Ok(content) => Ok(Html(content)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
