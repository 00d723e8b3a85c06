// src/api_client.rs

use async_trait::async_trait;
use reqwest::Client;

use crate::{
    errors::AppError,
    models::{
        Cart, CartResponse, CouponPayload, CreateOrderData, CreateOrderResponse, DataEnvelope,
        MutationResponse, Order, OrderResponse, UpsertCartLinePayload,
    },
    state::ApiConfig,
};

/// Interfejs API sklepu (zaplecze REST). Za tym traitem siedzi prawdziwy
/// klient HTTP; w testach podstawiamy atrapę, więc cała orkiestracja
/// koszyka i kasy jest testowalna bez sieci.
#[async_trait]
pub trait ShopApi: Send + Sync {
    /// `GET cart` - pełny koszyk z policzonymi przez serwer sumami.
    async fn fetch_cart(&self) -> Result<Cart, AppError>;

    /// `POST cart` - nowa pozycja koszyka dla produktu.
    async fn add_cart_line(&self, product_id: &str, qty: u32) -> Result<(), AppError>;

    /// `PUT cart/{line_id}` - zmiana ilości istniejącej pozycji.
    async fn update_cart_line(
        &self,
        line_id: &str,
        product_id: &str,
        qty: u32,
    ) -> Result<(), AppError>;

    /// `DELETE cart/{line_id}`.
    async fn remove_cart_line(&self, line_id: &str) -> Result<(), AppError>;

    /// `POST coupon` - serwer waliduje kod i przelicza `final_total`.
    /// Zwraca komunikat sukcesu z serwera.
    async fn apply_coupon(&self, code: &str) -> Result<String, AppError>;

    /// `POST order` - utworzenie zamówienia, zwraca nadany identyfikator.
    async fn create_order(&self, order: &CreateOrderData) -> Result<String, AppError>;

    /// `GET order/{order_id}` - zapisane zamówienie do widoku potwierdzenia.
    async fn fetch_order(&self, order_id: &str) -> Result<Order, AppError>;
}

/// Klient HTTP API sklepu. Limit czasu żądań jest ustawiony globalnie na
/// kliencie reqwest (konfiguracja), więc każda mutacja jest ograniczona
/// czasowo i timeout wraca jako zwykły błąd żądania.
pub struct HttpShopApi {
    client: Client,
    config: ApiConfig,
}

impl HttpShopApi {
    pub fn new(client: Client, config: ApiConfig) -> Self {
        Self { client, config }
    }

    /// Składa pełny adres zasobu: `{base}/v2/api/{path}/{suffix}`.
    fn endpoint(&self, suffix: &str) -> String {
        format!(
            "{}/v2/api/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_path,
            suffix
        )
    }

    /// Wyciąga komunikat błędu z odpowiedzi zaplecza; gdy body nie daje się
    /// sparsować, zostaje komunikat zastępczy ze statusem.
    async fn rejection(resp: reqwest::Response, fallback: &str) -> AppError {
        let status = resp.status();
        match resp.json::<MutationResponse>().await {
            Ok(body) => {
                let message = body
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("{} (status: {})", fallback, status));
                AppError::ApiRejected(message)
            }
            Err(e) => {
                tracing::debug!("Nie można sparsować body błędu z zaplecza: {}", e);
                AppError::ApiRejected(format!("{} (status: {})", fallback, status))
            }
        }
    }
}

#[async_trait]
impl ShopApi for HttpShopApi {
    async fn fetch_cart(&self) -> Result<Cart, AppError> {
        let url = self.endpoint("cart");
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Self::rejection(resp, "Nie udało się pobrać koszyka").await);
        }

        let body = resp.json::<CartResponse>().await.map_err(|e| {
            tracing::error!("Błąd deserializacji odpowiedzi koszyka: {}", e);
            AppError::ApiRejected("Niepoprawna odpowiedź serwera przy pobieraniu koszyka".into())
        })?;

        match body.data {
            Some(cart) if body.success => Ok(cart),
            _ => Err(AppError::ApiRejected(
                body.message
                    .unwrap_or_else(|| "Nie udało się pobrać koszyka".into()),
            )),
        }
    }

    async fn add_cart_line(&self, product_id: &str, qty: u32) -> Result<(), AppError> {
        let url = self.endpoint("cart");
        let payload = DataEnvelope {
            data: UpsertCartLinePayload {
                product_id: product_id.to_string(),
                qty,
            },
        };
        let resp = self.client.post(&url).json(&payload).send().await?;

        if !resp.status().is_success() {
            return Err(Self::rejection(resp, "Nie udało się dodać do koszyka").await);
        }
        let body = resp.json::<MutationResponse>().await.unwrap_or(MutationResponse {
            success: true,
            message: None,
        });
        if !body.success {
            return Err(AppError::ApiRejected(
                body.message
                    .unwrap_or_else(|| "Nie udało się dodać do koszyka".into()),
            ));
        }
        Ok(())
    }

    async fn update_cart_line(
        &self,
        line_id: &str,
        product_id: &str,
        qty: u32,
    ) -> Result<(), AppError> {
        let url = self.endpoint(&format!("cart/{}", line_id));
        let payload = DataEnvelope {
            data: UpsertCartLinePayload {
                product_id: product_id.to_string(),
                qty,
            },
        };
        let resp = self.client.put(&url).json(&payload).send().await?;

        if !resp.status().is_success() {
            return Err(Self::rejection(resp, "Nie udało się zmienić ilości").await);
        }
        let body = resp.json::<MutationResponse>().await.unwrap_or(MutationResponse {
            success: true,
            message: None,
        });
        if !body.success {
            return Err(AppError::ApiRejected(
                body.message
                    .unwrap_or_else(|| "Nie udało się zmienić ilości".into()),
            ));
        }
        Ok(())
    }

    async fn remove_cart_line(&self, line_id: &str) -> Result<(), AppError> {
        let url = self.endpoint(&format!("cart/{}", line_id));
        let resp = self.client.delete(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Self::rejection(resp, "Nie udało się usunąć pozycji").await);
        }
        Ok(())
    }

    async fn apply_coupon(&self, code: &str) -> Result<String, AppError> {
        let url = self.endpoint("coupon");
        let payload = DataEnvelope {
            data: CouponPayload {
                code: code.to_string(),
            },
        };
        let resp = self.client.post(&url).json(&payload).send().await?;

        if !resp.status().is_success() {
            return Err(Self::rejection(resp, "Kod rabatowy jest nieprawidłowy lub wygasł").await);
        }
        let body = resp.json::<MutationResponse>().await.map_err(|e| {
            tracing::error!("Błąd deserializacji odpowiedzi kuponu: {}", e);
            AppError::ApiRejected("Niepoprawna odpowiedź serwera przy kuponie".into())
        })?;
        if !body.success {
            return Err(AppError::ApiRejected(
                body.message
                    .unwrap_or_else(|| "Kod rabatowy jest nieprawidłowy lub wygasł".into()),
            ));
        }
        Ok(body
            .message
            .unwrap_or_else(|| "Kupon został zastosowany".into()))
    }

    async fn create_order(&self, order: &CreateOrderData) -> Result<String, AppError> {
        let url = self.endpoint("order");
        let payload = DataEnvelope { data: order };
        let resp = self.client.post(&url).json(&payload).send().await?;

        if !resp.status().is_success() {
            return Err(Self::rejection(resp, "Nie udało się złożyć zamówienia").await);
        }
        let body = resp.json::<CreateOrderResponse>().await.map_err(|e| {
            tracing::error!("Błąd deserializacji odpowiedzi zamówienia: {}", e);
            AppError::ApiRejected("Niepoprawna odpowiedź serwera przy zamówieniu".into())
        })?;

        match body.order_id {
            Some(order_id) if body.success => Ok(order_id),
            _ => Err(AppError::ApiRejected(
                body.message
                    .unwrap_or_else(|| "Nie udało się złożyć zamówienia".into()),
            )),
        }
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Order, AppError> {
        let url = self.endpoint(&format!("order/{}", order_id));
        let resp = self.client.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(Self::rejection(resp, "Nie udało się pobrać zamówienia").await);
        }
        let body = resp.json::<OrderResponse>().await.map_err(|e| {
            tracing::error!("Błąd deserializacji zapisanego zamówienia: {}", e);
            AppError::ApiRejected("Niepoprawna odpowiedź serwera przy zamówieniu".into())
        })?;

        match body.order {
            Some(order) if body.success => Ok(order),
            // Zaplecze zwraca success=true i order=null dla nieznanego id.
            _ => Err(AppError::NotFound),
        }
    }
}
