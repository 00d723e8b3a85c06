// src/order_flow.rs

use std::sync::{Arc, Mutex};

use validator::Validate;

use crate::{
    api_client::ShopApi,
    errors::AppError,
    models::{
        Cart, CheckoutContactInfo, CreateOrderData, CreateOrderUser, Order, PaymentMethod,
    },
    pricing::{SHIPPING_FEE, charged_total},
};

/// Faza przepływu składania zamówienia. `Submitting` blokuje każdy
/// równoległy duplikat; `Failed` wraca do edycji z zachowanymi danymi
/// formularza, więc osobnej fazy nie potrzebuje.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionPhase {
    Editing,
    Submitting,
}

/// Wynik udanego złożenia zamówienia: identyfikator nadany przez serwer
/// plus koszt dostawy, który jedzie do widoku potwierdzenia jako stan
/// przejściowy nawigacji.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub order_id: String,
    pub shipping_fee: i64,
}

/// Przepływ składania zamówienia jednej sesji kasowej. Konstruowany z
/// wstrzykniętym klientem API razem z sesją, nie przez globalny stan.
pub struct OrderSubmission {
    api: Arc<dyn ShopApi>,
    phase: Mutex<SubmissionPhase>,
}

/// Strażnik fazy: każde zejście z `Submitting` (sukces, błąd, panika)
/// wraca do `Editing`, żeby formularz nie został zablokowany na stałe.
struct PhaseGuard<'a> {
    phase: &'a Mutex<SubmissionPhase>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = SubmissionPhase::Editing;
        }
    }
}

impl OrderSubmission {
    pub fn new(api: Arc<dyn ShopApi>) -> Self {
        Self {
            api,
            phase: Mutex::new(SubmissionPhase::Editing),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.phase
            .lock()
            .map(|phase| *phase == SubmissionPhase::Submitting)
            .unwrap_or(false)
    }

    /// Przejście Editing -> Submitting. Duplikat w trakcie wysyłki jest
    /// odrzucany wprost, nie tylko "zniechęcany" wyłączonym przyciskiem.
    fn try_begin(&self) -> Result<PhaseGuard<'_>, AppError> {
        let mut phase = self
            .phase
            .lock()
            .map_err(|_| AppError::InternalServerError("Blokada fazy zamówienia pękła".into()))?;
        if *phase == SubmissionPhase::Submitting {
            return Err(AppError::OperationInProgress(
                "Zamówienie jest już wysyłane".to_string(),
            ));
        }
        *phase = SubmissionPhase::Submitting;
        Ok(PhaseGuard { phase: &self.phase })
    }

    /// Składa zamówienie z przekazanego zrzutu koszyka.
    ///
    /// Kolejność jest częścią kontraktu:
    /// 1. pełna walidacja danych kontaktowych PRZED jakimkolwiek żądaniem
    ///    (błędy wracają per pole i nigdy nie dotykają sieci),
    /// 2. pozycje zamówienia to pary `{product_id, qty}` z koszyka
    ///    dokładnie w chwili wysyłki - bez ponownego pobierania, wysyłamy
    ///    to, co użytkownik widział na ekranie,
    /// 3. porażka zostawia formularz w edycji z wpisanymi wartościami;
    ///    żadne częściowe zamówienie nie jest zakładane.
    ///
    /// Metoda płatności jest wyborem czysto prezentacyjnym - payload
    /// zamówienia w API zaplecza nie ma pola płatności.
    pub async fn submit(
        &self,
        contact: &CheckoutContactInfo,
        payment: PaymentMethod,
        message: Option<String>,
        cart: &Cart,
    ) -> Result<SubmittedOrder, AppError> {
        contact.validate()?;

        if cart.is_empty() {
            return Err(AppError::UnprocessableEntity(
                "Twój koszyk jest pusty".to_string(),
            ));
        }

        let _guard = self.try_begin()?;

        tracing::info!(
            "Składanie zamówienia: {} pozycji, płatność {}",
            cart.lines.len(),
            payment
        );

        let data = CreateOrderData {
            user: CreateOrderUser {
                name: contact.name.clone(),
                email: contact.email.clone(),
                tel: contact.tel.clone(),
                address: contact.address.clone(),
            },
            message: message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
            products: cart.order_lines(),
        };

        let order_id = self.api.create_order(&data).await?;
        tracing::info!("Zamówienie przyjęte, id: {}", order_id);

        Ok(SubmittedOrder {
            order_id,
            shipping_fee: SHIPPING_FEE,
        })
    }
}

/// Dane widoku potwierdzenia zamówienia, niezależne od żywego koszyka
/// (koszyk mógł już zostać wyczyszczony po stronie serwera).
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order: Order,
    pub shipping_fee: i64,
    pub charged_total: i64,
}

/// Pobiera zapisane zamówienie dokładnie raz. Koszt dostawy przychodzi ze
/// stanu przejściowego nawigacji; przy wejściu z bezpośredniego linku
/// stanu nie ma i obowiązuje domyślna stawka. Błąd pobrania wraca do
/// wywołującego - zamówienie jest niezmienne, cicha ponowna próba nie ma
/// żadnej wartości, a zmyślonych danych nie pokazujemy.
pub async fn load_order_confirmation(
    api: &dyn ShopApi,
    order_id: &str,
    carried_shipping: Option<i64>,
) -> Result<OrderConfirmation, AppError> {
    let order = api.fetch_order(order_id).await?;
    let shipping_fee = carried_shipping.unwrap_or(SHIPPING_FEE);

    // Ta sama reguła sufitu co przy wycenie koszyka, ale liczona z
    // utrwalonego `order.total`.
    let charged = charged_total(order.total, shipping_fee);

    Ok(OrderConfirmation {
        order,
        shipping_fee,
        charged_total: charged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::test_support::MockShopApi;
    use crate::models::{CartLine, ProductBrief};
    use std::sync::atomic::Ordering;

    fn contact() -> CheckoutContactInfo {
        CheckoutContactInfo {
            email: "anna.kowalska@example.com".into(),
            name: "Anna Kowalska".into(),
            tel: "601234567".into(),
            address: "ul. Polna 12/3, 00-625 Warszawa".into(),
        }
    }

    fn cart_with_lines() -> Cart {
        Cart {
            lines: vec![
                CartLine {
                    id: "L1".into(),
                    product_id: "P1".into(),
                    qty: 2,
                    total: 700.0,
                    final_total: 700.0,
                    product: ProductBrief {
                        id: "P1".into(),
                        title: "Serum z witaminą C".into(),
                        ..ProductBrief::default()
                    },
                },
                CartLine {
                    id: "L2".into(),
                    product_id: "P2".into(),
                    qty: 1,
                    total: 300.0,
                    final_total: 300.0,
                    product: ProductBrief {
                        id: "P2".into(),
                        title: "Krem nawilżający".into(),
                        ..ProductBrief::default()
                    },
                },
            ],
            total: 1000.0,
            final_total: 1000.0,
        }
    }

    #[tokio::test]
    async fn missing_address_blocks_submission_before_network() {
        let api = Arc::new(MockShopApi::new());
        let flow = OrderSubmission::new(api.clone());
        let mut bad_contact = contact();
        bad_contact.address = "".into();

        let result = flow
            .submit(&bad_contact, PaymentMethod::WebAtm, None, &cart_with_lines())
            .await;

        match result {
            Err(AppError::ValidationError(errors)) => {
                assert!(errors.field_errors().contains_key("address"));
            }
            other => panic!("Oczekiwano błędu walidacji, jest: {:?}", other.err()),
        }
        assert_eq!(api.order_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_submit_returns_order_id_and_shipping() {
        let api = Arc::new(MockShopApi::new());
        let flow = OrderSubmission::new(api.clone());

        let submitted = flow
            .submit(&contact(), PaymentMethod::Atm, None, &cart_with_lines())
            .await
            .unwrap();

        assert_eq!(submitted.order_id, "X123");
        assert_eq!(submitted.shipping_fee, SHIPPING_FEE);
        assert_eq!(api.order_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn order_lines_are_snapshotted_from_given_cart() {
        let api = Arc::new(MockShopApi::new());
        let flow = OrderSubmission::new(api.clone());
        let cart = cart_with_lines();

        flow.submit(&contact(), PaymentMethod::WebAtm, Some("proszę o fakturę".into()), &cart)
            .await
            .unwrap();

        let sent = api.last_order.lock().unwrap().clone().unwrap();
        assert_eq!(sent.products, cart.order_lines());
        assert_eq!(sent.message.as_deref(), Some("proszę o fakturę"));
        // Zrzut nie wymusza dodatkowego pobrania koszyka.
        assert_eq!(api.fetch_cart_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_cart_is_rejected_without_request() {
        let api = Arc::new(MockShopApi::new());
        let flow = OrderSubmission::new(api.clone());

        let result = flow
            .submit(&contact(), PaymentMethod::WebAtm, None, &Cart::default())
            .await;

        assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
        assert_eq!(api.order_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_submit_is_rejected_while_in_flight() {
        let api = Arc::new(MockShopApi::new());
        api.delay_ms.store(50, Ordering::SeqCst);
        let flow = Arc::new(OrderSubmission::new(api.clone()));

        let first = {
            let flow = flow.clone();
            tokio::spawn(async move {
                flow.submit(&contact(), PaymentMethod::WebAtm, None, &cart_with_lines())
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(flow.is_submitting());

        let second = flow
            .submit(&contact(), PaymentMethod::WebAtm, None, &cart_with_lines())
            .await;

        assert!(matches!(second, Err(AppError::OperationInProgress(_))));
        first.await.unwrap().unwrap();
        assert_eq!(api.order_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_submit_returns_to_editing_and_allows_retry() {
        let api = Arc::new(MockShopApi::new());
        api.fail_order.store(true, Ordering::SeqCst);
        let flow = OrderSubmission::new(api.clone());

        let result = flow
            .submit(&contact(), PaymentMethod::WebAtm, None, &cart_with_lines())
            .await;
        assert!(matches!(result, Err(AppError::ApiRejected(_))));
        assert!(!flow.is_submitting());

        api.fail_order.store(false, Ordering::SeqCst);
        flow.submit(&contact(), PaymentMethod::WebAtm, None, &cart_with_lines())
            .await
            .unwrap();
        assert_eq!(api.order_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn submitted_order_feeds_confirmation_with_carried_fee() {
        let api = Arc::new(MockShopApi::new());
        api.order.lock().unwrap().total = 1000.0;
        let flow = OrderSubmission::new(api.clone());

        let submitted = flow
            .submit(&contact(), PaymentMethod::ApplePay, None, &cart_with_lines())
            .await
            .unwrap();
        assert_eq!(submitted.order_id, "X123");

        // Potwierdzenie czyta zamówienie po przekazanym identyfikatorze
        // i używa opłaty przyniesionej ze stanu nawigacji.
        let confirmation = load_order_confirmation(
            api.as_ref(),
            &submitted.order_id,
            Some(submitted.shipping_fee),
        )
        .await
        .unwrap();

        assert_eq!(confirmation.shipping_fee, submitted.shipping_fee);
        assert_eq!(confirmation.charged_total, 1160);
    }

    #[tokio::test]
    async fn confirmation_uses_carried_shipping_fee() {
        let api = MockShopApi::new();
        api.order.lock().unwrap().total = 800.0;

        let confirmation = load_order_confirmation(&api, "X123", Some(160))
            .await
            .unwrap();

        assert_eq!(confirmation.shipping_fee, 160);
        assert_eq!(confirmation.charged_total, 960);
        assert_eq!(api.fetch_order_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn confirmation_falls_back_to_default_fee_on_direct_entry() {
        let api = MockShopApi::new();
        api.order.lock().unwrap().total = 800.25;

        let confirmation = load_order_confirmation(&api, "X123", None).await.unwrap();

        assert_eq!(confirmation.shipping_fee, SHIPPING_FEE);
        // Sufit do pełnej złotówki, jak przy wycenie koszyka.
        assert_eq!(confirmation.charged_total, 961);
    }

    #[tokio::test]
    async fn confirmation_fetch_failure_is_surfaced_not_fabricated() {
        let api = MockShopApi::new();
        api.fail_fetch_order.store(true, Ordering::SeqCst);

        let result = load_order_confirmation(&api, "X123", None).await;

        assert!(result.is_err());
        // Dokładnie jedna próba; żadnych automatycznych ponowień.
        assert_eq!(api.fetch_order_calls.load(Ordering::SeqCst), 1);
    }
}
