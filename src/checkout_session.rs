// src/checkout_session.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

use crate::api_client::ShopApi;
use crate::errors::AppError;
use crate::models::Cart;
use crate::order_flow::OrderSubmission;

/// Sesja kasowa jednego odwiedzającego: jedyny właściciel bieżącego widoku
/// koszyka i pośrednik każdej mutacji. Żaden inny komponent nie dotyka
/// pól koszyka bezpośrednio; wycena i potwierdzenie tylko czytają.
pub struct CheckoutSession {
    api: Arc<dyn ShopApi>,
    cart: RwLock<Cart>,
    /// Identyfikatory pozycji z żądaniem w locie. Wpis trwa od wysłania
    /// do odpowiedzi i znika dokładnie raz, niezależnie od wyniku.
    pending: Arc<Mutex<HashSet<String>>>,
    /// Najwyżej jedno zgłoszenie kuponu naraz, niezależnie od mutacji pozycji.
    coupon_lock: tokio::sync::Mutex<()>,
    submission: OrderSubmission,
}

/// Strażnik wpisu w zbiorze pozycji w toku. Zwolnienie w `Drop` gwarantuje
/// sprzątnięcie także przy błędzie żądania, więc kontrolka pozycji nigdy
/// nie zostaje zablokowana na stałe.
struct PendingGuard {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

impl CheckoutSession {
    pub fn new(api: Arc<dyn ShopApi>) -> Self {
        Self {
            submission: OrderSubmission::new(api.clone()),
            api,
            cart: RwLock::new(Cart::default()),
            pending: Arc::new(Mutex::new(HashSet::new())),
            coupon_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn submission(&self) -> &OrderSubmission {
        &self.submission
    }

    /// Zrzut bieżącego koszyka (do widoków i do zrzutu zamówienia).
    pub async fn cart_snapshot(&self) -> Cart {
        self.cart.read().await.clone()
    }

    /// Identyfikatory pozycji z żądaniem w locie (do wyłączania kontrolek).
    pub fn pending_lines(&self) -> HashSet<String> {
        self.pending.lock().map(|set| set.clone()).unwrap_or_default()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }

    /// Rejestruje pozycję jako "w toku". `None` oznacza, że ta pozycja ma
    /// już żądanie w locie i wywołujący powinien odpuścić (no-op).
    fn try_begin_pending(&self, key: &str) -> Option<PendingGuard> {
        let mut set = self.pending.lock().ok()?;
        if set.insert(key.to_string()) {
            Some(PendingGuard {
                set: Arc::clone(&self.pending),
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    /// Pobiera koszyk z zaplecza i podmienia całość. Przy błędzie poprzedni
    /// koszyk zostaje nietknięty, a błąd wraca do wywołującego jako
    /// odwracalne powiadomienie. Bezpieczne do wołania wielokrotnie.
    pub async fn load_cart(&self) -> Result<Cart, AppError> {
        let cart = self.api.fetch_cart().await?;
        if cart.final_total > cart.total {
            // Serwer złamał własny niezmiennik; pokazujemy co przysłał,
            // rabat i tak zostanie ucięty do zera przy wycenie.
            tracing::warn!(
                "Koszyk z zaplecza ma final_total {} > total {}",
                cart.final_total,
                cart.total
            );
        }
        let mut current = self.cart.write().await;
        *current = cart.clone();
        Ok(cart)
    }

    /// Dodaje nową pozycję (`line_id = None`, wartownikiem w zbiorze pozycji
    /// w toku jest wtedy identyfikator produktu) albo zmienia ilość
    /// istniejącej. Po udanej mutacji pełne przeładowanie koszyka zamiast
    /// lokalnej łatki: serwer liczy sumy, klient nigdy nie dryfuje.
    pub async fn add_or_update_line(
        &self,
        line_id: Option<&str>,
        product_id: &str,
        qty: u32,
    ) -> Result<(), AppError> {
        if qty == 0 {
            return Err(AppError::BadRequest(
                "Ilość musi być liczbą dodatnią".to_string(),
            ));
        }

        let key = line_id.unwrap_or(product_id);
        let Some(_guard) = self.try_begin_pending(key) else {
            tracing::debug!("Pozycja {} ma już mutację w locie, pomijam", key);
            return Ok(());
        };

        match line_id {
            Some(id) => self.api.update_cart_line(id, product_id, qty).await?,
            None => self.api.add_cart_line(product_id, qty).await?,
        }

        // Mutacja przeszła; padnięte przeładowanie to błąd częściowy -
        // wpis "w toku" i tak znika (Drop), następna akcja doczyta stan.
        self.load_cart().await?;
        Ok(())
    }

    /// Usuwa pozycję koszyka. Drugie wywołanie dla tej samej pozycji przed
    /// odpowiedzią pierwszego jest no-opem i nie wysyła żadnego żądania.
    pub async fn remove_line(&self, line_id: &str) -> Result<(), AppError> {
        let Some(_guard) = self.try_begin_pending(line_id) else {
            tracing::debug!("Pozycja {} jest już usuwana, pomijam", line_id);
            return Ok(());
        };

        self.api.remove_cart_line(line_id).await?;
        self.load_cart().await?;
        Ok(())
    }

    /// Przekazuje kod rabatowy do serwera i synchronizuje koszyk po
    /// sukcesie. Klient nie zna formuły rabatu: jedyne źródło kwoty
    /// rabatu to `total - final_total` ze świeżo przeładowanego koszyka.
    pub async fn apply_coupon(&self, code: &str) -> Result<String, AppError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::BadRequest("Wpisz kod rabatowy".to_string()));
        }

        let Ok(_guard) = self.coupon_lock.try_lock() else {
            return Err(AppError::OperationInProgress(
                "Poprzednie zgłoszenie kuponu jeszcze trwa".to_string(),
            ));
        };

        // Przy odrzuconym kodzie koszyk zostaje nietknięty.
        let message = self.api.apply_coupon(code).await?;
        self.load_cart().await?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::test_support::MockShopApi;
    use crate::models::{CartLine, ProductBrief};
    use std::sync::atomic::Ordering;

    fn sample_cart(total: f64, final_total: f64) -> Cart {
        Cart {
            lines: vec![CartLine {
                id: "L1".into(),
                product_id: "P1".into(),
                qty: 2,
                total,
                final_total,
                product: ProductBrief {
                    id: "P1".into(),
                    title: "Krem nawilżający".into(),
                    ..ProductBrief::default()
                },
            }],
            total,
            final_total,
        }
    }

    fn session_with(mock: MockShopApi) -> (Arc<MockShopApi>, CheckoutSession) {
        let api = Arc::new(mock);
        let session = CheckoutSession::new(api.clone());
        (api, session)
    }

    #[tokio::test]
    async fn load_cart_is_idempotent() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 800.0)));

        let first = session.load_cart().await.unwrap();
        let second = session.load_cart().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second, session.cart_snapshot().await);
        assert_eq!(api.fetch_cart_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_cart() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 800.0)));
        session.load_cart().await.unwrap();

        api.fail_fetch_cart.store(true, Ordering::SeqCst);
        let result = session.load_cart().await;

        assert!(result.is_err());
        assert_eq!(session.cart_snapshot().await, sample_cart(1000.0, 800.0));
    }

    #[tokio::test(start_paused = true)]
    async fn double_remove_sends_exactly_one_delete() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 1000.0)));
        api.delay_ms.store(50, Ordering::SeqCst);
        let session = Arc::new(session);

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.remove_line("L1").await })
        };
        // Pierwsze usuwanie wisi na symulowanej sieci...
        tokio::task::yield_now().await;
        assert!(session.is_pending("L1"));

        // ...a drugie kliknięcie w tym czasie ma być no-opem.
        session.remove_line("L1").await.unwrap();

        first.await.unwrap().unwrap();
        assert_eq!(api.remove_calls.load(Ordering::SeqCst), 1);
        assert!(!session.is_pending("L1"));
    }

    #[tokio::test(start_paused = true)]
    async fn double_add_of_same_product_sends_one_request() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 1000.0)));
        api.delay_ms.store(50, Ordering::SeqCst);
        let session = Arc::new(session);

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.add_or_update_line(None, "P1", 1).await })
        };
        tokio::task::yield_now().await;
        // Dla nowej pozycji wartownikiem jest identyfikator produktu.
        assert!(session.is_pending("P1"));

        session.add_or_update_line(None, "P1", 1).await.unwrap();

        first.await.unwrap().unwrap();
        assert_eq!(api.add_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn independent_lines_mutate_concurrently() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 1000.0)));
        let session = Arc::new(session);

        let (a, b) = tokio::join!(
            session.add_or_update_line(Some("L1"), "P1", 2),
            session.add_or_update_line(Some("L2"), "P2", 3),
        );

        a.unwrap();
        b.unwrap();
        assert_eq!(api.update_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_mutation_clears_pending_flag() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 1000.0)));
        api.fail_mutations.store(true, Ordering::SeqCst);

        let result = session.remove_line("L1").await;

        assert!(result.is_err());
        assert!(!session.is_pending("L1"));

        // Kontrolka odżyła: kolejna próba faktycznie wysyła żądanie.
        api.fail_mutations.store(false, Ordering::SeqCst);
        session.remove_line("L1").await.unwrap();
        assert_eq!(api.remove_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mutation_triggers_full_reload() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 1000.0)));

        session.add_or_update_line(Some("L1"), "P1", 5).await.unwrap();

        assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.fetch_cart_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.cart_snapshot().await, sample_cart(1000.0, 1000.0));
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_without_request() {
        let (api, session) = session_with(MockShopApi::new());

        let result = session.add_or_update_line(Some("L1"), "P1", 0).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_coupon_leaves_cart_untouched() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 1000.0)));
        session.load_cart().await.unwrap();
        let before_fetches = api.fetch_cart_calls.load(Ordering::SeqCst);

        api.fail_coupon.store(true, Ordering::SeqCst);
        let result = session.apply_coupon("ZIMA2025").await;

        assert!(matches!(result, Err(AppError::ApiRejected(_))));
        assert_eq!(session.cart_snapshot().await.final_total, 1000.0);
        // Bez sukcesu nie ma przeładowania.
        assert_eq!(api.fetch_cart_calls.load(Ordering::SeqCst), before_fetches);
    }

    #[tokio::test]
    async fn accepted_coupon_reloads_cart_with_discount() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 1000.0)));
        session.load_cart().await.unwrap();

        // Serwer przeliczył final_total; klient tylko przeładowuje.
        *api.cart.lock().unwrap() = sample_cart(1000.0, 800.0);
        let message = session.apply_coupon("ZIMA2025").await.unwrap();

        assert_eq!(message, "Kupon został zastosowany");
        let cart = session.cart_snapshot().await;
        assert_eq!(cart.total - cart.final_total, 200.0);
    }

    #[tokio::test]
    async fn empty_coupon_code_never_reaches_network() {
        let (api, session) = session_with(MockShopApi::new());

        let result = session.apply_coupon("   ").await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(api.coupon_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn coupon_application_is_single_flight() {
        let (api, session) = session_with(MockShopApi::with_cart(sample_cart(1000.0, 800.0)));
        api.delay_ms.store(50, Ordering::SeqCst);
        let session = Arc::new(session);

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.apply_coupon("ZIMA2025").await })
        };
        tokio::task::yield_now().await;

        let second = session.apply_coupon("ZIMA2025").await;

        assert!(matches!(second, Err(AppError::OperationInProgress(_))));
        first.await.unwrap().unwrap();
        assert_eq!(api.coupon_calls.load(Ordering::SeqCst), 1);
    }
}
