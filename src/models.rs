// src/models.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumIter, EnumString};
use validator::{Validate, ValidationError};

/// Metoda płatności oferowana w kasie.
/// Zamówienie w API zaplecza nie ma pola płatności, więc wybór
/// jedzie do serwera wewnątrz pola `message` zamówienia.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum PaymentMethod {
    #[strum(serialize = "WebATM")]
    #[serde(rename = "WebATM")]
    WebAtm,
    #[strum(serialize = "ATM")]
    #[serde(rename = "ATM")]
    Atm,
    #[strum(serialize = "ApplePay")]
    ApplePay,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::WebAtm
    }
}

// --- MODELE KOSZYKA (kształt odpowiedzi API zaplecza) ---

/// Skrót danych produktu osadzony w pozycji koszyka i zamówienia.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductBrief {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Pojedyncza pozycja koszyka. Identyfikator nadaje serwer przy utworzeniu;
/// `total` i `final_total` są zawsze policzone po stronie serwera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: String,
    pub product_id: String,
    pub qty: u32,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub final_total: f64,
    pub product: ProductBrief,
}

/// Koszyk w kształcie zwracanym przez zaplecze.
/// Niezmiennik: `final_total <= total` (rabat nigdy nie podnosi ceny).
/// Klient NIE liczy rabatu sam, wyświetla tylko `total - final_total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Cart {
    #[serde(rename = "carts", default)]
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub final_total: f64,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Pary `{product_id, qty}` do zrzutu zamówienia, w kolejności pozycji.
    pub fn order_lines(&self) -> Vec<OrderRequestLine> {
        self.lines
            .iter()
            .map(|line| OrderRequestLine {
                product_id: line.product.id.clone(),
                qty: line.qty,
            })
            .collect()
    }
}

// --- MODELE ZAMÓWIENIA ---

/// Pozycja zapisanego zamówienia (mapa `products` w odpowiedzi API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    #[serde(default)]
    pub qty: u32,
    #[serde(default)]
    pub final_total: f64,
    pub product: ProductBrief,
}

/// Zapisane zamówienie. Z perspektywy klienta niezmienne po utworzeniu;
/// widok potwierdzenia tylko je odczytuje.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Order {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub create_at: Option<i64>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub products: HashMap<String, OrderLine>,
    #[serde(default)]
    pub user: Option<OrderContact>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Dane kontaktowe wewnątrz zapisanego zamówienia.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tel: String,
    #[serde(default)]
    pub address: String,
}

// --- PAYLOADY WYSYŁANE DO ZAPLECZA ---

/// Koperta `{ "data": ... }`, w której API zaplecza oczekuje każdego body.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T: Serialize> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertCartLinePayload {
    pub product_id: String,
    pub qty: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CouponPayload {
    pub code: String,
}

/// Pozycja żądania zamówienia: zrzut `{product_id, qty}` z koszyka
/// dokładnie w chwili wysyłki (bez ponownego pobierania).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequestLine {
    pub product_id: String,
    pub qty: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderUser {
    pub name: String,
    pub email: String,
    pub tel: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderData {
    pub user: CreateOrderUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub products: Vec<OrderRequestLine>,
}

// --- ODPOWIEDZI API ZAPLECZA ---

#[derive(Debug, Deserialize)]
pub struct CartResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Cart>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub order: Option<Order>,
    #[serde(default)]
    pub message: Option<String>,
}

// --- FORMULARZ KASY ---

/// Dane kontaktowe z formularza kasy. Walidowane w całości po stronie
/// klienta, zanim cokolwiek pójdzie do sieci; błędy wyświetlane przy polach.
#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct CheckoutContactInfo {
    #[validate(
        length(min = 1, message = "Adres e-mail jest wymagany"),
        email(message = "Nieprawidłowy format adresu e-mail")
    )]
    pub email: String,

    #[validate(length(
        min = 1,
        max = 100,
        message = "Imię i nazwisko jest wymagane (do 100 znaków)"
    ))]
    pub name: String,

    #[validate(custom(function = validate_tel))]
    pub tel: String,

    #[validate(length(min = 1, message = "Adres jest wymagany"))]
    pub address: String,
}

/// Pełny payload formularza kasy (kontakt + płatność + uwagi).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CheckoutFormPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tel: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl CheckoutFormPayload {
    pub fn contact_info(&self) -> CheckoutContactInfo {
        CheckoutContactInfo {
            email: self.email.trim().to_string(),
            name: self.name.trim().to_string(),
            tel: self.tel.trim().to_string(),
            address: self.address.trim().to_string(),
        }
    }
}

/// Telefon: po odrzuceniu wszystkiego poza cyframi musi zostać 9-11 cyfr.
fn validate_tel(tel: &str) -> Result<(), ValidationError> {
    let digits: String = tel.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        let mut err = ValidationError::new("tel_required");
        err.message = Some("Numer telefonu jest wymagany".into());
        return Err(err);
    }
    if digits.len() < 9 || digits.len() > 11 {
        let mut err = ValidationError::new("tel_format");
        err.message = Some("Podaj prawidłowy numer telefonu (9-11 cyfr)".into());
        return Err(err);
    }
    Ok(())
}

// --- PAYLOADY FORMULARZY HTMX ---

#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    #[serde(default = "default_qty")]
    pub qty: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartLineForm {
    pub product_id: String,
    pub qty: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponForm {
    #[serde(default)]
    pub code: String,
}

fn default_qty() -> u32 {
    1
}
