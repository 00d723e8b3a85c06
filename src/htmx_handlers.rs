// src/htmx_handlers.rs

use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use maud::{Markup, html};
use serde::Deserialize;
use strum::IntoEnumIterator;

use crate::{
    errors::AppError,
    extractor::{CheckoutSessionId, session_cookie},
    models::{
        AddToCartForm, ApplyCouponForm, Cart, CheckoutFormPayload, PaymentMethod,
        UpdateCartLineForm,
    },
    order_flow::{OrderConfirmation, load_order_confirmation},
    pricing::{SHIPPING_FEE, derive_pricing, format_price, format_price_whole},
    response::build_response,
    state::AppState,
};

/// Górna granica ilości oferowana przez kontrolkę (serwer jej nie wymusza).
const MAX_LINE_QTY: u32 = 20;

// --- POMOCNIKI POWIADOMIEŃ ---

/// Nagłówek HX-Trigger z powiadomieniem dla użytkownika (toast).
fn toast_headers(kind: &str, message: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let payload = serde_json::json!({
        "showMessage": { "type": kind, "message": message }
    });
    match HeaderValue::from_str(&payload.to_string()) {
        Ok(value) => {
            headers.insert("HX-Trigger", value);
        }
        Err(_) => {
            tracing::error!("Nie można zbudować nagłówka HX-Trigger dla powiadomienia");
        }
    }
    headers
}

/// Toast dobrany do błędu operacji: duplikaty zgłoszeń to informacja,
/// reszta to pełnoprawny błąd. Błędy operacji kończą się tutaj,
/// powiadomieniem - nie propagują wyżej przez warstwę widoku.
fn error_toast(err: &AppError) -> HeaderMap {
    let kind = match err {
        AppError::OperationInProgress(_) => "info",
        _ => "error",
    };
    toast_headers(kind, &err.user_message())
}

/// Pierwszy komunikat walidacji dla każdego pola formularza.
fn validation_error_map(errors: &validator::ValidationErrors) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (field, field_errors) in errors.field_errors() {
        if let Some(error) = field_errors.first() {
            let message = error.message.as_ref().map_or_else(
                || format!("Pole '{}' jest nieprawidłowe", field),
                |m| m.to_string(),
            );
            map.insert(field.to_string(), message);
        }
    }
    map
}

// --- STRONA I FRAGMENT KOSZYKA ---

pub async fn cart_page_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    tracing::info!("MAUD: /koszyk - wejście do strefy kasy");
    let session = app_state.checkout_session(session_id.id).await;

    // Wejście do strefy kasy zawsze zaczyna od pobrania koszyka; błąd
    // zostawia poprzedni stan i zamienia się w odwracalne powiadomienie.
    let load_error = match session.load_cart().await {
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Nie udało się załadować koszyka: {}", e);
            Some(e.user_message())
        }
    };

    let cart = session.cart_snapshot().await;
    let pending = session.pending_lines();
    let markup = render_cart_view(&cart, &pending, load_error.as_deref());

    let response = build_response(headers, "Koszyk | Derma Studio", markup).await?;
    let jar = if session_id.is_new {
        jar.add(session_cookie(session_id.id))
    } else {
        jar
    };
    Ok((jar, response).into_response())
}

pub async fn get_cart_details_htmx_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
) -> Result<(HeaderMap, Markup), AppError> {
    tracing::info!("MAUD HTMX: /htmx/cart/details - odświeżenie koszyka");
    let session = app_state.checkout_session(session_id.id).await;

    let load_error = session.load_cart().await.err().map(|e| e.user_message());
    let cart = session.cart_snapshot().await;
    let pending = session.pending_lines();

    let headers = match &load_error {
        Some(message) => toast_headers("error", message),
        None => HeaderMap::new(),
    };
    Ok((
        headers,
        render_cart_view(&cart, &pending, load_error.as_deref()),
    ))
}

pub async fn add_item_to_cart_htmx_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
    Path(product_id): Path<String>,
    Form(form): Form<AddToCartForm>,
) -> Result<(HeaderMap, StatusCode), AppError> {
    tracing::info!(
        "MAUD HTMX: /htmx/cart/add/{} - dodawanie produktu (ilość {})",
        product_id,
        form.qty
    );
    let session = app_state.checkout_session(session_id.id).await;

    // Ilość poniżej 1 jest po cichu podbijana do 1, jak w kontrolce.
    let qty = form.qty.max(1);

    let headers = match session.add_or_update_line(None, &product_id, qty).await {
        Ok(()) => toast_headers("success", "Dodano do koszyka"),
        Err(e) => error_toast(&e),
    };

    // Przyciski "Dodaj do koszyka" mają hx-swap="none" - wystarczą nagłówki.
    Ok((headers, StatusCode::OK))
}

pub async fn update_cart_line_htmx_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
    Path(line_id): Path<String>,
    Form(form): Form<UpdateCartLineForm>,
) -> Result<(HeaderMap, Markup), AppError> {
    tracing::info!(
        "MAUD HTMX: /htmx/cart/update/{} - zmiana ilości na {}",
        line_id,
        form.qty
    );
    let session = app_state.checkout_session(session_id.id).await;

    // 1. Zakres z kontrolki sprawdzamy przed jakimkolwiek żądaniem.
    let headers = if form.qty == 0 || form.qty > MAX_LINE_QTY {
        toast_headers(
            "error",
            &format!("Ilość musi być w zakresie 1-{}", MAX_LINE_QTY),
        )
    } else {
        // 2. Mutacja + pełne przeładowanie w sesji kasowej.
        match session
            .add_or_update_line(Some(&line_id), &form.product_id, form.qty)
            .await
        {
            Ok(()) => toast_headers("success", "Zaktualizowano ilość"),
            Err(e) => error_toast(&e),
        }
    };

    // 3. Niezależnie od wyniku oddajemy świeży fragment koszyka.
    let cart = session.cart_snapshot().await;
    let pending = session.pending_lines();
    Ok((headers, render_cart_view(&cart, &pending, None)))
}

pub async fn remove_cart_line_htmx_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
    Path(line_id): Path<String>,
) -> Result<(HeaderMap, Markup), AppError> {
    tracing::info!("MAUD HTMX: /htmx/cart/remove/{} - usuwanie pozycji", line_id);
    let session = app_state.checkout_session(session_id.id).await;

    let headers = match session.remove_line(&line_id).await {
        Ok(()) => toast_headers("success", "Usunięto pozycję z koszyka"),
        Err(e) => error_toast(&e),
    };

    let cart = session.cart_snapshot().await;
    let pending = session.pending_lines();
    Ok((headers, render_cart_view(&cart, &pending, None)))
}

pub async fn apply_coupon_htmx_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
    Form(form): Form<ApplyCouponForm>,
) -> Result<(HeaderMap, Markup), AppError> {
    tracing::info!("MAUD HTMX: /htmx/coupon/apply - zgłoszenie kodu rabatowego");
    let session = app_state.checkout_session(session_id.id).await;

    let headers = match session.apply_coupon(&form.code).await {
        Ok(message) => toast_headers("success", &message),
        Err(e) => error_toast(&e),
    };

    let cart = session.cart_snapshot().await;
    let pending = session.pending_lines();
    Ok((headers, render_cart_view(&cart, &pending, None)))
}

/// Widok koszyka: pozycje, kod rabatowy, rozbicie cen, przejście do kasy.
/// Kontrolki pozycji z mutacją w locie są wyłączone do czasu odpowiedzi.
/// Fragment niesie własny kontener `#cart-content`, więc każda podmiana
/// (hx-swap "outerHTML") zostawia cel dla kolejnych operacji.
fn render_cart_view(cart: &Cart, pending: &HashSet<String>, load_error: Option<&str>) -> Markup {
    html! {
        div #cart-content {
            @if let Some(message) = load_error {
                div ."mb-4 border border-red-300 bg-red-50 px-4 py-3 text-sm text-red-700" {
                    (message)
                }
            }

            h2 ."text-xl font-semibold mb-4" { "Twój koszyk" }

            @if cart.is_empty() {
                div ."py-10 text-center" {
                    p ."text-gray-600 mb-4" { "Twój koszyk jest pusty." }
                    a href="/" ."inline-block bg-gray-900 text-white px-6 py-3" {
                        "Wróć do sklepu"
                    }
                }
            } @else {
                ul role="list" ."divide-y divide-gray-200 border-t border-b" {
                    @for line in &cart.lines {
                        @let line_pending = pending.contains(&line.id);
                        li ."flex py-4" {
                            @if let Some(image) = &line.product.image_url {
                                img src=(image) alt=(line.product.title)
                                    ."h-20 w-20 object-cover border border-gray-200";
                            }
                            div ."ml-4 flex flex-1 flex-col" {
                                div ."flex justify-between text-sm font-medium text-gray-800" {
                                    h3 { (line.product.title) }
                                    p ."ml-4" { (format_price(line.total)) }
                                }
                                @if let Some(description) = &line.product.description {
                                    p ."mt-1 text-xs text-gray-500" { (description) }
                                }
                                div ."mt-2 flex items-center justify-between" {
                                    select name="qty"
                                        "hx-post"=(format!("/htmx/cart/update/{}", line.id))
                                        "hx-trigger"="change"
                                        "hx-vals"=(format!(r#"{{"product_id": "{}"}}"#, line.product.id))
                                        "hx-target"="#cart-content"
                                        "hx-swap"="outerHTML"
                                        disabled[line_pending]
                                        ."border border-gray-300 px-2 py-1 text-sm" {
                                        @for n in 1..=MAX_LINE_QTY {
                                            option value=(n) selected[n == line.qty] { (n) }
                                        }
                                    }
                                    button type="button"
                                        "hx-post"=(format!("/htmx/cart/remove/{}", line.id))
                                        "hx-confirm"=(format!("Usunąć \"{}\" z koszyka?", line.product.title))
                                        "hx-target"="#cart-content"
                                        "hx-swap"="outerHTML"
                                        disabled[line_pending]
                                        ."text-sm text-pink-600 hover:text-pink-500 disabled:text-gray-400" {
                                        @if line_pending { "..." } @else { "Usuń" }
                                    }
                                }
                            }
                        }
                    }
                }

                form "hx-post"="/htmx/coupon/apply"
                    "hx-target"="#cart-content"
                    "hx-swap"="outerHTML"
                    ."mt-4 flex gap-2" {
                    input type="text" name="code" placeholder="Kod rabatowy"
                        ."flex-1 border border-gray-300 px-3 py-2 text-sm";
                    button type="submit" ."bg-gray-900 text-white px-4 py-2 text-sm" {
                        "Zastosuj kupon"
                    }
                }

                (render_pricing_table(cart))

                a href="/kasa"
                    ."mt-4 block w-full bg-pink-600 py-3 text-center font-semibold text-white" {
                    "Przejdź do kasy"
                }
            }
        }
    }
}

/// Rozbicie cen wspólne dla koszyka i podsumowania kasy - obie strony
/// wołają tę samą wycenę, więc nigdy się nie rozjadą.
fn render_pricing_table(cart: &Cart) -> Markup {
    let pricing = derive_pricing(cart, SHIPPING_FEE);
    html! {
        table ."mt-4 w-full text-sm text-gray-600" {
            tbody {
                tr {
                    th ."py-1 text-left font-normal" { "Wartość produktów" }
                    td ."py-1 text-right" { (format_price(pricing.subtotal)) }
                }
                tr {
                    th ."py-1 text-left font-normal" { "Rabat z kuponu" }
                    td ."py-1 text-right" { "-" (format_price(pricing.discount)) }
                }
                tr {
                    th ."py-1 text-left font-normal" { "Dostawa" }
                    td ."py-1 text-right" { "+" (format_price_whole(pricing.shipping)) }
                }
            }
        }
        div ."mt-2 flex justify-between text-lg font-bold" {
            p { "Do zapłaty" }
            p { (format_price_whole(pricing.total)) }
        }
    }
}

// --- KASA ---

pub async fn checkout_page_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    tracing::info!("MAUD: /kasa - formularz zamówienia");
    let session = app_state.checkout_session(session_id.id).await;

    let load_error = match session.load_cart().await {
        Ok(_) => None,
        Err(e) => Some(e.user_message()),
    };
    let cart = session.cart_snapshot().await;

    let markup = html! {
        div ."grid gap-6 md:grid-cols-2" {
            @if let Some(message) = load_error {
                div ."md:col-span-2 border border-red-300 bg-red-50 px-4 py-3 text-sm text-red-700" {
                    (message)
                }
            }
            (render_checkout_form(&CheckoutFormPayload::default(), &HashMap::new()))
            (render_checkout_summary(&cart))
        }
    };

    let response = build_response(headers, "Kasa | Derma Studio", markup).await?;
    let jar = if session_id.is_new {
        jar.add(session_cookie(session_id.id))
    } else {
        jar
    };
    Ok((jar, response).into_response())
}

#[axum_macros::debug_handler]
pub async fn submit_checkout_htmx_handler(
    State(app_state): State<AppState>,
    session_id: CheckoutSessionId,
    Form(payload): Form<CheckoutFormPayload>,
) -> Result<Response, AppError> {
    tracing::info!("MAUD HTMX: /htmx/checkout/submit - wysyłka zamówienia");
    let session = app_state.checkout_session(session_id.id).await;

    let contact = payload.contact_info();
    let payment = payload.payment_method.unwrap_or_default();

    // Zrzut koszyka z chwili wysyłki - zamawiamy dokładnie to, co
    // użytkownik widział, bez ponownego pobierania z serwera.
    let cart = session.cart_snapshot().await;

    match session
        .submission()
        .submit(&contact, payment, payload.message.clone(), &cart)
        .await
    {
        Ok(submitted) => {
            // Koszt dostawy jedzie do potwierdzenia jako stan przejściowy
            // nawigacji; bezpośredni link obędzie się bez niego.
            let mut headers = HeaderMap::new();
            let target = format!(
                "/sukces/{}?shipping={}",
                submitted.order_id, submitted.shipping_fee
            );
            headers.insert(
                "HX-Redirect",
                HeaderValue::from_str(&target).map_err(|_| {
                    AppError::InternalServerError("Niepoprawny adres przekierowania".into())
                })?,
            );
            Ok((headers, StatusCode::OK).into_response())
        }
        Err(AppError::ValidationError(errors)) => {
            // Błędy per pole wracają przy polach; wpisane wartości zostają.
            tracing::warn!("Błędy walidacji formularza kasy: {:?}", errors);
            let field_errors = validation_error_map(&errors);
            Ok(render_checkout_form(&payload, &field_errors).into_response())
        }
        Err(e) => {
            // Porażka wysyłki: formularz zostaje w edycji z danymi
            // użytkownika, błąd leci jako powiadomienie.
            tracing::warn!("Zamówienie odrzucone: {}", e);
            let headers = error_toast(&e);
            Ok((headers, render_checkout_form(&payload, &HashMap::new())).into_response())
        }
    }
}

/// Pole formularza kasy z opcjonalnym błędem walidacji przy polu.
fn field_input(
    id: &str,
    label: &str,
    input_type: &str,
    placeholder: &str,
    value: &str,
    error: Option<&String>,
) -> Markup {
    let border_class = if error.is_some() {
        "border-red-500"
    } else {
        "border-gray-300"
    };
    html! {
        div ."mb-3" {
            label for=(id) ."block text-sm text-gray-700 mb-1" { (label) }
            input type=(input_type) id=(id) name=(id) value=(value) placeholder=(placeholder)
                class={ "w-full border px-3 py-2 text-sm " (border_class) };
            @if let Some(message) = error {
                p ."mt-1 text-xs text-red-600" { (message) }
            }
        }
    }
}

/// Formularz kasy. Przy błędzie wysyłki wraca w całości (hx-swap
/// "outerHTML"), z wartościami wpisanymi przez użytkownika.
fn render_checkout_form(
    payload: &CheckoutFormPayload,
    errors: &HashMap<String, String>,
) -> Markup {
    let message_value = payload.message.clone().unwrap_or_default();
    let selected_payment = payload.payment_method.unwrap_or_default();

    html! {
        form #checkout-form
            "hx-post"="/htmx/checkout/submit"
            "hx-target"="this"
            "hx-swap"="outerHTML"
            "hx-disabled-elt"="find button[type='submit']"
            ."bg-white p-4" {

            h3 ."text-lg font-semibold mb-3" { "Dane kontaktowe" }
            (field_input("email", "E-mail", "email", "jan.nowak@example.com",
                &payload.email, errors.get("email")))
            (field_input("name", "Imię i nazwisko", "text", "Jan Nowak",
                &payload.name, errors.get("name")))
            (field_input("tel", "Telefon", "tel", "601 234 567",
                &payload.tel, errors.get("tel")))
            (field_input("address", "Adres", "text", "ul. Polna 12/3, 00-625 Warszawa",
                &payload.address, errors.get("address")))

            h3 ."text-lg font-semibold mt-4 mb-2" { "Metoda płatności" }
            @for method in PaymentMethod::iter() {
                div ."mb-1" {
                    label ."text-sm text-gray-600" {
                        input type="radio" name="payment_method" value=(method)
                            checked[method == selected_payment] ."mr-2";
                        (method)
                    }
                }
            }

            div ."mt-4" {
                label for="message" ."block text-sm text-gray-700 mb-1" {
                    "Uwagi do zamówienia (opcjonalnie)"
                }
                input type="text" id="message" name="message" value=(message_value)
                    ."w-full border border-gray-300 px-3 py-2 text-sm";
            }

            div ."mt-6 flex items-center justify-between" {
                a href="/koszyk" ."text-sm text-gray-700" { "Wróć do koszyka" }
                button type="submit" ."bg-gray-900 px-8 py-3 font-semibold text-white" {
                    "Złóż zamówienie"
                }
            }
        }
    }
}

/// Podsumowanie kasy - te same pozycje i ta sama wycena co widok koszyka.
fn render_checkout_summary(cart: &Cart) -> Markup {
    html! {
        div ."border p-4" {
            h3 ."text-lg font-semibold mb-3" { "Twoje zamówienie" }
            @for line in &cart.lines {
                div ."mb-2 flex justify-between text-sm" {
                    p { (line.product.title) " × " (line.qty) }
                    p { (format_price(line.total)) }
                }
            }
            (render_pricing_table(cart))
        }
    }
}

// --- POTWIERDZENIE ZAMÓWIENIA ---

#[derive(Debug, Deserialize)]
pub struct ConfirmationQuery {
    /// Koszt dostawy przyniesiony z kasy; brak przy bezpośrednim linku.
    pub shipping: Option<i64>,
}

pub async fn order_confirmation_handler(
    State(app_state): State<AppState>,
    Path(order_id): Path<String>,
    Query(query): Query<ConfirmationQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    tracing::info!("MAUD: /sukces/{} - potwierdzenie zamówienia", order_id);

    // Dokładnie jedno pobranie na wejście; przy błędzie strona błędu
    // zamiast zmyślonych danych, bez automatycznych ponowień.
    let markup =
        match load_order_confirmation(app_state.api.as_ref(), &order_id, query.shipping).await {
            Ok(confirmation) => render_confirmation_view(&confirmation),
            Err(e) => {
                tracing::warn!("Nie udało się pobrać zamówienia {}: {}", order_id, e);
                render_confirmation_error(&order_id)
            }
        };

    build_response(headers, "Potwierdzenie zamówienia | Derma Studio", markup).await
}

fn render_confirmation_view(confirmation: &OrderConfirmation) -> Markup {
    // Mapa pozycji z zaplecza nie gwarantuje kolejności; sortujemy po
    // identyfikatorze pozycji, żeby widok był stabilny między wejściami.
    let mut lines: Vec<_> = confirmation.order.products.values().collect();
    lines.sort_by(|a, b| a.id.cmp(&b.id));

    html! {
        div ."grid gap-6 md:grid-cols-2" {
            div {
                h2 ."text-2xl font-bold mb-2" { "Zamówienie przyjęte" }
                @if let Some(order_id) = &confirmation.order.id {
                    p ."text-sm text-gray-500" { "Numer zamówienia: " (order_id) }
                }
                @if let Some(created) = confirmation
                    .order
                    .create_at
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                {
                    p ."text-sm text-gray-500" {
                        "Data złożenia: " (created.format("%d.%m.%Y"))
                    }
                }
                p ."mt-2 text-gray-600" {
                    "Twoje zamówienie trafiło do realizacji."
                    br;
                    "Zadbana skóra zaczyna się dziś."
                }
                a href="/" ."mt-4 inline-block bg-gray-900 px-6 py-3 text-white" {
                    "Wróć do sklepu"
                }
            }

            div ."border p-4" {
                h3 ."text-lg font-semibold mb-3" { "Rozliczenie" }
                ul ."divide-y divide-gray-200" {
                    @for line in &lines {
                        li ."flex justify-between py-2 text-sm" {
                            div {
                                p ."font-medium" { (line.product.title) }
                                p ."text-gray-500" { "× " (line.qty) }
                            }
                            // Kwoty za pozycję pokazujemy po suficie,
                            // spójnie z kwotą do zapłaty.
                            p { (format_price_whole(line.final_total.ceil() as i64)) }
                        }
                    }
                }
                table ."mt-3 w-full text-sm text-gray-600" {
                    tbody {
                        tr {
                            th ."py-1 text-left font-normal" { "Dostawa" }
                            td ."py-1 text-right" {
                                (format_price_whole(confirmation.shipping_fee))
                            }
                        }
                    }
                }
                div ."mt-2 flex justify-between text-lg font-bold" {
                    p { "Zapłacono łącznie" }
                    p { (format_price_whole(confirmation.charged_total)) }
                }
            }
        }
    }
}

/// Stan błędu potwierdzenia: bez danych zastępczych i bez ponowień.
fn render_confirmation_error(order_id: &str) -> Markup {
    html! {
        div ."py-10 text-center" {
            h2 ."text-xl font-semibold mb-2" { "Nie udało się pobrać zamówienia" }
            p ."text-gray-600 mb-4" {
                "Nie mogliśmy teraz wyświetlić zamówienia " (order_id) ". "
                "Odśwież stronę albo spróbuj ponownie za chwilę."
            }
            a href="/" ."inline-block bg-gray-900 px-6 py-3 text-white" { "Wróć do sklepu" }
        }
    }
}
