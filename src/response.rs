// src/response.rs

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use lol_html::{HtmlRewriter, Settings, element};
use maud::Markup;
use tokio::fs;

use crate::errors::AppError;

/// Ścieżka szablonu powłoki strony (nagłówek, nawigacja, skrypty htmx).
const SHELL_TEMPLATE: &str = "static/index.html";

/// Buduje odpowiedź zależnie od rodzaju żądania: htmx dostaje sam
/// fragment do podmiany, pełne odświeżenie (F5, bezpośredni link)
/// dostaje fragment osadzony w powłoce strony.
pub async fn build_response(
    headers: HeaderMap,
    page_title: &str,
    content: Markup,
) -> Result<Response, AppError> {
    if headers.contains_key("HX-Request") {
        Ok(content.into_response())
    } else {
        render_shell(page_title, content).await
    }
}

/// Wczytuje powłokę i wstrzykuje treść strony w kontener `#app-content`,
/// podmieniając przy okazji tytuł dokumentu. Atrybuty htmx inicjujące
/// doładowanie są zdejmowane, żeby klient nie nadpisał już wyrenderowanej
/// treści zaraz po załadowaniu strony.
async fn render_shell(page_title: &str, content: Markup) -> Result<Response, AppError> {
    let shell = fs::read(SHELL_TEMPLATE).await.map_err(|e| {
        tracing::error!("Nie można wczytać powłoki {}: {}", SHELL_TEMPLATE, e);
        AppError::InternalServerError("Błąd wczytywania szablonu strony".to_string())
    })?;

    let content_html = content.into_string();
    let title = page_title.to_string();
    let mut rendered = Vec::with_capacity(shell.len() + content_html.len());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("#app-content", move |el| {
                    el.set_inner_content(&content_html, lol_html::html_content::ContentType::Html);
                    el.remove_attribute("hx-get");
                    el.remove_attribute("hx-trigger");
                    Ok(())
                }),
                element!("title", move |el| {
                    el.set_inner_content(&title, lol_html::html_content::ContentType::Text);
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |chunk: &[u8]| rendered.extend_from_slice(chunk),
    );

    rewriter.write(&shell).map_err(|e| {
        tracing::error!("Błąd przepisywania powłoki HTML: {}", e);
        AppError::InternalServerError("Błąd renderowania strony".to_string())
    })?;
    rewriter.end().map_err(|e| {
        tracing::error!("Błąd domykania przepisywania HTML: {}", e);
        AppError::InternalServerError("Błąd renderowania strony".to_string())
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Body::from(rendered))
        .map_err(|e| {
            tracing::error!("Nie można zbudować odpowiedzi HTTP: {}", e);
            AppError::InternalServerError("Błąd budowania odpowiedzi".to_string())
        })
}
