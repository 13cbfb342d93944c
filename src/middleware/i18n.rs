// src/middleware/i18n.rs

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

// Idiomas com catálogo de mensagens
const SUPPORTED: [&str; 2] = ["pt", "en"];

// Extrator de idioma (a partir do Accept-Language)
#[derive(Debug, Clone)]
pub struct Locale(pub String);

impl Locale {
    /// Escolhe o primeiro idioma suportado do cabeçalho; "en" por omissão.
    pub fn from_header(value: Option<&str>) -> Self {
        // "pt-BR" -> "pt"; ordem de qualidade preservada pelo parse
        let lang = value
            .map(accept_language::parse)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tag| tag.split('-').next().map(str::to_lowercase))
            .find(|primary| SUPPORTED.contains(&primary.as_str()))
            .unwrap_or_else(|| "en".to_string());

        Locale(lang)
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());

        Ok(Locale::from_header(header_value))
    }
}
