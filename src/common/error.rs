// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::common::i18n::I18nStore;
use crate::middleware::i18n::Locale;

// O erro de domínio. Serviços e repositórios só conhecem este tipo.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Zona não encontrada: {0}")]
    ZoneNotFound(Uuid),

    #[error("Posição não encontrada: {0}")]
    PositionNotFound(Uuid),

    #[error("Modelo não encontrado: {0}")]
    TemplateNotFound(Uuid),

    // Aviso (não fatal): a clonagem não achou nada para copiar
    #[error("Estrutura incompatível: {0}")]
    StructuralMismatch(String),

    #[error("Operação destrutiva exige dupla confirmação")]
    ConfirmationRequired,

    // Falha do colaborador de persistência durante load/commit/discard/deleteAll
    #[error("Falha de persistência na etapa '{step}': {source}")]
    PersistenceError {
        step: &'static str,
        #[source]
        source: Box<AppError>,
    },

    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Monta um `ValidationError` para um único campo, no mesmo formato do `validator`.
    pub fn field(field: &'static str, code: &'static str, message: &'static str) -> Self {
        let mut err = validator::ValidationError::new(code);
        err.message = Some(message.into());
        let mut errors = validator::ValidationErrors::new();
        errors.add(field, err);
        AppError::ValidationError(errors)
    }

    /// Embrulha um erro do colaborador marcando a etapa em que falhou.
    pub fn persistence(step: &'static str, source: AppError) -> Self {
        match source {
            // Já embrulhado numa etapa mais interna
            e @ AppError::PersistenceError { .. } => e,
            other => AppError::PersistenceError { step, source: Box::new(other) },
        }
    }

    // Chave usada no catálogo de mensagens
    fn message_key(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation",
            AppError::ZoneNotFound(_) => "zone_not_found",
            AppError::PositionNotFound(_) => "position_not_found",
            AppError::TemplateNotFound(_) => "template_not_found",
            AppError::StructuralMismatch(_) => "structural_mismatch",
            AppError::ConfirmationRequired => "confirmation_required",
            AppError::PersistenceError { .. } => "persistence",
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ZoneNotFound(_)
            | AppError::PositionNotFound(_)
            | AppError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            AppError::StructuralMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ConfirmationRequired => StatusCode::CONFLICT,
            AppError::PersistenceError { .. }
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converte para a resposta HTTP, traduzindo a mensagem para o idioma do cliente.
    pub fn to_api_error(&self, locale: &Locale, store: &I18nStore) -> ApiError {
        let status = self.status();
        let error = store.translate(&locale.0, self.message_key());

        let details = match self {
            AppError::ValidationError(errors) => {
                let mut fields = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<Value> = field_errors
                        .iter()
                        .map(|e| match &e.message {
                            Some(m) => Value::String(m.to_string()),
                            None => Value::String(e.code.to_string()),
                        })
                        .collect();
                    fields.insert(field.to_string(), Value::Array(messages));
                }
                Some(Value::Object(fields))
            }
            AppError::StructuralMismatch(reason) => Some(json!({ "reason": reason })),
            AppError::ZoneNotFound(id)
            | AppError::PositionNotFound(id)
            | AppError::TemplateNotFound(id) => Some(json!({ "id": id })),
            AppError::PersistenceError { step, .. } => Some(json!({ "step": step })),
            _ => None,
        };

        if status.is_server_error() {
            // O detalhe completo só vai para o log
            tracing::error!("Erro Interno do Servidor: {}", self);
        }

        ApiError { status, error, details }
    }
}

// O erro que sai pela API (já traduzido)
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_error_carries_field_and_message() {
        let err = AppError::field("code", "required", "O código é obrigatório.");
        let store = I18nStore::new();
        let api = err.to_api_error(&Locale("pt".into()), &store);

        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        let details = api.details.unwrap();
        assert_eq!(details["code"][0], "O código é obrigatório.");
    }

    #[test]
    fn persistence_error_is_not_wrapped_twice() {
        let inner = AppError::persistence("insert_zones", AppError::ZoneNotFound(Uuid::nil()));
        let outer = AppError::persistence("commit", inner);

        match outer {
            AppError::PersistenceError { step, .. } => assert_eq!(step, "insert_zones"),
            other => panic!("esperava PersistenceError, veio {other:?}"),
        }
    }

    #[test]
    fn structural_mismatch_maps_to_unprocessable_entity() {
        let store = I18nStore::new();
        let api = AppError::StructuralMismatch("nada".into())
            .to_api_error(&Locale("en".into()), &store);

        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.details.unwrap()["reason"], "nada");
    }
}
