// src/handlers/templates.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::{ApiError, AppError},
        validation::not_blank,
    },
    config::AppState,
    middleware::{i18n::Locale, tenancy::TenantContext},
    models::zones::{ZoneTemplate, ZoneTreeSnapshot},
};

// GET /api/zone-templates
#[utoipa::path(
    get,
    path = "/api/zone-templates",
    tag = "Templates",
    responses(
        (status = 200, description = "Modelos de estrutura salvos", body = Vec<ZoneTemplate>)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn list_templates(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let templates = app_state
        .zone_service
        .list_templates(tenant.0)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(templates)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveTemplatePayload {
    pub zone_id: Uuid,

    #[validate(custom(function = "not_blank", message = "O nome do modelo é obrigatório."))]
    #[schema(example = "Galpão padrão")]
    pub name: String,
}

// POST /api/zone-templates
#[utoipa::path(
    post,
    path = "/api/zone-templates",
    tag = "Templates",
    request_body = SaveTemplatePayload,
    responses(
        (status = 201, description = "Modelo criado a partir da sub-árvore", body = ZoneTemplate),
        (status = 404, description = "Zona não encontrada")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn save_template(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Json(payload): Json<SaveTemplatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let template = app_state
        .zone_service
        .save_template(tenant.0, payload.zone_id, &payload.name)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(template)))
}

// DELETE /api/zone-templates/{template_id}
#[utoipa::path(
    delete,
    path = "/api/zone-templates/{template_id}",
    tag = "Templates",
    responses(
        (status = 204, description = "Modelo removido"),
        (status = 404, description = "Modelo não encontrado")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("template_id" = Uuid, Path, description = "ID do modelo")
    )
)]
pub async fn delete_template(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(template_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .zone_service
        .delete_template(tenant.0, template_id)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyTemplatePayload {
    pub parent_id: Option<Uuid>,

    #[validate(custom(function = "not_blank", message = "O código é obrigatório."))]
    #[schema(example = "G2")]
    pub code: String,

    #[validate(custom(function = "not_blank", message = "O nome é obrigatório."))]
    #[schema(example = "Galpão 2")]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAppliedResponse {
    pub root_id: Uuid,
    pub tree: ZoneTreeSnapshot,
}

// POST /api/zone-templates/{template_id}/apply
#[utoipa::path(
    post,
    path = "/api/zone-templates/{template_id}/apply",
    tag = "Templates",
    request_body = ApplyTemplatePayload,
    responses(
        (status = 201, description = "Estrutura instanciada na sessão", body = TemplateAppliedResponse),
        (status = 404, description = "Modelo ou zona pai não encontrados")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("template_id" = Uuid, Path, description = "ID do modelo")
    )
)]
pub async fn apply_template(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(template_id): Path<Uuid>,
    Json(payload): Json<ApplyTemplatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let service = &app_state.zone_service;
    let to_api = |app_err: AppError| app_err.to_api_error(&locale, &app_state.i18n_store);

    let root_id = service
        .apply_template(tenant.0, template_id, payload.parent_id, &payload.code, &payload.name)
        .await
        .map_err(to_api)?;
    let tree = service.snapshot(tenant.0).await.map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(TemplateAppliedResponse { root_id, tree })))
}
