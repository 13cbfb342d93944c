// src/handlers/zones.rs

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
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
    models::zones::{CloneOutcome, CommitSummary, ZoneTreeSnapshot},
    services::zone_manager::{DeleteAllConfirmation, PositionBatch},
};

fn default_count() -> i32 {
    1
}

fn default_start() -> i32 {
    1
}

// =============================================================================
//  1. ÁRVORE (leitura)
// =============================================================================

// GET /api/zones
#[utoipa::path(
    get,
    path = "/api/zones",
    tag = "Zones",
    responses(
        (status = 200, description = "Árvore de zonas da sessão (com edições pendentes)", body = ZoneTreeSnapshot)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn get_tree(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = app_state
        .zone_service
        .snapshot(tenant.0)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(snapshot)))
}

// GET /api/zones/events
// Cada mudança na sessão gera um evento "revision"; o cliente recarrega a árvore.
#[utoipa::path(
    get,
    path = "/api/zones/events",
    tag = "Zones",
    responses(
        (status = 200, description = "Fluxo SSE com a revisão atual e cada nova revisão", content_type = "text/event-stream", body = String)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn revision_events(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let receiver = app_state
        .zone_service
        .subscribe(tenant.0)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    let stream = WatchStream::new(receiver)
        .map(|revision| Ok(Event::default().event("revision").data(revision.to_string())));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// =============================================================================
//  2. ZONAS (edição em memória)
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateZonePayload {
    pub parent_id: Option<Uuid>,

    #[validate(custom(function = "not_blank", message = "O código é obrigatório."))]
    #[schema(example = "D")]
    pub code: String,

    #[validate(custom(function = "not_blank", message = "O nome é obrigatório."))]
    #[schema(example = "Corredor")]
    pub name: String,

    // > 1 cria várias zonas numeradas de uma vez
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 500, message = "A quantidade deve estar entre 1 e 500."))]
    #[schema(example = 5)]
    pub count: i32,
}

// POST /api/zones
#[utoipa::path(
    post,
    path = "/api/zones",
    tag = "Zones",
    request_body = CreateZonePayload,
    responses(
        (status = 201, description = "Zona(s) adicionada(s) à sessão", body = ZoneTreeSnapshot),
        (status = 400, description = "Campos inválidos")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn add_zone(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Json(payload): Json<CreateZonePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let snapshot = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            editor.add_zone(payload.parent_id, &payload.code, &payload.name, payload.count)?;
            Ok(editor.snapshot())
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameZonePayload {
    #[validate(custom(function = "not_blank", message = "O código é obrigatório."))]
    #[schema(example = "A1")]
    pub code: String,

    #[validate(custom(function = "not_blank", message = "O nome é obrigatório."))]
    #[schema(example = "Corredor 1")]
    pub name: String,
}

// PUT /api/zones/{zone_id}
#[utoipa::path(
    put,
    path = "/api/zones/{zone_id}",
    tag = "Zones",
    request_body = RenameZonePayload,
    responses(
        (status = 200, description = "Zona renomeada na sessão", body = ZoneTreeSnapshot),
        (status = 400, description = "Código ou nome em branco"),
        (status = 404, description = "Zona não encontrada")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("zone_id" = Uuid, Path, description = "ID da zona")
    )
)]
pub async fn rename_zone(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(zone_id): Path<Uuid>,
    Json(payload): Json<RenameZonePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let snapshot = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            editor.rename_zone(zone_id, &payload.code, &payload.name)?;
            Ok(editor.snapshot())
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(snapshot)))
}

// DELETE /api/zones/{zone_id}
#[utoipa::path(
    delete,
    path = "/api/zones/{zone_id}",
    tag = "Zones",
    responses(
        (status = 200, description = "Zona e descendentes marcados como excluídos", body = ZoneTreeSnapshot),
        (status = 404, description = "Zona não encontrada")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("zone_id" = Uuid, Path, description = "ID da zona")
    )
)]
pub async fn delete_zone(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(zone_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            editor.delete_zone(zone_id)?;
            Ok(editor.snapshot())
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(snapshot)))
}

// POST /api/zones/{zone_id}/duplicate
#[utoipa::path(
    post,
    path = "/api/zones/{zone_id}/duplicate",
    tag = "Zones",
    responses(
        (status = 201, description = "Cópia da sub-árvore adicionada à sessão", body = ZoneTreeSnapshot),
        (status = 404, description = "Zona não encontrada")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("zone_id" = Uuid, Path, description = "ID da zona a duplicar")
    )
)]
pub async fn duplicate_zone(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(zone_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            editor.duplicate_zone(zone_id)?;
            Ok(editor.snapshot())
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

// =============================================================================
//  3. POSIÇÕES
// =============================================================================

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum BatchMode {
    Manual,
    Auto,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePositionsPayload {
    #[schema(example = "auto")]
    pub mode: BatchMode,

    // Modo manual: "{prefix}{n}"
    #[schema(example = "B.V")]
    pub prefix: Option<String>,

    // Modo automático: {zone}, {#} e {PREFIXO} de cada nível
    #[schema(example = "{zone}.V{#}")]
    pub pattern: Option<String>,

    #[serde(default = "default_start")]
    #[schema(example = 1)]
    pub start: i32,

    #[validate(range(min = 1, max = 10000, message = "A quantidade deve estar entre 1 e 10000."))]
    #[schema(example = 10)]
    pub count: i32,

    pub batch_name: Option<String>,
}

impl CreatePositionsPayload {
    fn to_batch(&self) -> Result<PositionBatch, AppError> {
        match self.mode {
            BatchMode::Manual => Ok(PositionBatch::Manual {
                prefix: self.prefix.clone().unwrap_or_default(),
                start: self.start,
                count: self.count,
            }),
            BatchMode::Auto => {
                let pattern = self
                    .pattern
                    .clone()
                    .ok_or_else(|| AppError::field("pattern", "required", "O padrão é obrigatório."))?;
                Ok(PositionBatch::Auto { pattern, start: self.start, count: self.count })
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PositionsCreatedResponse {
    pub created: usize,
    pub tree: ZoneTreeSnapshot,
}

// POST /api/zones/{zone_id}/positions
#[utoipa::path(
    post,
    path = "/api/zones/{zone_id}/positions",
    tag = "Positions",
    request_body = CreatePositionsPayload,
    responses(
        (status = 201, description = "Lote de posições criado na sessão", body = PositionsCreatedResponse),
        (status = 400, description = "Campos inválidos")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("zone_id" = Uuid, Path, description = "Zona alvo (no modo automático, todas as folhas abaixo dela)")
    )
)]
pub async fn create_positions(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(zone_id): Path<Uuid>,
    Json(payload): Json<CreatePositionsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let batch = payload
        .to_batch()
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    let response = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            let created = editor.create_positions(zone_id, &batch, payload.batch_name.as_deref())?;
            Ok(PositionsCreatedResponse { created, tree: editor.snapshot() })
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClonePositionsPayload {
    pub source_zone_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloneResponse {
    pub outcome: CloneOutcome,
    pub tree: ZoneTreeSnapshot,
}

// POST /api/zones/{zone_id}/clone
#[utoipa::path(
    post,
    path = "/api/zones/{zone_id}/clone",
    tag = "Positions",
    request_body = ClonePositionsPayload,
    responses(
        (status = 201, description = "Posições copiadas da sub-árvore de origem", body = CloneResponse),
        (status = 422, description = "Nada para clonar (aviso)")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("zone_id" = Uuid, Path, description = "Zona de destino")
    )
)]
pub async fn clone_positions(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(zone_id): Path<Uuid>,
    Json(payload): Json<ClonePositionsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let response = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            let outcome = editor.clone_positions(payload.source_zone_id, zone_id)?;
            Ok(CloneResponse { outcome, tree: editor.snapshot() })
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenamePositionPayload {
    #[validate(custom(function = "not_blank", message = "O código é obrigatório."))]
    #[schema(example = "A.D1.T1.V3")]
    pub code: String,
}

// PUT /api/positions/{position_id}
#[utoipa::path(
    put,
    path = "/api/positions/{position_id}",
    tag = "Positions",
    request_body = RenamePositionPayload,
    responses(
        (status = 200, description = "Posição renomeada na sessão", body = ZoneTreeSnapshot),
        (status = 400, description = "Código em branco"),
        (status = 404, description = "Posição não encontrada")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("position_id" = Uuid, Path, description = "ID da posição")
    )
)]
pub async fn rename_position(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(position_id): Path<Uuid>,
    Json(payload): Json<RenamePositionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let snapshot = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            editor.rename_position(position_id, &payload.code)?;
            Ok(editor.snapshot())
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(snapshot)))
}

// DELETE /api/positions/{position_id}
#[utoipa::path(
    delete,
    path = "/api/positions/{position_id}",
    tag = "Positions",
    responses(
        (status = 200, description = "Posição marcada como excluída", body = ZoneTreeSnapshot),
        (status = 404, description = "Posição não encontrada")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja"),
        ("position_id" = Uuid, Path, description = "ID da posição")
    )
)]
pub async fn delete_position(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(position_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = app_state
        .zone_service
        .edit(tenant.0, |editor| {
            editor.delete_position(position_id)?;
            Ok(editor.snapshot())
        })
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(snapshot)))
}

// =============================================================================
//  4. SESSÃO (gravar / descartar / apagar tudo)
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub summary: CommitSummary,
    pub tree: ZoneTreeSnapshot,
}

// POST /api/zones/commit
#[utoipa::path(
    post,
    path = "/api/zones/commit",
    tag = "Zones",
    responses(
        (status = 200, description = "Edições gravadas e árvore recarregada", body = CommitResponse),
        (status = 500, description = "Falha ao gravar; a sessão continua com as edições pendentes")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn commit(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let summary = app_state
        .zone_service
        .commit(tenant.0)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    let tree = app_state
        .zone_service
        .snapshot(tenant.0)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(CommitResponse { summary, tree })))
}

// POST /api/zones/discard
#[utoipa::path(
    post,
    path = "/api/zones/discard",
    tag = "Zones",
    responses(
        (status = 200, description = "Edições descartadas; árvore recarregada do banco", body = ZoneTreeSnapshot)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn discard(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = app_state
        .zone_service
        .discard(tenant.0)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(snapshot)))
}

// POST /api/zones/delete-all
#[utoipa::path(
    post,
    path = "/api/zones/delete-all",
    tag = "Zones",
    request_body = DeleteAllConfirmation,
    responses(
        (status = 200, description = "Todas as zonas e posições do escopo apagadas", body = ZoneTreeSnapshot),
        (status = 409, description = "Falta a dupla confirmação")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do sistema/loja")
    )
)]
pub async fn delete_all(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Json(confirmation): Json<DeleteAllConfirmation>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = app_state
        .zone_service
        .delete_all(tenant.0, confirmation)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(snapshot)))
}
