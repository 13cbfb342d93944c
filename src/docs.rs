// src/docs.rs

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::OpenApi;

use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Zones ---
        handlers::zones::get_tree,
        handlers::zones::revision_events,
        handlers::zones::add_zone,
        handlers::zones::rename_zone,
        handlers::zones::delete_zone,
        handlers::zones::duplicate_zone,
        handlers::zones::commit,
        handlers::zones::discard,
        handlers::zones::delete_all,

        // --- Positions ---
        handlers::zones::create_positions,
        handlers::zones::clone_positions,
        handlers::zones::rename_position,
        handlers::zones::delete_position,

        // --- Templates ---
        handlers::templates::list_templates,
        handlers::templates::save_template,
        handlers::templates::delete_template,
        handlers::templates::apply_template,
    ),
    components(
        schemas(
            // --- Zones ---
            models::zones::Zone,
            models::zones::Position,
            models::zones::EditStatus,
            models::zones::StagedZone,
            models::zones::StagedPosition,
            models::zones::ZoneTreeSnapshot,
            models::zones::ZoneTemplate,
            models::zones::CommitSummary,
            models::zones::CloneOutcome,
            services::zone_manager::DeleteAllConfirmation,

            // --- Payloads ---
            handlers::zones::CreateZonePayload,
            handlers::zones::RenameZonePayload,
            handlers::zones::BatchMode,
            handlers::zones::CreatePositionsPayload,
            handlers::zones::ClonePositionsPayload,
            handlers::zones::RenamePositionPayload,
            handlers::zones::PositionsCreatedResponse,
            handlers::zones::CloneResponse,
            handlers::zones::CommitResponse,
            handlers::templates::SaveTemplatePayload,
            handlers::templates::ApplyTemplatePayload,
            handlers::templates::TemplateAppliedResponse,
        )
    ),
    tags(
        (name = "Zones", description = "Árvore de zonas do armazém (edição em sessão)"),
        (name = "Positions", description = "Posições de armazenagem nas zonas"),
        (name = "Templates", description = "Modelos de estrutura reutilizáveis")
    ),
    modifiers(&TenantHeaderAddon)
)]
pub struct ApiDoc;

struct TenantHeaderAddon;

impl utoipa::Modify for TenantHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "tenant_header",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-tenant-id"))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_zone_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/zones"));
        assert!(doc.paths.paths.contains_key("/api/zones/{zone_id}/positions"));
        assert!(doc.paths.paths.contains_key("/api/zones/events"));
        assert!(doc.paths.paths.contains_key("/api/zone-templates/{template_id}/apply"));
    }
}
