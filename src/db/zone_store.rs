// src/db/zone_store.rs

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::zones::{NewPositionLink, Position, PositionZoneLink, TemplateNode, Zone, ZoneTemplate},
};

// ---
// O "colaborador de persistência" do editor de zonas.
// ---
// Todas as operações recebem (ou carregam no registro) o escopo do tenant.
// Quem implementa é responsável pelo isolamento entre tenants.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    // --- Leitura ---
    async fn list_zones(&self, tenant_id: Uuid) -> Result<Vec<Zone>, AppError>;

    async fn list_position_links(&self, tenant_id: Uuid) -> Result<Vec<PositionZoneLink>, AppError>;

    /// IDs das posições ligadas às zonas informadas (direto na tabela de ligação).
    async fn list_position_ids_for_zones(
        &self,
        tenant_id: Uuid,
        zone_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError>;

    // --- Zonas ---
    async fn insert_zones(&self, zones: &[Zone]) -> Result<(), AppError>;

    async fn update_zone(&self, tenant_id: Uuid, id: Uuid, code: &str, name: &str) -> Result<(), AppError>;

    async fn delete_zones(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<(), AppError>;

    // --- Posições ---
    async fn insert_positions(&self, positions: &[Position]) -> Result<(), AppError>;

    async fn update_position(&self, tenant_id: Uuid, id: Uuid, code: &str) -> Result<(), AppError>;

    async fn delete_positions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<(), AppError>;

    // --- Ligações posição -> zona ---
    async fn insert_position_links(&self, tenant_id: Uuid, links: &[NewPositionLink]) -> Result<(), AppError>;

    async fn delete_position_links_by_zone(&self, tenant_id: Uuid, zone_ids: &[Uuid]) -> Result<(), AppError>;

    // --- Modelos ---
    async fn list_templates(&self, tenant_id: Uuid) -> Result<Vec<ZoneTemplate>, AppError>;

    async fn insert_template(
        &self,
        tenant_id: Uuid,
        name: &str,
        structure: &TemplateNode,
    ) -> Result<ZoneTemplate, AppError>;

    async fn delete_template(&self, tenant_id: Uuid, id: Uuid) -> Result<(), AppError>;

    /// Apaga ligações, posições e zonas do escopo (nesta ordem).
    async fn purge_scope(&self, tenant_id: Uuid) -> Result<(), AppError>;
}
