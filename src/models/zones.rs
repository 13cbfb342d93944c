// src/models/zones.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use utoipa::ToSchema;
use uuid::Uuid;

// ---
// 1. Zona (nó da árvore física: prédio -> corredor -> estante -> prateleira)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: Uuid,
    #[schema(ignore)] // O escopo vem do cabeçalho x-tenant-id
    pub tenant_id: Uuid,
    #[schema(example = "A1")]
    pub code: String,
    #[schema(example = "Corredor 1")]
    pub name: String,
    pub parent_id: Option<Uuid>,
    // 0 para raízes, sempre nível do pai + 1
    pub level: i32,
    pub created_at: DateTime<Utc>,
}

// ---
// 2. Posição (vaga física onde um lote é guardado)
// ---
// A ligação com a zona fica em `position_zones`, não aqui.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "A.D1.T1.V3")]
    pub code: String,
    pub display_order: i32,
    #[schema(example = "Auto: {zone}.V{#}")]
    pub batch_name: Option<String>,
    // Referência opaca ao lote que ocupa a vaga
    pub lot_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Linha de `position_zones` já com a posição carregada.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PositionZoneLink {
    pub zone_id: Uuid,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPositionLink {
    pub zone_id: Uuid,
    pub position_id: Uuid,
}

// ---
// 3. Estado da edição em memória
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EditStatus {
    Existing, // Igual ao banco
    New,
    Modified,
    Deleted,
}

impl EditStatus {
    pub fn is_dirty(self) -> bool {
        self != EditStatus::Existing
    }

    pub fn is_live(self) -> bool {
        self != EditStatus::Deleted
    }

    /// Renomear mantém `new` como `new`; o resto vira `modified`.
    pub fn after_rename(self) -> EditStatus {
        match self {
            EditStatus::New => EditStatus::New,
            _ => EditStatus::Modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagedZone {
    #[serde(flatten)]
    pub zone: Zone,
    pub status: EditStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagedPosition {
    #[serde(flatten)]
    pub position: Position,
    pub status: EditStatus,
}

/// Fotografia da sessão de edição entregue à interface.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZoneTreeSnapshot {
    pub zones: Vec<StagedZone>,
    pub positions_by_zone: BTreeMap<Uuid, Vec<StagedPosition>>,
    pub is_dirty: bool,
    pub revision: u64,
}

// ---
// 4. Modelos (formas de sub-árvore reutilizáveis)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateNode {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<TemplateNode>,
}

impl TemplateNode {
    /// Quantidade de zonas que o modelo cria (inclui o próprio nó).
    pub fn zone_count(&self) -> usize {
        1 + self.children.iter().map(TemplateNode::zone_count).sum::<usize>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZoneTemplate {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "Corredor padrão 4x5")]
    pub name: String,
    #[schema(value_type = Object)]
    pub structure: Json<TemplateNode>,
    pub created_at: DateTime<Utc>,
}

// ---
// 5. Resultados das operações em lote
// ---
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub zones_deleted: usize,
    pub zones_updated: usize,
    pub zones_inserted: usize,
    pub positions_deleted: usize,
    pub positions_updated: usize,
    pub positions_inserted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    pub positions_created: usize,
    pub paired_zones: usize,
    // Caminhos relativos da origem sem par no destino
    pub unmatched_paths: Vec<String>,
}
