// src/services/zone_manager/editor.rs

use std::collections::HashSet;

use tokio::sync::watch;
use uuid::Uuid;

use super::tree::ZoneArena;
use crate::{
    common::error::AppError,
    db::ZoneStore,
    models::zones::ZoneTreeSnapshot,
};

/// Opções da sessão de edição (vindas da configuração).
#[derive(Debug, Clone, Default)]
pub struct EditorOptions {
    // Duplicar zona também copia as posições de cada zona copiada
    pub duplicate_positions: bool,
}

// Ids que existiam no banco na última sincronização.
#[derive(Debug, Clone, Default)]
pub(super) struct Baseline {
    pub zone_ids: HashSet<Uuid>,
    pub position_ids: HashSet<Uuid>,
    // Posições gravadas cuja ligação com a zona ainda não foi (ou já deixou de ser) gravada.
    // Sobrevivem à recarga: não aparecem na listagem do banco, mas o próximo commit resolve.
    pub unlinked_positions: HashSet<Uuid>,
}

// ---
// Sessão de edição de um escopo (tenant).
// ---
// Mutações são síncronas e só mexem na arena; load/commit/discard falam com o banco.
pub struct ZoneEditor {
    pub(super) tenant_id: Uuid,
    pub(super) arena: ZoneArena,
    pub(super) baseline: Baseline,
    pub(super) options: EditorOptions,
    revision: watch::Sender<u64>,
}

impl ZoneEditor {
    pub fn new(tenant_id: Uuid, options: EditorOptions) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            tenant_id,
            arena: ZoneArena::default(),
            baseline: Baseline::default(),
            options,
            revision,
        }
    }

    /// Carrega zonas e posições do escopo e substitui a linha de base.
    pub async fn load(&mut self, store: &dyn ZoneStore) -> Result<(), AppError> {
        let zones = store
            .list_zones(self.tenant_id)
            .await
            .map_err(|e| AppError::persistence("list_zones", e))?;
        let links = store
            .list_position_links(self.tenant_id)
            .await
            .map_err(|e| AppError::persistence("list_position_links", e))?;

        self.arena = ZoneArena::from_persisted(zones, links);

        let violations = self.validate_structure();
        if !violations.is_empty() {
            tracing::warn!(
                tenant_id = %self.tenant_id,
                count = violations.len(),
                first = %violations[0],
                "Árvore de zonas inconsistente no banco"
            );
        }

        self.baseline = Baseline {
            zone_ids: self.arena.zones().map(|z| z.zone.id).collect(),
            position_ids: self
                .arena
                .positions_by_zone()
                .flat_map(|(_, list)| list.iter().map(|p| p.position.id))
                .collect(),
            unlinked_positions: std::mem::take(&mut self.baseline.unlinked_positions),
        };

        tracing::info!(
            tenant_id = %self.tenant_id,
            zones = self.baseline.zone_ids.len(),
            positions = self.baseline.position_ids.len(),
            "Árvore de zonas carregada"
        );
        self.bump();
        Ok(())
    }

    /// Joga fora todas as edições pendentes recarregando do banco.
    pub async fn discard(&mut self, store: &dyn ZoneStore) -> Result<(), AppError> {
        tracing::info!(tenant_id = %self.tenant_id, "Descartando edições pendentes");
        self.load(store).await
    }

    /// Níveis coerentes com o pai, nenhuma zona viva sob pai excluído, sem ciclos.
    pub fn validate_structure(&self) -> Vec<String> {
        self.arena.structure_violations()
    }

    pub fn is_dirty(&self) -> bool {
        self.arena.is_dirty()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn snapshot(&self) -> ZoneTreeSnapshot {
        self.arena.snapshot(self.revision())
    }

    /// Notificado a cada mutação ou recarga (valor = revisão).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.revision.receiver_count() > 0
    }

    /// Id novo, que não colide com nada já carregado ou criado na sessão.
    pub fn generate_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !self.arena.contains_id(id) {
                return id;
            }
        }
    }

    pub(super) fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}
