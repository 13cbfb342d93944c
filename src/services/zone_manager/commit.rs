// src/services/zone_manager/commit.rs

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::editor::{Baseline, ZoneEditor};
use super::tree::ZoneArena;
use crate::{
    common::error::AppError,
    db::ZoneStore,
    models::zones::{CommitSummary, EditStatus, NewPositionLink, Position, Zone},
};

// ---
// Plano de gravação (diferença entre a sessão e a linha de base)
// ---
#[derive(Debug, Default)]
pub struct CommitPlan {
    /// Zonas do banco marcadas como excluídas, da mais funda para a raiz.
    pub zone_deletes: Vec<Uuid>,
    /// (id, código, nome)
    pub zone_updates: Vec<(Uuid, String, String)>,
    /// Zonas novas agrupadas por nível, do menor para o maior.
    pub zone_inserts: Vec<Vec<Zone>>,
    pub position_deletes: Vec<Uuid>,
    /// (id, código)
    pub position_updates: Vec<(Uuid, String)>,
    /// Posições novas agrupadas por zona.
    pub position_inserts: Vec<(Uuid, Vec<Position>)>,
    /// Ligações que ficaram para trás num commit interrompido.
    pub pending_links: Vec<NewPositionLink>,
}

impl CommitPlan {
    pub(super) fn build(arena: &ZoneArena, baseline: &Baseline) -> Self {
        let mut plan = CommitPlan::default();

        // Zonas excluídas que nunca chegaram ao banco simplesmente somem
        let mut deleted: Vec<&Zone> = arena
            .zones()
            .filter(|z| z.status == EditStatus::Deleted && baseline.zone_ids.contains(&z.zone.id))
            .map(|z| &z.zone)
            .collect();
        deleted.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.id.cmp(&b.id)));
        plan.zone_deletes = deleted.iter().map(|z| z.id).collect();

        let mut updates: Vec<&Zone> = arena
            .zones()
            .filter(|z| z.status == EditStatus::Modified)
            .map(|z| &z.zone)
            .collect();
        updates.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)));
        plan.zone_updates = updates
            .into_iter()
            .map(|z| (z.id, z.code.clone(), z.name.clone()))
            .collect();

        let mut by_level: BTreeMap<i32, Vec<Zone>> = BTreeMap::new();
        for staged in arena.zones().filter(|z| z.status == EditStatus::New) {
            by_level.entry(staged.zone.level).or_default().push(staged.zone.clone());
        }
        plan.zone_inserts = by_level.into_values().collect();

        // Posições de zonas excluídas já saem junto com a zona (etapa 1) ou nem entram
        let dead_zones: HashSet<Uuid> = arena
            .zones()
            .filter(|z| !z.status.is_live())
            .map(|z| z.zone.id)
            .collect();

        let mut zone_ids: Vec<Uuid> = arena.positions_by_zone().map(|(id, _)| id).collect();
        zone_ids.sort();
        for zone_id in zone_ids {
            if dead_zones.contains(&zone_id) {
                continue;
            }
            let mut inserts = Vec::new();
            for staged in arena.positions_of(zone_id) {
                let position = &staged.position;
                match staged.status {
                    EditStatus::Deleted
                        if baseline.position_ids.contains(&position.id)
                            && !baseline.unlinked_positions.contains(&position.id) =>
                    {
                        plan.position_deletes.push(position.id);
                    }
                    EditStatus::Modified => {
                        plan.position_updates.push((position.id, position.code.clone()));
                    }
                    EditStatus::New => inserts.push(position.clone()),
                    _ => {}
                }
            }
            if !inserts.is_empty() {
                plan.position_inserts.push((zone_id, inserts));
            }
        }

        // Posições sem ligação no banco: ligam-se se ainda vivas numa zona viva, senão saem
        let mut unlinked: Vec<Uuid> = baseline.unlinked_positions.iter().copied().collect();
        unlinked.sort();
        for position_id in unlinked {
            let live = arena.position(position_id).is_some_and(|p| p.status.is_live());
            let zone_id = arena
                .zone_of_position(position_id)
                .filter(|zone_id| arena.live_zone(*zone_id).is_ok());
            match zone_id {
                Some(zone_id) if live => plan.pending_links.push(NewPositionLink { zone_id, position_id }),
                _ => plan.position_deletes.push(position_id),
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.zone_deletes.is_empty()
            && self.zone_updates.is_empty()
            && self.zone_inserts.is_empty()
            && self.position_deletes.is_empty()
            && self.position_updates.is_empty()
            && self.position_inserts.is_empty()
            && self.pending_links.is_empty()
    }

    pub fn summary(&self) -> CommitSummary {
        CommitSummary {
            zones_deleted: self.zone_deletes.len(),
            zones_updated: self.zone_updates.len(),
            zones_inserted: self.zone_inserts.iter().map(Vec::len).sum(),
            positions_deleted: self.position_deletes.len(),
            positions_updated: self.position_updates.len(),
            positions_inserted: self.position_inserts.iter().map(|(_, list)| list.len()).sum(),
        }
    }
}

/// As duas confirmações exigidas para apagar tudo.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllConfirmation {
    pub confirmed: bool,
    pub confirmed_again: bool,
}

impl ZoneEditor {
    /// Grava a sessão no banco, na ordem exigida pelas chaves estrangeiras,
    /// e recarrega a linha de base. Para na primeira falha (sem rollback).
    ///
    /// Cada etapa concluída é registrada na sessão, então repetir o commit
    /// depois de uma falha continua de onde parou.
    pub async fn commit(&mut self, store: &dyn ZoneStore) -> Result<CommitSummary, AppError> {
        let plan = CommitPlan::build(&self.arena, &self.baseline);
        let summary = plan.summary();
        let tenant_id = self.tenant_id;

        if plan.is_empty() {
            tracing::info!(%tenant_id, "Nada para gravar");
            self.load(store).await?;
            return Ok(summary);
        }

        tracing::info!(%tenant_id, ?summary, "Gravando edições de zonas");

        if let Err(err) = self.apply_plan(store, &plan).await {
            tracing::warn!(%tenant_id, error = %err, "Commit interrompido; a sessão guarda o que já foi gravado");
            self.bump();
            return Err(err);
        }

        self.load(store).await?;
        tracing::info!(%tenant_id, "Edições de zonas gravadas");
        Ok(summary)
    }

    async fn apply_plan(&mut self, store: &dyn ZoneStore, plan: &CommitPlan) -> Result<(), AppError> {
        let tenant_id = self.tenant_id;

        // 1. Zonas excluídas (filhos antes dos pais), com as posições ligadas
        for zone_id in &plan.zone_deletes {
            let zone_ids = [*zone_id];
            let position_ids = store
                .list_position_ids_for_zones(tenant_id, &zone_ids)
                .await
                .map_err(|e| AppError::persistence("list_position_ids_for_zones", e))?;
            store
                .delete_position_links_by_zone(tenant_id, &zone_ids)
                .await
                .map_err(|e| AppError::persistence("delete_position_links_by_zone", e))?;
            self.baseline.unlinked_positions.extend(position_ids.iter().copied());

            store
                .delete_positions(tenant_id, &position_ids)
                .await
                .map_err(|e| AppError::persistence("delete_positions", e))?;
            self.forget_positions(&position_ids);

            store
                .delete_zones(tenant_id, &zone_ids)
                .await
                .map_err(|e| AppError::persistence("delete_zones", e))?;
            self.baseline.zone_ids.remove(zone_id);
        }

        // 2. Zonas renomeadas
        for (id, code, name) in &plan.zone_updates {
            store
                .update_zone(tenant_id, *id, code, name)
                .await
                .map_err(|e| AppError::persistence("update_zone", e))?;
            if let Some(staged) = self.arena.zone_mut(*id) {
                staged.status = EditStatus::Existing;
            }
        }

        // 3. Zonas novas (pais antes dos filhos)
        for level in &plan.zone_inserts {
            store
                .insert_zones(level)
                .await
                .map_err(|e| AppError::persistence("insert_zones", e))?;
            for zone in level {
                self.baseline.zone_ids.insert(zone.id);
                if let Some(staged) = self.arena.zone_mut(zone.id) {
                    staged.status = EditStatus::Existing;
                }
            }
        }

        // 4. Posições excluídas
        store
            .delete_positions(tenant_id, &plan.position_deletes)
            .await
            .map_err(|e| AppError::persistence("delete_positions", e))?;
        self.forget_positions(&plan.position_deletes);

        // 5. Posições renomeadas
        for (id, code) in &plan.position_updates {
            store
                .update_position(tenant_id, *id, code)
                .await
                .map_err(|e| AppError::persistence("update_position", e))?;
            if let Some(staged) = self.arena.position_mut(*id) {
                staged.status = EditStatus::Existing;
            }
        }

        // 6. Posições novas + ligações, zona por zona
        if !plan.pending_links.is_empty() {
            store
                .insert_position_links(tenant_id, &plan.pending_links)
                .await
                .map_err(|e| AppError::persistence("insert_position_links", e))?;
            for link in &plan.pending_links {
                self.baseline.unlinked_positions.remove(&link.position_id);
            }
        }

        for (zone_id, positions) in &plan.position_inserts {
            store
                .insert_positions(positions)
                .await
                .map_err(|e| AppError::persistence("insert_positions", e))?;
            for position in positions {
                self.baseline.position_ids.insert(position.id);
                self.baseline.unlinked_positions.insert(position.id);
                if let Some(staged) = self.arena.position_mut(position.id) {
                    staged.status = EditStatus::Existing;
                }
            }

            let links: Vec<NewPositionLink> = positions
                .iter()
                .map(|p| NewPositionLink { zone_id: *zone_id, position_id: p.id })
                .collect();
            store
                .insert_position_links(tenant_id, &links)
                .await
                .map_err(|e| AppError::persistence("insert_position_links", e))?;
            for link in &links {
                self.baseline.unlinked_positions.remove(&link.position_id);
            }
        }

        Ok(())
    }

    fn forget_positions(&mut self, ids: &[Uuid]) {
        for id in ids {
            self.baseline.position_ids.remove(id);
            self.baseline.unlinked_positions.remove(id);
        }
    }

    /// Apaga ligações, posições e zonas do escopo direto no banco, ignorando a sessão.
    pub async fn delete_all(
        &mut self,
        store: &dyn ZoneStore,
        confirmation: DeleteAllConfirmation,
    ) -> Result<(), AppError> {
        if !(confirmation.confirmed && confirmation.confirmed_again) {
            return Err(AppError::ConfirmationRequired);
        }

        tracing::warn!(tenant_id = %self.tenant_id, "Apagando todas as zonas e posições do escopo");
        store
            .purge_scope(self.tenant_id)
            .await
            .map_err(|e| AppError::persistence("purge_scope", e))?;

        self.load(store).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::editor::EditorOptions;
    use super::super::patterns::PositionBatch;
    use super::super::tree::fixtures::*;
    use super::*;
    use crate::db::MemoryZoneStore;
    use crate::models::zones::StagedZone;

    async fn seeded() -> (MemoryZoneStore, ZoneEditor, Vec<Zone>, Vec<Position>) {
        let store = MemoryZoneStore::new();
        let tenant = Uuid::new_v4();
        let a = zone(tenant, None, "A");
        let d1 = zone(tenant, Some(&a), "D1");
        let t1 = zone(tenant, Some(&d1), "T1");
        let b = zone(tenant, None, "B");
        let p1 = position(tenant, "A.D1.T1.V1", 1);
        let p2 = position(tenant, "B.V1", 1);

        store.insert_zones(&[a.clone(), d1.clone(), t1.clone(), b.clone()]).await.unwrap();
        store.insert_positions(&[p1.clone(), p2.clone()]).await.unwrap();
        store
            .insert_position_links(
                tenant,
                &[
                    NewPositionLink { zone_id: t1.id, position_id: p1.id },
                    NewPositionLink { zone_id: b.id, position_id: p2.id },
                ],
            )
            .await
            .unwrap();

        let mut editor = ZoneEditor::new(tenant, EditorOptions::default());
        editor.load(&store).await.unwrap();
        (store, editor, vec![a, d1, t1, b], vec![p1, p2])
    }

    fn live_zones(editor: &ZoneEditor) -> Vec<(String, Option<Uuid>, i32)> {
        let mut zones: Vec<(String, Option<Uuid>, i32)> = editor
            .arena
            .zones()
            .filter(|z| z.status.is_live())
            .map(|z: &StagedZone| (z.zone.code.clone(), z.zone.parent_id, z.zone.level))
            .collect();
        zones.sort();
        zones
    }

    #[tokio::test]
    async fn commit_rebaselines_to_the_live_tree() {
        let (store, mut editor, zones, positions) = seeded().await;
        let (a, d1, b) = (&zones[0], &zones[1], &zones[3]);

        editor.delete_zone(d1.id).unwrap();
        editor.rename_zone(b.id, "B2", "Bloco 2").unwrap();
        let new_ids = editor.add_zone(Some(a.id), "D", "Corredor", 2).unwrap();
        editor
            .create_positions(new_ids[0], &PositionBatch::Manual { prefix: "A.D1.V".into(), start: 1, count: 2 }, None)
            .unwrap();
        editor.rename_position(positions[1].id, "B2.V1").unwrap();

        let expected = live_zones(&editor);
        let summary = editor.commit(&store).await.unwrap();

        assert_eq!(
            summary,
            CommitSummary {
                zones_deleted: 2,
                zones_updated: 1,
                zones_inserted: 2,
                positions_deleted: 0,
                positions_updated: 1,
                positions_inserted: 2,
            }
        );
        assert!(!editor.is_dirty());
        assert!(editor.arena.zones().all(|z| z.status == EditStatus::Existing));
        assert_eq!(live_zones(&editor), expected);
        // A posição da zona excluída saiu junto
        assert_eq!(store.position_count(editor.tenant_id).await, 3);
        assert_eq!(editor.arena.positions_of(new_ids[0]).len(), 2);
        assert_eq!(editor.arena.positions_of(b.id)[0].position.code, "B2.V1");
    }

    #[tokio::test]
    async fn commit_orders_writes_for_foreign_keys() {
        let (store, mut editor, zones, positions) = seeded().await;
        let (a, d1, b) = (&zones[0], &zones[1], &zones[3]);

        editor.delete_zone(d1.id).unwrap();
        let parent = editor.add_zone(Some(a.id), "X", "Novo", 1).unwrap()[0];
        editor.add_zone(Some(parent), "Y", "Neto", 1).unwrap();
        editor.delete_position(positions[1].id).unwrap();
        editor
            .create_positions(b.id, &PositionBatch::Manual { prefix: "B.V".into(), start: 2, count: 1 }, None)
            .unwrap();

        editor.commit(&store).await.unwrap();

        let writes: Vec<String> = store
            .calls()
            .await
            .into_iter()
            .skip(3) // semeadura
            .collect();
        assert_eq!(
            writes,
            vec![
                // T1 (nível 2) antes de D1 (nível 1)
                "delete_position_links_by_zone:1",
                "delete_positions:1",
                "delete_zones:1",
                "delete_position_links_by_zone:0",
                "delete_positions:0",
                "delete_zones:1",
                // Novas zonas, um nível por vez
                "insert_zones:1",
                "insert_zones:1",
                "delete_positions:1",
                "insert_positions:1",
                "insert_position_links:1",
            ]
        );
    }

    #[tokio::test]
    async fn new_then_deleted_entities_never_reach_the_store() {
        let (store, mut editor, zones, _) = seeded().await;
        let fresh = editor.add_zone(Some(zones[3].id), "TMP", "Temporária", 1).unwrap()[0];
        editor
            .create_positions(fresh, &PositionBatch::Manual { prefix: "TMP.V".into(), start: 1, count: 3 }, None)
            .unwrap();
        editor.delete_zone(fresh).unwrap();

        let summary = editor.commit(&store).await.unwrap();

        assert_eq!(summary, CommitSummary::default());
        assert_eq!(store.zone_count(editor.tenant_id).await, 4);
    }

    #[tokio::test]
    async fn failed_commit_keeps_session_dirty() {
        let (store, mut editor, zones, _) = seeded().await;
        editor.add_zone(Some(zones[3].id), "C", "Nova", 1).unwrap();
        store.fail_on("insert_zones").await;

        let err = editor.commit(&store).await.unwrap_err();

        assert!(matches!(err, AppError::PersistenceError { step: "insert_zones", .. }));
        assert!(editor.is_dirty());

        // Tentar de novo depois que o banco volta
        store.clear_failures().await;
        editor.commit(&store).await.unwrap();
        assert!(!editor.is_dirty());
    }

    #[tokio::test]
    async fn discard_restores_last_baseline() {
        let (store, mut editor, zones, positions) = seeded().await;
        let before = editor.snapshot();

        editor.delete_zone(zones[0].id).unwrap();
        editor.rename_position(positions[1].id, "ZZZ").unwrap();
        editor.add_zone(None, "Q", "Q", 4).unwrap();
        assert!(editor.is_dirty());

        editor.discard(&store).await.unwrap();

        let after = editor.snapshot();
        assert!(!after.is_dirty);
        assert_eq!(after.zones, before.zones);
        assert_eq!(after.positions_by_zone, before.positions_by_zone);
    }

    #[tokio::test]
    async fn delete_all_needs_both_confirmations() {
        let (store, mut editor, _, _) = seeded().await;
        let tenant = editor.tenant_id;

        let half = DeleteAllConfirmation { confirmed: true, confirmed_again: false };
        assert!(matches!(editor.delete_all(&store, half).await, Err(AppError::ConfirmationRequired)));
        assert_eq!(store.zone_count(tenant).await, 4);

        let both = DeleteAllConfirmation { confirmed: true, confirmed_again: true };
        editor.delete_all(&store, both).await.unwrap();

        assert_eq!(store.zone_count(tenant).await, 0);
        assert_eq!(store.position_count(tenant).await, 0);
        assert_eq!(editor.arena.zones().count(), 0);
    }

    #[tokio::test]
    async fn retry_resumes_after_failing_on_positions() {
        let (store, mut editor, zones, _) = seeded().await;
        let tenant = editor.tenant_id;
        let fresh = editor.add_zone(Some(zones[3].id), "C", "Nova", 1).unwrap()[0];
        editor
            .create_positions(fresh, &PositionBatch::Manual { prefix: "B.C.V".into(), start: 1, count: 1 }, None)
            .unwrap();
        store.fail_on("insert_positions").await;

        let err = editor.commit(&store).await.unwrap_err();
        assert!(matches!(err, AppError::PersistenceError { step: "insert_positions", .. }));
        // A zona já chegou ao banco; só a posição continua pendente
        assert_eq!(editor.arena.zone(fresh).unwrap().status, EditStatus::Existing);
        assert!(editor.is_dirty());

        store.clear_failures().await;
        let summary = editor.commit(&store).await.unwrap();

        assert_eq!(summary.zones_inserted, 0);
        assert_eq!(summary.positions_inserted, 1);
        assert!(!editor.is_dirty());
        assert_eq!(store.zone_count(tenant).await, 5);
        assert_eq!(store.position_count(tenant).await, 3);
        assert_eq!(editor.arena.positions_of(fresh)[0].position.code, "B.C.V1");
    }

    #[tokio::test]
    async fn retry_links_positions_written_before_a_link_failure() {
        let (store, mut editor, zones, _) = seeded().await;
        let tenant = editor.tenant_id;
        let shelf = zones[3].id;
        editor
            .create_positions(shelf, &PositionBatch::Manual { prefix: "B.V".into(), start: 2, count: 2 }, None)
            .unwrap();
        store.fail_on("insert_position_links").await;

        assert!(editor.commit(&store).await.is_err());
        assert_eq!(store.position_count(tenant).await, 4);

        store.clear_failures().await;
        let summary = editor.commit(&store).await.unwrap();

        assert_eq!(summary.positions_inserted, 0);
        assert_eq!(store.position_count(tenant).await, 4);
        let codes: Vec<String> = editor
            .arena
            .positions_of(shelf)
            .iter()
            .map(|p| p.position.code.clone())
            .collect();
        assert_eq!(codes, vec!["B.V1", "B.V2", "B.V3"]);
        assert!(!editor.is_dirty());
    }

    #[tokio::test]
    async fn deleting_a_zone_removes_positions_linked_only_in_the_store() {
        let (store, mut editor, zones, _) = seeded().await;
        let tenant = editor.tenant_id;
        let (d1, t1) = (&zones[1], &zones[2]);

        // Gravada por outra sessão depois da carga: a arena não conhece
        let stray = position(tenant, "A.D1.T1.V9", 9);
        store.insert_positions(&[stray.clone()]).await.unwrap();
        store
            .insert_position_links(tenant, &[NewPositionLink { zone_id: t1.id, position_id: stray.id }])
            .await
            .unwrap();
        assert!(editor.arena.position(stray.id).is_none());

        editor.delete_zone(d1.id).unwrap();
        editor.commit(&store).await.unwrap();

        assert_eq!(store.position_count(tenant).await, 1);
        let links = store.list_position_links(tenant).await.unwrap();
        assert_eq!(links.len(), 1);
        assert!(links.iter().all(|l| l.position.id != stray.id));
        assert_eq!(store.zone_count(tenant).await, 2);
    }
}
