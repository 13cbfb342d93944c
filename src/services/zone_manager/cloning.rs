// src/services/zone_manager/cloning.rs

use chrono::Utc;
use uuid::Uuid;

use super::editor::ZoneEditor;
use super::tree::{full_path, relative_paths};
use crate::{
    common::error::AppError,
    models::zones::{CloneOutcome, Position},
};

/// Reescreve o prefixo de um código de posição.
///
/// Se o código começa pelo caminho completo da origem (sem diferenciar caixa),
/// troca esse trecho pelo caminho do destino. Senão, troca qualquer ocorrência
/// do código da raiz de origem pelo código da raiz de destino.
pub fn rewrite_code(
    code: &str,
    source_prefix: &str,
    target_prefix: &str,
    source_code: &str,
    target_code: &str,
) -> String {
    let upper = code.to_uppercase();
    let source_prefix = source_prefix.to_uppercase();

    if !source_prefix.is_empty() && upper.starts_with(&source_prefix) {
        return format!("{}{}", target_prefix.to_uppercase(), &upper[source_prefix.len()..]);
    }

    let source_code = source_code.to_uppercase();
    if source_code.is_empty() {
        return upper;
    }
    upper.replace(&source_code, &target_code.to_uppercase())
}

impl ZoneEditor {
    /// Copia as posições da sub-árvore `source_id` para a sub-árvore `target_id`,
    /// casando zonas pelo caminho relativo à raiz de cada lado.
    pub fn clone_positions(&mut self, source_id: Uuid, target_id: Uuid) -> Result<CloneOutcome, AppError> {
        if source_id == target_id {
            return Err(AppError::field("sourceZoneId", "same_zone", "Origem e destino devem ser zonas diferentes."));
        }
        let source = self.arena.live_zone(source_id)?.zone.clone();
        let target = self.arena.live_zone(target_id)?.zone.clone();

        let source_prefix = full_path(&self.arena, source_id);
        let target_prefix = full_path(&self.arena, target_id);
        let source_paths = relative_paths(&self.arena, source_id);
        let target_paths = relative_paths(&self.arena, target_id);
        let batch_name = format!("Cloned from {}", source.name);

        let mut pairs: Vec<(&String, Uuid, Uuid)> = Vec::new();
        let mut unmatched_paths = Vec::new();
        for (path, source_zone) in &source_paths {
            match target_paths.get(path) {
                Some(target_zone) => pairs.push((path, *source_zone, *target_zone)),
                None => unmatched_paths.push(path.clone()),
            }
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        unmatched_paths.sort();

        let mut outcome = CloneOutcome { unmatched_paths, ..CloneOutcome::default() };
        let mut staged: Vec<(Uuid, Vec<Position>)> = Vec::new();

        for (_, source_zone, target_zone) in &pairs {
            let copies: Vec<Position> = self
                .arena
                .live_positions_of(*source_zone)
                .map(|p| Position {
                    id: self.generate_id(),
                    tenant_id: self.tenant_id,
                    code: rewrite_code(&p.position.code, &source_prefix, &target_prefix, &source.code, &target.code),
                    display_order: p.position.display_order,
                    batch_name: Some(batch_name.clone()),
                    lot_id: None,
                    created_at: Utc::now(),
                })
                .collect();

            if !copies.is_empty() {
                outcome.paired_zones += 1;
                outcome.positions_created += copies.len();
                staged.push((*target_zone, copies));
            }
        }

        if outcome.positions_created == 0 {
            tracing::warn!(
                tenant_id = %self.tenant_id,
                source = %source.code,
                target = %target.code,
                "Clonagem sem posições para copiar"
            );
            return Err(AppError::StructuralMismatch(format!(
                "Nenhuma posição encontrada em {} para clonar em {}",
                source.code, target.code
            )));
        }

        for (zone_id, copies) in staged {
            self.arena.push_positions(zone_id, copies);
        }

        tracing::debug!(
            tenant_id = %self.tenant_id,
            created = outcome.positions_created,
            skipped = outcome.unmatched_paths.len(),
            "Posições clonadas"
        );
        self.bump();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::super::editor::EditorOptions;
    use super::super::tree::fixtures::*;
    use super::super::tree::ZoneArena;
    use super::*;
    use crate::models::zones::{EditStatus, PositionZoneLink, Zone};

    fn editor_with(zones: Vec<Zone>, links: Vec<PositionZoneLink>) -> ZoneEditor {
        let mut editor = ZoneEditor::new(zones[0].tenant_id, EditorOptions::default());
        editor.arena = ZoneArena::from_persisted(zones, links);
        editor
    }

    #[test]
    fn rewrites_full_path_prefix() {
        assert_eq!(rewrite_code("WH1.A1.V3", "WH1", "WH2", "WH1", "WH2"), "WH2.A1.V3");
        assert_eq!(rewrite_code("a.d1.t1.v2", "A.D1", "A.D3", "D1", "D3"), "A.D3.T1.V2");
    }

    #[test]
    fn falls_back_to_root_code_replacement() {
        // Código gerado antes de a zona ser movida: não começa pelo caminho atual
        assert_eq!(rewrite_code("OLD.D1.V3", "A.D1", "A.D3", "D1", "D3"), "OLD.D3.V3");
    }

    #[test]
    fn clones_by_structural_pairing() {
        let tenant = Uuid::new_v4();
        let wh1 = zone(tenant, None, "WH1");
        let a1 = zone(tenant, Some(&wh1), "A1");
        let wh2 = zone(tenant, None, "WH2");
        let a1b = zone(tenant, Some(&wh2), "A1");
        let original = position(tenant, "WH1.A1.V3", 3);
        let mut editor = editor_with(
            vec![wh1.clone(), a1.clone(), wh2.clone(), a1b.clone()],
            vec![link(&a1, original.clone())],
        );

        let outcome = editor.clone_positions(wh1.id, wh2.id).unwrap();

        assert_eq!(outcome.positions_created, 1);
        assert_eq!(outcome.paired_zones, 1);
        let copied = &editor.arena.positions_of(a1b.id)[0];
        assert_eq!(copied.position.code, "WH2.A1.V3");
        assert_ne!(copied.position.id, original.id);
        assert_eq!(copied.position.lot_id, None);
        assert_eq!(copied.status, EditStatus::New);
        assert_eq!(copied.position.batch_name.as_deref(), Some("Cloned from Zona WH1"));
        // A origem fica intocada
        assert_eq!(editor.arena.positions_of(a1.id)[0].status, EditStatus::Existing);
    }

    #[test]
    fn unmatched_paths_are_skipped_not_fatal() {
        let tenant = Uuid::new_v4();
        let wh1 = zone(tenant, None, "WH1");
        let a1 = zone(tenant, Some(&wh1), "A1");
        let a2 = zone(tenant, Some(&wh1), "A2");
        let wh2 = zone(tenant, None, "WH2");
        let a1b = zone(tenant, Some(&wh2), "A1");
        let mut editor = editor_with(
            vec![wh1.clone(), a1.clone(), a2.clone(), wh2.clone(), a1b.clone()],
            vec![
                link(&a1, position(tenant, "WH1.A1.V1", 1)),
                link(&a2, position(tenant, "WH1.A2.V1", 1)),
            ],
        );

        let outcome = editor.clone_positions(wh1.id, wh2.id).unwrap();

        assert_eq!(outcome.positions_created, 1);
        assert_eq!(outcome.unmatched_paths, vec!["A2".to_string()]);
        assert_eq!(editor.arena.positions_of(a1b.id)[0].position.code, "WH2.A1.V1");
    }

    #[test]
    fn nothing_to_clone_is_a_structural_mismatch() {
        let tenant = Uuid::new_v4();
        let wh1 = zone(tenant, None, "WH1");
        let wh2 = zone(tenant, None, "WH2");
        let mut editor = editor_with(vec![wh1.clone(), wh2.clone()], Vec::new());

        let err = editor.clone_positions(wh1.id, wh2.id).unwrap_err();
        assert!(matches!(err, AppError::StructuralMismatch(_)));
        assert!(!editor.is_dirty());
    }

    #[test]
    fn deleted_source_positions_are_not_cloned() {
        let tenant = Uuid::new_v4();
        let wh1 = zone(tenant, None, "WH1");
        let wh2 = zone(tenant, None, "WH2");
        let gone = position(tenant, "WH1.V1", 1);
        let mut editor = editor_with(vec![wh1.clone(), wh2.clone()], vec![link(&wh1, gone.clone())]);
        editor.delete_position(gone.id).unwrap();

        assert!(matches!(editor.clone_positions(wh1.id, wh2.id), Err(AppError::StructuralMismatch(_))));
    }
}
