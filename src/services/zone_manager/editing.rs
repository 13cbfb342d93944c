// src/services/zone_manager/editing.rs

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use super::cloning::rewrite_code;
use super::editor::ZoneEditor;
use super::tree::{full_path, subtree_ids};
use crate::{
    common::error::AppError,
    models::zones::{EditStatus, Position, TemplateNode, Zone},
};

/// Códigos são sempre maiúsculos e sem espaços nas pontas.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn require_code_and_name(code: &str, name: &str) -> Result<(String, String), AppError> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(AppError::field("code", "required", "O código é obrigatório."));
    }
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::field("name", "required", "O nome é obrigatório."));
    }
    Ok((code, name))
}

impl ZoneEditor {
    fn new_zone(&self, parent_id: Option<Uuid>, level: i32, code: String, name: String) -> Zone {
        Zone {
            id: self.generate_id(),
            tenant_id: self.tenant_id,
            code,
            name,
            parent_id,
            level,
            created_at: Utc::now(),
        }
    }

    // ---
    // Zonas
    // ---

    /// Cria uma zona (ou `count` zonas numeradas 1..count) sob `parent_id`.
    pub fn add_zone(
        &mut self,
        parent_id: Option<Uuid>,
        code: &str,
        name: &str,
        count: i32,
    ) -> Result<Vec<Uuid>, AppError> {
        let (code, name) = require_code_and_name(code, name)?;
        if count < 1 {
            return Err(AppError::field("count", "range", "A quantidade deve ser no mínimo 1."));
        }
        let level = self.arena.level_under(parent_id)?;

        let mut created = Vec::with_capacity(count as usize);
        if count == 1 {
            let zone = self.new_zone(parent_id, level, code, name);
            created.push(zone.id);
            self.arena.insert_zone(zone);
        } else {
            // Criação rápida: "Corredor" x5 -> A1..A5 / "Corredor 1".."Corredor 5"
            for i in 1..=count {
                let zone = self.new_zone(parent_id, level, format!("{code}{i}"), format!("{name} {i}"));
                created.push(zone.id);
                self.arena.insert_zone(zone);
            }
        }

        tracing::debug!(tenant_id = %self.tenant_id, ?parent_id, count, "Zonas adicionadas");
        self.bump();
        Ok(created)
    }

    /// Renomeia a zona. Campo vazio = nada acontece (retorna `false`).
    pub fn rename_zone(&mut self, id: Uuid, code: &str, name: &str) -> Result<bool, AppError> {
        let Ok((code, name)) = require_code_and_name(code, name) else {
            return Ok(false);
        };
        self.arena.live_zone(id)?;

        if let Some(staged) = self.arena.zone_mut(id) {
            staged.zone.code = code;
            staged.zone.name = name;
            staged.status = staged.status.after_rename();
        }
        self.bump();
        Ok(true)
    }

    /// Marca a zona e todos os descendentes vivos como excluídos. Retorna quantas foram marcadas.
    pub fn delete_zone(&mut self, id: Uuid) -> Result<usize, AppError> {
        self.arena.live_zone(id)?;

        let doomed = subtree_ids(&self.arena, id, false);
        for zone_id in &doomed {
            if let Some(staged) = self.arena.zone_mut(*zone_id) {
                staged.status = EditStatus::Deleted;
            }
        }

        tracing::debug!(tenant_id = %self.tenant_id, zone_id = %id, cascade = doomed.len(), "Zona excluída");
        self.bump();
        Ok(doomed.len())
    }

    /// Cópia profunda da sub-árvore viva, como irmã da original.
    /// A raiz ganha o sufixo `_COPY` / `(copy)`; os descendentes mantêm código e nome.
    pub fn duplicate_zone(&mut self, id: Uuid) -> Result<Uuid, AppError> {
        let source = self.arena.live_zone(id)?.zone.clone();

        // id original -> id da cópia
        let mut mapping: HashMap<Uuid, Uuid> = HashMap::new();
        let mut copies: Vec<Zone> = Vec::new();

        for original_id in subtree_ids(&self.arena, id, false) {
            let Some(original) = self.arena.zone(original_id).map(|z| z.zone.clone()) else {
                continue;
            };
            let is_root = original_id == id;

            let mut copy = self.new_zone(
                if is_root { original.parent_id } else { original.parent_id.and_then(|p| mapping.get(&p).copied()) },
                original.level,
                if is_root { format!("{}_COPY", original.code) } else { original.code.clone() },
                if is_root { format!("{} (copy)", original.name) } else { original.name.clone() },
            );
            // generate_id só enxerga a arena; evita colisão dentro do próprio lote
            while mapping.values().any(|used| *used == copy.id) {
                copy.id = self.generate_id();
            }
            mapping.insert(original_id, copy.id);
            copies.push(copy);
        }

        let copy_root = mapping[&id];
        for copy in copies {
            self.arena.insert_zone(copy);
        }

        if self.options.duplicate_positions {
            let source_prefix = full_path(&self.arena, id);
            let target_prefix = full_path(&self.arena, copy_root);
            let target_code = format!("{}_COPY", source.code);
            let batch_name = format!("Duplicated from {}", source.name);

            for (original_id, copy_id) in &mapping {
                let positions: Vec<Position> = self
                    .arena
                    .live_positions_of(*original_id)
                    .map(|p| Position {
                        id: self.generate_id(),
                        tenant_id: self.tenant_id,
                        code: rewrite_code(&p.position.code, &source_prefix, &target_prefix, &source.code, &target_code),
                        display_order: p.position.display_order,
                        batch_name: Some(batch_name.clone()),
                        lot_id: None,
                        created_at: Utc::now(),
                    })
                    .collect();
                if !positions.is_empty() {
                    self.arena.push_positions(*copy_id, positions);
                }
            }
        }

        tracing::debug!(tenant_id = %self.tenant_id, zone_id = %id, copies = mapping.len(), "Zona duplicada");
        self.bump();
        Ok(copy_root)
    }

    // ---
    // Modelos
    // ---

    /// Fotografa código/nome da zona e de seus descendentes vivos.
    pub fn snapshot_template(&self, id: Uuid) -> Result<TemplateNode, AppError> {
        fn build(editor: &ZoneEditor, id: Uuid, seen: &mut HashSet<Uuid>) -> TemplateNode {
            let (code, name) = editor
                .arena
                .zone(id)
                .map(|z| (z.zone.code.clone(), z.zone.name.clone()))
                .unwrap_or_default();

            let mut children = Vec::new();
            for child in editor.arena.live_children(id) {
                if seen.insert(child) {
                    children.push(build(editor, child, seen));
                }
            }
            TemplateNode { code, name, children }
        }

        self.arena.live_zone(id)?;
        let mut seen = HashSet::from([id]);
        Ok(build(self, id, &mut seen))
    }

    /// Instancia o modelo sob `parent_id`; a raiz usa o código/nome informados,
    /// os filhos mantêm os do modelo. Retorna o id da nova raiz.
    pub fn apply_template(
        &mut self,
        parent_id: Option<Uuid>,
        template: &TemplateNode,
        root_code: &str,
        root_name: &str,
    ) -> Result<Uuid, AppError> {
        let (root_code, root_name) = require_code_and_name(root_code, root_name)?;
        let level = self.arena.level_under(parent_id)?;

        let root = self.new_zone(parent_id, level, root_code, root_name);
        let root_id = root.id;
        self.arena.insert_zone(root);

        // Um nível por vez: (pai já inserido, nós filhos do modelo)
        let mut frontier: Vec<(Uuid, i32, &TemplateNode)> = vec![(root_id, level, template)];
        let mut created = 1;
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for (parent, parent_level, node) in frontier {
                for child in &node.children {
                    let zone = self.new_zone(Some(parent), parent_level + 1, child.code.clone(), child.name.clone());
                    next.push((zone.id, parent_level + 1, child));
                    self.arena.insert_zone(zone);
                    created += 1;
                }
            }
            frontier = next;
        }

        tracing::debug!(tenant_id = %self.tenant_id, ?parent_id, created, "Modelo aplicado");
        self.bump();
        Ok(root_id)
    }

    // ---
    // Posições avulsas
    // ---

    pub fn rename_position(&mut self, id: Uuid, code: &str) -> Result<bool, AppError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(false);
        }
        let zone_id = self.arena.zone_of_position(id).ok_or(AppError::PositionNotFound(id))?;

        let staged = self
            .arena
            .position_mut(id)
            .filter(|p| p.status.is_live())
            .ok_or(AppError::PositionNotFound(id))?;
        staged.position.code = code;
        staged.status = staged.status.after_rename();

        self.arena.sort_positions(zone_id);
        self.bump();
        Ok(true)
    }

    pub fn delete_position(&mut self, id: Uuid) -> Result<(), AppError> {
        let staged = self
            .arena
            .position_mut(id)
            .filter(|p| p.status.is_live())
            .ok_or(AppError::PositionNotFound(id))?;
        staged.status = EditStatus::Deleted;

        self.bump();
        Ok(())
    }
}
