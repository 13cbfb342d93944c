// src/services/zone_manager/tree.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use super::natural::natural_cmp;
use crate::{
    common::error::AppError,
    models::zones::{
        EditStatus, Position, PositionZoneLink, StagedPosition, StagedZone, Zone, ZoneTreeSnapshot,
    },
};

// ---
// Arena de zonas e posições, indexada por id.
// ---
// Nada é removido fisicamente antes do commit: excluir é só mudar o status.
// Toda navegação (pais, filhos, folhas, caminhos) é feita por consulta ao mapa.
#[derive(Debug, Clone, Default)]
pub struct ZoneArena {
    zones: HashMap<Uuid, StagedZone>,
    positions: HashMap<Uuid, Vec<StagedPosition>>,
}

impl ZoneArena {
    /// Monta a arena a partir do que veio do banco; tudo entra como `existing`.
    pub fn from_persisted(zones: Vec<Zone>, links: Vec<PositionZoneLink>) -> Self {
        let mut arena = ZoneArena::default();

        for zone in zones {
            arena.zones.insert(zone.id, StagedZone { zone, status: EditStatus::Existing });
        }

        for link in links {
            arena
                .positions
                .entry(link.zone_id)
                .or_default()
                .push(StagedPosition { position: link.position, status: EditStatus::Existing });
        }

        let zone_ids: Vec<Uuid> = arena.positions.keys().copied().collect();
        for zone_id in zone_ids {
            arena.sort_positions(zone_id);
        }
        arena
    }

    // --- Consultas de zona ---

    pub fn zone(&self, id: Uuid) -> Option<&StagedZone> {
        self.zones.get(&id)
    }

    pub(super) fn zone_mut(&mut self, id: Uuid) -> Option<&mut StagedZone> {
        self.zones.get_mut(&id)
    }

    /// A zona precisa existir e não estar excluída.
    pub fn live_zone(&self, id: Uuid) -> Result<&StagedZone, AppError> {
        self.zones
            .get(&id)
            .filter(|z| z.status.is_live())
            .ok_or(AppError::ZoneNotFound(id))
    }

    pub fn zones(&self) -> impl Iterator<Item = &StagedZone> {
        self.zones.values()
    }

    pub fn contains_id(&self, id: Uuid) -> bool {
        self.zones.contains_key(&id)
            || self
                .positions
                .values()
                .flatten()
                .any(|p| p.position.id == id)
    }

    /// Filhos diretos (vivos ou não), na ordem natural dos códigos.
    pub fn children(&self, id: Uuid) -> Vec<Uuid> {
        let mut children: Vec<&StagedZone> = self
            .zones
            .values()
            .filter(|z| z.zone.parent_id == Some(id))
            .collect();
        children.sort_by(|a, b| natural_cmp(&a.zone.code, &b.zone.code));
        children.into_iter().map(|z| z.zone.id).collect()
    }

    pub fn live_children(&self, id: Uuid) -> Vec<Uuid> {
        self.children(id)
            .into_iter()
            .filter(|child| self.zones[child].status.is_live())
            .collect()
    }

    /// Nível que uma nova zona terá sob `parent_id` (0 para raiz).
    pub fn level_under(&self, parent_id: Option<Uuid>) -> Result<i32, AppError> {
        match parent_id {
            None => Ok(0),
            Some(parent_id) => Ok(self.live_zone(parent_id)?.zone.level + 1),
        }
    }

    // --- Posições ---

    pub fn positions_of(&self, zone_id: Uuid) -> &[StagedPosition] {
        self.positions.get(&zone_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(super) fn positions_of_mut(&mut self, zone_id: Uuid) -> &mut Vec<StagedPosition> {
        self.positions.entry(zone_id).or_default()
    }

    pub fn live_positions_of(&self, zone_id: Uuid) -> impl Iterator<Item = &StagedPosition> {
        self.positions_of(zone_id).iter().filter(|p| p.status.is_live())
    }

    /// Zona dona da posição.
    pub fn zone_of_position(&self, position_id: Uuid) -> Option<Uuid> {
        self.positions
            .iter()
            .find(|(_, list)| list.iter().any(|p| p.position.id == position_id))
            .map(|(zone_id, _)| *zone_id)
    }

    pub fn position(&self, position_id: Uuid) -> Option<&StagedPosition> {
        self.positions
            .values()
            .flatten()
            .find(|p| p.position.id == position_id)
    }

    pub(super) fn position_mut(&mut self, position_id: Uuid) -> Option<&mut StagedPosition> {
        self.positions
            .values_mut()
            .flatten()
            .find(|p| p.position.id == position_id)
    }

    /// Mapa zona -> posições, com as zonas na ordem de iteração do mapa.
    pub fn positions_by_zone(&self) -> impl Iterator<Item = (Uuid, &[StagedPosition])> {
        self.positions.iter().map(|(id, list)| (*id, list.as_slice()))
    }

    // --- Mutação básica ---

    pub(super) fn insert_zone(&mut self, zone: Zone) {
        self.zones.insert(zone.id, StagedZone { zone, status: EditStatus::New });
    }

    pub(super) fn push_positions(&mut self, zone_id: Uuid, positions: Vec<Position>) {
        let list = self.positions_of_mut(zone_id);
        list.extend(
            positions
                .into_iter()
                .map(|position| StagedPosition { position, status: EditStatus::New }),
        );
        self.sort_positions(zone_id);
    }

    pub(super) fn sort_positions(&mut self, zone_id: Uuid) {
        if let Some(list) = self.positions.get_mut(&zone_id) {
            list.sort_by(|a, b| natural_cmp(&a.position.code, &b.position.code));
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.zones.values().any(|z| z.status.is_dirty())
            || self.positions.values().flatten().any(|p| p.status.is_dirty())
    }

    pub fn snapshot(&self, revision: u64) -> ZoneTreeSnapshot {
        let mut zones: Vec<StagedZone> = self.zones.values().cloned().collect();
        zones.sort_by(|a, b| {
            a.zone
                .level
                .cmp(&b.zone.level)
                .then_with(|| natural_cmp(&a.zone.code, &b.zone.code))
        });

        let positions_by_zone: BTreeMap<Uuid, Vec<StagedPosition>> = self
            .positions
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(id, list)| (*id, list.clone()))
            .collect();

        ZoneTreeSnapshot { zones, positions_by_zone, is_dirty: self.is_dirty(), revision }
    }

    /// Lista as violações de estrutura (nível, ciclos, pais ausentes, cascata).
    pub fn structure_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for staged in self.zones.values() {
            let zone = &staged.zone;
            match zone.parent_id {
                None if zone.level != 0 => {
                    violations.push(format!("zona raiz {} com nível {}", zone.code, zone.level));
                }
                None => {}
                Some(parent_id) => match self.zones.get(&parent_id) {
                    None => violations.push(format!("zona {} aponta para pai inexistente", zone.code)),
                    Some(parent) => {
                        if zone.level != parent.zone.level + 1 {
                            violations.push(format!(
                                "zona {} com nível {} sob pai de nível {}",
                                zone.code, zone.level, parent.zone.level
                            ));
                        }
                        if staged.status.is_live() && !parent.status.is_live() {
                            violations.push(format!("zona {} viva sob pai excluído", zone.code));
                        }
                    }
                },
            }

            // Subida até a raiz; revisitar um id é ciclo
            let mut seen = HashSet::from([zone.id]);
            let mut cursor = zone.parent_id;
            while let Some(id) = cursor {
                if !seen.insert(id) {
                    violations.push(format!("ciclo passando pela zona {}", zone.code));
                    break;
                }
                cursor = self.zones.get(&id).and_then(|z| z.zone.parent_id);
            }
        }
        violations
    }
}

// ---
// Travessias (funções puras sobre a arena)
// ---

/// O próprio `id` seguido de todos os descendentes (pré-ordem).
/// Cada zona aparece uma vez só, mesmo que o banco tenha um ciclo.
pub fn subtree_ids(arena: &ZoneArena, id: Uuid, include_deleted: bool) -> Vec<Uuid> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![id];

    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        let Some(zone) = arena.zone(current) else {
            continue;
        };
        if !include_deleted && !zone.status.is_live() {
            continue;
        }
        ids.push(current);
        // Invertido para a pilha devolver os filhos na ordem natural
        stack.extend(arena.children(current).into_iter().rev());
    }
    ids
}

/// Zonas vivas sem filhos vivos dentro da sub-árvore (uma zona sem filhos é a própria folha).
pub fn leaf_zones(arena: &ZoneArena, id: Uuid) -> Vec<Uuid> {
    subtree_ids(arena, id, false)
        .into_iter()
        .filter(|zone_id| arena.live_children(*zone_id).is_empty())
        .collect()
}

/// Zonas da raiz até `id`, inclusive.
pub fn ancestry(arena: &ZoneArena, id: Uuid) -> Vec<Uuid> {
    let mut chain = Vec::new();
    let mut cursor = Some(id);
    while let Some(current) = cursor {
        // Guarda contra ciclo num banco inconsistente
        if chain.contains(&current) {
            break;
        }
        let Some(zone) = arena.zone(current) else {
            break;
        };
        chain.push(current);
        cursor = zone.zone.parent_id;
    }
    chain.reverse();
    chain
}

/// Caminho completo de códigos, ex.: "A.D1.T1".
pub fn full_path(arena: &ZoneArena, id: Uuid) -> String {
    ancestry(arena, id)
        .into_iter()
        .filter_map(|zone_id| arena.zone(zone_id))
        .map(|z| z.zone.code.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// Caminho relativo de cada zona viva da sub-árvore; a raiz tem caminho vazio.
pub fn relative_paths(arena: &ZoneArena, root: Uuid) -> HashMap<String, Uuid> {
    fn walk(
        arena: &ZoneArena,
        id: Uuid,
        prefix: &str,
        seen: &mut HashSet<Uuid>,
        out: &mut HashMap<String, Uuid>,
    ) {
        for child in arena.live_children(id) {
            if !seen.insert(child) {
                continue;
            }
            let code = &arena.zones[&child].zone.code;
            let path = if prefix.is_empty() { code.clone() } else { format!("{prefix}.{code}") };
            walk(arena, child, &path, seen, out);
            out.insert(path, child);
        }
    }

    let mut paths = HashMap::new();
    if arena.live_zone(root).is_ok() {
        let mut seen = HashSet::from([root]);
        paths.insert(String::new(), root);
        walk(arena, root, "", &mut seen, &mut paths);
    }
    paths
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    // A -> (D1 -> T1), (D2 -> T1)
    fn sample() -> (ZoneArena, Vec<Zone>) {
        let tenant = Uuid::new_v4();
        let a = zone(tenant, None, "A");
        let d1 = zone(tenant, Some(&a), "D1");
        let d2 = zone(tenant, Some(&a), "D2");
        let t1 = zone(tenant, Some(&d1), "T1");
        let t2 = zone(tenant, Some(&d2), "T1");
        let zones = vec![a, d1, d2, t1, t2];
        let links = vec![
            link(&zones[3], position(tenant, "A.D1.T1.V10", 10)),
            link(&zones[3], position(tenant, "A.D1.T1.V2", 2)),
        ];
        (ZoneArena::from_persisted(zones.clone(), links), zones)
    }

    #[test]
    fn loads_everything_as_existing_and_sorted() {
        let (arena, zones) = sample();
        assert!(!arena.is_dirty());
        assert!(arena.zones().all(|z| z.status == EditStatus::Existing));

        let codes: Vec<&str> = arena
            .positions_of(zones[3].id)
            .iter()
            .map(|p| p.position.code.as_str())
            .collect();
        assert_eq!(codes, vec!["A.D1.T1.V2", "A.D1.T1.V10"]);
    }

    #[test]
    fn paths_and_leaves() {
        let (arena, zones) = sample();
        assert_eq!(full_path(&arena, zones[4].id), "A.D2.T1");
        assert_eq!(leaf_zones(&arena, zones[0].id), vec![zones[3].id, zones[4].id]);
        assert_eq!(leaf_zones(&arena, zones[3].id), vec![zones[3].id]);

        let rel = relative_paths(&arena, zones[0].id);
        assert_eq!(rel[""], zones[0].id);
        assert_eq!(rel["D1.T1"], zones[3].id);
        assert_eq!(rel["D2.T1"], zones[4].id);
        assert_eq!(rel.len(), 5);
    }

    #[test]
    fn detects_broken_levels() {
        let tenant = Uuid::new_v4();
        let root = zone(tenant, None, "A");
        let mut child = zone(tenant, Some(&root), "B");
        child.level = 3;
        let arena = ZoneArena::from_persisted(vec![root, child], Vec::new());

        assert_eq!(arena.structure_violations().len(), 1);
    }

    // X e Y apontam um para o outro como pai
    fn cyclic() -> (ZoneArena, Zone, Zone) {
        let tenant = Uuid::new_v4();
        let mut x = zone(tenant, None, "X");
        let y = zone(tenant, Some(&x), "Y");
        x.parent_id = Some(y.id);
        x.level = 2;
        (ZoneArena::from_persisted(vec![x.clone(), y.clone()], Vec::new()), x, y)
    }

    #[test]
    fn walks_terminate_on_cyclic_trees() {
        let (arena, x, y) = cyclic();
        assert!(!arena.structure_violations().is_empty());

        assert_eq!(subtree_ids(&arena, x.id, false), vec![x.id, y.id]);
        assert_eq!(subtree_ids(&arena, y.id, true), vec![y.id, x.id]);
        assert!(leaf_zones(&arena, x.id).is_empty());

        let rel = relative_paths(&arena, x.id);
        assert_eq!(rel.len(), 2);
        assert_eq!(rel["Y"], y.id);
        assert_eq!(full_path(&arena, x.id), "Y.X");
    }
}
