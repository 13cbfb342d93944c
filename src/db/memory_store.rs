// src/db/memory_store.rs

use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ZoneStore,
    models::zones::{NewPositionLink, Position, PositionZoneLink, TemplateNode, Zone, ZoneTemplate},
};

#[derive(Default)]
struct MemoryData {
    zones: HashMap<Uuid, Zone>,
    positions: HashMap<Uuid, Position>,
    // (tenant, zona, posição)
    links: Vec<(Uuid, Uuid, Uuid)>,
    templates: Vec<ZoneTemplate>,
    // Operações que devem falhar (injeção de falhas)
    #[cfg(test)]
    failing: HashSet<&'static str>,
    // Registro das chamadas de escrita, na ordem em que chegaram
    #[cfg(test)]
    calls: Vec<String>,
}

#[cfg(test)]
impl MemoryData {
    fn enter(&mut self, op: &'static str) -> Result<(), AppError> {
        if self.failing.contains(op) {
            return Err(AppError::InternalServerError(anyhow!("falha simulada em {op}")));
        }
        Ok(())
    }

    fn record(&mut self, op: &'static str, count: usize) {
        self.calls.push(format!("{op}:{count}"));
    }
}

#[cfg(not(test))]
impl MemoryData {
    fn enter(&mut self, _op: &'static str) -> Result<(), AppError> {
        Ok(())
    }

    fn record(&mut self, _op: &'static str, _count: usize) {}
}

// Banco em memória com as mesmas restrições de chave estrangeira do Postgres.
// Usado com STORAGE_BACKEND=memory e nos testes.
#[derive(Default)]
pub struct MemoryZoneStore {
    data: Mutex<MemoryData>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Ganchos para os testes: falhas simuladas, registro de chamadas e contagens
#[cfg(test)]
impl MemoryZoneStore {
    /// Faz a operação `op` (nome do método do trait) falhar a partir de agora.
    pub async fn fail_on(&self, op: &'static str) {
        self.data.lock().await.failing.insert(op);
    }

    pub async fn clear_failures(&self) {
        self.data.lock().await.failing.clear();
    }

    /// Chamadas de escrita no formato "operação:quantidade".
    pub async fn calls(&self) -> Vec<String> {
        self.data.lock().await.calls.clone()
    }

    pub async fn zone_count(&self, tenant_id: Uuid) -> usize {
        let data = self.data.lock().await;
        data.zones.values().filter(|z| z.tenant_id == tenant_id).count()
    }

    pub async fn position_count(&self, tenant_id: Uuid) -> usize {
        let data = self.data.lock().await;
        data.positions.values().filter(|p| p.tenant_id == tenant_id).count()
    }
}

fn fk_violation(what: String) -> AppError {
    AppError::InternalServerError(anyhow!("violação de chave estrangeira: {what}"))
}

#[async_trait]
impl ZoneStore for MemoryZoneStore {
    async fn list_zones(&self, tenant_id: Uuid) -> Result<Vec<Zone>, AppError> {
        let mut data = self.data.lock().await;
        data.enter("list_zones")?;

        let mut zones: Vec<Zone> = data
            .zones
            .values()
            .filter(|z| z.tenant_id == tenant_id)
            .cloned()
            .collect();
        zones.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.code.cmp(&b.code)));
        Ok(zones)
    }

    async fn list_position_links(&self, tenant_id: Uuid) -> Result<Vec<PositionZoneLink>, AppError> {
        let mut data = self.data.lock().await;
        data.enter("list_position_links")?;

        let links = data
            .links
            .iter()
            .filter(|(tenant, _, _)| *tenant == tenant_id)
            .filter_map(|(_, zone_id, position_id)| {
                data.positions.get(position_id).map(|position| PositionZoneLink {
                    zone_id: *zone_id,
                    position: position.clone(),
                })
            })
            .collect();
        Ok(links)
    }

    async fn list_position_ids_for_zones(
        &self,
        tenant_id: Uuid,
        zone_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError> {
        let mut data = self.data.lock().await;
        data.enter("list_position_ids_for_zones")?;

        Ok(data
            .links
            .iter()
            .filter(|(tenant, zone_id, _)| *tenant == tenant_id && zone_ids.contains(zone_id))
            .map(|(_, _, position_id)| *position_id)
            .collect())
    }

    async fn insert_zones(&self, zones: &[Zone]) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("insert_zones")?;

        // Como no Postgres, a checagem vale para o comando inteiro
        let batch: HashSet<Uuid> = zones.iter().map(|z| z.id).collect();
        for zone in zones {
            if data.zones.contains_key(&zone.id) {
                return Err(AppError::InternalServerError(anyhow!("zona duplicada: {}", zone.id)));
            }
            if let Some(parent_id) = zone.parent_id {
                if !data.zones.contains_key(&parent_id) && !batch.contains(&parent_id) {
                    return Err(fk_violation(format!("zona {} sem pai {}", zone.id, parent_id)));
                }
            }
        }

        for zone in zones {
            data.zones.insert(zone.id, zone.clone());
        }
        data.record("insert_zones", zones.len());
        Ok(())
    }

    async fn update_zone(&self, tenant_id: Uuid, id: Uuid, code: &str, name: &str) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("update_zone")?;

        let zone = data
            .zones
            .get_mut(&id)
            .filter(|z| z.tenant_id == tenant_id)
            .ok_or(AppError::ZoneNotFound(id))?;
        zone.code = code.to_string();
        zone.name = name.to_string();
        data.record("update_zone", 1);
        Ok(())
    }

    async fn delete_zones(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("delete_zones")?;

        let doomed: HashSet<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| data.zones.get(id).is_some_and(|z| z.tenant_id == tenant_id))
            .collect();

        // Filho remanescente ou ligação ainda apontando para a zona = erro de FK
        for zone in data.zones.values() {
            if let Some(parent_id) = zone.parent_id {
                if doomed.contains(&parent_id) && !doomed.contains(&zone.id) {
                    return Err(fk_violation(format!("zona {} ainda tem filho {}", parent_id, zone.id)));
                }
            }
        }
        if let Some((_, zone_id, _)) = data.links.iter().find(|(_, zone_id, _)| doomed.contains(zone_id)) {
            return Err(fk_violation(format!("zona {zone_id} ainda tem posições ligadas")));
        }

        data.zones.retain(|id, _| !doomed.contains(id));
        data.record("delete_zones", doomed.len());
        Ok(())
    }

    async fn insert_positions(&self, positions: &[Position]) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("insert_positions")?;

        for position in positions {
            if data.positions.contains_key(&position.id) {
                return Err(AppError::InternalServerError(anyhow!("posição duplicada: {}", position.id)));
            }
        }
        for position in positions {
            data.positions.insert(position.id, position.clone());
        }
        data.record("insert_positions", positions.len());
        Ok(())
    }

    async fn update_position(&self, tenant_id: Uuid, id: Uuid, code: &str) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("update_position")?;

        let position = data
            .positions
            .get_mut(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or(AppError::PositionNotFound(id))?;
        position.code = code.to_string();
        data.record("update_position", 1);
        Ok(())
    }

    async fn delete_positions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("delete_positions")?;

        let doomed: HashSet<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| data.positions.get(id).is_some_and(|p| p.tenant_id == tenant_id))
            .collect();

        data.links.retain(|(_, _, position_id)| !doomed.contains(position_id));
        data.positions.retain(|id, _| !doomed.contains(id));
        data.record("delete_positions", doomed.len());
        Ok(())
    }

    async fn insert_position_links(&self, tenant_id: Uuid, links: &[NewPositionLink]) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("insert_position_links")?;

        for link in links {
            if !data.zones.contains_key(&link.zone_id) {
                return Err(fk_violation(format!("ligação para zona inexistente {}", link.zone_id)));
            }
            if !data.positions.contains_key(&link.position_id) {
                return Err(fk_violation(format!("ligação para posição inexistente {}", link.position_id)));
            }
        }
        data.links
            .extend(links.iter().map(|l| (tenant_id, l.zone_id, l.position_id)));
        data.record("insert_position_links", links.len());
        Ok(())
    }

    async fn delete_position_links_by_zone(&self, tenant_id: Uuid, zone_ids: &[Uuid]) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("delete_position_links_by_zone")?;

        let before = data.links.len();
        data.links
            .retain(|(tenant, zone_id, _)| !(*tenant == tenant_id && zone_ids.contains(zone_id)));
        let removed = before - data.links.len();
        data.record("delete_position_links_by_zone", removed);
        Ok(())
    }

    async fn list_templates(&self, tenant_id: Uuid) -> Result<Vec<ZoneTemplate>, AppError> {
        let mut data = self.data.lock().await;
        data.enter("list_templates")?;

        let mut templates: Vec<ZoneTemplate> = data
            .templates
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    async fn insert_template(
        &self,
        tenant_id: Uuid,
        name: &str,
        structure: &TemplateNode,
    ) -> Result<ZoneTemplate, AppError> {
        let mut data = self.data.lock().await;
        data.enter("insert_template")?;

        let template = ZoneTemplate {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            structure: Json(structure.clone()),
            created_at: Utc::now(),
        };
        data.templates.push(template.clone());
        data.record("insert_template", 1);
        Ok(template)
    }

    async fn delete_template(&self, tenant_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("delete_template")?;

        let before = data.templates.len();
        data.templates
            .retain(|t| !(t.id == id && t.tenant_id == tenant_id));
        if data.templates.len() == before {
            return Err(AppError::TemplateNotFound(id));
        }
        data.record("delete_template", 1);
        Ok(())
    }

    async fn purge_scope(&self, tenant_id: Uuid) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.enter("purge_scope")?;

        data.links.retain(|(tenant, _, _)| *tenant != tenant_id);
        data.positions.retain(|_, p| p.tenant_id != tenant_id);
        data.zones.retain(|_, z| z.tenant_id != tenant_id);
        data.record("purge_scope", 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(tenant_id: Uuid, parent_id: Option<Uuid>, code: &str, level: i32) -> Zone {
        Zone {
            id: Uuid::new_v4(),
            tenant_id,
            code: code.to_string(),
            name: code.to_string(),
            parent_id,
            level,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn refuses_parent_delete_while_children_remain() {
        let store = MemoryZoneStore::new();
        let tenant = Uuid::new_v4();
        let root = zone(tenant, None, "A", 0);
        let child = zone(tenant, Some(root.id), "A1", 1);
        store.insert_zones(&[root.clone(), child.clone()]).await.unwrap();

        assert!(store.delete_zones(tenant, &[root.id]).await.is_err());
        store.delete_zones(tenant, &[child.id]).await.unwrap();
        store.delete_zones(tenant, &[root.id]).await.unwrap();
        assert_eq!(store.zone_count(tenant).await, 0);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let store = MemoryZoneStore::new();
        let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert_zones(&[zone(t1, None, "A", 0)]).await.unwrap();
        store.insert_zones(&[zone(t2, None, "B", 0)]).await.unwrap();

        store.purge_scope(t1).await.unwrap();

        assert_eq!(store.zone_count(t1).await, 0);
        assert_eq!(store.list_zones(t2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_error() {
        let store = MemoryZoneStore::new();
        store.fail_on("list_zones").await;
        assert!(store.list_zones(Uuid::new_v4()).await.is_err());

        store.clear_failures().await;
        assert!(store.list_zones(Uuid::new_v4()).await.is_ok());
    }
}
