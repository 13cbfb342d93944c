// src/db/zone_repo.rs

use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ZoneStore,
    models::zones::{NewPositionLink, Position, PositionZoneLink, TemplateNode, Zone, ZoneTemplate},
};

// Postgres aceita no máximo 65535 parâmetros por comando.
const INSERT_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct ZoneRepository {
    pool: PgPool,
}

impl ZoneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Helper RLS: a "chave" do banco
    // ---
    /// Abre uma transação já com `app.tenant_id` definido (vale só até o commit).
    async fn begin_scoped(&self, tenant_id: Uuid) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }
}

#[async_trait]
impl ZoneStore for ZoneRepository {
    async fn list_zones(&self, tenant_id: Uuid) -> Result<Vec<Zone>, AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        let zones = sqlx::query_as::<_, Zone>(
            r#"
            SELECT id, tenant_id, code, name, parent_id, level, created_at
            FROM zones
            WHERE tenant_id = $1
            ORDER BY level ASC, code ASC
            "#,
        )
            .bind(tenant_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(zones)
    }

    async fn list_position_links(&self, tenant_id: Uuid) -> Result<Vec<PositionZoneLink>, AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        // A posição vem "achatada" na mesma linha da ligação
        let links = sqlx::query_as::<_, PositionZoneLink>(
            r#"
            SELECT pz.zone_id,
                   p.id, p.tenant_id, p.code, p.display_order, p.batch_name, p.lot_id, p.created_at
            FROM position_zones pz
            JOIN positions p ON p.id = pz.position_id
            WHERE pz.tenant_id = $1
            "#,
        )
            .bind(tenant_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(links)
    }

    async fn list_position_ids_for_zones(
        &self,
        tenant_id: Uuid,
        zone_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError> {
        if zone_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.begin_scoped(tenant_id).await?;

        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT position_id FROM position_zones WHERE tenant_id = $1 AND zone_id = ANY($2)",
        )
            .bind(tenant_id)
            .bind(zone_ids)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ids)
    }

    async fn insert_zones(&self, zones: &[Zone]) -> Result<(), AppError> {
        let Some(first) = zones.first() else {
            return Ok(());
        };
        let mut tx = self.begin_scoped(first.tenant_id).await?;

        for chunk in zones.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO zones (id, tenant_id, code, name, parent_id, level, created_at) ",
            );
            builder.push_values(chunk, |mut row, zone| {
                row.push_bind(zone.id)
                    .push_bind(zone.tenant_id)
                    .push_bind(zone.code.clone())
                    .push_bind(zone.name.clone())
                    .push_bind(zone.parent_id)
                    .push_bind(zone.level)
                    .push_bind(zone.created_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_zone(&self, tenant_id: Uuid, id: Uuid, code: &str, name: &str) -> Result<(), AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        let result = sqlx::query("UPDATE zones SET code = $1, name = $2 WHERE id = $3 AND tenant_id = $4")
            .bind(code)
            .bind(name)
            .bind(id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ZoneNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_zones(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.begin_scoped(tenant_id).await?;

        sqlx::query("DELETE FROM zones WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_positions(&self, positions: &[Position]) -> Result<(), AppError> {
        let Some(first) = positions.first() else {
            return Ok(());
        };
        let mut tx = self.begin_scoped(first.tenant_id).await?;

        for chunk in positions.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO positions (id, tenant_id, code, display_order, batch_name, lot_id, created_at) ",
            );
            builder.push_values(chunk, |mut row, position| {
                row.push_bind(position.id)
                    .push_bind(position.tenant_id)
                    .push_bind(position.code.clone())
                    .push_bind(position.display_order)
                    .push_bind(position.batch_name.clone())
                    .push_bind(position.lot_id)
                    .push_bind(position.created_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_position(&self, tenant_id: Uuid, id: Uuid, code: &str) -> Result<(), AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        let result = sqlx::query("UPDATE positions SET code = $1 WHERE id = $2 AND tenant_id = $3")
            .bind(code)
            .bind(id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PositionNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_positions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.begin_scoped(tenant_id).await?;

        // A ligação precisa sair antes da posição (FK)
        sqlx::query("DELETE FROM position_zones WHERE tenant_id = $1 AND position_id = ANY($2)")
            .bind(tenant_id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM positions WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_position_links(&self, tenant_id: Uuid, links: &[NewPositionLink]) -> Result<(), AppError> {
        if links.is_empty() {
            return Ok(());
        }
        let mut tx = self.begin_scoped(tenant_id).await?;

        for chunk in links.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO position_zones (tenant_id, zone_id, position_id) ");
            builder.push_values(chunk, |mut row, link| {
                row.push_bind(tenant_id)
                    .push_bind(link.zone_id)
                    .push_bind(link.position_id);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_position_links_by_zone(&self, tenant_id: Uuid, zone_ids: &[Uuid]) -> Result<(), AppError> {
        if zone_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.begin_scoped(tenant_id).await?;

        sqlx::query("DELETE FROM position_zones WHERE tenant_id = $1 AND zone_id = ANY($2)")
            .bind(tenant_id)
            .bind(zone_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_templates(&self, tenant_id: Uuid) -> Result<Vec<ZoneTemplate>, AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        let templates = sqlx::query_as::<_, ZoneTemplate>(
            r#"
            SELECT id, tenant_id, name, structure, created_at
            FROM zone_templates
            WHERE tenant_id = $1
            ORDER BY name ASC
            "#,
        )
            .bind(tenant_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(templates)
    }

    async fn insert_template(
        &self,
        tenant_id: Uuid,
        name: &str,
        structure: &TemplateNode,
    ) -> Result<ZoneTemplate, AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        let template = sqlx::query_as::<_, ZoneTemplate>(
            r#"
            INSERT INTO zone_templates (id, tenant_id, name, structure)
            VALUES ($1, $2, $3, $4)
            RETURNING id, tenant_id, name, structure, created_at
            "#,
        )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(name)
            .bind(Json(structure))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(template)
    }

    async fn delete_template(&self, tenant_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        let result = sqlx::query("DELETE FROM zone_templates WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TemplateNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn purge_scope(&self, tenant_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.begin_scoped(tenant_id).await?;

        sqlx::query("DELETE FROM position_zones WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM positions WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        // Filhos antes dos pais: do nível mais fundo para a raiz
        let levels = sqlx::query_scalar::<_, i32>(
            "SELECT DISTINCT level FROM zones WHERE tenant_id = $1 ORDER BY level DESC",
        )
            .bind(tenant_id)
            .fetch_all(&mut *tx)
            .await?;

        for level in levels {
            sqlx::query("DELETE FROM zones WHERE tenant_id = $1 AND level = $2")
                .bind(tenant_id)
                .bind(level)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
