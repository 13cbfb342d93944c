// src/services/zone_manager/patterns.rs

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use super::editor::ZoneEditor;
use super::tree::{ancestry, full_path, leaf_zones};
use crate::{common::error::AppError, models::zones::Position};

// Marcador temporário para o número, fora do alfabeto dos códigos
const NUMBER_PLACEHOLDER: &str = "\u{0}#\u{0}";

/// Como gerar um lote de posições numa zona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionBatch {
    /// `"{prefix}{n}"` para n em start..start+count
    Manual { prefix: String, start: i32, count: i32 },
    /// Padrão expandido em cada zona-folha sob a zona alvo.
    Auto { pattern: String, start: i32, count: i32 },
}

impl PositionBatch {
    fn numbers(start: i32, count: i32) -> Result<std::ops::Range<i32>, AppError> {
        if count < 1 {
            return Err(AppError::field("count", "range", "A quantidade deve ser no mínimo 1."));
        }
        let end = start
            .checked_add(count)
            .ok_or_else(|| AppError::field("start", "range", "Numeração fora do intervalo permitido."))?;
        Ok(start..end)
    }
}

/// Prefixo alfabético de um código: "D1" -> "D", "RK12" -> "RK", "12" -> "".
pub fn alpha_prefix(code: &str) -> String {
    code.chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

/// Expande um padrão para uma posição.
///
/// Ordem: `{#}` vira marcador, depois `{zone}`, depois as etiquetas de ancestrais
/// (prefixo mais longo primeiro) e, por fim, o marcador vira o número.
pub fn expand_pattern(pattern: &str, zone_path: &str, tags: &[(String, String)], number: i32) -> String {
    let mut out = pattern.replace("{#}", NUMBER_PLACEHOLDER);
    out = out.replace("{zone}", zone_path);

    let mut ordered: Vec<&(String, String)> = tags.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    for (prefix, code) in ordered {
        out = out.replace(&format!("{{{prefix}}}"), code);
    }

    out.replace(NUMBER_PLACEHOLDER, &number.to_string()).to_uppercase()
}

impl ZoneEditor {
    /// Etiquetas `{PREFIXO}` -> código para cada zona do caminho raiz..folha.
    /// Com prefixos repetidos, vale a zona mais próxima da folha.
    pub fn ancestor_tags(&self, leaf_id: Uuid) -> Vec<(String, String)> {
        let mut tags: HashMap<String, String> = HashMap::new();
        for zone_id in ancestry(&self.arena, leaf_id) {
            let Some(staged) = self.arena.zone(zone_id) else {
                continue;
            };
            let prefix = alpha_prefix(&staged.zone.code);
            if !prefix.is_empty() {
                tags.insert(prefix, staged.zone.code.clone());
            }
        }
        tags.into_iter().collect()
    }

    fn new_position(&self, code: String, display_order: i32, batch_name: &str) -> Position {
        Position {
            id: self.generate_id(),
            tenant_id: self.tenant_id,
            code,
            display_order,
            batch_name: Some(batch_name.to_string()),
            lot_id: None,
            created_at: Utc::now(),
        }
    }

    /// Cria um lote de posições. Retorna quantas foram criadas.
    pub fn create_positions(
        &mut self,
        zone_id: Uuid,
        batch: &PositionBatch,
        batch_name: Option<&str>,
    ) -> Result<usize, AppError> {
        self.arena.live_zone(zone_id)?;

        let created = match batch {
            PositionBatch::Manual { prefix, start, count } => {
                let numbers = PositionBatch::numbers(*start, *count)?;
                let label = batch_name.map(str::to_string).unwrap_or_else(|| format!("Manual: {prefix}"));

                let positions: Vec<Position> = numbers
                    .map(|n| self.new_position(format!("{prefix}{n}").trim().to_uppercase(), n, &label))
                    .collect();
                let created = positions.len();
                self.arena.push_positions(zone_id, positions);
                created
            }
            PositionBatch::Auto { pattern, start, count } => {
                let numbers = PositionBatch::numbers(*start, *count)?;
                if pattern.trim().is_empty() {
                    return Err(AppError::field("pattern", "required", "O padrão é obrigatório."));
                }
                if !pattern.contains("{#}") {
                    return Err(AppError::field("pattern", "number_token", "O padrão precisa conter {#}."));
                }
                let label = batch_name.map(str::to_string).unwrap_or_else(|| format!("Auto: {pattern}"));

                let mut created = 0;
                for leaf in leaf_zones(&self.arena, zone_id) {
                    let path = full_path(&self.arena, leaf);
                    let tags = self.ancestor_tags(leaf);
                    let positions: Vec<Position> = numbers
                        .clone()
                        .map(|n| self.new_position(expand_pattern(pattern.trim(), &path, &tags, n), n, &label))
                        .collect();
                    created += positions.len();
                    self.arena.push_positions(leaf, positions);
                }
                created
            }
        };

        tracing::debug!(tenant_id = %self.tenant_id, zone_id = %zone_id, created, "Lote de posições criado");
        self.bump();
        Ok(created)
    }
}
