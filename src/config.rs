// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use sqlx::postgres::PgPoolOptions;

use crate::{
    common::i18n::I18nStore,
    db::{MemoryZoneStore, ZoneRepository, ZoneStore},
    services::{zone_manager::EditorOptions, ZoneManagerService},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory, // Sem banco: útil para desenvolvimento da interface
}

// Configuração lida do ambiente (.env)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub duplicate_positions: bool,
    pub session_idle_timeout: Duration,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("{name} inválido: '{other}' (use true/false)"),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage_backend = match var_or("STORAGE_BACKEND", "postgres").to_ascii_lowercase().as_str() {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => bail!("STORAGE_BACKEND inválido: '{other}' (use postgres ou memory)"),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL deve ser definida quando STORAGE_BACKEND=postgres");
        }

        let db_max_connections = var_or("DB_MAX_CONNECTIONS", "5")
            .parse()
            .context("DB_MAX_CONNECTIONS deve ser um número")?;
        let acquire_secs: u64 = var_or("DB_ACQUIRE_TIMEOUT_SECS", "3")
            .parse()
            .context("DB_ACQUIRE_TIMEOUT_SECS deve ser um número")?;
        let idle_secs: u64 = var_or("SESSION_IDLE_SECS", "1800")
            .parse()
            .context("SESSION_IDLE_SECS deve ser um número")?;

        Ok(Self {
            database_url,
            storage_backend,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000"),
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(acquire_secs),
            duplicate_positions: parse_bool("ZONE_DUPLICATE_POSITIONS", &var_or("ZONE_DUPLICATE_POSITIONS", "false"))?,
            session_idle_timeout: Duration::from_secs(idle_secs),
        })
    }

    pub fn editor_options(&self) -> EditorOptions {
        EditorOptions { duplicate_positions: self.duplicate_positions }
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub zone_service: ZoneManagerService,
    pub i18n_store: Arc<I18nStore>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn ZoneStore> = match config.storage_backend {
            StorageBackend::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL deve ser definida")?;

                // Conecta ao banco de dados, usando '?' para propagar erros
                let db_pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .acquire_timeout(config.db_acquire_timeout)
                    .connect(database_url)
                    .await?;
                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

                sqlx::migrate!().run(&db_pool).await?;
                tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

                Arc::new(ZoneRepository::new(db_pool))
            }
            StorageBackend::Memory => {
                tracing::warn!("Usando armazenamento em memória: nada será persistido");
                Arc::new(MemoryZoneStore::new())
            }
        };

        Ok(Self::with_store(store, config.editor_options()))
    }

    // --- Monta o gráfico de dependências ---
    pub fn with_store(store: Arc<dyn ZoneStore>, options: EditorOptions) -> Self {
        Self {
            zone_service: ZoneManagerService::new(store, options),
            i18n_store: Arc::new(I18nStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boolean_flags() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "talvez").is_err());
    }
}
