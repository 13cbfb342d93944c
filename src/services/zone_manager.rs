// src/services/zone_manager.rs

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{
    sync::{watch, Mutex, OnceCell},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ZoneStore,
    models::zones::{CommitSummary, ZoneTemplate, ZoneTreeSnapshot},
};

pub mod cloning;
pub mod commit;
pub mod editing;
pub mod editor;
pub mod natural;
pub mod patterns;
pub mod tree;

pub use commit::DeleteAllConfirmation;
pub use editor::{EditorOptions, ZoneEditor};
pub use patterns::PositionBatch;

type Session = Arc<Mutex<ZoneEditor>>;

// Vaga do tenant no mapa. A carga inicial acontece dentro da célula,
// sem segurar o lock do mapa (outros tenants não esperam por ela).
struct SessionEntry {
    cell: Arc<OnceCell<Session>>,
    last_used: Instant,
}

// ---
// Serviço do editor de zonas: uma sessão de edição por tenant.
// ---
#[derive(Clone)]
pub struct ZoneManagerService {
    store: Arc<dyn ZoneStore>,
    options: EditorOptions,
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
}

impl ZoneManagerService {
    pub fn new(store: Arc<dyn ZoneStore>, options: EditorOptions) -> Self {
        Self {
            store,
            options,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sessão do tenant; na primeira vez, carrega a árvore do banco.
    /// Uma carga que falha não fica guardada: a próxima chamada tenta de novo.
    async fn session(&self, tenant_id: Uuid) -> Result<Session, AppError> {
        let cell = {
            let mut sessions = self.sessions.lock().await;
            let entry = sessions.entry(tenant_id).or_insert_with(|| SessionEntry {
                cell: Arc::new(OnceCell::new()),
                last_used: Instant::now(),
            });
            entry.last_used = Instant::now();
            entry.cell.clone()
        };

        let session = cell
            .get_or_try_init(|| async {
                let mut editor = ZoneEditor::new(tenant_id, self.options.clone());
                editor.load(self.store.as_ref()).await?;
                Ok::<_, AppError>(Arc::new(Mutex::new(editor)))
            })
            .await?;
        Ok(session.clone())
    }

    /// Descarta sessões paradas há mais de `max_idle` sem edições pendentes,
    /// sem assinantes e que ninguém está usando. Sessões sujas ficam até o commit ou descarte.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();

        sessions.retain(|_, entry| {
            if entry.last_used.elapsed() < max_idle || Arc::strong_count(&entry.cell) > 1 {
                return true;
            }
            let Some(session) = entry.cell.get() else {
                // Carga que falhou: nada a preservar
                return false;
            };
            if Arc::strong_count(session) > 1 {
                return true;
            }
            match session.try_lock() {
                Ok(editor) => editor.is_dirty() || editor.has_subscribers(),
                Err(_) => true,
            }
        });

        before - sessions.len()
    }

    /// Varredura periódica das sessões ociosas.
    pub fn spawn_session_sweeper(&self, max_idle: Duration) -> JoinHandle<()> {
        let service = self.clone();
        let period = (max_idle / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            tracing::info!(?max_idle, ?period, "Varredura de sessões ociosas iniciada");
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = service.evict_idle(max_idle).await;
                if evicted > 0 {
                    tracing::debug!(evicted, "Sessões ociosas descartadas");
                }
            }
        })
    }

    pub async fn snapshot(&self, tenant_id: Uuid) -> Result<ZoneTreeSnapshot, AppError> {
        let session = self.session(tenant_id).await?;
        let editor = session.lock().await;
        Ok(editor.snapshot())
    }

    pub async fn subscribe(&self, tenant_id: Uuid) -> Result<watch::Receiver<u64>, AppError> {
        let session = self.session(tenant_id).await?;
        let editor = session.lock().await;
        Ok(editor.subscribe())
    }

    /// Aplica uma mutação síncrona na sessão do tenant.
    /// Espera qualquer commit em andamento terminar antes.
    pub async fn edit<T, F>(&self, tenant_id: Uuid, mutation: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut ZoneEditor) -> Result<T, AppError>,
    {
        let session = self.session(tenant_id).await?;
        let mut editor = session.lock().await;
        mutation(&mut editor)
    }

    // ---
    // Operações com o banco
    // ---
    // Rodam numa task própria: se a requisição cair no meio, o commit vai até o fim.

    pub async fn commit(&self, tenant_id: Uuid) -> Result<CommitSummary, AppError> {
        let session = self.session(tenant_id).await?;
        let store = self.store.clone();

        let handle = tokio::spawn(async move {
            let mut editor = session.lock_owned().await;
            editor.commit(store.as_ref()).await
        });
        handle.await.map_err(|e| AppError::InternalServerError(e.into()))?
    }

    pub async fn discard(&self, tenant_id: Uuid) -> Result<ZoneTreeSnapshot, AppError> {
        let session = self.session(tenant_id).await?;
        let store = self.store.clone();

        let handle = tokio::spawn(async move {
            let mut editor = session.lock_owned().await;
            editor.discard(store.as_ref()).await?;
            Ok::<_, AppError>(editor.snapshot())
        });
        handle.await.map_err(|e| AppError::InternalServerError(e.into()))?
    }

    pub async fn delete_all(
        &self,
        tenant_id: Uuid,
        confirmation: DeleteAllConfirmation,
    ) -> Result<ZoneTreeSnapshot, AppError> {
        let session = self.session(tenant_id).await?;
        let store = self.store.clone();

        let handle = tokio::spawn(async move {
            let mut editor = session.lock_owned().await;
            editor.delete_all(store.as_ref(), confirmation).await?;
            Ok::<_, AppError>(editor.snapshot())
        });
        handle.await.map_err(|e| AppError::InternalServerError(e.into()))?
    }

    // ---
    // Modelos
    // ---

    pub async fn list_templates(&self, tenant_id: Uuid) -> Result<Vec<ZoneTemplate>, AppError> {
        self.store.list_templates(tenant_id).await
    }

    /// Salva a forma da sub-árvore viva de `zone_id` como modelo.
    pub async fn save_template(&self, tenant_id: Uuid, zone_id: Uuid, name: &str) -> Result<ZoneTemplate, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::field("name", "required", "O nome do modelo é obrigatório."));
        }
        let structure = self.edit(tenant_id, |editor| editor.snapshot_template(zone_id)).await?;

        let template = self.store.insert_template(tenant_id, name, &structure).await?;
        tracing::info!(%tenant_id, template_id = %template.id, zones = structure.zone_count(), "Modelo salvo");
        Ok(template)
    }

    pub async fn delete_template(&self, tenant_id: Uuid, template_id: Uuid) -> Result<(), AppError> {
        self.store.delete_template(tenant_id, template_id).await
    }

    /// Instancia um modelo salvo sob `parent_id`. Retorna o id da nova raiz.
    pub async fn apply_template(
        &self,
        tenant_id: Uuid,
        template_id: Uuid,
        parent_id: Option<Uuid>,
        root_code: &str,
        root_name: &str,
    ) -> Result<Uuid, AppError> {
        let template = self
            .store
            .list_templates(tenant_id)
            .await?
            .into_iter()
            .find(|t| t.id == template_id)
            .ok_or(AppError::TemplateNotFound(template_id))?;

        self.edit(tenant_id, |editor| {
            editor.apply_template(parent_id, &template.structure.0, root_code, root_name)
        })
        .await
    }
}
