use crate::config::AppSettings;
use crate::core::ModelLifecycleService;
use crate::infrastructure::database::{Database, ModelRepository, TokenLedger, UserRepository};
use crate::infrastructure::storage::ArtifactStore;

/// État partagé de l'application, injecté dans chaque handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub store: ArtifactStore,
    pub settings: AppSettings,
}

impl AppState {
    pub fn new(db: Database, store: ArtifactStore, settings: AppSettings) -> Self {
        Self {
            db,
            store,
            settings,
        }
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.db.pool.clone())
    }

    pub fn ledger(&self) -> TokenLedger {
        TokenLedger::new(self.db.pool.clone())
    }

    pub fn models(&self) -> ModelRepository {
        ModelRepository::new(self.db.pool.clone())
    }

    pub fn lifecycle(&self) -> ModelLifecycleService {
        ModelLifecycleService::new(self.ledger(), self.models(), self.store.clone())
    }
}
