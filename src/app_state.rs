use std::sync::Arc;

use crate::config::{Config, ConfigError, StoreBackend};
use crate::store::{MemoryStore, MongoStore, ProjectStore, StoreError, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<dyn ProjectStore>,
    pub users: Arc<dyn UserStore>,
    pub config: Config,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppState {
    /// Opens the store selected by `config.store_backend`.
    pub async fn connect(config: Config) -> Result<Self, StartupError> {
        match config.store_backend {
            StoreBackend::Memory => Ok(Self::in_memory(config)),
            StoreBackend::Mongo => {
                let uri = config
                    .mongo_uri
                    .as_deref()
                    .ok_or(ConfigError::Missing("MONGO_URI"))?;
                let store = Arc::new(MongoStore::init(uri, &config.database_name).await?);
                Ok(Self {
                    projects: store.clone(),
                    users: store,
                    config,
                })
            }
        }
    }

    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            projects: store.clone(),
            users: store,
            config,
        }
    }
}
