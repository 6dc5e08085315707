use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::memory::{InMemoryImageStore, InMemoryUserStore};
use crate::types::{NewImage, NewUser, StoredImage, User};

/// Persistence for uploaded images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Insert a new record, assigning its id and timestamps.
    async fn create(&self, image: NewImage) -> Result<StoredImage, StoreError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<StoredImage>, StoreError>;
    /// Returns whether a record was removed.
    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError>;
    /// One page of `owner`'s images, newest first.
    async fn list_by_owner(
        &self,
        owner: &str,
        limit: u64,
        skip: u64,
    ) -> Result<Vec<StoredImage>, StoreError>;
    async fn count_by_owner(&self, owner: &str) -> Result<u64, StoreError>;
    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Persistence for accounts. Usernames are unique.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the username is taken.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

/// Both stores, built from one [`StoreConfig`].
#[derive(Clone)]
pub struct Stores {
    pub images: Arc<dyn ImageStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            images: Arc::new(InMemoryImageStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
        }
    }
}

/// Configuration for selecting and building a backend.
///
/// ```
/// use store::StoreConfig;
///
/// // In-memory (tests, local development)
/// let config = StoreConfig::in_memory();
///
/// // MongoDB (requires the `backend-mongo` feature)
/// let config = StoreConfig::mongo("mongodb://localhost:27017", "imgshift");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    InMemory,
    Mongo {
        uri: String,
        #[serde(default = "default_database")]
        database: String,
    },
}

fn default_database() -> String {
    "imgshift".to_string()
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        StoreConfig::InMemory
    }

    pub fn mongo<U: Into<String>, D: Into<String>>(uri: U, database: D) -> Self {
        StoreConfig::Mongo {
            uri: uri.into(),
            database: database.into(),
        }
    }

    /// Build the stores for this configuration.
    ///
    /// Each backend is only available if its feature flag is enabled at
    /// compile time.
    pub async fn build(&self) -> Result<Stores, StoreError> {
        match self {
            StoreConfig::InMemory => Ok(Stores::in_memory()),
            StoreConfig::Mongo { uri, database } => {
                #[cfg(feature = "backend-mongo")]
                {
                    crate::mongo::connect(uri, database).await
                }
                #[cfg(not(feature = "backend-mongo"))]
                {
                    let _ = (uri, database);
                    Err(StoreError::Config(
                        "mongo backend disabled at compile time".to_string(),
                    ))
                }
            }
        }
    }
}
