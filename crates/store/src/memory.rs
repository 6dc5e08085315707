//! In-process stores backed by `RwLock<HashMap>`.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::backend::{ImageStore, UserStore};
use crate::error::StoreError;
use crate::types::{NewImage, NewUser, StoredImage, User};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::backend("poisoned lock")
}

/// Images keyed by id. Insertion order breaks ties between equal
/// timestamps so listings stay stable.
#[derive(Default)]
pub struct InMemoryImageStore {
    records: RwLock<HashMap<String, (u64, StoredImage)>>,
    sequence: AtomicU64,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn create(&self, image: NewImage) -> Result<StoredImage, StoreError> {
        let now = Utc::now();
        let record = StoredImage {
            id: Uuid::new_v4().to_string(),
            user: image.user,
            image: image.image,
            format: image.format,
            size: image.size,
            original_name: image.original_name,
            created_at: now,
            updated_at: now,
        };
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.records
            .write()
            .map_err(poisoned)?
            .insert(record.id.clone(), (seq, record.clone()));
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredImage>, StoreError> {
        let guard = self.records.read().map_err(poisoned)?;
        Ok(guard.get(id).map(|(_, image)| image.clone()))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().map_err(poisoned)?.remove(id).is_some())
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        limit: u64,
        skip: u64,
    ) -> Result<Vec<StoredImage>, StoreError> {
        let guard = self.records.read().map_err(poisoned)?;
        let mut owned: Vec<&(u64, StoredImage)> = guard
            .values()
            .filter(|(_, image)| image.user == owner)
            .collect();
        owned.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(owned
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .map(|(_, image)| image.clone())
            .collect())
    }

    async fn count_by_owner(&self, owner: &str) -> Result<u64, StoreError> {
        let guard = self.records.read().map_err(poisoned)?;
        Ok(guard.values().filter(|(_, image)| image.user == owner).count() as u64)
    }
}

/// Users keyed by id, with usernames kept unique.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        // One write lock covers the uniqueness check and the insert.
        let mut guard = self.users.write().map_err(poisoned)?;
        if guard.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("username".to_string()));
        }
        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4().to_string(),
            username: user.username,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let guard = self.users.read().map_err(poisoned)?;
        Ok(guard.values().find(|u| u.username == username).cloned())
    }
}
