//! MongoDB backend.
//!
//! Images and users live in the `images` and `users` collections of the
//! configured database. Ids are UUID strings stored as `_id`; image bytes
//! are stored as generic BSON binary.
//!
//! # Configuration Example
//! ```toml
//! [storage]
//! backend = "mongo"
//! uri = "mongodb://localhost:27017"
//! database = "imgshift"
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{self, doc, Binary};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{ImageStore, Stores, UserStore};
use crate::error::StoreError;
use crate::types::{NewImage, NewUser, StoredImage, User};

const IMAGES: &str = "images";
const USERS: &str = "users";
const DUPLICATE_KEY: i32 = 11000;

fn backend_err(err: MongoError) -> StoreError {
    StoreError::backend(err.to_string())
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn to_bson_time(t: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(t.timestamp_millis())
}

fn from_bson_time(t: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or_default()
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageDoc {
    #[serde(rename = "_id")]
    id: String,
    user: String,
    image: Binary,
    format: String,
    size: i64,
    original_name: String,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl From<ImageDoc> for StoredImage {
    fn from(doc: ImageDoc) -> Self {
        StoredImage {
            id: doc.id,
            user: doc.user,
            image: doc.image.bytes,
            format: doc.format,
            size: doc.size.max(0) as u64,
            original_name: doc.original_name,
            created_at: from_bson_time(doc.created_at),
            updated_at: from_bson_time(doc.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UserDoc {
    #[serde(rename = "_id")]
    id: String,
    username: String,
    password_hash: String,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl From<UserDoc> for User {
    fn from(doc: UserDoc) -> Self {
        User {
            id: doc.id,
            username: doc.username,
            password_hash: doc.password_hash,
            created_at: from_bson_time(doc.created_at),
            updated_at: from_bson_time(doc.updated_at),
        }
    }
}

/// Connect, ensure indexes exist, and return both stores.
pub async fn connect(uri: &str, database: &str) -> Result<Stores, StoreError> {
    let client = Client::with_uri_str(uri).await.map_err(backend_err)?;
    let db = client.database(database);

    let images = MongoImageStore::new(&db);
    let users = MongoUserStore::new(&db);
    images.ensure_indexes().await?;
    users.ensure_indexes().await?;
    tracing::info!(database, "connected to mongodb");

    Ok(Stores {
        images: Arc::new(images),
        users: Arc::new(users),
    })
}

pub struct MongoImageStore {
    db: Database,
    images: Collection<ImageDoc>,
}

impl MongoImageStore {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            images: db.collection(IMAGES),
        }
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let by_owner = IndexModel::builder()
            .keys(doc! { "user": 1, "created_at": -1 })
            .build();
        self.images
            .create_index(by_owner, None)
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}

#[async_trait]
impl ImageStore for MongoImageStore {
    async fn create(&self, image: NewImage) -> Result<StoredImage, StoreError> {
        let now = to_bson_time(Utc::now());
        let doc = ImageDoc {
            id: Uuid::new_v4().to_string(),
            user: image.user,
            image: Binary {
                subtype: BinarySubtype::Generic,
                bytes: image.image,
            },
            format: image.format,
            size: image.size as i64,
            original_name: image.original_name,
            created_at: now,
            updated_at: now,
        };
        self.images
            .insert_one(&doc, None)
            .await
            .map_err(backend_err)?;
        Ok(doc.into())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredImage>, StoreError> {
        let found = self
            .images
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(backend_err)?;
        Ok(found.map(StoredImage::from))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let result = self
            .images
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(backend_err)?;
        Ok(result.deleted_count > 0)
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        limit: u64,
        skip: u64,
    ) -> Result<Vec<StoredImage>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1, "_id": -1 })
            .skip(skip)
            .limit(limit as i64)
            .build();
        let cursor = self
            .images
            .find(doc! { "user": owner }, options)
            .await
            .map_err(backend_err)?;
        let docs: Vec<ImageDoc> = cursor.try_collect().await.map_err(backend_err)?;
        Ok(docs.into_iter().map(StoredImage::from).collect())
    }

    async fn count_by_owner(&self, owner: &str) -> Result<u64, StoreError> {
        self.images
            .count_documents(doc! { "user": owner }, None)
            .await
            .map_err(backend_err)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}

pub struct MongoUserStore {
    users: Collection<UserDoc>,
}

impl MongoUserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection(USERS),
        }
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_username = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users
            .create_index(unique_username, None)
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let now = to_bson_time(Utc::now());
        let doc = UserDoc {
            id: Uuid::new_v4().to_string(),
            username: user.username,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        match self.users.insert_one(&doc, None).await {
            Ok(_) => Ok(doc.into()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict("username".to_string())),
            Err(e) => Err(backend_err(e)),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let found = self
            .users
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(backend_err)?;
        Ok(found.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let found = self
            .users
            .find_one(doc! { "username": username }, None)
            .await
            .map_err(backend_err)?;
        Ok(found.map(User::from))
    }
}
