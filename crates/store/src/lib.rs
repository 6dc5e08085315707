//! Owner-scoped image and user storage.
//!
//! Two async traits, [`ImageStore`] and [`UserStore`], abstract over the
//! persistence layer. [`StoreConfig::build`] picks the implementation:
//!
//! - `InMemory` - `RwLock<HashMap>` stores for tests and local runs
//! - `Mongo` - MongoDB collections (feature `backend-mongo`)

mod backend;
mod error;
mod memory;
#[cfg(feature = "backend-mongo")]
mod mongo;
mod types;

pub use crate::backend::{ImageStore, StoreConfig, Stores, UserStore};
pub use crate::error::StoreError;
pub use crate::memory::{InMemoryImageStore, InMemoryUserStore};
#[cfg(feature = "backend-mongo")]
pub use crate::mongo::{MongoImageStore, MongoUserStore};
pub use crate::types::{NewImage, NewUser, StoredImage, User};
