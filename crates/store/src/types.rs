//! Records persisted by the stores.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded image owned by one user.
///
/// `image` holds the raw file bytes; JSON renders them as standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: String,
    /// Owner id.
    pub user: String,
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,
    /// Declared content type of the upload.
    pub format: String,
    pub size: u64,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredImage {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user == user_id
    }
}

/// Input for [`ImageStore::create`](crate::ImageStore::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub user: String,
    pub image: Vec<u8>,
    pub format: String,
    pub size: u64,
    pub original_name: String,
}

/// A registered account. The password hash never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`UserStore::create`](crate::UserStore::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_bytes_render_as_base64() {
        let now = Utc::now();
        let image = StoredImage {
            id: "img".into(),
            user: "u1".into(),
            image: b"hello".to_vec(),
            format: "image/png".into(),
            size: 5,
            original_name: "a.png".into(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["image"], "aGVsbG8=");

        let back: StoredImage = serde_json::from_value(json).unwrap();
        assert_eq!(back, image);
        assert!(back.is_owned_by("u1"));
        assert!(!back.is_owned_by("u2"));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: "u1".into(),
            username: "alice".into(),
            password_hash: "$argon2id$secret".into(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }
}
