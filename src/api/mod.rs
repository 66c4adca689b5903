//! Persistence against the remote venue API.
//!
//! Every domain record is a [`Resource`] living under `guilds/{guild_id}/...`.
//! The bot keeps no local storage; the in-memory managers are rebuilt from
//! `GET guilds/{id}` and every change is pushed straight back.

pub mod client;

pub use client::ApiClient;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serenity::all::GuildId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API rejected our credentials")]
    Unauthorized,

    #[error("API resource not found: {0}")]
    NotFound(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API returned malformed data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0} has not been created yet")]
    Unsaved(&'static str),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// How a resource gets its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// POST to the collection; the API answers with the stored record and its id.
    Assigned,
    /// The key is a Discord snowflake we already know; create is a PUT upsert.
    Known,
}

pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Collection segment below `guilds/{guild_id}/`.
    const COLLECTION: &'static str;
    const KEY_KIND: KeyKind;

    fn guild_id(&self) -> GuildId;

    /// `None` until the API has assigned one.
    fn key(&self) -> Option<String>;

    fn collection_path(&self) -> String {
        format!("guilds/{}/{}", self.guild_id(), Self::COLLECTION)
    }

    fn item_path(&self) -> Result<String, ApiError> {
        let key = self.key().ok_or(ApiError::Unsaved(Self::COLLECTION))?;
        Ok(format!("{}/{}", self.collection_path(), key))
    }
}

/// Server-assigned ids start at zero locally until the API hands one back.
pub(crate) fn assigned_key(id: u64) -> Option<String> {
    (id != 0).then(|| id.to_string())
}
