//! Self-assignable roles driven by reactions on a chosen message.

use crate::api::{KeyKind, Resource};
use crate::lazy::{LazyMessage, LazyRole};
use serde::{Deserialize, Serialize};
use serenity::all::{EmojiId, GuildId, MessageId, ReactionType, RoleId};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Discord caps distinct reactions per message at 20.
pub const MAX_BINDINGS: usize = 20;
const VARIATION_SELECTOR: char = '\u{FE0F}';

#[derive(Debug, Error, PartialEq)]
pub enum ReactionRoleError {
    #[error("'{0}' is not an emoji I can use.")]
    InvalidEmoji(String),
    #[error("{0} is already bound on that message.")]
    DuplicateEmoji(String),
    #[error("{0} is not bound on that message.")]
    NotBound(String),
    #[error("That message has no reaction roles.")]
    MessageNotFound(MessageId),
    #[error("A message can carry at most 20 reaction roles.")]
    TooManyBindings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmojiKey {
    Unicode(String),
    Custom {
        id: EmojiId,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        animated: bool,
    },
}

impl EmojiKey {
    /// Accepts `<:name:id>`, `<a:name:id>` or a unicode emoji.
    pub fn parse(input: &str) -> Result<Self, ReactionRoleError> {
        let invalid = || ReactionRoleError::InvalidEmoji(input.to_string());
        let trimmed = input.trim();

        if let Some(inner) = trimmed.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            let parts: Vec<&str> = inner.split(':').collect();
            let [flag, name, id] = parts.as_slice() else {
                return Err(invalid());
            };
            let animated = match *flag {
                "" => false,
                "a" => true,
                _ => return Err(invalid()),
            };
            let id: u64 = id.parse().map_err(|_| invalid())?;
            if id == 0 || name.is_empty() {
                return Err(invalid());
            }
            return Ok(EmojiKey::Custom {
                id: EmojiId::new(id),
                name: Some(name.to_string()),
                animated,
            });
        }

        // Plain words are almost certainly a typo rather than an emoji.
        if trimmed.is_empty()
            || trimmed.is_ascii()
            || trimmed.chars().any(char::is_whitespace)
            || trimmed.chars().count() > 16
        {
            return Err(invalid());
        }
        Ok(EmojiKey::Unicode(trimmed.to_string()))
    }

    pub fn from_reaction(reaction: &ReactionType) -> Option<Self> {
        match reaction {
            ReactionType::Unicode(s) => Some(EmojiKey::Unicode(s.clone())),
            ReactionType::Custom { animated, id, name } => Some(EmojiKey::Custom {
                id: *id,
                name: name.clone(),
                animated: *animated,
            }),
            _ => None,
        }
    }

    pub fn to_reaction_type(&self) -> ReactionType {
        match self {
            EmojiKey::Unicode(s) => ReactionType::Unicode(s.clone()),
            EmojiKey::Custom { id, name, animated } => ReactionType::Custom {
                animated: *animated,
                id: *id,
                name: name.clone(),
            },
        }
    }
}

impl PartialEq for EmojiKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Custom emoji can be renamed; only the id is stable.
            (EmojiKey::Custom { id: a, .. }, EmojiKey::Custom { id: b, .. }) => a == b,
            (EmojiKey::Unicode(a), EmojiKey::Unicode(b)) => {
                a.chars().filter(|c| *c != VARIATION_SELECTOR).eq(b
                    .chars()
                    .filter(|c| *c != VARIATION_SELECTOR))
            }
            _ => false,
        }
    }
}

impl Eq for EmojiKey {}

impl fmt::Display for EmojiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmojiKey::Unicode(s) => f.write_str(s),
            EmojiKey::Custom { id, name, animated } => write!(
                f,
                "<{}:{}:{}>",
                if *animated { "a" } else { "" },
                name.as_deref().unwrap_or("emoji"),
                id
            ),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, poise::ChoiceParameter,
)]
#[serde(rename_all = "lowercase")]
pub enum ReactionRoleMode {
    /// React to get the role, unreact to lose it.
    #[default]
    #[name = "Normal"]
    Normal,
    /// Only one of the message's roles at a time.
    #[name = "Unique"]
    Unique,
    /// Reacting grants the role permanently.
    #[name = "Verify"]
    Verify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionBinding {
    pub emoji: EmojiKey,
    pub role: LazyRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRoleMessage {
    pub guild_id: GuildId,
    pub message: LazyMessage,
    #[serde(default)]
    pub mode: ReactionRoleMode,
    #[serde(default)]
    pub bindings: Vec<ReactionBinding>,
}

impl ReactionRoleMessage {
    pub fn role_for(&self, emoji: &EmojiKey) -> Option<LazyRole> {
        self.bindings
            .iter()
            .find(|b| &b.emoji == emoji)
            .map(|b| b.role)
    }
}

impl Resource for ReactionRoleMessage {
    const COLLECTION: &'static str = "reaction-roles";
    const KEY_KIND: KeyKind = KeyKind::Known;

    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn key(&self) -> Option<String> {
        Some(self.message.id().to_string())
    }
}

/// Role edits a reaction event calls for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleChanges {
    pub add: Vec<LazyRole>,
    pub remove: Vec<LazyRole>,
}

impl RoleChanges {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Unbound {
    /// Other bindings remain on the message.
    Updated(ReactionRoleMessage),
    /// That was the last binding; the message is no longer tracked.
    Emptied(ReactionRoleMessage),
}

#[derive(Debug, Clone, Default)]
pub struct ReactionRoleManager {
    messages: BTreeMap<MessageId, ReactionRoleMessage>,
}

impl ReactionRoleManager {
    pub fn new(messages: Vec<ReactionRoleMessage>) -> Self {
        Self {
            messages: messages
                .into_iter()
                .map(|m| (m.message.id(), m))
                .collect(),
        }
    }

    pub fn bind(
        &mut self,
        guild_id: GuildId,
        message: LazyMessage,
        emoji: EmojiKey,
        role: LazyRole,
    ) -> Result<&ReactionRoleMessage, ReactionRoleError> {
        let entry = self
            .messages
            .entry(message.id())
            .or_insert_with(|| ReactionRoleMessage {
                guild_id,
                message,
                mode: ReactionRoleMode::default(),
                bindings: Vec::new(),
            });
        if entry.role_for(&emoji).is_some() {
            return Err(ReactionRoleError::DuplicateEmoji(emoji.to_string()));
        }
        if entry.bindings.len() >= MAX_BINDINGS {
            return Err(ReactionRoleError::TooManyBindings);
        }
        entry.bindings.push(ReactionBinding { emoji, role });
        Ok(entry)
    }

    pub fn unbind(
        &mut self,
        message_id: MessageId,
        emoji: &EmojiKey,
    ) -> Result<Unbound, ReactionRoleError> {
        let message = self
            .messages
            .get_mut(&message_id)
            .ok_or(ReactionRoleError::MessageNotFound(message_id))?;
        let before = message.bindings.len();
        message.bindings.retain(|b| &b.emoji != emoji);
        if message.bindings.len() == before {
            return Err(ReactionRoleError::NotBound(emoji.to_string()));
        }
        if message.bindings.is_empty() {
            let removed = self
                .messages
                .remove(&message_id)
                .ok_or(ReactionRoleError::MessageNotFound(message_id))?;
            return Ok(Unbound::Emptied(removed));
        }
        Ok(Unbound::Updated(message.clone()))
    }

    pub fn set_mode(
        &mut self,
        message_id: MessageId,
        mode: ReactionRoleMode,
    ) -> Result<&ReactionRoleMessage, ReactionRoleError> {
        let message = self
            .messages
            .get_mut(&message_id)
            .ok_or(ReactionRoleError::MessageNotFound(message_id))?;
        message.mode = mode;
        Ok(message)
    }

    /// Stores a record as-is, replacing whatever was tracked for its message.
    pub fn put(&mut self, message: ReactionRoleMessage) {
        self.messages.insert(message.message.id(), message);
    }

    pub fn find(&self, message_id: MessageId) -> Option<&ReactionRoleMessage> {
        self.messages.get(&message_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReactionRoleMessage> {
        self.messages.values()
    }

    pub fn on_add(
        &self,
        message_id: MessageId,
        emoji: &EmojiKey,
        member_roles: &[RoleId],
    ) -> RoleChanges {
        let mut changes = RoleChanges::default();
        let Some(message) = self.find(message_id) else {
            return changes;
        };
        let Some(role) = message.role_for(emoji) else {
            return changes;
        };
        if !member_roles.contains(&role.id()) {
            changes.add.push(role);
        }
        if message.mode == ReactionRoleMode::Unique {
            changes.remove = message
                .bindings
                .iter()
                .map(|b| b.role)
                .filter(|r| r.id() != role.id() && member_roles.contains(&r.id()))
                .collect();
        }
        changes
    }

    pub fn on_remove(
        &self,
        message_id: MessageId,
        emoji: &EmojiKey,
        member_roles: &[RoleId],
    ) -> RoleChanges {
        let mut changes = RoleChanges::default();
        let Some(message) = self.find(message_id) else {
            return changes;
        };
        if message.mode == ReactionRoleMode::Verify {
            return changes;
        }
        if let Some(role) = message.role_for(emoji) {
            if member_roles.contains(&role.id()) {
                changes.remove.push(role);
            }
        }
        changes
    }
}
