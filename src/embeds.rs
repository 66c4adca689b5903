//! Reusable announcement embeds that staff compose once and post anywhere.
//! Posted copies are remembered so edits can be pushed to all of them.

use crate::api::{assigned_key, KeyKind, Resource};
use crate::config::DISCORD_EMBED_LIMIT;
use crate::lazy::LazyMessage;
use serde::{Deserialize, Serialize};
use serenity::all::{CreateEmbed, CreateEmbedFooter, GuildId, MessageId};
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_NAME: usize = 100;
const MAX_TITLE: usize = 256;
const MAX_FIELDS: usize = 25;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;
const MAX_FOOTER: usize = 2048;
const MAX_TOTAL: usize = 6000;

/// Passing this as a value clears the attribute.
pub const CLEAR: &str = "-";

#[derive(Debug, Error, PartialEq)]
pub enum EmbedError {
    #[error("No saved embed named '{0}'.")]
    NotFound(String),
    #[error("An embed named '{0}' already exists.")]
    DuplicateName(String),
    #[error("Embed names must be 1 to 100 characters.")]
    InvalidName,
    #[error("'{0}' is not a colour. Use a hex value like #5865F2.")]
    InvalidColor(String),
    #[error("'{0}' is not an http(s) link.")]
    InvalidUrl(String),
    #[error("Titles can be at most 256 characters.")]
    TitleTooLong,
    #[error("Descriptions can be at most 4096 characters.")]
    DescriptionTooLong,
    #[error("Footers can be at most 2048 characters.")]
    FooterTooLong,
    #[error("An embed can have at most 25 fields.")]
    TooManyFields,
    #[error("Field names must be 1 to 256 characters.")]
    InvalidFieldName,
    #[error("Field values must be 1 to 1024 characters.")]
    InvalidFieldValue,
    #[error("There is no field #{0}.")]
    FieldNotFound(usize),
    #[error("The embed would be {0} characters long; Discord allows 6000.")]
    TooLong(usize),
    #[error("An embed needs a title, description, image or at least one field.")]
    Empty,
}

/// Parses `#rrggbb`, `0xrrggbb` or `rrggbb`.
pub fn parse_color(input: &str) -> Result<u32, EmbedError> {
    let trimmed = input.trim();
    let hex = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EmbedError::InvalidColor(input.to_string()));
    }
    u32::from_str_radix(hex, 16).map_err(|_| EmbedError::InvalidColor(input.to_string()))
}

fn parse_url(input: &str) -> Result<String, EmbedError> {
    let url = input.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(url.to_string())
    } else {
        Err(EmbedError::InvalidUrl(input.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: &str, value: &str, inline: bool) -> Result<Self, EmbedError> {
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || name.chars().count() > MAX_FIELD_NAME {
            return Err(EmbedError::InvalidFieldName);
        }
        if value.is_empty() || value.chars().count() > MAX_FIELD_VALUE {
            return Err(EmbedError::InvalidFieldValue);
        }
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
            inline,
        })
    }
}

/// Changes requested by `/embed edit`. `None` leaves an attribute alone and
/// [`CLEAR`] removes it.
#[derive(Debug, Clone, Default)]
pub struct EmbedPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub footer: Option<String>,
}

impl EmbedPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.color.is_none()
            && self.url.is_none()
            && self.thumbnail.is_none()
            && self.image.is_none()
            && self.footer.is_none()
    }
}

fn patch_text(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        let value = value.trim();
        *target = (value != CLEAR && !value.is_empty()).then(|| value.replace("\\n", "\n"));
    }
}

fn patch_with<T>(
    target: &mut Option<T>,
    value: Option<String>,
    parse: impl Fn(&str) -> Result<T, EmbedError>,
) -> Result<(), EmbedError> {
    if let Some(value) = value {
        *target = if value.trim() == CLEAR {
            None
        } else {
            Some(parse(&value)?)
        };
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEmbed {
    #[serde(default)]
    pub id: u64,
    pub guild_id: GuildId,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    #[serde(default)]
    pub posts: Vec<LazyMessage>,
}

impl SavedEmbed {
    pub fn new(guild_id: GuildId, name: &str) -> Self {
        Self {
            id: 0,
            guild_id,
            name: name.trim().to_string(),
            title: None,
            description: None,
            color: None,
            url: None,
            thumbnail: None,
            image: None,
            footer: None,
            fields: Vec::new(),
            posts: Vec::new(),
        }
    }

    pub fn total_len(&self) -> usize {
        let text = |s: &Option<String>| s.as_deref().map_or(0, |s| s.chars().count());
        text(&self.title)
            + text(&self.description)
            + text(&self.footer)
            + self
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }

    /// Checks the embed against Discord's limits.
    pub fn validate(&self) -> Result<(), EmbedError> {
        let chars = |s: &Option<String>| s.as_deref().map_or(0, |s| s.chars().count());
        if chars(&self.title) > MAX_TITLE {
            return Err(EmbedError::TitleTooLong);
        }
        if chars(&self.description) > DISCORD_EMBED_LIMIT {
            return Err(EmbedError::DescriptionTooLong);
        }
        if chars(&self.footer) > MAX_FOOTER {
            return Err(EmbedError::FooterTooLong);
        }
        if self.fields.len() > MAX_FIELDS {
            return Err(EmbedError::TooManyFields);
        }
        let total = self.total_len();
        if total > MAX_TOTAL {
            return Err(EmbedError::TooLong(total));
        }
        if self.title.is_none()
            && self.description.is_none()
            && self.image.is_none()
            && self.fields.is_empty()
        {
            return Err(EmbedError::Empty);
        }
        Ok(())
    }

    /// Applies the patch only if the result is still a valid embed.
    pub fn apply(&mut self, patch: EmbedPatch) -> Result<(), EmbedError> {
        let mut next = self.clone();
        patch_text(&mut next.title, patch.title);
        patch_text(&mut next.description, patch.description);
        patch_text(&mut next.footer, patch.footer);
        patch_with(&mut next.color, patch.color, parse_color)?;
        patch_with(&mut next.url, patch.url, parse_url)?;
        patch_with(&mut next.thumbnail, patch.thumbnail, parse_url)?;
        patch_with(&mut next.image, patch.image, parse_url)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn add_field(&mut self, field: EmbedField) -> Result<usize, EmbedError> {
        if self.fields.len() >= MAX_FIELDS {
            return Err(EmbedError::TooManyFields);
        }
        self.fields.push(field);
        let total = self.total_len();
        if total > MAX_TOTAL {
            self.fields.pop();
            return Err(EmbedError::TooLong(total));
        }
        Ok(self.fields.len())
    }

    /// `number` is one-based.
    pub fn remove_field(&mut self, number: usize) -> Result<EmbedField, EmbedError> {
        if number == 0 || number > self.fields.len() {
            return Err(EmbedError::FieldNotFound(number));
        }
        let removed = self.fields.remove(number - 1);
        if let Err(e) = self.validate() {
            self.fields.insert(number - 1, removed);
            return Err(e);
        }
        Ok(removed)
    }

    pub fn to_create_embed(&self, fallback_color: u32) -> CreateEmbed {
        let mut embed = CreateEmbed::new().color(self.color.unwrap_or(fallback_color));
        if let Some(title) = &self.title {
            embed = embed.title(title);
        }
        if let Some(description) = &self.description {
            embed = embed.description(description);
        }
        if let Some(url) = &self.url {
            embed = embed.url(url);
        }
        if let Some(thumbnail) = &self.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }
        if let Some(image) = &self.image {
            embed = embed.image(image);
        }
        if let Some(footer) = &self.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }
        embed.fields(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.value.clone(), f.inline)),
        )
    }

    pub fn record_post(&mut self, message: LazyMessage) {
        if !self.posts.contains(&message) {
            self.posts.push(message);
        }
    }

    /// Forgets posted copies that no longer exist. Returns how many were dropped.
    pub fn prune(&mut self, missing: &[MessageId]) -> usize {
        let before = self.posts.len();
        self.posts.retain(|m| !missing.contains(&m.message_id));
        before - self.posts.len()
    }
}

impl Resource for SavedEmbed {
    const COLLECTION: &'static str = "embeds";
    const KEY_KIND: KeyKind = KeyKind::Assigned;

    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn key(&self) -> Option<String> {
        assigned_key(self.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmbedManager {
    embeds: BTreeMap<u64, SavedEmbed>,
}

impl EmbedManager {
    pub fn new(embeds: Vec<SavedEmbed>) -> Self {
        Self {
            embeds: embeds.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn validate_new(&self, name: &str) -> Result<(), EmbedError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME {
            return Err(EmbedError::InvalidName);
        }
        if self.get_by_name(name).is_ok() {
            return Err(EmbedError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    pub fn insert(&mut self, embed: SavedEmbed) {
        self.embeds.insert(embed.id, embed);
    }

    pub fn get_by_name(&self, name: &str) -> Result<&SavedEmbed, EmbedError> {
        let name = name.trim();
        self.embeds
            .values()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EmbedError::NotFound(name.to_string()))
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Result<&mut SavedEmbed, EmbedError> {
        let name = name.trim();
        self.embeds
            .values_mut()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EmbedError::NotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut SavedEmbed> {
        self.embeds.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<SavedEmbed> {
        self.embeds.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedEmbed> {
        self.embeds.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::ChannelId;

    fn titled(name: &str) -> SavedEmbed {
        let mut embed = SavedEmbed::new(GuildId::new(1), name);
        embed
            .apply(EmbedPatch {
                title: Some("Opening night".into()),
                ..Default::default()
            })
            .unwrap();
        embed
    }

    #[test]
    fn colors_in_common_notations() {
        assert_eq!(parse_color("#5865F2"), Ok(0x5865F2));
        assert_eq!(parse_color("0xff0000"), Ok(0xFF0000));
        assert_eq!(parse_color(" 00ff00 "), Ok(0x00FF00));
        assert!(parse_color("red").is_err());
        assert!(parse_color("#fff").is_err());
        assert!(parse_color("#1234567").is_err());
    }

    #[test]
    fn empty_embed_is_invalid() {
        let embed = SavedEmbed::new(GuildId::new(1), "blank");
        assert_eq!(embed.validate(), Err(EmbedError::Empty));
    }

    #[test]
    fn patch_is_atomic() {
        let mut embed = titled("welcome");
        let err = embed
            .apply(EmbedPatch {
                description: Some("Doors at 9".into()),
                color: Some("not-a-colour".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidColor(_)));
        assert!(embed.description.is_none());

        embed
            .apply(EmbedPatch {
                description: Some("Doors at 9\\nDress code: formal".into()),
                color: Some("#abcdef".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            embed.description.as_deref(),
            Some("Doors at 9\nDress code: formal")
        );
        assert_eq!(embed.color, Some(0xABCDEF));
    }

    #[test]
    fn clear_marker_removes_attribute() {
        let mut embed = titled("welcome");
        embed
            .apply(EmbedPatch {
                description: Some("Body".into()),
                ..Default::default()
            })
            .unwrap();
        embed
            .apply(EmbedPatch {
                title: Some(CLEAR.into()),
                ..Default::default()
            })
            .unwrap();
        assert!(embed.title.is_none());

        // Clearing the last content is refused.
        assert_eq!(
            embed.apply(EmbedPatch {
                description: Some(CLEAR.into()),
                ..Default::default()
            }),
            Err(EmbedError::Empty)
        );
    }

    #[test]
    fn field_limits() {
        let mut embed = titled("rules");
        for i in 0..MAX_FIELDS {
            embed
                .add_field(EmbedField::new(&format!("Rule {i}"), "Be nice", false).unwrap())
                .unwrap();
        }
        assert_eq!(
            embed.add_field(EmbedField::new("Extra", "x", false).unwrap()),
            Err(EmbedError::TooManyFields)
        );
        assert_eq!(
            EmbedField::new("Name", &"x".repeat(1025), false),
            Err(EmbedError::InvalidFieldValue)
        );
        assert_eq!(embed.remove_field(26), Err(EmbedError::FieldNotFound(26)));
        assert_eq!(embed.remove_field(1).unwrap().name, "Rule 0");
    }

    #[test]
    fn total_length_is_capped() {
        let mut embed = titled("long");
        for _ in 0..5 {
            embed
                .add_field(EmbedField::new("Section", &"y".repeat(1000), false).unwrap())
                .unwrap();
        }
        let err = embed
            .add_field(EmbedField::new("Section", &"y".repeat(1000), false).unwrap())
            .unwrap_err();
        assert!(matches!(err, EmbedError::TooLong(_)));
        assert_eq!(embed.fields.len(), 5);
    }

    #[test]
    fn removing_the_only_content_is_refused() {
        let mut embed = SavedEmbed::new(GuildId::new(1), "fields-only");
        embed
            .add_field(EmbedField::new("Only", "field", true).unwrap())
            .unwrap();
        assert_eq!(embed.remove_field(1), Err(EmbedError::Empty));
        assert_eq!(embed.fields.len(), 1);
    }

    #[test]
    fn posts_are_tracked_and_pruned() {
        let mut embed = titled("menu");
        let first = LazyMessage::new(ChannelId::new(5), MessageId::new(50));
        let second = LazyMessage::new(ChannelId::new(5), MessageId::new(51));
        embed.record_post(first);
        embed.record_post(first);
        embed.record_post(second);
        assert_eq!(embed.posts.len(), 2);

        assert_eq!(embed.prune(&[MessageId::new(50)]), 1);
        assert_eq!(embed.posts, vec![second]);
    }

    #[test]
    fn renders_to_discord_embed() {
        let mut embed = titled("menu");
        embed
            .add_field(EmbedField::new("Drinks", "Ale", true).unwrap())
            .unwrap();
        let value = serde_json::to_value(embed.to_create_embed(0x123456)).unwrap();
        assert_eq!(value["title"], "Opening night");
        assert_eq!(value["color"], 0x123456);
        assert_eq!(value["fields"][0]["inline"], true);
    }

    #[test]
    fn manager_names_are_unique() {
        let mut manager = EmbedManager::default();
        let mut embed = titled("Welcome");
        embed.id = 1;
        manager.insert(embed);
        assert_eq!(
            manager.validate_new("welcome"),
            Err(EmbedError::DuplicateName("welcome".into()))
        );
        assert!(manager.get_by_name("WELCOME").is_ok());
    }
}
