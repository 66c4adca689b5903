//! Per-guild state. Each guild the bot serves gets one [`GuildData`] aggregate,
//! loaded from the API the first time the guild is touched and kept in memory
//! afterwards.

use crate::activity::{ActivityManager, Giveaway, Raffle};
use crate::api::{ApiClient, ApiError};
use crate::embeds::{EmbedManager, SavedEmbed};
use crate::forms::{Form, FormManager};
use crate::lazy::{LazyChannel, LazyRole};
use crate::reaction_roles::{ReactionRoleManager, ReactionRoleMessage};
use crate::staff::{StaffManager, StaffMember, StaffPosition};
use crate::vip::{VipManager, VipMember, VipTier};
use serde::{Deserialize, Serialize};
use serenity::all::{CreateEmbed, CreateMessage, GuildId};
use serenity::http::Http;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: GuildId,
    #[serde(default)]
    pub log_channel: Option<LazyChannel>,
    #[serde(default)]
    pub staff_role: Option<LazyRole>,
    #[serde(default)]
    pub manager_role: Option<LazyRole>,
    #[serde(default)]
    pub accent_color: Option<u32>,
}

impl GuildSettings {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            log_channel: None,
            staff_role: None,
            manager_role: None,
            accent_color: None,
        }
    }

    pub fn path(&self) -> String {
        guild_path(self.guild_id)
    }
}

pub fn guild_path(guild_id: GuildId) -> String {
    format!("guilds/{}", guild_id)
}

/// Wire shape of `GET guilds/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub settings: GuildSettings,
    #[serde(default)]
    pub giveaways: Vec<Giveaway>,
    #[serde(default)]
    pub raffles: Vec<Raffle>,
    #[serde(default)]
    pub staff_positions: Vec<StaffPosition>,
    #[serde(default)]
    pub staff_members: Vec<StaffMember>,
    #[serde(default)]
    pub vip_tiers: Vec<VipTier>,
    #[serde(default)]
    pub vip_members: Vec<VipMember>,
    #[serde(default)]
    pub forms: Vec<Form>,
    #[serde(default)]
    pub embeds: Vec<SavedEmbed>,
    #[serde(default)]
    pub reaction_roles: Vec<ReactionRoleMessage>,
}

pub struct GuildData {
    pub guild_id: GuildId,
    pub settings: GuildSettings,
    pub giveaways: ActivityManager<Giveaway>,
    pub raffles: ActivityManager<Raffle>,
    pub staff: StaffManager,
    pub vip: VipManager,
    pub forms: FormManager,
    pub embeds: EmbedManager,
    pub reaction_roles: ReactionRoleManager,
}

impl GuildData {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            settings: GuildSettings::new(guild_id),
            giveaways: ActivityManager::default(),
            raffles: ActivityManager::default(),
            staff: StaffManager::default(),
            vip: VipManager::default(),
            forms: FormManager::default(),
            embeds: EmbedManager::default(),
            reaction_roles: ReactionRoleManager::default(),
        }
    }

    pub fn accent_color(&self, fallback: u32) -> u32 {
        self.settings.accent_color.unwrap_or(fallback)
    }
}

impl From<GuildSnapshot> for GuildData {
    fn from(snapshot: GuildSnapshot) -> Self {
        Self {
            guild_id: snapshot.settings.guild_id,
            settings: snapshot.settings,
            giveaways: ActivityManager::new(snapshot.giveaways),
            raffles: ActivityManager::new(snapshot.raffles),
            staff: StaffManager::new(snapshot.staff_positions, snapshot.staff_members),
            vip: VipManager::new(snapshot.vip_tiers, snapshot.vip_members),
            forms: FormManager::new(snapshot.forms),
            embeds: EmbedManager::new(snapshot.embeds),
            reaction_roles: ReactionRoleManager::new(snapshot.reaction_roles),
        }
    }
}

pub type GuildHandle = Arc<Mutex<GuildData>>;

/// Lazily-populated map of every guild the bot has touched since startup.
pub struct GuildRegistry {
    api: Arc<ApiClient>,
    guilds: RwLock<HashMap<GuildId, GuildHandle>>,
}

impl GuildRegistry {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            guilds: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, guild_id: GuildId) -> Result<GuildHandle, ApiError> {
        if let Some(guild) = self.guilds.read().await.get(&guild_id) {
            return Ok(guild.clone());
        }

        let data = self.load(guild_id).await?;
        let mut guilds = self.guilds.write().await;
        // Another task may have finished loading while we were waiting on the API.
        Ok(guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(data)))
            .clone())
    }

    async fn load(&self, guild_id: GuildId) -> Result<GuildData, ApiError> {
        match self.api.get::<GuildSnapshot>(&guild_path(guild_id)).await {
            Ok(snapshot) => {
                debug!(
                    "Guild registry: loaded guild {} ({} giveaways, {} raffles)",
                    guild_id,
                    snapshot.giveaways.len(),
                    snapshot.raffles.len()
                );
                Ok(GuildData::from(snapshot))
            }
            Err(e) if e.is_not_found() => {
                info!("Guild registry: registering new guild {}", guild_id);
                let settings = GuildSettings::new(guild_id);
                self.api.put(&settings.path(), &settings).await?;
                Ok(GuildData::new(guild_id))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn loaded(&self) -> Vec<(GuildId, GuildHandle)> {
        self.guilds
            .read()
            .await
            .iter()
            .map(|(id, guild)| (*id, guild.clone()))
            .collect()
    }

    pub async fn evict(&self, guild_id: GuildId) -> bool {
        let removed = self.guilds.write().await.remove(&guild_id).is_some();
        if removed {
            info!("Guild registry: dropped guild {}", guild_id);
        }
        removed
    }
}

/// Best-effort post to the guild's log channel.
pub async fn log_event(http: &Http, settings: &GuildSettings, embed: CreateEmbed) {
    let Some(channel) = settings.log_channel else {
        return;
    };
    if let Err(e) = channel
        .id()
        .send_message(http, CreateMessage::new().embed(embed))
        .await
    {
        warn!(
            "Failed to write to log channel {} in guild {}: {}",
            channel.id(),
            settings.guild_id,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_snapshot_defaults_to_empty_collections() {
        let snapshot: GuildSnapshot =
            serde_json::from_str(r#"{"settings":{"guild_id":"55"}}"#).unwrap();
        let guild = GuildData::from(snapshot);

        assert_eq!(guild.guild_id, GuildId::new(55));
        assert!(guild.giveaways.is_empty());
        assert!(guild.staff.members().is_empty());
        assert_eq!(guild.accent_color(0x123456), 0x123456);
    }

    #[test]
    fn settings_path() {
        assert_eq!(GuildSettings::new(GuildId::new(9)).path(), "guilds/9");
    }
}
