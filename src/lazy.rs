//! Deferred-resolution handles for Discord objects.
//!
//! Domain records only ever store snowflakes. The live object is fetched when a
//! caller actually needs it, so nothing here goes stale in memory.

use serde::{Deserialize, Serialize};
use serenity::all::{
    CacheHttp, Channel, ChannelId, EditMessage, GuildId, Member, Message, MessageId, ModelError,
    Role, RoleId, User, UserId,
};
use serenity::http::{Http, HttpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LazyChannel(pub ChannelId);

impl LazyChannel {
    pub fn id(&self) -> ChannelId {
        self.0
    }

    pub fn mention(&self) -> String {
        format!("<#{}>", self.0)
    }

    pub async fn fetch(&self, cache_http: impl CacheHttp) -> serenity::Result<Channel> {
        self.0.to_channel(cache_http).await
    }
}

impl From<ChannelId> for LazyChannel {
    fn from(id: ChannelId) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LazyUser(pub UserId);

impl LazyUser {
    pub fn id(&self) -> UserId {
        self.0
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }

    pub async fn fetch(&self, cache_http: impl CacheHttp) -> serenity::Result<User> {
        self.0.to_user(cache_http).await
    }

    pub async fn member(
        &self,
        cache_http: impl CacheHttp,
        guild_id: GuildId,
    ) -> serenity::Result<Member> {
        guild_id.member(cache_http, self.0).await
    }
}

impl From<UserId> for LazyUser {
    fn from(id: UserId) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LazyRole {
    pub guild_id: GuildId,
    pub role_id: RoleId,
}

impl LazyRole {
    pub fn new(guild_id: GuildId, role_id: RoleId) -> Self {
        Self { guild_id, role_id }
    }

    pub fn id(&self) -> RoleId {
        self.role_id
    }

    pub fn mention(&self) -> String {
        format!("<@&{}>", self.role_id)
    }

    pub async fn fetch(&self, http: &Http) -> serenity::Result<Role> {
        let mut roles = self.guild_id.roles(http).await?;
        roles
            .remove(&self.role_id)
            .ok_or(serenity::Error::Model(ModelError::RoleNotFound))
    }

    pub async fn grant(&self, http: &Http, user_id: UserId, reason: &str) -> serenity::Result<()> {
        http.add_member_role(self.guild_id, user_id, self.role_id, Some(reason))
            .await
    }

    pub async fn revoke(&self, http: &Http, user_id: UserId, reason: &str) -> serenity::Result<()> {
        http.remove_member_role(self.guild_id, user_id, self.role_id, Some(reason))
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LazyMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

impl LazyMessage {
    pub fn new(channel_id: ChannelId, message_id: MessageId) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }

    pub fn id(&self) -> MessageId {
        self.message_id
    }

    pub fn channel(&self) -> LazyChannel {
        LazyChannel(self.channel_id)
    }

    pub fn jump_url(&self, guild_id: GuildId) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            guild_id, self.channel_id, self.message_id
        )
    }

    pub async fn fetch(&self, cache_http: impl CacheHttp) -> serenity::Result<Message> {
        self.channel_id.message(cache_http, self.message_id).await
    }

    pub async fn edit(
        &self,
        cache_http: impl CacheHttp,
        builder: EditMessage,
    ) -> serenity::Result<Message> {
        self.channel_id
            .edit_message(cache_http, self.message_id, builder)
            .await
    }

    pub async fn delete(&self, http: &Http) -> serenity::Result<()> {
        self.channel_id.delete_message(http, self.message_id).await
    }
}

impl From<&Message> for LazyMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.channel_id, message.id)
    }
}

/// True when Discord reports the target as gone (deleted message, channel or role).
pub fn is_not_found(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            response.status_code.as_u16() == 404
        }
        serenity::Error::Model(ModelError::RoleNotFound) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_use_discord_markup() {
        assert_eq!(LazyUser(UserId::new(42)).mention(), "<@42>");
        assert_eq!(LazyChannel(ChannelId::new(7)).mention(), "<#7>");
        assert_eq!(
            LazyRole::new(GuildId::new(1), RoleId::new(9)).mention(),
            "<@&9>"
        );
    }

    #[test]
    fn message_jump_url() {
        let message = LazyMessage::new(ChannelId::new(2), MessageId::new(3));
        assert_eq!(
            message.jump_url(GuildId::new(1)),
            "https://discord.com/channels/1/2/3"
        );
    }

    #[test]
    fn snowflakes_serialize_as_strings() {
        let user = LazyUser(UserId::new(123456789012345678));
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, "\"123456789012345678\"");

        let role: LazyRole =
            serde_json::from_str(r#"{"guild_id":"1","role_id":"2"}"#).unwrap();
        assert_eq!(role.role_id, RoleId::new(2));
    }
}
