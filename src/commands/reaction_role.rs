use crate::commands::{guild, is_manager, user_error};
use crate::lazy::{LazyMessage, LazyRole};
use crate::reaction_roles::{EmojiKey, ReactionRoleMode, Unbound};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::{ChoiceParameter, CreateReply};
use tracing::{info, warn};

/// Accepts a message link, or a bare id in `channel`.
fn parse_message_ref(
    input: &str,
    channel: serenity::ChannelId,
    guild_id: serenity::GuildId,
) -> Result<LazyMessage, Error> {
    let input = input.trim();
    if let Some((link_guild, link_channel, message)) = serenity::utils::parse_message_url(input) {
        if link_guild != guild_id {
            return Err(user_error("That message is in a different server."));
        }
        return Ok(LazyMessage::new(link_channel, message));
    }
    match input.parse::<u64>() {
        Ok(id) if id != 0 => Ok(LazyMessage::new(channel, serenity::MessageId::new(id))),
        _ => Err(user_error(
            "Give me a message link (right-click → Copy Message Link) or a message id.",
        )),
    }
}

/// Let members pick roles by reacting to a message
#[poise::command(
    slash_command,
    subcommands("bind", "unbind", "mode", "list"),
    check = "is_manager",
    guild_only
)]
pub async fn reactionrole(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give a role to anyone who reacts with an emoji
#[poise::command(slash_command)]
pub async fn bind(
    ctx: Context<'_>,
    #[description = "Message link or id"] message: String,
    #[description = "Emoji to react with"] emoji: String,
    #[description = "Role to give"] role: serenity::Role,
    #[description = "Channel of the message, when giving a bare id"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    if role.managed || role.id.get() == guild_id.get() {
        return Err(user_error("That role is managed by Discord or an integration and can't be handed out."));
    }
    let target = parse_message_ref(
        &message,
        channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id()),
        guild_id,
    )?;
    let emoji = EmojiKey::parse(&emoji)?;
    ctx.defer_ephemeral().await?;

    // Fails early if the message doesn't exist or we can't see it.
    target.fetch(ctx.http()).await.map_err(|e| {
        warn!("Reaction role target {} unavailable: {}", target.id(), e);
        user_error("I can't find that message. Check the link and that I can read the channel.")
    })?;

    let record = {
        let mut guild = guild.lock().await;
        guild
            .reaction_roles
            .bind(guild_id, target, emoji.clone(), LazyRole::new(guild_id, role.id))?
            .clone()
    };
    if let Err(e) = ctx.data().api.update(&record).await {
        let _ = guild.lock().await.reaction_roles.unbind(target.id(), &emoji);
        return Err(e.into());
    }

    let mut reply = format!("✅ Reacting with {} now gives <@&{}>.", emoji, role.id);
    if let Err(e) = target
        .channel_id
        .create_reaction(ctx.http(), target.message_id, emoji.to_reaction_type())
        .await
    {
        warn!("Couldn't add {} to message {}: {}", emoji, target.id(), e);
        reply.push_str("\n-# ⚠️ I couldn't add the reaction myself; add it so members can click it.");
    }
    info!(
        "Reaction role {} -> {} bound on message {} in guild {}",
        emoji,
        role.id,
        target.id(),
        guild_id
    );
    ctx.send(
        CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Stop an emoji from giving a role
#[poise::command(slash_command)]
pub async fn unbind(
    ctx: Context<'_>,
    #[description = "Message link or id"] message: String,
    #[description = "Emoji to unbind"] emoji: String,
    #[description = "Channel of the message, when giving a bare id"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let target = parse_message_ref(
        &message,
        channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id()),
        guild_id,
    )?;
    let emoji = EmojiKey::parse(&emoji)?;

    let (before, outcome) = {
        let mut guild = guild.lock().await;
        let before = guild.reaction_roles.find(target.id()).cloned();
        (before, guild.reaction_roles.unbind(target.id(), &emoji)?)
    };
    let persisted = match &outcome {
        Unbound::Updated(record) => ctx.data().api.update(record).await,
        Unbound::Emptied(record) => ctx.data().api.delete_resource(record).await,
    };
    if let Err(e) = persisted {
        if let Some(before) = before {
            guild.lock().await.reaction_roles.put(before);
        }
        return Err(e.into());
    }

    let bot_id = ctx.framework().bot_id;
    if let Err(e) = target
        .channel_id
        .delete_reaction(
            ctx.http(),
            target.message_id,
            Some(bot_id),
            emoji.to_reaction_type(),
        )
        .await
    {
        warn!("Couldn't remove my {} from message {}: {}", emoji, target.id(), e);
    }

    let reply = match outcome {
        Unbound::Updated(_) => format!("✅ {} no longer gives a role.", emoji),
        Unbound::Emptied(_) => format!(
            "✅ {} no longer gives a role. That was the last one on the message.",
            emoji
        ),
    };
    ctx.send(CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}

/// Choose how a message's reaction roles behave
#[poise::command(slash_command)]
pub async fn mode(
    ctx: Context<'_>,
    #[description = "Message link or id"] message: String,
    #[description = "Normal: toggle. Unique: one role at a time. Verify: keep the role."]
    mode: ReactionRoleMode,
    #[description = "Channel of the message, when giving a bare id"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let target = parse_message_ref(
        &message,
        channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id()),
        guild_id,
    )?;
    let (previous, record) = {
        let mut guild = guild.lock().await;
        let previous = guild
            .reaction_roles
            .find(target.id())
            .map(|m| m.mode)
            .unwrap_or_default();
        (previous, guild.reaction_roles.set_mode(target.id(), mode)?.clone())
    };
    if let Err(e) = ctx.data().api.update(&record).await {
        let _ = guild.lock().await.reaction_roles.set_mode(target.id(), previous);
        return Err(e.into());
    }
    ctx.send(
        CreateReply::default()
            .content(format!("✅ That message now uses **{}** mode.", mode.name()))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// List reaction role messages
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let blocks: Vec<String> = {
        let guild = guild.lock().await;
        guild
            .reaction_roles
            .iter()
            .map(|m| {
                let bindings: Vec<String> = m
                    .bindings
                    .iter()
                    .map(|b| format!("{} → {}", b.emoji, b.role.mention()))
                    .collect();
                format!(
                    "{} · **{}**\n{}",
                    m.message.jump_url(guild_id),
                    m.mode.name(),
                    bindings.join("\n")
                )
            })
            .collect()
    };
    let content = if blocks.is_empty() {
        "No reaction roles yet. Set one up with `/reactionrole bind`.".to_string()
    } else {
        let mut content = String::new();
        for block in &blocks {
            if content.len() + block.len() + 2 > crate::config::DISCORD_MESSAGE_LIMIT {
                content.push('…');
                break;
            }
            content.push_str(block);
            content.push_str("\n\n");
        }
        content
    };
    ctx.send(
        CreateReply::default()
            .content(content)
            .allowed_mentions(serenity::CreateAllowedMentions::new())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_refs_accept_links_and_ids() {
        let guild = serenity::GuildId::new(1);
        let here = serenity::ChannelId::new(2);

        let linked = parse_message_ref("https://discord.com/channels/1/3/4", here, guild).unwrap();
        assert_eq!(linked, LazyMessage::new(serenity::ChannelId::new(3), serenity::MessageId::new(4)));

        let bare = parse_message_ref(" 99 ", here, guild).unwrap();
        assert_eq!(bare, LazyMessage::new(here, serenity::MessageId::new(99)));

        assert!(parse_message_ref("https://discord.com/channels/7/3/4", here, guild).is_err());
        assert!(parse_message_ref("hello", here, guild).is_err());
    }
}
