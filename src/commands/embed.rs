use crate::commands::{defaults, guild, guild_choices, is_manager};
use crate::embeds::{EmbedError, EmbedField, EmbedPatch, SavedEmbed};
use crate::lazy::{is_not_found, LazyMessage};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::CreateReply;
use tracing::{info, warn};

async fn autocomplete_embed<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    guild_choices(ctx, partial, |guild| {
        guild.embeds.iter().map(|e| e.name.clone()).collect()
    })
    .await
    .into_iter()
}

/// Rewrites every posted copy of the embed. Copies deleted on Discord are
/// forgotten; returns (updated, forgotten).
async fn sync_posts(ctx: Context<'_>, embed: &mut SavedEmbed, color: u32) -> (usize, usize) {
    let mut updated = 0;
    let mut missing = Vec::new();
    for post in &embed.posts {
        let edit = serenity::EditMessage::new().embed(embed.to_create_embed(color));
        match post.edit(ctx.http(), edit).await {
            Ok(_) => updated += 1,
            Err(e) if is_not_found(&e) => missing.push(post.id()),
            Err(e) => warn!(
                "Failed to update copy {} of embed '{}': {}",
                post.id(),
                embed.name,
                e
            ),
        }
    }
    (updated, embed.prune(&missing))
}

/// Saves an embed after `change`, then brings posted copies in line.
async fn edit_embed<F>(ctx: Context<'_>, name: &str, change: F) -> Result<String, Error>
where
    F: FnOnce(&mut SavedEmbed) -> Result<(), EmbedError>,
{
    let (_, guild) = guild(ctx).await?;
    let (mut embed, color) = {
        let guild = guild.lock().await;
        (
            guild.embeds.get_by_name(name)?.clone(),
            guild.accent_color(defaults(ctx).embed_color),
        )
    };
    change(&mut embed)?;
    ctx.defer().await?;

    let (updated, forgotten) = sync_posts(ctx, &mut embed, color).await;
    ctx.data().api.update(&embed).await?;
    guild.lock().await.embeds.insert(embed.clone());

    let mut reply = format!("✅ Saved **{}**", embed.name);
    if updated > 0 {
        reply.push_str(&format!(" and updated {} posted cop{}", updated, if updated == 1 { "y" } else { "ies" }));
    }
    reply.push('.');
    if forgotten > 0 {
        reply.push_str(&format!(
            "\n-# {} posted copy(ies) had been deleted and were forgotten.",
            forgotten
        ));
    }
    Ok(reply)
}

/// Build reusable embeds and post them
#[poise::command(
    slash_command,
    subcommands("create", "edit", "field", "post", "preview", "list", "delete"),
    check = "is_manager",
    guild_only
)]
pub async fn embed(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create a saved embed
#[allow(clippy::too_many_arguments)]
#[poise::command(slash_command)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Name to refer to it by"] name: String,
    #[description = "Title"] title: Option<String>,
    #[description = "Body text (\\n for a new line)"] description: Option<String>,
    #[description = "Hex colour, e.g. #FF66AA"] color: Option<String>,
    #[description = "Link for the title"] url: Option<String>,
    #[description = "Small image URL"] thumbnail: Option<String>,
    #[description = "Large image URL"] image: Option<String>,
    #[description = "Footer text"] footer: Option<String>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    guild.lock().await.embeds.validate_new(&name)?;

    let mut draft = SavedEmbed::new(guild_id, &name);
    draft.apply(EmbedPatch {
        title,
        description,
        color,
        url,
        thumbnail,
        image,
        footer,
    })?;
    let stored = ctx.data().api.create(&draft).await?;
    let reply = format!(
        "✅ Saved embed **{}**. Preview it with `/embed preview` or post it with `/embed post`.",
        stored.name
    );
    guild.lock().await.embeds.insert(stored);
    info!("Embed '{}' created in guild {}", draft.name, guild_id);
    ctx.say(reply).await?;
    Ok(())
}

/// Change a saved embed; posted copies update too
#[allow(clippy::too_many_arguments)]
#[poise::command(slash_command)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Embed"]
    #[autocomplete = autocomplete_embed]
    name: String,
    #[description = "Title (- to clear)"] title: Option<String>,
    #[description = "Body text (- to clear, \\n for a new line)"] description: Option<String>,
    #[description = "Hex colour (- to clear)"] color: Option<String>,
    #[description = "Link for the title (- to clear)"] url: Option<String>,
    #[description = "Small image URL (- to clear)"] thumbnail: Option<String>,
    #[description = "Large image URL (- to clear)"] image: Option<String>,
    #[description = "Footer text (- to clear)"] footer: Option<String>,
) -> Result<(), Error> {
    let patch = EmbedPatch {
        title,
        description,
        color,
        url,
        thumbnail,
        image,
        footer,
    };
    if patch.is_empty() {
        ctx.send(
            CreateReply::default()
                .content("Nothing to change. Pass at least one option.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }
    let reply = edit_embed(ctx, &name, |embed| embed.apply(patch)).await?;
    ctx.say(reply).await?;
    Ok(())
}

/// Edit an embed's fields
#[poise::command(slash_command, subcommands("add_field", "remove_field"))]
pub async fn field(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a field to the end of an embed
#[poise::command(slash_command, rename = "add")]
pub async fn add_field(
    ctx: Context<'_>,
    #[description = "Embed"]
    #[autocomplete = autocomplete_embed]
    embed: String,
    #[description = "Field name"] name: String,
    #[description = "Field text (\\n for a new line)"] value: String,
    #[description = "Show side by side with other inline fields"] inline: Option<bool>,
) -> Result<(), Error> {
    let field = EmbedField::new(&name, &value, inline.unwrap_or(false))?;
    let reply = edit_embed(ctx, &embed, |e| e.add_field(field).map(|_| ())).await?;
    ctx.say(reply).await?;
    Ok(())
}

/// Remove a field by its number
#[poise::command(slash_command, rename = "remove")]
pub async fn remove_field(
    ctx: Context<'_>,
    #[description = "Embed"]
    #[autocomplete = autocomplete_embed]
    embed: String,
    #[description = "Field number, counting from 1"]
    #[min = 1]
    number: u32,
) -> Result<(), Error> {
    let reply = edit_embed(ctx, &embed, |e| {
        e.remove_field(number as usize).map(|_| ())
    })
    .await?;
    ctx.say(reply).await?;
    Ok(())
}

/// Post a saved embed
#[poise::command(slash_command)]
pub async fn post(
    ctx: Context<'_>,
    #[description = "Embed"]
    #[autocomplete = autocomplete_embed]
    name: String,
    #[description = "Channel to post in (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (embed, color) = {
        let guild = guild.lock().await;
        (
            guild.embeds.get_by_name(&name)?.clone(),
            guild.accent_color(defaults(ctx).embed_color),
        )
    };

    let target = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    let message = target
        .send_message(
            ctx.http(),
            serenity::CreateMessage::new().embed(embed.to_create_embed(color)),
        )
        .await?;

    let changed = {
        let mut guild = guild.lock().await;
        match guild.embeds.get_mut(embed.id) {
            Some(stored) => {
                let previous = stored.clone();
                stored.record_post(LazyMessage::from(&message));
                Some((stored.clone(), previous))
            }
            None => None,
        }
    };
    if let Some((updated, previous)) = changed {
        if let Err(e) = ctx.data().api.update(&updated).await {
            guild.lock().await.embeds.insert(previous);
            // An untracked copy could never be edited again.
            if let Err(delete) = message.delete(ctx.http()).await {
                warn!("Failed to remove untracked embed copy {}: {}", message.id, delete);
            }
            return Err(e.into());
        }
    }

    ctx.send(
        CreateReply::default()
            .content(format!("✅ Posted **{}**: {}", embed.name, message.link()))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show a saved embed only to you
#[poise::command(slash_command)]
pub async fn preview(
    ctx: Context<'_>,
    #[description = "Embed"]
    #[autocomplete = autocomplete_embed]
    name: String,
) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (embed, color) = {
        let guild = guild.lock().await;
        (
            guild.embeds.get_by_name(&name)?.clone(),
            guild.accent_color(defaults(ctx).embed_color),
        )
    };
    ctx.send(
        CreateReply::default()
            .content(format!(
                "Preview of **{}** ({} field(s), posted {} time(s))",
                embed.name,
                embed.fields.len(),
                embed.posts.len()
            ))
            .embed(embed.to_create_embed(color))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// List saved embeds
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let lines: Vec<String> = {
        let guild = guild.lock().await;
        guild
            .embeds
            .iter()
            .map(|e| {
                format!(
                    "**{}**{} · {} posted cop{}",
                    e.name,
                    e.title
                        .as_ref()
                        .map(|t| format!(" · {}", t))
                        .unwrap_or_default(),
                    e.posts.len(),
                    if e.posts.len() == 1 { "y" } else { "ies" }
                )
            })
            .collect()
    };
    let content = if lines.is_empty() {
        "No saved embeds yet. Create one with `/embed create`.".to_string()
    } else {
        lines.join("\n")
    };
    ctx.say(content).await?;
    Ok(())
}

/// Delete a saved embed
#[poise::command(slash_command)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Embed"]
    #[autocomplete = autocomplete_embed]
    name: String,
    #[description = "Also delete every posted copy"] delete_posts: Option<bool>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let embed = guild.lock().await.embeds.get_by_name(&name)?.clone();
    ctx.defer().await?;

    ctx.data().api.delete_resource(&embed).await?;
    guild.lock().await.embeds.remove(embed.id);

    let mut removed_posts = 0;
    if delete_posts.unwrap_or(false) {
        for post in &embed.posts {
            match post.delete(ctx.http()).await {
                Ok(()) => removed_posts += 1,
                Err(e) if is_not_found(&e) => {}
                Err(e) => warn!("Failed to delete copy {} of embed '{}': {}", post.id(), embed.name, e),
            }
        }
    }
    info!("Embed '{}' deleted in guild {}", embed.name, guild_id);
    let mut reply = format!("🗑️ Deleted embed **{}**.", embed.name);
    if removed_posts > 0 {
        reply.push_str(&format!(" Removed {} posted copy(ies).", removed_posts));
    }
    ctx.say(reply).await?;
    Ok(())
}
