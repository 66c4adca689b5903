use crate::commands::{defaults, guild};
use crate::embeds::{parse_color, CLEAR};
use crate::guild::GuildSettings;
use crate::lazy::{LazyChannel, LazyRole};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Manage bot settings for this server
#[poise::command(
    slash_command,
    subcommands("show", "log_channel", "staff_role", "manager_role", "color"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn settings(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Applies `change` to the server settings and saves them.
async fn update_settings<F>(ctx: Context<'_>, change: F) -> Result<GuildSettings, Error>
where
    F: FnOnce(&mut GuildSettings) -> Result<(), Error>,
{
    let (guild_id, guild) = guild(ctx).await?;
    let mut settings = guild.lock().await.settings.clone();
    change(&mut settings)?;
    ctx.data().api.put(&settings.path(), &settings).await?;
    guild.lock().await.settings = settings.clone();
    info!(
        "Settings for guild {} updated by {}",
        guild_id,
        ctx.author().id
    );
    Ok(settings)
}

fn or_unset(value: Option<String>) -> String {
    value.unwrap_or_else(|| "*not set*".to_string())
}

/// Show the current settings
#[poise::command(slash_command)]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (settings, color) = {
        let guild = guild.lock().await;
        (
            guild.settings.clone(),
            guild.accent_color(defaults(ctx).embed_color),
        )
    };

    let embed = serenity::CreateEmbed::new()
        .title("⚙️ Server settings")
        .field("Log channel", or_unset(settings.log_channel.map(|c| c.mention())), true)
        .field("Staff role", or_unset(settings.staff_role.map(|r| r.mention())), true)
        .field("Manager role", or_unset(settings.manager_role.map(|r| r.mention())), true)
        .field(
            "Accent colour",
            settings
                .accent_color
                .map(|c| format!("#{:06X}", c))
                .unwrap_or_else(|| format!("default (#{:06X})", defaults(ctx).embed_color)),
            true,
        )
        .color(color);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Set or clear the channel that receives event logs
#[poise::command(slash_command, rename = "log-channel")]
pub async fn log_channel(
    ctx: Context<'_>,
    #[description = "Channel for logs (omit to turn logging off)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let target = channel.map(|c| LazyChannel(c.id));
    update_settings(ctx, |s| {
        s.log_channel = target;
        Ok(())
    })
    .await?;
    ctx.say(match target {
        Some(channel) => format!("✅ Logs will be posted in {}.", channel.mention()),
        None => "✅ Logging is off.".to_string(),
    })
    .await?;
    Ok(())
}

/// Set or clear the role every staff member receives
#[poise::command(slash_command, rename = "staff-role")]
pub async fn staff_role(
    ctx: Context<'_>,
    #[description = "Role (omit to clear)"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let target = role.map(|r| LazyRole::new(guild_id, r.id));
    update_settings(ctx, |s| {
        s.staff_role = target;
        Ok(())
    })
    .await?;
    ctx.send(
        poise::CreateReply::default()
            .content(match target {
                Some(role) => format!("✅ Hired staff will receive {}.", role.mention()),
                None => "✅ Staff no longer receive a shared role.".to_string(),
            })
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Set or clear the role allowed to run management commands
#[poise::command(slash_command, rename = "manager-role")]
pub async fn manager_role(
    ctx: Context<'_>,
    #[description = "Role (omit to clear)"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let target = role.map(|r| LazyRole::new(guild_id, r.id));
    update_settings(ctx, |s| {
        s.manager_role = target;
        Ok(())
    })
    .await?;
    ctx.send(
        poise::CreateReply::default()
            .content(match target {
                Some(role) => format!(
                    "✅ Members with {} can now run management commands.",
                    role.mention()
                ),
                None => "✅ Only members with Manage Server can run management commands.".to_string(),
            })
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Set the colour used for the bot's embeds
#[poise::command(slash_command)]
pub async fn color(
    ctx: Context<'_>,
    #[description = "Hex colour like #FF66AA, or - for the default"] color: String,
) -> Result<(), Error> {
    let parsed = if color.trim() == CLEAR {
        None
    } else {
        Some(parse_color(&color)?)
    };
    update_settings(ctx, |s| {
        s.accent_color = parsed;
        Ok(())
    })
    .await?;
    ctx.say(match parsed {
        Some(c) => format!("✅ Accent colour set to #{:06X}.", c),
        None => "✅ Accent colour reset to the default.".to_string(),
    })
    .await?;
    Ok(())
}
