use crate::activity::render::discord_timestamp;
use crate::commands::{apply_role, guild, guild_choices, is_manager, parse_duration, user_error};
use crate::guild::log_event;
use crate::lazy::LazyRole;
use crate::vip::{VipError, VipTier};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::Mentionable;
use poise::CreateReply;
use tracing::{info, warn};

const VIP_COLOR: u32 = 0xF1C40F;

async fn autocomplete_tier<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    guild_choices(ctx, partial, |guild| {
        guild
            .vip
            .tiers_by_rank()
            .into_iter()
            .map(|t| t.name.clone())
            .collect()
    })
    .await
    .into_iter()
}

fn expiry_text(expires_at: Option<chrono::DateTime<Utc>>) -> String {
    match expires_at {
        Some(at) => format!("expires {}", discord_timestamp(at, 'R')),
        None => "never expires".to_string(),
    }
}

/// Manage VIP memberships
#[poise::command(
    slash_command,
    subcommands("tier", "grant", "revoke", "status", "members"),
    check = "is_manager",
    guild_only
)]
pub async fn vip(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Manage VIP tiers
#[poise::command(slash_command, subcommands("add_tier", "remove_tier", "list_tiers"))]
pub async fn tier(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a VIP tier
#[poise::command(slash_command, rename = "add")]
pub async fn add_tier(
    ctx: Context<'_>,
    #[description = "Tier name, e.g. Gold"] name: String,
    #[description = "Higher ranks are listed first"] rank: u32,
    #[description = "Role members of this tier receive"] role: Option<serenity::Role>,
    #[description = "Price, for display"] cost: Option<u64>,
    #[description = "What the tier includes"] description: Option<String>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    guild.lock().await.vip.validate_new_tier(&name, rank)?;

    let draft = VipTier {
        id: 0,
        guild_id,
        name: name.trim().to_string(),
        description: description.filter(|d| !d.trim().is_empty()),
        role: role.map(|r| LazyRole::new(guild_id, r.id)),
        cost: cost.unwrap_or(0),
        rank,
    };
    let stored = ctx.data().api.create(&draft).await?;
    let reply = format!("✅ Added VIP tier **{}** (rank {}).", stored.name, stored.rank);
    guild.lock().await.vip.insert_tier(stored);
    info!("VIP tier '{}' added in guild {}", draft.name, guild_id);
    ctx.say(reply).await?;
    Ok(())
}

/// Remove a VIP tier nobody holds
#[poise::command(slash_command, rename = "remove")]
pub async fn remove_tier(
    ctx: Context<'_>,
    #[description = "Tier to remove"]
    #[autocomplete = autocomplete_tier]
    name: String,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let removed = {
        let mut guild = guild.lock().await;
        let id = find_tier(&guild.vip, &name)?.id;
        guild.vip.remove_tier(id)?
    };
    if let Err(e) = ctx.data().api.delete_resource(&removed).await {
        guild.lock().await.vip.insert_tier(removed);
        return Err(e.into());
    }
    info!("VIP tier '{}' removed in guild {}", removed.name, guild_id);
    ctx.say(format!("🗑️ Removed VIP tier **{}**.", removed.name))
        .await?;
    Ok(())
}

/// List VIP tiers
#[poise::command(slash_command, rename = "list")]
pub async fn list_tiers(ctx: Context<'_>) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (fields, color) = {
        let guild = guild.lock().await;
        let fields: Vec<(String, String)> = guild
            .vip
            .tiers_by_rank()
            .into_iter()
            .map(|t| {
                let holders = guild.vip.members().filter(|m| m.tier_id == t.id).count();
                let mut value = format!("Rank {} · {} member(s)", t.rank, holders);
                if t.cost > 0 {
                    value.push_str(&format!(" · costs {}", t.cost));
                }
                if let Some(role) = t.role {
                    value.push_str(&format!("\n{}", role.mention()));
                }
                if let Some(description) = &t.description {
                    value.push_str(&format!("\n{}", description));
                }
                (t.name.clone(), value)
            })
            .collect();
        (fields, guild.accent_color(VIP_COLOR))
    };

    if fields.is_empty() {
        ctx.say("No VIP tiers yet. Add one with `/vip tier add`.")
            .await?;
        return Ok(());
    }
    let mut embed = serenity::CreateEmbed::new().title("💎 VIP tiers").color(color);
    for (name, value) in fields.into_iter().take(25) {
        embed = embed.field(name, value, false);
    }
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn find_tier<'a>(vip: &'a crate::vip::VipManager, name: &str) -> Result<&'a VipTier, Error> {
    vip.tier_by_name(name)
        .ok_or_else(|| user_error(format!("There's no VIP tier called '{}'.", name)))
}

/// Give someone VIP, or extend their membership
#[poise::command(slash_command)]
pub async fn grant(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
    #[description = "Tier"]
    #[autocomplete = autocomplete_tier]
    tier: String,
    #[description = "How long, e.g. 30d (omit for no expiry)"] duration: Option<String>,
) -> Result<(), Error> {
    if user.bot {
        return Err(user_error("Bots can't be VIPs."));
    }
    let duration = duration.as_deref().map(parse_duration).transpose()?;
    let (guild_id, guild) = guild(ctx).await?;
    ctx.defer().await?;

    let (outcome, tier, previous_tier, settings) = {
        let guild = guild.lock().await;
        let tier = find_tier(&guild.vip, &tier)?.clone();
        let outcome = guild
            .vip
            .plan_grant(guild_id, user.id, tier.id, duration, Utc::now())?;
        let previous_tier = outcome
            .previous_tier
            .and_then(|id| guild.vip.tier(id).ok().cloned());
        (outcome, tier, previous_tier, guild.settings.clone())
    };

    ctx.data().api.create(&outcome.member).await?;
    guild.lock().await.vip.put_member(outcome.member.clone());

    let mut reply = if outcome.extended {
        format!(
            "💎 Extended {}'s **{}** membership, now {}.",
            user.mention(),
            tier.name,
            expiry_text(outcome.member.expires_at)
        )
    } else {
        format!(
            "💎 {} is now **{}** VIP, {}.",
            user.mention(),
            tier.name,
            expiry_text(outcome.member.expires_at)
        )
    };
    if let Some(previous) = &previous_tier {
        if previous.role != tier.role {
            if let Some(note) = apply_role(ctx, previous.role, user.id, false, "VIP tier changed").await {
                reply.push_str(&note);
            }
        }
    }
    if let Some(note) = apply_role(ctx, tier.role, user.id, true, "VIP granted").await {
        reply.push_str(&note);
    }

    if !outcome.extended {
        let dm = serenity::CreateMessage::new().embed(
            serenity::CreateEmbed::new()
                .title(format!("💎 Welcome to {} VIP", tier.name))
                .description(format!(
                    "Your membership {}.",
                    expiry_text(outcome.member.expires_at)
                ))
                .color(VIP_COLOR),
        );
        if let Err(e) = user.id.direct_message(ctx.http(), dm).await {
            warn!("Couldn't DM {} about their VIP grant: {}", user.id, e);
        }
    }

    info!(
        "VIP {} granted to {} in guild {} (extended: {})",
        tier.name, user.id, guild_id, outcome.extended
    );
    log_event(
        ctx.http(),
        &settings,
        serenity::CreateEmbed::new()
            .title(if outcome.extended { "VIP extended" } else { "VIP granted" })
            .description(format!("{} · **{}**", user.mention(), tier.name))
            .field("By", ctx.author().mention().to_string(), true)
            .field("Expiry", expiry_text(outcome.member.expires_at), true)
            .color(VIP_COLOR),
    )
    .await;

    ctx.send(
        CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Take away someone's VIP membership
#[poise::command(slash_command)]
pub async fn revoke(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
    #[description = "Reason, for the log"] reason: Option<String>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let (member, tier, settings) = {
        let guild = guild.lock().await;
        let member = guild
            .vip
            .member(user.id)
            .cloned()
            .ok_or(VipError::NotVip(user.id))?;
        let tier = guild.vip.tier(member.tier_id).ok().cloned();
        (member, tier, guild.settings.clone())
    };

    ctx.data().api.delete_resource(&member).await?;
    let _ = guild.lock().await.vip.revoke(user.id);

    let tier_name = tier
        .as_ref()
        .map(|t| t.name.clone())
        .unwrap_or_else(|| "VIP".to_string());
    let mut reply = format!("📤 Removed {}'s **{}** membership.", user.mention(), tier_name);
    if let Some(note) = apply_role(ctx, tier.and_then(|t| t.role), user.id, false, "VIP revoked").await {
        reply.push_str(&note);
    }

    info!("VIP revoked from {} in guild {} by {}", user.id, guild_id, ctx.author().id);
    log_event(
        ctx.http(),
        &settings,
        serenity::CreateEmbed::new()
            .title("VIP revoked")
            .description(format!("{} · **{}**", user.mention(), tier_name))
            .field("By", ctx.author().mention().to_string(), true)
            .field("Reason", reason.unwrap_or_else(|| "not given".to_string()), true)
            .color(0xED4245),
    )
    .await;

    ctx.send(
        CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Check someone's VIP membership
#[poise::command(slash_command)]
pub async fn status(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let content = {
        let guild = guild.lock().await;
        match guild.vip.member(user.id) {
            None => format!("{} is not a VIP.", user.mention()),
            Some(member) => {
                let tier = guild
                    .vip
                    .tier(member.tier_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|_| format!("tier {}", member.tier_id));
                let state = if member.is_expired(Utc::now()) {
                    "lapsed, pending removal".to_string()
                } else {
                    expiry_text(member.expires_at)
                };
                format!(
                    "💎 {} is **{}** VIP since {}, {}.",
                    user.mention(),
                    tier,
                    discord_timestamp(member.started_at, 'D'),
                    state
                )
            }
        }
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

/// List VIP members by tier
#[poise::command(slash_command)]
pub async fn members(ctx: Context<'_>) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (fields, color) = {
        let guild = guild.lock().await;
        let fields: Vec<(String, String)> = guild
            .vip
            .tiers_by_rank()
            .into_iter()
            .filter_map(|t| {
                let lines: Vec<String> = guild
                    .vip
                    .members()
                    .filter(|m| m.tier_id == t.id)
                    .map(|m| format!("{} · {}", m.user.mention(), expiry_text(m.expires_at)))
                    .collect();
                (!lines.is_empty()).then(|| (t.name.clone(), lines.join("\n")))
            })
            .collect();
        (fields, guild.accent_color(VIP_COLOR))
    };

    if fields.is_empty() {
        ctx.say("There are no VIP members yet.").await?;
        return Ok(());
    }
    let mut embed = serenity::CreateEmbed::new().title("💎 VIP members").color(color);
    for (name, mut value) in fields.into_iter().take(25) {
        if value.len() > 1024 {
            let mut cut = 1000;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            value.truncate(cut);
            value.push_str("\n…");
        }
        embed = embed.field(name, value, false);
    }
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
