use crate::commands::{apply_role, guild, guild_choices, is_manager, user_error};
use crate::guild::log_event;
use crate::lazy::LazyRole;
use crate::staff::{StaffError, StaffMember, StaffPosition};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::Mentionable;
use poise::CreateReply;
use tracing::{info, warn};

const STAFF_COLOR: u32 = 0x3BA55D;

async fn autocomplete_position<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    guild_choices(ctx, partial, |guild| {
        guild.staff.positions().map(|p| p.name.clone()).collect()
    })
    .await
    .into_iter()
}

/// Manage venue staff
#[poise::command(
    slash_command,
    subcommands("position", "hire", "fire", "assign", "unassign", "notes", "roster"),
    check = "is_manager",
    guild_only
)]
pub async fn staff(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Manage staff positions
#[poise::command(
    slash_command,
    subcommands("add_position", "remove_position", "list_positions")
)]
pub async fn position(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a staff position
#[poise::command(slash_command, rename = "add")]
pub async fn add_position(
    ctx: Context<'_>,
    #[description = "Position name, e.g. Bartender"] name: String,
    #[description = "What the position does"] description: Option<String>,
    #[description = "Role given to anyone holding this position"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let draft = {
        let guild = guild.lock().await;
        guild.staff.validate_new_position(&name)?;
        StaffPosition::new(
            guild_id,
            &name,
            description.filter(|d| !d.trim().is_empty()),
            role.map(|r| LazyRole::new(guild_id, r.id)),
        )
    };

    let stored = ctx.data().api.create(&draft).await?;
    let reply = format!(
        "✅ Added position **{}**{}.",
        stored.name,
        stored
            .role
            .map(|r| format!(" (gives {})", r.mention()))
            .unwrap_or_default()
    );
    guild.lock().await.staff.insert_position(stored);
    info!("Staff position '{}' added in guild {}", name.trim(), guild_id);
    ctx.send(
        CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Remove a staff position and take it from everyone holding it
#[poise::command(slash_command, rename = "remove")]
pub async fn remove_position(
    ctx: Context<'_>,
    #[description = "Position to remove"]
    #[autocomplete = autocomplete_position]
    name: String,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    ctx.defer().await?;
    let (position, holders, affected) = {
        let mut guild = guild.lock().await;
        let id = guild
            .staff
            .position_by_name(&name)
            .map(|p| p.id)
            .ok_or_else(|| user_error(format!("There's no position called '{}'.", name)))?;
        let holders: Vec<StaffMember> = guild.staff.members_in(id).into_iter().cloned().collect();
        let (position, affected) = guild.staff.remove_position(id)?;
        (position, holders, affected)
    };

    let api = &ctx.data().api;
    if let Err(e) = api.delete_resource(&position).await {
        guild
            .lock()
            .await
            .staff
            .restore_position(position, holders);
        return Err(e.into());
    }

    // The position is gone for good now, so every holder is handled even if
    // one of them fails to save.
    let mut unsaved = Vec::new();
    for member in &affected {
        if let Err(e) = api.update(member).await {
            warn!(
                "Failed to save {} after removing position '{}': {}",
                member.user.id(),
                position.name,
                e
            );
            unsaved.push(member.user.mention());
        }
        apply_role(ctx, position.role, member.user.id(), false, "Staff position removed").await;
    }
    info!(
        "Staff position '{}' removed in guild {} ({} holder(s) updated, {} unsaved)",
        position.name,
        guild_id,
        affected.len(),
        unsaved.len()
    );
    let mut reply = format!(
        "🗑️ Removed **{}**. {} member(s) no longer hold it.",
        position.name,
        affected.len()
    );
    if !unsaved.is_empty() {
        reply.push_str(&format!(
            "\n-# ⚠️ Couldn't save the change for {}; it will be saved with their next update.",
            unsaved.join(", ")
        ));
    }
    ctx.send(
        CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// List staff positions
#[poise::command(slash_command, rename = "list")]
pub async fn list_positions(ctx: Context<'_>) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let lines: Vec<String> = {
        let guild = guild.lock().await;
        guild
            .staff
            .positions()
            .map(|p| {
                let mut line = format!(
                    "**{}** · {} holder(s)",
                    p.name,
                    guild.staff.members_in(p.id).len()
                );
                if let Some(role) = p.role {
                    line.push_str(&format!(" · {}", role.mention()));
                }
                if let Some(description) = &p.description {
                    line.push_str(&format!("\n-# {}", description));
                }
                line
            })
            .collect()
    };

    let content = if lines.is_empty() {
        "No positions yet. Add one with `/staff position add`.".to_string()
    } else {
        lines.join("\n")
    };
    ctx.send(
        CreateReply::default()
            .content(content)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Add someone to staff
#[poise::command(slash_command)]
pub async fn hire(
    ctx: Context<'_>,
    #[description = "New staff member"] user: serenity::User,
    #[description = "Position to start them in"]
    #[autocomplete = autocomplete_position]
    position: Option<String>,
) -> Result<(), Error> {
    if user.bot {
        return Err(user_error("Bots can't be hired."));
    }
    let (guild_id, guild) = guild(ctx).await?;
    let (member, settings, position_role) = {
        let mut guild = guild.lock().await;
        let position_id = match &position {
            Some(name) => Some(
                guild
                    .staff
                    .position_by_name(name)
                    .map(|p| p.id)
                    .ok_or_else(|| user_error(format!("There's no position called '{}'.", name)))?,
            ),
            None => None,
        };
        guild.staff.hire(guild_id, user.id, Utc::now())?;
        let member = match position_id {
            Some(id) => guild.staff.assign(user.id, id)?.clone(),
            None => guild
                .staff
                .member(user.id)
                .cloned()
                .ok_or(StaffError::NotStaff(user.id))?,
        };
        let position_role = position_id
            .and_then(|id| guild.staff.position(id).ok())
            .and_then(|p| p.role);
        (member, guild.settings.clone(), position_role)
    };

    if let Err(e) = ctx.data().api.create(&member).await {
        // Keep memory in step with the API.
        let _ = guild.lock().await.staff.fire(user.id);
        return Err(e.into());
    }

    let mut reply = format!("👋 Welcome to the team, {}!", user.mention());
    if let Some(note) = apply_role(ctx, settings.staff_role, user.id, true, "Hired").await {
        reply.push_str(&note);
    }
    if let Some(note) = apply_role(ctx, position_role, user.id, true, "Hired").await {
        reply.push_str(&note);
    }

    info!("{} hired in guild {} by {}", user.id, guild_id, ctx.author().id);
    log_event(
        ctx.http(),
        &settings,
        serenity::CreateEmbed::new()
            .title("Staff hired")
            .description(format!("{} joined the staff", user.mention()))
            .field("By", ctx.author().mention().to_string(), true)
            .field("Position", position.unwrap_or_else(|| "none".to_string()), true)
            .color(STAFF_COLOR),
    )
    .await;

    ctx.send(
        CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new().users(vec![user.id])),
    )
    .await?;
    Ok(())
}

/// Remove someone from staff
#[poise::command(slash_command)]
pub async fn fire(
    ctx: Context<'_>,
    #[description = "Staff member to remove"] user: serenity::User,
    #[description = "Reason, for the log"] reason: Option<String>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    ctx.defer().await?;
    let (member, settings, roles) = {
        let guild = guild.lock().await;
        let member = guild
            .staff
            .member(user.id)
            .cloned()
            .ok_or(StaffError::NotStaff(user.id))?;
        let roles: Vec<LazyRole> = member
            .positions
            .iter()
            .filter_map(|id| guild.staff.position(*id).ok())
            .filter_map(|p| p.role)
            .collect();
        (member, guild.settings.clone(), roles)
    };

    ctx.data().api.delete_resource(&member).await?;
    // Someone else may have fired them while the API call was in flight.
    let _ = guild.lock().await.staff.fire(user.id);

    let mut reply = format!("📤 {} is no longer on staff.", user.mention());
    for role in std::iter::once(settings.staff_role).chain(roles.into_iter().map(Some)) {
        if let Some(note) = apply_role(ctx, role, user.id, false, "Removed from staff").await {
            reply.push_str(&note);
        }
    }

    info!("{} removed from staff in guild {} by {}", user.id, guild_id, ctx.author().id);
    log_event(
        ctx.http(),
        &settings,
        serenity::CreateEmbed::new()
            .title("Staff removed")
            .description(format!("{} left the staff", user.mention()))
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

/// Give a staff member a position
#[poise::command(slash_command)]
pub async fn assign(
    ctx: Context<'_>,
    #[description = "Staff member"] user: serenity::User,
    #[description = "Position"]
    #[autocomplete = autocomplete_position]
    position: String,
) -> Result<(), Error> {
    change_position(ctx, user, position, true).await
}

/// Take a position away from a staff member
#[poise::command(slash_command)]
pub async fn unassign(
    ctx: Context<'_>,
    #[description = "Staff member"] user: serenity::User,
    #[description = "Position"]
    #[autocomplete = autocomplete_position]
    position: String,
) -> Result<(), Error> {
    change_position(ctx, user, position, false).await
}

async fn change_position(
    ctx: Context<'_>,
    user: serenity::User,
    position: String,
    assign: bool,
) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (member, previous, target) = {
        let mut guild = guild.lock().await;
        let target = guild
            .staff
            .position_by_name(&position)
            .cloned()
            .ok_or_else(|| user_error(format!("There's no position called '{}'.", position)))?;
        let previous = guild
            .staff
            .member(user.id)
            .cloned()
            .ok_or(StaffError::NotStaff(user.id))?;
        let member = if assign {
            guild.staff.assign(user.id, target.id)?.clone()
        } else {
            guild.staff.unassign(user.id, target.id)?.clone()
        };
        (member, previous, target)
    };

    if let Err(e) = ctx.data().api.update(&member).await {
        guild.lock().await.staff.put_member(previous);
        return Err(e.into());
    }
    let mut reply = if assign {
        format!("✅ {} is now **{}**.", user.mention(), target.name)
    } else {
        format!("✅ {} no longer holds **{}**.", user.mention(), target.name)
    };
    if let Some(note) = apply_role(ctx, target.role, user.id, assign, "Staff position changed").await {
        reply.push_str(&note);
    }
    ctx.send(
        CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Set private notes on a staff member
#[poise::command(slash_command)]
pub async fn notes(
    ctx: Context<'_>,
    #[description = "Staff member"] user: serenity::User,
    #[description = "Notes (leave empty to clear)"] text: Option<String>,
) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (member, previous) = {
        let mut guild = guild.lock().await;
        let previous = guild
            .staff
            .member(user.id)
            .cloned()
            .ok_or(StaffError::NotStaff(user.id))?;
        (guild.staff.set_notes(user.id, text)?.clone(), previous)
    };
    if let Err(e) = ctx.data().api.update(&member).await {
        guild.lock().await.staff.put_member(previous);
        return Err(e.into());
    }
    ctx.send(
        CreateReply::default()
            .content(match &member.notes {
                Some(_) => format!("📝 Updated notes for {}.", user.mention()),
                None => format!("📝 Cleared notes for {}.", user.mention()),
            })
            .allowed_mentions(serenity::CreateAllowedMentions::new())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show the staff roster
#[poise::command(slash_command)]
pub async fn roster(ctx: Context<'_>) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (fields, total, color) = {
        let guild = guild.lock().await;
        let fields: Vec<(String, String)> = guild
            .staff
            .roster()
            .into_iter()
            .map(|group| {
                let title = group
                    .position
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Unplaced".to_string());
                let value = if group.members.is_empty() {
                    "*open*".to_string()
                } else {
                    group
                        .members
                        .iter()
                        .map(|m| m.user.mention())
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                (title, value)
            })
            .collect();
        (
            fields,
            guild.staff.members().len(),
            guild.accent_color(STAFF_COLOR),
        )
    };

    if fields.is_empty() {
        ctx.say("Nobody is on staff yet.").await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Staff roster")
        .footer(serenity::CreateEmbedFooter::new(format!("{} staff member(s)", total)))
        .color(color);
    // Embeds hold at most 25 fields.
    if fields.len() > 25 {
        warn!("Roster has {} groups, showing the first 25", fields.len());
    }
    for (name, value) in fields.into_iter().take(25) {
        embed = embed.field(name, truncate(value, 1024), true);
    }
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn truncate(mut value: String, max: usize) -> String {
    if value.len() > max {
        let mut cut = max.saturating_sub(1);
        while !value.is_char_boundary(cut) {
            cut -= 1;
        }
        value.truncate(cut);
        value.push('…');
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short".to_string(), 10), "short");
        let long = "é".repeat(600);
        let cut = truncate(long, 1024);
        assert!(cut.len() <= 1024 + '…'.len_utf8());
        assert!(cut.ends_with('…'));
    }
}
