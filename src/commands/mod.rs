pub mod activity;
pub mod embed;
pub mod form;
pub mod giveaway;
pub mod raffle;
pub mod reaction_role;
pub mod settings;
pub mod staff;
pub mod vip;

use crate::config::ActivityDefaults;
use crate::guild::{GuildData, GuildHandle};
use crate::lazy::LazyRole;
use crate::{Context, Data, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use poise::CreateReply;
use thiserror::Error;
use tracing::warn;

/// A problem with the user's input, shown back to them verbatim.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserError(pub String);

pub fn user_error(message: impl Into<String>) -> Error {
    Box::new(UserError(message.into()))
}

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        giveaway::giveaway(),
        raffle::raffle(),
        staff::staff(),
        vip::vip(),
        form::form(),
        embed::embed(),
        reaction_role::reactionrole(),
        settings::settings(),
    ]
}

/// The guild the command runs in, loaded from the API on first use.
pub async fn guild(ctx: Context<'_>) -> Result<(serenity::GuildId, GuildHandle), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| user_error("This command only works in a server."))?;
    let guild = ctx.data().guilds.get(guild_id).await?;
    Ok((guild_id, guild))
}

pub fn defaults<'a>(ctx: Context<'a>) -> &'a ActivityDefaults {
    &ctx.data().config.activity
}

/// Parses durations like `2d 4h` or `90m`.
pub fn parse_duration(input: &str) -> Result<chrono::Duration, Error> {
    let parsed = humantime::parse_duration(input.trim()).map_err(|e| {
        user_error(format!(
            "Couldn't read '{}' as a duration ({}). Try `2d 4h`.",
            input, e
        ))
    })?;
    chrono::Duration::from_std(parsed).map_err(|_| user_error("That duration is too long."))
}

pub fn ends_in(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
    Ok(now + parse_duration(input)?)
}

/// Names from the current guild for an autocomplete list, filtered by what the
/// user has typed so far.
pub async fn guild_choices<F>(ctx: Context<'_>, partial: &str, names: F) -> Vec<String>
where
    F: FnOnce(&GuildData) -> Vec<String>,
{
    let Ok((_, guild)) = guild(ctx).await else {
        return Vec::new();
    };
    let names = names(&*guild.lock().await);
    filter_choices(names, partial)
}

pub fn filter_choices(names: Vec<String>, partial: &str) -> Vec<String> {
    let partial = partial.trim().to_lowercase();
    names
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&partial))
        .take(25)
        .collect()
}

/// Adds or removes a role. Discord refusing is reported back as a note for
/// the reply rather than failing the whole command.
pub async fn apply_role(
    ctx: Context<'_>,
    role: Option<LazyRole>,
    user: serenity::UserId,
    grant: bool,
    reason: &str,
) -> Option<String> {
    let role = role?;
    let result = if grant {
        role.grant(ctx.http(), user, reason).await
    } else {
        role.revoke(ctx.http(), user, reason).await
    };
    match result {
        Ok(()) => None,
        Err(e) => {
            warn!(
                "Failed to {} role {} for {}: {}",
                if grant { "grant" } else { "remove" },
                role.id(),
                user,
                e
            );
            Some(format!(
                "\n-# ⚠️ Couldn't {} {}. Check my role is above it.",
                if grant { "give" } else { "remove" },
                role.mention()
            ))
        }
    }
}

pub async fn reply_ephemeral(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Manage Server, the configured manager role, or the bot owner.
pub async fn is_manager(ctx: Context<'_>) -> Result<bool, Error> {
    if let Some(owner_id) = ctx.data().config.owner_id {
        if ctx.author().id == serenity::UserId::new(owner_id) {
            return Ok(true);
        }
    }

    let member = match ctx {
        poise::Context::Application(app) => app.interaction.member.as_deref(),
        poise::Context::Prefix(_) => None,
    };
    if let Some(member) = member {
        if member
            .permissions
            .is_some_and(|p| p.administrator() || p.manage_guild())
        {
            return Ok(true);
        }
        if let Some(guild_id) = ctx.guild_id() {
            let guild = ctx.data().guilds.get(guild_id).await?;
            let manager_role = guild.lock().await.settings.manager_role;
            if manager_role.is_some_and(|role| member.roles.contains(&role.id())) {
                return Ok(true);
            }
        }
    }

    reply_ephemeral(
        ctx,
        "❌ You need Manage Server or the manager role to do that.",
    )
    .await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_humantime() {
        assert_eq!(parse_duration("2d 4h").unwrap(), chrono::Duration::hours(52));
        assert_eq!(parse_duration(" 90m ").unwrap(), chrono::Duration::minutes(90));
        let err = parse_duration("soon").unwrap_err();
        assert!(err.downcast_ref::<UserError>().is_some());
    }

    #[test]
    fn choices_match_anywhere_ignoring_case() {
        let names = vec!["Bartender".to_string(), "Dancer".to_string(), "Bar Back".to_string()];
        assert_eq!(
            filter_choices(names.clone(), "bar"),
            vec!["Bartender".to_string(), "Bar Back".to_string()]
        );
        assert_eq!(filter_choices(names.clone(), "").len(), 3);
        assert!(filter_choices(names, "security").is_empty());
    }

    #[test]
    fn command_tree_has_unique_names() {
        let commands = all();
        let mut names: Vec<_> = commands.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), commands.len());
        assert!(commands.iter().all(|c| !c.subcommands.is_empty()));
    }
}
