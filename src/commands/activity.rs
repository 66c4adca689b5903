//! Command bodies shared by `/giveaway` and `/raffle`.

use crate::activity::lifecycle::{self, NotifyReport};
use crate::activity::render::{discord_timestamp, mention_list};
use crate::activity::{Activity, ActivityDetails, ActivityError, ActivityKind, ActivityStatus};
use crate::commands::{defaults, guild};
use crate::config::DISCORD_EMBED_LIMIT;
use crate::{Context, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use poise::CreateReply;
use tracing::info;

/// Stores a freshly built draft and, if asked, starts it right away.
pub async fn create<A: Activity>(ctx: Context<'_>, draft: A, start_now: bool) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    ctx.defer().await?;

    let stored = ctx.data().api.create(&draft).await?;
    let id = stored.id();
    A::manager_mut(&mut *guild.lock().await).insert(stored);
    info!(
        "{} {} created in guild {} by {}",
        A::KIND,
        id,
        draft.details().guild_id,
        ctx.author().id
    );

    if !start_now {
        ctx.say(format!(
            "📝 Saved draft {} **#{}**. Run `/{} start id:{}` when it's ready.",
            A::KIND,
            id,
            A::KIND,
            id
        ))
        .await?;
        return Ok(());
    }
    start::<A>(ctx, id).await
}

pub async fn start<A: Activity>(ctx: Context<'_>, id: u64) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    ctx.defer().await?;
    let started = lifecycle::start::<A>(
        ctx.http(),
        &ctx.data().api,
        &guild,
        id,
        defaults(ctx),
    )
    .await?;
    let link = started
        .details()
        .message
        .map(|m| m.jump_url(guild_id))
        .unwrap_or_default();
    ctx.say(format!(
        "{} **{}** is live! {}",
        A::KIND.emoji(),
        started.details().title,
        link
    ))
    .await?;
    Ok(())
}

/// Applies `edit` to a copy so a failed validation leaves the record untouched.
/// A failed save puts the old record back.
pub async fn edit<A, F>(ctx: Context<'_>, id: u64, edit: F) -> Result<(), Error>
where
    A: Activity,
    F: FnOnce(&mut A, DateTime<Utc>) -> Result<(), ActivityError> + Send,
{
    let (_, guild) = guild(ctx).await?;
    let (edited, previous) = {
        let mut guild = guild.lock().await;
        let stored = A::manager_mut(&mut guild).require_mut(id)?;
        let mut copy = stored.clone();
        edit(&mut copy, Utc::now())?;
        let previous = std::mem::replace(stored, copy.clone());
        (copy, previous)
    };
    ctx.defer().await?;
    lifecycle::commit(
        ctx.http(),
        &ctx.data().api,
        &guild,
        &edited,
        previous,
        defaults(ctx),
    )
    .await?;
    ctx.say(format!("✅ Updated {} **#{}**.", A::KIND, id))
        .await?;
    Ok(())
}

fn describe_report(report: &NotifyReport) -> String {
    let mut parts = Vec::new();
    if !report.fallback.is_empty() {
        parts.push(format!(
            "{} winner(s) had DMs closed and were pinged in the channel",
            report.fallback.len()
        ));
    }
    if !report.failed.is_empty() {
        parts.push(format!(
            "couldn't reach {}",
            mention_list(&report.failed)
        ));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("\n-# {}", parts.join("; "))
    }
}

pub async fn end<A: Activity>(ctx: Context<'_>, id: u64) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    ctx.defer().await?;
    let (ended, report) = lifecycle::conclude::<A>(
        ctx.http(),
        &ctx.data().api,
        &guild,
        id,
        defaults(ctx),
    )
    .await?;
    let winners = &ended.details().winners;
    let summary = if winners.is_empty() {
        "nobody entered, so there are no winners".to_string()
    } else {
        format!("winners: {}", mention_list(winners))
    };
    ctx.send(
        CreateReply::default()
            .content(format!(
                "🏁 Ended **{}**: {}.{}",
                ended.details().title,
                summary,
                describe_report(&report)
            ))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

pub async fn reroll<A: Activity>(ctx: Context<'_>, id: u64, count: Option<u32>) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    ctx.defer().await?;
    let (rerolled, report) = lifecycle::reroll::<A>(
        ctx.http(),
        &ctx.data().api,
        &guild,
        id,
        count,
        defaults(ctx),
    )
    .await?;
    ctx.send(
        CreateReply::default()
            .content(format!(
                "🔁 New winner(s) for **{}**: {}{}",
                rerolled.details().title,
                mention_list(&rerolled.details().winners),
                describe_report(&report)
            ))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

pub async fn cancel<A: Activity>(ctx: Context<'_>, id: u64) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    ctx.defer().await?;
    let cancelled =
        lifecycle::cancel::<A>(ctx.http(), &ctx.data().api, &guild, id, defaults(ctx)).await?;
    ctx.say(format!(
        "🛑 Cancelled {} **{}**.",
        A::KIND,
        cancelled.details().title
    ))
    .await?;
    Ok(())
}

fn list_line(details: &ActivityDetails, guild_id: serenity::GuildId) -> String {
    let when = match (details.status, details.ends_at, details.ended_at) {
        (ActivityStatus::Ended | ActivityStatus::Cancelled, _, Some(at)) => {
            format!("ended {}", discord_timestamp(at, 'R'))
        }
        (_, Some(at), _) => format!("ends {}", discord_timestamp(at, 'R')),
        _ => "no end time".to_string(),
    };
    let link = details
        .message
        .map(|m| format!(" · [jump]({})", m.jump_url(guild_id)))
        .unwrap_or_default();
    format!(
        "`#{}` **{}** · {} · {}{}",
        details.id, details.title, details.status, when, link
    )
}

/// Open activities first, then the most recent finished ones.
pub async fn list<A: Activity>(ctx: Context<'_>, include_finished: bool) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let (color, lines) = {
        let guild = guild.lock().await;
        let mut items: Vec<&A> = A::manager(&guild)
            .iter()
            .filter(|a| include_finished || a.details().is_open())
            .collect();
        items.sort_by_key(|a| (!a.details().is_open(), std::cmp::Reverse(a.details().created_at)));
        let lines: Vec<String> = items
            .into_iter()
            .map(|a| list_line(a.details(), guild_id))
            .collect();
        (guild.accent_color(defaults(ctx).embed_color), lines)
    };

    if lines.is_empty() {
        ctx.say(format!("📭 No {}s to show.", A::KIND)).await?;
        return Ok(());
    }

    let mut description = String::new();
    let mut shown = 0;
    for line in &lines {
        if description.len() + line.len() + 32 > DISCORD_EMBED_LIMIT {
            break;
        }
        description.push_str(line);
        description.push('\n');
        shown += 1;
    }
    if shown < lines.len() {
        description.push_str(&format!("…and {} more", lines.len() - shown));
    }

    let title = match A::KIND {
        ActivityKind::Giveaway => "Giveaways",
        ActivityKind::Raffle => "Raffles",
    };
    ctx.send(
        CreateReply::default().embed(
            serenity::CreateEmbed::new()
                .title(format!("{} {}", A::KIND.emoji(), title))
                .description(description)
                .color(color),
        ),
    )
    .await?;
    Ok(())
}

/// Entrants sorted by weight, heaviest first.
pub async fn entries<A: Activity>(ctx: Context<'_>, id: u64) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (title, lines, total_users, total_weight) = {
        let guild = guild.lock().await;
        let activity = A::manager(&guild).require(id)?;
        let mut entries: Vec<_> = activity.entries().iter().collect();
        entries.sort_by(|a, b| b.quantity.cmp(&a.quantity).then(a.entered_at.cmp(&b.entered_at)));
        let lines: Vec<String> = entries
            .iter()
            .map(|e| {
                if e.quantity == 1 {
                    format!("<@{}>", e.user_id)
                } else {
                    format!("<@{}> × {}", e.user_id, e.quantity)
                }
            })
            .collect();
        (
            activity.details().title.clone(),
            lines,
            activity.entries().len(),
            activity.entries().total_weight(),
        )
    };

    let mut description = String::new();
    for (shown, line) in lines.iter().enumerate() {
        if description.len() + line.len() + 32 > DISCORD_EMBED_LIMIT {
            description.push_str(&format!("…and {} more", lines.len() - shown));
            break;
        }
        description.push_str(line);
        description.push('\n');
    }
    if description.is_empty() {
        description.push_str("No entries yet.");
    }

    ctx.send(
        CreateReply::default()
            .embed(
                serenity::CreateEmbed::new()
                    .title(format!("{} Entries for {}", A::KIND.emoji(), title))
                    .description(description)
                    .footer(serenity::CreateEmbedFooter::new(format!(
                        "{} entrant(s) · {} entries",
                        total_users, total_weight
                    ))),
            )
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
