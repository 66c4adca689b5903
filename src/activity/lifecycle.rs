//! Discord side effects of the activity state machine: posting the activity,
//! keeping the posted message in step, and announcing winners.

use crate::activity::render::{activity_components, activity_embed, mention_list};
use crate::activity::{Activity, ActivityError};
use crate::api::ApiClient;
use crate::config::ActivityDefaults;
use crate::guild::{log_event, GuildData};
use crate::lazy::{is_not_found, LazyMessage};
use chrono::Utc;
use serenity::all::{CreateAllowedMentions, CreateEmbed, CreateMessage, EditMessage, UserId};
use serenity::http::Http;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What happened when the posted message was edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated,
    NotPosted,
    /// The message was deleted on Discord.
    Missing,
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NotifyReport {
    pub dm: Vec<UserId>,
    pub fallback: Vec<UserId>,
    pub failed: Vec<UserId>,
}

pub async fn post<A: Activity>(
    http: &Http,
    activity: &A,
    defaults: &ActivityDefaults,
    accent: u32,
) -> Result<LazyMessage, crate::Error> {
    let channel = activity
        .details()
        .channel
        .ok_or(ActivityError::MissingChannel)?;
    let message = channel
        .id()
        .send_message(
            http,
            CreateMessage::new()
                .embed(activity_embed(activity, accent))
                .components(activity_components(activity, defaults, Utc::now())),
        )
        .await?;
    debug!(
        "Posted {} {} as message {} in channel {}",
        A::KIND,
        activity.id(),
        message.id,
        channel.id()
    );
    Ok(LazyMessage::from(&message))
}

/// Edits the posted message to match the current state. Never fails the caller.
pub async fn sync_message<A: Activity>(
    http: &Http,
    activity: &A,
    defaults: &ActivityDefaults,
    accent: u32,
) -> SyncOutcome {
    let Some(message) = activity.details().message else {
        return SyncOutcome::NotPosted;
    };
    let edit = EditMessage::new()
        .embed(activity_embed(activity, accent))
        .components(activity_components(activity, defaults, Utc::now()));
    match message.edit(http, edit).await {
        Ok(_) => SyncOutcome::Updated,
        Err(e) if is_not_found(&e) => {
            info!(
                "Posted message for {} {} is gone; forgetting it",
                A::KIND,
                activity.id()
            );
            SyncOutcome::Missing
        }
        Err(e) => {
            warn!(
                "Failed to update message for {} {}: {}",
                A::KIND,
                activity.id(),
                e
            );
            SyncOutcome::Failed
        }
    }
}

/// DMs every winner, falling back to a mention in the activity channel for
/// anyone who has DMs closed.
pub async fn notify_winners<A: Activity>(http: &Http, activity: &A) -> NotifyReport {
    let details = activity.details();
    let mut report = NotifyReport::default();
    let link = details
        .message
        .map(|m| format!("\n{}", m.jump_url(details.guild_id)))
        .unwrap_or_default();

    for &winner in &details.winners {
        let dm = CreateMessage::new().content(format!(
            "{} You won **{}** in the {} **{}**!{}",
            A::KIND.emoji(),
            details.prize,
            A::KIND,
            details.title,
            link
        ));
        match winner.direct_message(http, dm).await {
            Ok(_) => report.dm.push(winner),
            Err(e) => {
                debug!("Could not DM winner {}: {}", winner, e);
                report.failed.push(winner);
            }
        }
    }

    if report.failed.is_empty() {
        return report;
    }
    let Some(channel) = details.channel else {
        return report;
    };
    let missed = std::mem::take(&mut report.failed);
    let content = format!(
        "{} I couldn't DM {}: you won **{}**! Contact {} to claim it.",
        A::KIND.emoji(),
        mention_list(&missed),
        details.prize,
        details.host.mention()
    );
    let message = CreateMessage::new()
        .content(content)
        .allowed_mentions(CreateAllowedMentions::new().users(missed.clone()));
    match channel.id().send_message(http, message).await {
        Ok(_) => report.fallback = missed,
        Err(e) => {
            warn!(
                "Could not reach winners of {} {} in channel {}: {}",
                A::KIND,
                activity.id(),
                channel.id(),
                e
            );
            report.failed = missed;
        }
    }
    report
}

/// Posts the result in the activity channel, replying to the original post when it still exists.
pub async fn announce_results<A: Activity>(http: &Http, activity: &A) -> Result<(), crate::Error> {
    let details = activity.details();
    let Some(channel) = details.channel else {
        return Ok(());
    };
    let content = if details.winners.is_empty() {
        format!(
            "{} The {} **{}** ended with no valid entries.",
            A::KIND.emoji(),
            A::KIND,
            details.title
        )
    } else {
        format!(
            "{} Congratulations {}! You won **{}**.",
            A::KIND.emoji(),
            mention_list(&details.winners),
            details.prize
        )
    };
    let mut message = CreateMessage::new()
        .content(content)
        .allowed_mentions(CreateAllowedMentions::new().users(details.winners.clone()));
    if let Some(posted) = details.message {
        message = message.reference_message((posted.channel_id, posted.message_id));
    }
    if let Err(e) = channel.id().send_message(http, message).await {
        // A deleted original makes the reply fail; try once more without it.
        if details.message.is_none() {
            return Err(e.into());
        }
        debug!("Reply to posted message failed, sending plainly: {}", e);
        let plain = CreateMessage::new()
            .content(format!(
                "{} Results for **{}**: {}",
                A::KIND.emoji(),
                details.title,
                if details.winners.is_empty() {
                    "no valid entries".to_string()
                } else {
                    mention_list(&details.winners)
                }
            ))
            .allowed_mentions(CreateAllowedMentions::new().users(details.winners.clone()));
        channel.id().send_message(http, plain).await?;
    }
    Ok(())
}

/// Edits the posted message and, if it turned out to be deleted, forgets the
/// reference. Never fails the caller.
pub async fn refresh<A: Activity>(
    http: &Http,
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    activity: &A,
    defaults: &ActivityDefaults,
) -> SyncOutcome {
    let accent = guild.lock().await.accent_color(defaults.embed_color);
    let outcome = sync_message(http, activity, defaults, accent).await;
    if outcome != SyncOutcome::Missing {
        return outcome;
    }
    let cleared = {
        let mut guild = guild.lock().await;
        let Some(stored) = A::manager_mut(&mut guild).get_mut(activity.id()) else {
            return outcome;
        };
        stored.details_mut().message = None;
        stored.clone()
    };
    if let Err(e) = api.update(&cleared).await {
        warn!(
            "Failed to save {} {} without its deleted post: {}",
            A::KIND,
            activity.id(),
            e
        );
    }
    outcome
}

/// Persists an activity whose in-memory copy already holds the change, then
/// re-syncs its message.
pub async fn push<A: Activity>(
    http: &Http,
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    activity: &A,
    defaults: &ActivityDefaults,
) -> Result<SyncOutcome, crate::Error> {
    api.update(activity).await?;
    Ok(refresh(http, api, guild, activity, defaults).await)
}

/// Persists `updated`. If the save fails the stored copy goes back to `previous`.
pub async fn save_or_restore<A: Activity>(
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    updated: &A,
    previous: A,
) -> Result<(), crate::Error> {
    if let Err(e) = api.update(updated).await {
        warn!(
            "Failed to save {} {}, restoring the previous state: {}",
            A::KIND,
            updated.id(),
            e
        );
        let mut guild = guild.lock().await;
        if let Some(stored) = A::manager_mut(&mut guild).get_mut(previous.id()) {
            *stored = previous;
        }
        return Err(e.into());
    }
    Ok(())
}

/// [`save_or_restore`] followed by a message refresh.
pub async fn commit<A: Activity>(
    http: &Http,
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    updated: &A,
    previous: A,
    defaults: &ActivityDefaults,
) -> Result<SyncOutcome, crate::Error> {
    save_or_restore(api, guild, updated, previous).await?;
    Ok(refresh(http, api, guild, updated, defaults).await)
}

/// Posts a draft and marks it active. The draft must already be saved.
pub async fn start<A: Activity>(
    http: &Http,
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    id: u64,
    defaults: &ActivityDefaults,
) -> Result<A, crate::Error> {
    let now = Utc::now();
    let (mut preview, accent) = {
        let guild = guild.lock().await;
        (
            A::manager(&guild).require(id)?.clone(),
            guild.accent_color(defaults.embed_color),
        )
    };
    // Validate before anything reaches Discord.
    preview.details_mut().start(now)?;

    let message = post(http, &preview, defaults, accent).await?;

    let changed = {
        let mut guild = guild.lock().await;
        A::manager_mut(&mut guild).require_mut(id).and_then(|stored| {
            let previous = stored.clone();
            stored.details_mut().start(now)?;
            stored.details_mut().message = Some(message);
            Ok((stored.clone(), previous))
        })
    };
    let saved = match changed {
        Ok((started, previous)) => {
            let result = save_or_restore(api, guild, &started, previous).await;
            result.map(|_| started)
        }
        Err(e) => Err(e.into()),
    };
    let started = match saved {
        Ok(started) => started,
        Err(e) => {
            if let Err(delete) = message.delete(http).await {
                warn!("Failed to remove orphaned post {}: {}", message.id(), delete);
            }
            return Err(e);
        }
    };

    info!(
        "Started {} {} in guild {}",
        A::KIND,
        id,
        started.details().guild_id
    );
    Ok(started)
}

/// Ends an active activity: draws winners, persists, updates the post,
/// announces, notifies winners and logs. Used by commands and the scheduler.
pub async fn conclude<A: Activity>(
    http: &Http,
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    id: u64,
    defaults: &ActivityDefaults,
) -> Result<(A, NotifyReport), crate::Error> {
    let (ended, previous, settings, color) = {
        let mut guild = guild.lock().await;
        let settings = guild.settings.clone();
        let color = guild.accent_color(defaults.embed_color);
        let activity = A::manager_mut(&mut guild).require_mut(id)?;
        let previous = activity.clone();
        {
            let mut rng = rand::rng();
            activity.conclude(Utc::now(), &mut rng)?;
        }
        (activity.clone(), previous, settings, color)
    };

    // Nothing is announced until the draw is saved; a failed save leaves the
    // activity active so the next sweep draws again.
    commit(http, api, guild, &ended, previous, defaults).await?;
    if let Err(e) = announce_results(http, &ended).await {
        warn!("Failed to announce results of {} {}: {}", A::KIND, id, e);
    }
    let report = notify_winners(http, &ended).await;

    let details = ended.details();
    info!(
        "Concluded {} {} in guild {} with {} winner(s) ({} by DM, {} in channel, {} unreachable)",
        A::KIND,
        id,
        details.guild_id,
        details.winners.len(),
        report.dm.len(),
        report.fallback.len(),
        report.failed.len()
    );
    log_event(
        http,
        &settings,
        CreateEmbed::new()
            .title(format!("{} {} ended", A::KIND.emoji(), details.title))
            .description(format!(
                "Winners: {}",
                if details.winners.is_empty() {
                    "none".to_string()
                } else {
                    mention_list(&details.winners)
                }
            ))
            .field("Prize", details.prize.clone(), true)
            .field("Entries", ended.entries().len().to_string(), true)
            .field("Host", details.host.mention(), true)
            .color(color),
    )
    .await;

    Ok((ended, report))
}

/// Draws replacement winners for an ended activity and announces them.
pub async fn reroll<A: Activity>(
    http: &Http,
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    id: u64,
    count: Option<u32>,
    defaults: &ActivityDefaults,
) -> Result<(A, NotifyReport), crate::Error> {
    let (rerolled, previous) = {
        let mut guild = guild.lock().await;
        let activity = A::manager_mut(&mut guild).require_mut(id)?;
        let previous = activity.clone();
        {
            let mut rng = rand::rng();
            activity.reroll(count, &mut rng)?;
        }
        (activity.clone(), previous)
    };

    commit(http, api, guild, &rerolled, previous, defaults).await?;
    if let Err(e) = announce_results(http, &rerolled).await {
        warn!("Failed to announce reroll of {} {}: {}", A::KIND, id, e);
    }
    let report = notify_winners(http, &rerolled).await;
    info!(
        "Rerolled {} {}: {}",
        A::KIND,
        id,
        mention_list(&rerolled.details().winners)
    );
    Ok((rerolled, report))
}

/// Cancels a draft or running activity and updates its post.
pub async fn cancel<A: Activity>(
    http: &Http,
    api: &ApiClient,
    guild: &Mutex<GuildData>,
    id: u64,
    defaults: &ActivityDefaults,
) -> Result<A, crate::Error> {
    let (cancelled, previous) = {
        let mut guild = guild.lock().await;
        let activity = A::manager_mut(&mut guild).require_mut(id)?;
        let previous = activity.clone();
        activity.details_mut().cancel(Utc::now())?;
        (activity.clone(), previous)
    };
    commit(http, api, guild, &cancelled, previous, defaults).await?;
    info!("Cancelled {} {}", A::KIND, id);
    Ok(cancelled)
}
