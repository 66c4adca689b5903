use crate::activity::lifecycle;
use crate::activity::{Activity, Raffle};
use crate::commands::{activity, defaults, ends_in, guild, is_manager};
use crate::lazy::LazyChannel;
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::info;

/// Run raffles
#[poise::command(
    slash_command,
    subcommands(
        "create", "start", "edit", "tickets", "end", "reroll", "cancel", "list", "entries"
    ),
    check = "is_manager",
    guild_only
)]
pub async fn raffle(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create a raffle and post it
#[allow(clippy::too_many_arguments)]
#[poise::command(slash_command)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "What the raffle is called"] title: String,
    #[description = "What the winners get"] prize: String,
    #[description = "How long it runs, e.g. 7d"] duration: String,
    #[description = "Price per ticket (0 lets members claim one free ticket)"] ticket_cost: Option<u64>,
    #[description = "Most tickets one person may hold"]
    #[min = 1]
    max_tickets: Option<u32>,
    #[description = "Number of winners"]
    #[min = 1]
    #[max = 50]
    winners: Option<u32>,
    #[description = "Channel to post in (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
    #[description = "Extra details shown on the post"] description: Option<String>,
    #[description = "Post immediately (default) or save as a draft"] post_now: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let now = Utc::now();
    let mut raffle = Raffle::new(guild_id, ctx.author().id, &title, &prize, now)?;
    raffle.set_ticket_cost(ticket_cost.unwrap_or(0))?;
    raffle.set_max_tickets(max_tickets)?;
    let details = raffle.details_mut();
    details.set_description(description.as_deref())?;
    details.set_winner_count(winners.unwrap_or(defaults(ctx).default_winners))?;
    details.set_channel(LazyChannel(
        channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id()),
    ))?;
    details.set_end_time(ends_in(&duration, now)?, now, defaults(ctx))?;

    activity::create(ctx, raffle, post_now.unwrap_or(true)).await
}

/// Post a draft raffle
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>, #[description = "Raffle id"] id: u64) -> Result<(), Error> {
    activity::start::<Raffle>(ctx, id).await
}

/// Change a raffle that hasn't ended yet
#[allow(clippy::too_many_arguments)]
#[poise::command(slash_command)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Raffle id"] id: u64,
    #[description = "New title"] title: Option<String>,
    #[description = "New prize"] prize: Option<String>,
    #[description = "New details text (use - to clear)"] description: Option<String>,
    #[description = "New number of winners"]
    #[min = 1]
    #[max = 50]
    winners: Option<u32>,
    #[description = "New length, counted from now"] duration: Option<String>,
    #[description = "New ticket price (drafts only)"] ticket_cost: Option<u64>,
    #[description = "New per-person ticket cap (0 removes it)"] max_tickets: Option<u32>,
) -> Result<(), Error> {
    let ends_at = match duration {
        Some(d) => Some(ends_in(&d, Utc::now())?),
        None => None,
    };
    let limits = defaults(ctx).clone();

    activity::edit::<Raffle, _>(ctx, id, move |raffle, now| {
        if let Some(cost) = ticket_cost {
            raffle.set_ticket_cost(cost)?;
        }
        if let Some(max) = max_tickets {
            raffle.set_max_tickets(Some(max).filter(|m| *m > 0))?;
        }
        let details = raffle.details_mut();
        if let Some(title) = &title {
            details.set_title(title)?;
        }
        if let Some(prize) = &prize {
            details.set_prize(prize)?;
        }
        if let Some(description) = &description {
            details.set_description(Some(description.as_str()).filter(|d| d.trim() != "-"))?;
        }
        if let Some(winners) = winners {
            details.set_winner_count(winners)?;
        }
        if let Some(ends_at) = ends_at {
            details.set_end_time(ends_at, now, &limits)?;
        }
        Ok(())
    })
    .await
}

/// Record tickets sold by staff
#[poise::command(slash_command, subcommands("add_tickets", "remove_tickets"))]
pub async fn tickets(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give a member tickets they've paid for
#[poise::command(slash_command, rename = "add")]
pub async fn add_tickets(
    ctx: Context<'_>,
    #[description = "Raffle id"] id: u64,
    #[description = "Who bought the tickets"] user: serenity::User,
    #[description = "How many tickets"]
    #[min = 1]
    quantity: Option<u32>,
) -> Result<(), Error> {
    let quantity = quantity.unwrap_or(1);
    change_tickets(ctx, id, &user, |raffle| {
        raffle.add_tickets(user.id, quantity, Utc::now())
    })
    .await
}

/// Take tickets away from a member
#[poise::command(slash_command, rename = "remove")]
pub async fn remove_tickets(
    ctx: Context<'_>,
    #[description = "Raffle id"] id: u64,
    #[description = "Whose tickets to remove"] user: serenity::User,
    #[description = "How many tickets"]
    #[min = 1]
    quantity: Option<u32>,
) -> Result<(), Error> {
    let quantity = quantity.unwrap_or(1);
    change_tickets(ctx, id, &user, |raffle| {
        raffle.remove_tickets(user.id, quantity)
    })
    .await
}

async fn change_tickets<F>(
    ctx: Context<'_>,
    id: u64,
    user: &serenity::User,
    change: F,
) -> Result<(), Error>
where
    F: FnOnce(&mut Raffle) -> Result<u32, crate::activity::ActivityError>,
{
    let (_, guild) = guild(ctx).await?;
    let (updated, previous, held) = {
        let mut guild = guild.lock().await;
        let raffle = guild.raffles.require_mut(id)?;
        let previous = raffle.clone();
        let held = change(raffle)?;
        (raffle.clone(), previous, held)
    };
    ctx.defer_ephemeral().await?;
    lifecycle::commit(
        ctx.http(),
        &ctx.data().api,
        &guild,
        &updated,
        previous,
        defaults(ctx),
    )
    .await?;
    info!(
        "Tickets for {} in raffle {} set to {} by {}",
        user.id,
        id,
        held,
        ctx.author().id
    );
    ctx.say(format!(
        "🎟️ {} now holds **{}** ticket(s) for **{}** ({} total).",
        user.name,
        held,
        updated.details.title,
        updated.entries.total_weight()
    ))
    .await?;
    Ok(())
}

/// End a raffle now and draw its winners
#[poise::command(slash_command)]
pub async fn end(ctx: Context<'_>, #[description = "Raffle id"] id: u64) -> Result<(), Error> {
    activity::end::<Raffle>(ctx, id).await
}

/// Draw new winners for an ended raffle
#[poise::command(slash_command)]
pub async fn reroll(
    ctx: Context<'_>,
    #[description = "Raffle id"] id: u64,
    #[description = "How many to draw (defaults to the original winner count)"]
    #[min = 1]
    #[max = 50]
    count: Option<u32>,
) -> Result<(), Error> {
    activity::reroll::<Raffle>(ctx, id, count).await
}

/// Cancel a raffle without drawing winners
#[poise::command(slash_command)]
pub async fn cancel(ctx: Context<'_>, #[description = "Raffle id"] id: u64) -> Result<(), Error> {
    activity::cancel::<Raffle>(ctx, id).await
}

/// List this server's raffles
#[poise::command(slash_command)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Include ended and cancelled raffles"] all: Option<bool>,
) -> Result<(), Error> {
    activity::list::<Raffle>(ctx, all.unwrap_or(false)).await
}

/// Show ticket holders for a raffle
#[poise::command(slash_command)]
pub async fn entries(ctx: Context<'_>, #[description = "Raffle id"] id: u64) -> Result<(), Error> {
    activity::entries::<Raffle>(ctx, id).await
}
