use crate::activity::{Activity, Giveaway};
use crate::commands::{activity, defaults, ends_in, is_manager};
use crate::lazy::{LazyChannel, LazyRole};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;

/// Run giveaways
#[poise::command(
    slash_command,
    subcommands("create", "start", "edit", "end", "reroll", "cancel", "list", "entries"),
    check = "is_manager",
    guild_only
)]
pub async fn giveaway(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create a giveaway and post it
#[allow(clippy::too_many_arguments)]
#[poise::command(slash_command)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "What the giveaway is called"] title: String,
    #[description = "What the winners get"] prize: String,
    #[description = "How long it runs, e.g. 2d 4h"] duration: String,
    #[description = "Number of winners"]
    #[min = 1]
    #[max = 50]
    winners: Option<u32>,
    #[description = "Channel to post in (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
    #[description = "Extra details shown on the post"] description: Option<String>,
    #[description = "Only members with this role may enter"] required_role: Option<serenity::Role>,
    #[description = "Post immediately (default) or save as a draft"] post_now: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let now = Utc::now();
    let mut giveaway = Giveaway::new(guild_id, ctx.author().id, &title, &prize, now)?;
    let details = giveaway.details_mut();
    details.set_description(description.as_deref())?;
    details.set_winner_count(winners.unwrap_or(defaults(ctx).default_winners))?;
    details.set_channel(LazyChannel(
        channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id()),
    ))?;
    details.set_end_time(ends_in(&duration, now)?, now, defaults(ctx))?;
    giveaway.set_required_role(required_role.map(|r| LazyRole::new(guild_id, r.id)))?;

    activity::create(ctx, giveaway, post_now.unwrap_or(true)).await
}

/// Post a draft giveaway
#[poise::command(slash_command)]
pub async fn start(
    ctx: Context<'_>,
    #[description = "Giveaway id"] id: u64,
) -> Result<(), Error> {
    activity::start::<Giveaway>(ctx, id).await
}

/// Change a giveaway that hasn't ended yet
#[allow(clippy::too_many_arguments)]
#[poise::command(slash_command)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Giveaway id"] id: u64,
    #[description = "New title"] title: Option<String>,
    #[description = "New prize"] prize: Option<String>,
    #[description = "New details text (use - to clear)"] description: Option<String>,
    #[description = "New number of winners"]
    #[min = 1]
    #[max = 50]
    winners: Option<u32>,
    #[description = "New length, counted from now"] duration: Option<String>,
    #[description = "Role required to enter"] required_role: Option<serenity::Role>,
    #[description = "Let anyone enter again"] clear_required_role: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let ends_at = match duration {
        Some(d) => Some(ends_in(&d, Utc::now())?),
        None => None,
    };
    let limits = defaults(ctx).clone();

    activity::edit::<Giveaway, _>(ctx, id, move |giveaway, now| {
        let details = giveaway.details_mut();
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
        if clear_required_role.unwrap_or(false) {
            giveaway.set_required_role(None)?;
        } else if let Some(role) = &required_role {
            giveaway.set_required_role(Some(LazyRole::new(guild_id, role.id)))?;
        }
        Ok(())
    })
    .await
}

/// End a giveaway now and draw its winners
#[poise::command(slash_command)]
pub async fn end(
    ctx: Context<'_>,
    #[description = "Giveaway id"] id: u64,
) -> Result<(), Error> {
    activity::end::<Giveaway>(ctx, id).await
}

/// Draw new winners for an ended giveaway
#[poise::command(slash_command)]
pub async fn reroll(
    ctx: Context<'_>,
    #[description = "Giveaway id"] id: u64,
    #[description = "How many to draw (defaults to the original winner count)"]
    #[min = 1]
    #[max = 50]
    count: Option<u32>,
) -> Result<(), Error> {
    activity::reroll::<Giveaway>(ctx, id, count).await
}

/// Cancel a giveaway without drawing winners
#[poise::command(slash_command)]
pub async fn cancel(
    ctx: Context<'_>,
    #[description = "Giveaway id"] id: u64,
) -> Result<(), Error> {
    activity::cancel::<Giveaway>(ctx, id).await
}

/// List this server's giveaways
#[poise::command(slash_command)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Include ended and cancelled giveaways"] all: Option<bool>,
) -> Result<(), Error> {
    activity::list::<Giveaway>(ctx, all.unwrap_or(false)).await
}

/// Show who has entered a giveaway
#[poise::command(slash_command)]
pub async fn entries(
    ctx: Context<'_>,
    #[description = "Giveaway id"] id: u64,
) -> Result<(), Error> {
    activity::entries::<Giveaway>(ctx, id).await
}
