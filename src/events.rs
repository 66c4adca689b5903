//! Gateway events the bot reacts to outside of slash commands: button
//! clicks, modal submits, reactions and guild removal.

use crate::activity::giveaway::{EntryToggle, Giveaway};
use crate::activity::lifecycle;
use crate::activity::raffle::Raffle;
use crate::activity::Activity;
use crate::components::ComponentAction;
use crate::error_handler::{failure_embed, user_message};
use crate::forms::{Form, FormError, FormResponse};
use crate::guild::{log_event, GuildHandle};
use crate::reaction_roles::EmojiKey;
use crate::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::{debug, info, warn};

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::InteractionCreate { interaction } => match interaction {
            serenity::Interaction::Component(component) => {
                handle_component(ctx, data, component).await?
            }
            serenity::Interaction::Modal(modal) => handle_modal(ctx, data, modal).await?,
            _ => {}
        },
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            handle_reaction(ctx, data, framework.bot_id, add_reaction, true).await?
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            handle_reaction(ctx, data, framework.bot_id, removed_reaction, false).await?
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            // Unavailable means an outage, not a kick.
            if !incomplete.unavailable {
                data.guilds.evict(incomplete.id).await;
            }
        }
        _ => {}
    }
    Ok(())
}

fn ephemeral(content: impl Into<String>) -> serenity::CreateInteractionResponse {
    serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let custom_id = &component.data.custom_id;
    let action = match custom_id.parse::<ComponentAction>() {
        Ok(action) => action,
        Err(e) => {
            debug!("Ignoring component click: {}", e);
            return Ok(());
        }
    };
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    let result = route_click(ctx, data, component, guild_id, action).await;

    if let Err(error) = result {
        let message = user_message(&error, &format!("component {}", custom_id));
        let response = serenity::CreateInteractionResponse::Message(
            serenity::CreateInteractionResponseMessage::new()
                .embed(failure_embed(message))
                .ephemeral(true),
        );
        if let Err(e) = component.create_response(&ctx.http, response).await {
            warn!("Failed to report click error to {}: {}", component.user.id, e);
        }
    }
    Ok(())
}

async fn route_click(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
    guild_id: serenity::GuildId,
    action: ComponentAction,
) -> Result<(), Error> {
    let guild = data.guilds.get(guild_id).await?;
    match action {
        ComponentAction::EnterGiveaway(id) => enter_giveaway(ctx, data, component, &guild, id).await,
        ComponentAction::RaffleTickets(id) => raffle_tickets(ctx, data, component, &guild, id).await,
        ComponentAction::OpenForm(form) => open_form_page(ctx, component, &guild, form, 0).await,
        ComponentAction::ContinueForm { form, page } => {
            open_form_page(ctx, component, &guild, form, page).await
        }
        // Only ever carried by modals.
        ComponentAction::SubmitForm { .. } => Ok(()),
    }
}

/// Saves a clicked activity and refreshes its post once the click has been answered.
async fn push_after_click<A: Activity>(ctx: &serenity::Context, data: &Data, guild: &GuildHandle, activity: &A) {
    if let Err(e) = lifecycle::push(&ctx.http, &data.api, guild, activity, &data.config.activity).await {
        warn!(
            "Failed to save {} {} after a click: {}",
            A::KIND,
            activity.id(),
            e
        );
    }
}

async fn enter_giveaway(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
    guild: &GuildHandle,
    id: u64,
) -> Result<(), Error> {
    let roles = component
        .member
        .as_ref()
        .map(|m| m.roles.clone())
        .unwrap_or_default();
    let (toggle, updated) = {
        let mut guild = guild.lock().await;
        let giveaway = Giveaway::manager_mut(&mut guild).require_mut(id)?;
        let toggle = giveaway.toggle_entry(component.user.id, &roles, Utc::now())?;
        (toggle, giveaway.clone())
    };

    let title = &updated.details().title;
    let content = match toggle {
        EntryToggle::Entered => format!("🎉 You're entered in **{}**. Click again to withdraw.", title),
        EntryToggle::Withdrawn => format!("You've withdrawn from **{}**.", title),
    };
    component.create_response(&ctx.http, ephemeral(content)).await?;
    debug!(
        "Giveaway {}: {} {:?}",
        id, component.user.id, toggle
    );
    push_after_click(ctx, data, guild, &updated).await;
    Ok(())
}

async fn raffle_tickets(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
    guild: &GuildHandle,
    id: u64,
) -> Result<(), Error> {
    let user = component.user.id;
    let (content, claimed) = {
        let mut guild = guild.lock().await;
        let raffle = Raffle::manager_mut(&mut guild).require_mut(id)?;
        let title = raffle.details().title.clone();
        if raffle.is_free() {
            raffle.claim_free_ticket(user, Utc::now())?;
            (
                format!("🎟️ You've claimed your free ticket for **{}**. Good luck!", title),
                Some(raffle.clone()),
            )
        } else {
            let content = match raffle.entries().quantity_of(user) {
                0 => format!(
                    "🎟️ You don't hold any tickets for **{}** yet. Tickets cost {} each; ask staff to buy some.",
                    title, raffle.ticket_cost
                ),
                n => format!(
                    "🎟️ You hold **{}** ticket{} for **{}**.",
                    n,
                    if n == 1 { "" } else { "s" },
                    title
                ),
            };
            (content, None)
        }
    };

    component.create_response(&ctx.http, ephemeral(content)).await?;
    if let Some(updated) = claimed {
        push_after_click(ctx, data, guild, &updated).await;
    }
    Ok(())
}

async fn open_form_page(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    guild: &GuildHandle,
    form_id: u64,
    page: usize,
) -> Result<(), Error> {
    let modal = {
        let guild = guild.lock().await;
        let form = guild.forms.get(form_id)?;
        if !form.open {
            return Err(FormError::Closed.into());
        }
        form.modal(page)?
    };
    component
        .create_response(&ctx.http, serenity::CreateInteractionResponse::Modal(modal))
        .await?;
    Ok(())
}

/// Puts modal inputs back in question order using their `q{index}` ids.
fn order_answers(mut inputs: Vec<(String, String)>) -> Vec<String> {
    let index = |id: &str| {
        id.strip_prefix('q')
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
    };
    inputs.sort_by_key(|(id, _)| index(id));
    inputs.into_iter().map(|(_, value)| value).collect()
}

fn modal_answers(rows: &[serenity::ActionRow]) -> Vec<String> {
    let inputs = rows
        .iter()
        .flat_map(|row| row.components.iter())
        .filter_map(|component| match component {
            serenity::ActionRowComponent::InputText(input) => Some((
                input.custom_id.clone(),
                input.value.clone().unwrap_or_default(),
            )),
            _ => None,
        })
        .collect();
    order_answers(inputs)
}

enum Submitted {
    NextPage { form: Form, page: usize },
    Complete { form: Form },
}

async fn handle_modal(
    ctx: &serenity::Context,
    data: &Data,
    modal: &serenity::ModalInteraction,
) -> Result<(), Error> {
    let Ok(ComponentAction::SubmitForm { form, page }) =
        modal.data.custom_id.parse::<ComponentAction>()
    else {
        debug!("Ignoring modal {}", modal.data.custom_id);
        return Ok(());
    };
    let Some(guild_id) = modal.guild_id else {
        return Ok(());
    };

    modal
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Defer(
                serenity::CreateInteractionResponseMessage::new().ephemeral(true),
            ),
        )
        .await?;

    let answers = modal_answers(&modal.data.components);
    let edit = match submit_page(ctx, data, guild_id, modal.user.id, form, page, answers).await {
        Ok(Submitted::NextPage { form, page }) => serenity::EditInteractionResponse::new()
            .content(format!(
                "Page {} of {} saved. Continue when you're ready; your answers are kept for {} minutes.",
                page,
                form.page_count(),
                crate::forms::FormSessions::TTL_MINUTES
            ))
            .components(vec![continue_button(form.id, page, "Continue")]),
        Ok(Submitted::Complete { form }) => serenity::EditInteractionResponse::new()
            .content(format!("✅ Thanks! Your response to **{}** was sent.", form.name))
            .components(vec![]),
        Err(error) => {
            let mut edit = serenity::EditInteractionResponse::new()
                .content(format!("❌ {}", user_message(&error, "form submission")));
            if offers_retry(&error) {
                edit = edit.components(vec![continue_button(form, page, "Try again")]);
            }
            edit
        }
    };
    modal.edit_response(&ctx.http, edit).await?;
    Ok(())
}

/// Errors after which the session still expects the same page.
fn offers_retry(error: &Error) -> bool {
    matches!(
        error.downcast_ref::<FormError>(),
        Some(
            FormError::MissingAnswer(_)
                | FormError::AnswerTooShort { .. }
                | FormError::AnswerTooLong { .. }
                | FormError::NotSent
        )
    )
}

fn continue_button(form: u64, page: usize, label: &str) -> serenity::CreateActionRow {
    serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new(
        ComponentAction::ContinueForm { form, page }.to_string(),
    )
    .label(label)
    .style(serenity::ButtonStyle::Primary)])
}

async fn submit_page(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
    user: serenity::UserId,
    form_id: u64,
    page: usize,
    answers: Vec<String>,
) -> Result<Submitted, Error> {
    let guild = data.guilds.get(guild_id).await?;
    let (form, settings, color) = {
        let guild = guild.lock().await;
        (
            guild.forms.get(form_id)?.clone(),
            guild.settings.clone(),
            guild.accent_color(data.config.activity.embed_color),
        )
    };
    if !form.open {
        data.form_sessions.clear(user, form.id);
        return Err(FormError::Closed.into());
    }
    form.validate_answers(page, &answers)?;

    let now = Utc::now();
    let page_len = answers.len();
    let Some(all) =
        data.form_sessions
            .record_page(user, form.id, page, answers, form.page_count(), now)?
    else {
        return Ok(Submitted::NextPage { form, page: page + 1 });
    };

    let kept = all[..all.len().saturating_sub(page_len)].to_vec();
    let draft = FormResponse::new(&form, user, all, now);
    let response: FormResponse = match data.api.post(&form.responses_path(), &draft).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                "Failed to save response to form {} from {}: {}",
                form.id, user, e
            );
            data.form_sessions.reopen(user, form.id, page, kept, now);
            return Err(FormError::NotSent.into());
        }
    };
    info!(
        "Form '{}' ({}) submitted by {} in guild {}",
        form.name, form.id, user, guild_id
    );

    if let Some(channel) = form.response_channel {
        let message = serenity::CreateMessage::new()
            .embed(response.to_embed(&form.name, color))
            .allowed_mentions(serenity::CreateAllowedMentions::new());
        if let Err(e) = channel.id().send_message(&ctx.http, message).await {
            warn!(
                "Failed to post response to form {} in channel {}: {}",
                form.id,
                channel.id(),
                e
            );
        }
    }
    log_event(
        &ctx.http,
        &settings,
        serenity::CreateEmbed::new()
            .title("📝 Form submitted")
            .description(format!("<@{}> completed **{}**.", user, form.name))
            .color(color),
    )
    .await;

    Ok(Submitted::Complete { form })
}

async fn handle_reaction(
    ctx: &serenity::Context,
    data: &Data,
    bot_id: serenity::UserId,
    reaction: &serenity::Reaction,
    added: bool,
) -> Result<(), Error> {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };
    if user_id == bot_id {
        return Ok(());
    }
    let Some(emoji) = EmojiKey::from_reaction(&reaction.emoji) else {
        return Ok(());
    };

    let guild = data.guilds.get(guild_id).await?;
    if guild
        .lock()
        .await
        .reaction_roles
        .find(reaction.message_id)
        .is_none()
    {
        return Ok(());
    }

    let member = match &reaction.member {
        Some(member) => member.clone(),
        None => guild_id.member(ctx, user_id).await?,
    };
    if member.user.bot {
        return Ok(());
    }

    let changes = {
        let guild = guild.lock().await;
        if added {
            guild
                .reaction_roles
                .on_add(reaction.message_id, &emoji, &member.roles)
        } else {
            guild
                .reaction_roles
                .on_remove(reaction.message_id, &emoji, &member.roles)
        }
    };
    if changes.is_empty() {
        return Ok(());
    }

    for role in &changes.remove {
        if let Err(e) = role.revoke(&ctx.http, user_id, "Reaction role").await {
            warn!("Failed to remove reaction role {} from {}: {}", role.id(), user_id, e);
        }
    }
    for role in &changes.add {
        if let Err(e) = role.grant(&ctx.http, user_id, "Reaction role").await {
            warn!("Failed to give reaction role {} to {}: {}", role.id(), user_id, e);
        }
    }
    debug!(
        "Reaction roles on message {}: +{} -{} for {}",
        reaction.message_id,
        changes.add.len(),
        changes.remove.len(),
        user_id
    );
    Ok(())
}
