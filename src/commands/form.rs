use crate::commands::{defaults, guild, guild_choices, is_manager, user_error};
use crate::components::ComponentAction;
use crate::forms::{Form, FormError, FormQuestion, QuestionStyle, QUESTIONS_PER_PAGE};
use crate::lazy::LazyChannel;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::CreateReply;
use tracing::info;

async fn autocomplete_form<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    guild_choices(ctx, partial, |guild| {
        guild.forms.iter().map(|f| f.name.clone()).collect()
    })
    .await
    .into_iter()
}

/// Changes a copy of the named form, saves it, then swaps it in.
async fn edit_form<R, F>(ctx: Context<'_>, name: &str, edit: F) -> Result<(Form, R), Error>
where
    F: FnOnce(&mut Form) -> Result<R, FormError>,
{
    let (_, guild) = guild(ctx).await?;
    let mut form = {
        let guild = guild.lock().await;
        guild
            .forms
            .by_name(name)
            .cloned()
            .ok_or_else(|| user_error(format!("There's no form called '{}'.", name)))?
    };
    let result = edit(&mut form)?;
    ctx.data().api.update(&form).await?;
    guild.lock().await.forms.insert(form.clone());
    Ok((form, result))
}

/// Build application forms members fill in through pop-ups
#[poise::command(
    slash_command,
    subcommands("create", "delete", "question", "channel", "open", "close", "post", "show"),
    check = "is_manager",
    guild_only
)]
pub async fn form(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create an empty form
#[poise::command(slash_command)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Form name, e.g. Staff application"] name: String,
    #[description = "Shown on the posted form"] description: Option<String>,
    #[description = "Where completed responses go"]
    #[channel_types("Text")]
    responses: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    guild.lock().await.forms.validate_new(&name)?;

    let mut draft = Form::new(
        guild_id,
        &name,
        description.filter(|d| !d.trim().is_empty()),
    );
    draft.response_channel = responses.map(|c| LazyChannel(c.id));
    let stored = ctx.data().api.create(&draft).await?;
    let reply = format!(
        "📝 Created form **{}**. Add questions with `/form question add`.",
        stored.name
    );
    guild.lock().await.forms.insert(stored);
    info!("Form '{}' created in guild {}", draft.name, guild_id);
    ctx.say(reply).await?;
    Ok(())
}

/// Delete a form
#[poise::command(slash_command)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    name: String,
) -> Result<(), Error> {
    let (guild_id, guild) = guild(ctx).await?;
    let form = {
        let guild = guild.lock().await;
        guild
            .forms
            .by_name(&name)
            .cloned()
            .ok_or_else(|| user_error(format!("There's no form called '{}'.", name)))?
    };
    ctx.data().api.delete_resource(&form).await?;
    guild.lock().await.forms.remove(form.id);
    info!("Form '{}' deleted in guild {}", form.name, guild_id);
    ctx.say(format!(
        "🗑️ Deleted form **{}**. Buttons already posted for it will stop working.",
        form.name
    ))
    .await?;
    Ok(())
}

/// Edit a form's questions
#[poise::command(slash_command, subcommands("add_question", "remove_question"))]
pub async fn question(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a question to the end of a form
#[allow(clippy::too_many_arguments)]
#[poise::command(slash_command, rename = "add")]
pub async fn add_question(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    form: String,
    #[description = "The question, up to 45 characters"] label: String,
    #[description = "Answer box size"] style: Option<QuestionStyle>,
    #[description = "Must it be answered? (default yes)"] required: Option<bool>,
    #[description = "Shortest allowed answer"]
    #[max = 4000]
    min_length: Option<u16>,
    #[description = "Longest allowed answer"]
    #[min = 1]
    #[max = 4000]
    max_length: Option<u16>,
    #[description = "Hint shown in the empty box"] placeholder: Option<String>,
) -> Result<(), Error> {
    let question = FormQuestion::new(
        &label,
        style.unwrap_or(QuestionStyle::Short),
        required.unwrap_or(true),
        min_length,
        max_length,
        placeholder,
    )?;
    let (updated, number) = edit_form(ctx, &form, |f| f.add_question(question)).await?;
    ctx.say(format!(
        "✅ Added question #{} to **{}** (page {} of {}).",
        number,
        updated.name,
        (number - 1) / QUESTIONS_PER_PAGE + 1,
        updated.page_count()
    ))
    .await?;
    Ok(())
}

/// Remove a question by its number
#[poise::command(slash_command, rename = "remove")]
pub async fn remove_question(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    form: String,
    #[description = "Question number, as shown by /form show"]
    #[min = 1]
    number: u32,
) -> Result<(), Error> {
    let (updated, removed) =
        edit_form(ctx, &form, |f| f.remove_question(number as usize)).await?;
    let mut reply = format!("🗑️ Removed \"{}\" from **{}**.", removed.label, updated.name);
    if updated.questions.is_empty() {
        reply.push_str(" The form has no questions left and is now closed.");
    }
    ctx.say(reply).await?;
    Ok(())
}

/// Set where completed responses are posted
#[poise::command(slash_command)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    form: String,
    #[description = "Response channel"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let target = LazyChannel(channel.id);
    let (updated, ()) = edit_form(ctx, &form, |f| {
        f.response_channel = Some(target);
        Ok(())
    })
    .await?;
    ctx.say(format!(
        "✅ Responses to **{}** will be posted in {}.",
        updated.name,
        target.mention()
    ))
    .await?;
    Ok(())
}

/// Start accepting responses
#[poise::command(slash_command)]
pub async fn open(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    form: String,
) -> Result<(), Error> {
    let (updated, ()) = edit_form(ctx, &form, |f| f.set_open(true)).await?;
    ctx.say(format!("🟢 **{}** is open for responses.", updated.name))
        .await?;
    Ok(())
}

/// Stop accepting responses
#[poise::command(slash_command)]
pub async fn close(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    form: String,
) -> Result<(), Error> {
    let (updated, ()) = edit_form(ctx, &form, |f| f.set_open(false)).await?;
    ctx.say(format!("🔴 **{}** is closed.", updated.name)).await?;
    Ok(())
}

/// Post a message with a button that opens the form
#[poise::command(slash_command)]
pub async fn post(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    form: String,
    #[description = "Channel to post in (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
    #[description = "Button text"] button: Option<String>,
) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (form, color) = {
        let guild = guild.lock().await;
        let form = guild
            .forms
            .by_name(&form)
            .cloned()
            .ok_or_else(|| user_error(format!("There's no form called '{}'.", form)))?;
        (form, guild.accent_color(defaults(ctx).embed_color))
    };
    if form.questions.is_empty() {
        return Err(FormError::NoQuestions.into());
    }

    let label: String = button
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "Apply".to_string())
        .chars()
        .take(80)
        .collect();
    let mut embed = serenity::CreateEmbed::new().title(&form.name).color(color);
    if let Some(description) = &form.description {
        embed = embed.description(description);
    }
    let message = serenity::CreateMessage::new()
        .embed(embed)
        .components(vec![serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new(ComponentAction::OpenForm(form.id).to_string())
                .label(label)
                .emoji('📝')
                .style(serenity::ButtonStyle::Primary),
        ])]);

    let target = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    target.send_message(ctx.http(), message).await?;

    let mut reply = format!("✅ Posted **{}** in <#{}>.", form.name, target);
    if !form.open {
        reply.push_str(" It's still closed; run `/form open` when you're ready.");
    }
    ctx.send(CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}

/// Show a form's questions and settings
#[poise::command(slash_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Form"]
    #[autocomplete = autocomplete_form]
    form: String,
) -> Result<(), Error> {
    let (_, guild) = guild(ctx).await?;
    let (form, color) = {
        let guild = guild.lock().await;
        let form = guild
            .forms
            .by_name(&form)
            .cloned()
            .ok_or_else(|| user_error(format!("There's no form called '{}'.", form)))?;
        (form, guild.accent_color(defaults(ctx).embed_color))
    };

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("📝 {}", form.name))
        .color(color)
        .field("Status", if form.open { "Open" } else { "Closed" }, true)
        .field(
            "Responses go to",
            form.response_channel
                .map(|c| c.mention())
                .unwrap_or_else(|| "not set".to_string()),
            true,
        )
        .field("Pages", form.page_count().to_string(), true);
    if let Some(description) = &form.description {
        embed = embed.description(description);
    }
    for (page, range) in form.pages().into_iter().enumerate() {
        let lines: Vec<String> = range
            .map(|i| {
                let q = &form.questions[i];
                format!(
                    "**{}.** {}{}{}",
                    i + 1,
                    q.label,
                    if q.required { "" } else { " *(optional)*" },
                    match q.style {
                        QuestionStyle::Short => "",
                        QuestionStyle::Paragraph => " ¶",
                    }
                )
            })
            .collect();
        embed = embed.field(format!("Page {}", page + 1), lines.join("\n"), false);
    }
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
