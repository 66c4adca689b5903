use crate::activity::ActivityError;
use crate::api::ApiError;
use crate::commands::UserError;
use crate::embeds::EmbedError;
use crate::forms::FormError;
use crate::reaction_roles::ReactionRoleError;
use crate::staff::StaffError;
use crate::vip::VipError;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use poise::{CreateReply, FrameworkError};
use tracing::{error, warn};

pub const FAILURE_COLOR: u32 = 0xED4245;

pub fn failure_embed(message: impl Into<String>) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .description(format!("❌ {}", message.into()))
        .color(FAILURE_COLOR)
}

/// Text for errors caused by what the user asked for. `None` for anything
/// unexpected, which gets logged and hidden behind a generic message.
pub fn expected_message(error: &Error) -> Option<String> {
    macro_rules! expected {
        ($($ty:ty),*) => {
            $(
                if let Some(e) = error.downcast_ref::<$ty>() {
                    return Some(e.to_string());
                }
            )*
        };
    }
    expected!(
        UserError,
        ActivityError,
        StaffError,
        VipError,
        FormError,
        EmbedError,
        ReactionRoleError
    );
    match error.downcast_ref::<ApiError>() {
        Some(ApiError::NotFound(_)) => {
            Some("That no longer exists. It may have been deleted elsewhere.".to_string())
        }
        _ => None,
    }
}

/// The message shown to the user, logging the error if it wasn't expected.
pub fn user_message(error: &Error, origin: &str) -> String {
    expected_message(error).unwrap_or_else(|| {
        error!("Unexpected error in {}: {:?}", origin, error);
        "Something went wrong on my end. Please try again in a moment.".to_string()
    })
}

async fn reply_failure(ctx: crate::Context<'_>, message: impl Into<String>) {
    let reply = CreateReply::default()
        .embed(failure_embed(message))
        .ephemeral(true);
    if let Err(e) = ctx.send(reply).await {
        warn!("Failed to report error to {}: {}", ctx.author().id, e);
    }
}

pub async fn on_error(error: FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Setup { error, .. } => {
            error!("Error during framework setup: {:?}", error);
        }
        FrameworkError::EventHandler { error, event, .. } => {
            error!(
                "Event handler failed on {} event: {:?}",
                event.snake_case_name(),
                error
            );
        }
        FrameworkError::Command { ctx, error, .. } => {
            let origin = format!("/{}", ctx.command().qualified_name);
            reply_failure(ctx, user_message(&error, &origin)).await;
        }
        FrameworkError::ArgumentParse {
            ctx, input, error, ..
        } => {
            let response = match input {
                Some(input) => format!("Couldn't read `{}`: {}", input, error),
                None => format!("Couldn't read the command options: {}", error),
            };
            reply_failure(ctx, response).await;
        }
        FrameworkError::CommandCheckFailed { ctx, error, .. } => {
            // A failed check without an error has already told the user why.
            if let Some(error) = error {
                let origin = format!("check for /{}", ctx.command().qualified_name);
                reply_failure(ctx, user_message(&error, &origin)).await;
            }
        }
        FrameworkError::SubcommandRequired { ctx } => {
            let subcommands: Vec<&str> = ctx
                .command()
                .subcommands
                .iter()
                .map(|s| s.name.as_str())
                .collect();
            reply_failure(
                ctx,
                format!("Pick one of: {}", subcommands.join(", ")),
            )
            .await;
        }
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let response = match missing_permissions {
                Some(missing) => format!("You need {} to use this command.", missing),
                None => "I couldn't check your permissions, so I won't run this command.".to_string(),
            };
            reply_failure(ctx, response).await;
        }
        FrameworkError::MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            reply_failure(
                ctx,
                format!("I'm missing permissions for this: {}", missing_permissions),
            )
            .await;
        }
        FrameworkError::GuildOnly { ctx, .. } => {
            reply_failure(ctx, "This command only works in a server.").await;
        }
        FrameworkError::CommandPanic { ctx, payload, .. } => {
            error!(
                "Command /{} panicked: {:?}",
                ctx.command().qualified_name,
                payload
            );
            reply_failure(ctx, "Something went wrong on my end.").await;
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::user_error;

    #[test]
    fn domain_errors_are_shown_to_users() {
        let error: Error = Box::new(ActivityError::AlreadyEntered);
        assert_eq!(
            expected_message(&error).as_deref(),
            Some("You are already entered.")
        );

        let error = user_error("Pick a shorter name.");
        assert_eq!(expected_message(&error).as_deref(), Some("Pick a shorter name."));

        let error: Error = Box::new(ApiError::NotFound("guilds/1/forms/2".into()));
        assert!(expected_message(&error).is_some());
    }

    #[test]
    fn unexpected_errors_stay_hidden() {
        let error: Error = Box::new(ApiError::Unauthorized);
        assert!(expected_message(&error).is_none());
        assert!(!user_message(&error, "test").contains("credentials"));

        let error: Error = "socket closed".into();
        assert!(expected_message(&error).is_none());
    }
}
