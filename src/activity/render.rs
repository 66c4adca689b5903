use crate::activity::{Activity, ActivityKind, ActivityStatus};
use crate::components::ComponentAction;
use crate::config::ActivityDefaults;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{
    ButtonStyle, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter, ReactionType,
    UserId,
};

const ENDED_COLOR: u32 = 0x99AAB5;
const CANCELLED_COLOR: u32 = 0xED4245;

pub fn discord_timestamp(at: DateTime<Utc>, style: char) -> String {
    format!("<t:{}:{}>", at.timestamp(), style)
}

pub fn mention_list(users: &[UserId]) -> String {
    users
        .iter()
        .map(|u| format!("<@{u}>"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The embed shown on the posted activity message. It reflects the current status;
/// open activities use the guild's `accent` colour.
pub fn activity_embed<A: Activity>(activity: &A, accent: u32) -> CreateEmbed {
    let details = activity.details();
    let mut description = String::new();
    if details.status == ActivityStatus::Cancelled {
        description.push_str(&format!("**This {} was cancelled.**\n\n", A::KIND));
    }
    if let Some(text) = &details.description {
        description.push_str(text);
        description.push_str("\n\n");
    }
    description.push_str(&format!("**Prize:** {}", details.prize));

    let color = match details.status {
        ActivityStatus::Ended => ENDED_COLOR,
        ActivityStatus::Cancelled => CANCELLED_COLOR,
        _ => accent,
    };

    let mut embed = CreateEmbed::new()
        .title(format!("{} {}", A::KIND.emoji(), details.title))
        .description(description)
        .color(color)
        .field("Hosted by", details.host.mention(), true);

    match details.status {
        ActivityStatus::Draft | ActivityStatus::Active => {
            if let Some(ends_at) = details.ends_at {
                embed = embed.field(
                    "Ends",
                    format!(
                        "{} ({})",
                        discord_timestamp(ends_at, 'R'),
                        discord_timestamp(ends_at, 'f')
                    ),
                    true,
                );
            }
            embed = embed.field("Winners", details.winner_count.to_string(), true);
        }
        ActivityStatus::Ended => {
            let winners = if details.winners.is_empty() {
                "No valid entries".to_string()
            } else {
                mention_list(&details.winners)
            };
            embed = embed.field("Winners", winners, false);
            if let Some(ended_at) = details.ended_at {
                embed = embed.field("Ended", discord_timestamp(ended_at, 'f'), true);
            }
        }
        ActivityStatus::Cancelled => {}
    }

    for (name, value) in activity.summary_fields() {
        embed = embed.field(name, value, true);
    }

    let kind = match A::KIND {
        ActivityKind::Giveaway => "Giveaway",
        ActivityKind::Raffle => "Raffle",
    };
    embed.footer(CreateEmbedFooter::new(format!("{} #{}", kind, details.id)))
}

/// Buttons for the posted message. Empty once entries are closed, which strips them on edit.
pub fn activity_components<A: Activity>(
    activity: &A,
    defaults: &ActivityDefaults,
    now: DateTime<Utc>,
) -> Vec<CreateActionRow> {
    let details = activity.details();
    if !details.accepting_entries(now) {
        return Vec::new();
    }

    let button = match A::KIND {
        ActivityKind::Giveaway => {
            CreateButton::new(ComponentAction::EnterGiveaway(details.id).to_string())
                .label("Enter")
                .style(ButtonStyle::Success)
                .emoji(ReactionType::Unicode(defaults.enter_emoji.clone()))
        }
        ActivityKind::Raffle => {
            CreateButton::new(ComponentAction::RaffleTickets(details.id).to_string())
                .label("Tickets")
                .style(ButtonStyle::Primary)
                .emoji(ReactionType::Unicode(ActivityKind::Raffle.emoji().to_string()))
        }
    };
    vec![CreateActionRow::Buttons(vec![button])]
}
