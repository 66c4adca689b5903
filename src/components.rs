//! Custom ids carried by buttons and modals, so a click can be routed back to
//! the record it belongs to after a restart.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    EnterGiveaway(u64),
    RaffleTickets(u64),
    OpenForm(u64),
    ContinueForm { form: u64, page: usize },
    SubmitForm { form: u64, page: usize },
}

#[derive(Debug, Error, PartialEq)]
#[error("unrecognised component id '{0}'")]
pub struct UnknownComponent(pub String);

impl fmt::Display for ComponentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentAction::EnterGiveaway(id) => write!(f, "giveaway:enter:{id}"),
            ComponentAction::RaffleTickets(id) => write!(f, "raffle:tickets:{id}"),
            ComponentAction::OpenForm(id) => write!(f, "form:open:{id}"),
            ComponentAction::ContinueForm { form, page } => write!(f, "form:continue:{form}:{page}"),
            ComponentAction::SubmitForm { form, page } => write!(f, "form:submit:{form}:{page}"),
        }
    }
}

impl FromStr for ComponentAction {
    type Err = UnknownComponent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownComponent(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        let number = |index: usize| -> Result<u64, UnknownComponent> {
            parts
                .get(index)
                .and_then(|p| p.parse().ok())
                .ok_or_else(unknown)
        };

        let action = match parts.as_slice() {
            ["giveaway", "enter", _] => ComponentAction::EnterGiveaway(number(2)?),
            ["raffle", "tickets", _] => ComponentAction::RaffleTickets(number(2)?),
            ["form", "open", _] => ComponentAction::OpenForm(number(2)?),
            ["form", "continue", _, _] => ComponentAction::ContinueForm {
                form: number(2)?,
                page: number(3)? as usize,
            },
            ["form", "submit", _, _] => ComponentAction::SubmitForm {
                form: number(2)?,
                page: number(3)? as usize,
            },
            _ => return Err(unknown()),
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_survive_a_round_trip() {
        let actions = [
            ComponentAction::EnterGiveaway(5),
            ComponentAction::RaffleTickets(6),
            ComponentAction::OpenForm(7),
            ComponentAction::ContinueForm { form: 7, page: 2 },
            ComponentAction::SubmitForm { form: 7, page: 0 },
        ];
        for action in actions {
            assert_eq!(action.to_string().parse::<ComponentAction>(), Ok(action));
        }
    }

    #[test]
    fn ids_fit_discord_limit() {
        let longest = ComponentAction::ContinueForm {
            form: u64::MAX,
            page: usize::MAX,
        };
        assert!(longest.to_string().len() <= 100);
    }

    #[test]
    fn rejects_foreign_ids() {
        assert!("confirm_tool".parse::<ComponentAction>().is_err());
        assert!("giveaway:enter:abc".parse::<ComponentAction>().is_err());
        assert!("form:submit:1".parse::<ComponentAction>().is_err());
    }
}
