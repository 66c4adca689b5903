pub mod activity;
pub mod api;
pub mod commands;
pub mod components;
pub mod config;
pub mod embeds;
pub mod error_handler;
pub mod events;
pub mod forms;
pub mod guild;
pub mod lazy;
pub mod reaction_roles;
pub mod scheduler;
pub mod staff;
pub mod vip;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub api: Arc<api::ApiClient>,
    pub guilds: Arc<guild::GuildRegistry>,
    /// Answers from members part-way through a multi-page form
    pub form_sessions: Arc<forms::FormSessions>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
