use poise::serenity_prelude as serenity;
use stagehand::api::ApiClient;
use stagehand::config::Config;
use stagehand::forms::FormSessions;
use stagehand::guild::GuildRegistry;
use stagehand::scheduler::Scheduler;
use stagehand::{commands, error_handler, events, Data};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();

    let api = Arc::new(ApiClient::from_config(&config)?);
    api.login()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to log in to the venue API: {}", e))?;
    info!("Logged in to the venue API at {}", config.api_base_url);
    let guilds = Arc::new(GuildRegistry::new(api.clone()));

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(error_handler::on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Connected as {}", ready.user.name);

                if config.register_commands {
                    match config.dev_guild_id {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(
                                ctx,
                                &framework.options().commands,
                                serenity::GuildId::new(guild_id),
                            )
                            .await?;
                            info!("Registered commands in development guild {}", guild_id);
                        }
                        None => {
                            poise::builtins::register_globally(ctx, &framework.options().commands)
                                .await?;
                            info!("Registered commands globally");
                        }
                    }
                }

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                // Load every guild up front so the scheduler sees activities
                // that nobody has touched since the restart.
                let preload = guilds.clone();
                let guild_ids: Vec<serenity::GuildId> = ready.guilds.iter().map(|g| g.id).collect();
                tokio::spawn(async move {
                    for guild_id in guild_ids {
                        if let Err(e) = preload.get(guild_id).await {
                            warn!("Failed to load guild {}: {}", guild_id, e);
                        }
                    }
                });

                let form_sessions = Arc::new(FormSessions::new());
                let scheduler = Scheduler::new(
                    ctx.http.clone(),
                    api.clone(),
                    guilds.clone(),
                    form_sessions.clone(),
                    config.activity.clone(),
                    config.scheduler_interval_secs,
                );
                tokio::spawn(scheduler.run());

                Ok(Data {
                    config,
                    api,
                    guilds,
                    form_sessions,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
