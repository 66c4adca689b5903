//! Activity side effects against a stub standing in for the venue API and Discord.

mod common;

use chrono::{Duration, Utc};
use common::{client, discord, login_response, spawn_stub, Request};
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use stagehand::activity::lifecycle::{self, SyncOutcome};
use stagehand::activity::{Activity, ActivityStatus, Giveaway};
use stagehand::config::ActivityDefaults;
use stagehand::guild::GuildData;
use stagehand::lazy::{LazyChannel, LazyMessage};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// An active giveaway whose end time has passed. It has no channel, so
/// ending it never posts anything.
fn due_giveaway(id: u64, entrants: &[u64]) -> Giveaway {
    let now = Utc::now();
    let mut giveaway =
        Giveaway::new(GuildId::new(1), UserId::new(2), "Gala", "A dress", now).unwrap();
    giveaway.details.id = id;
    giveaway
        .details
        .set_channel(LazyChannel(ChannelId::new(3)))
        .unwrap();
    giveaway
        .details
        .set_end_time(now + Duration::hours(1), now, &ActivityDefaults::default())
        .unwrap();
    giveaway.details.start(now).unwrap();
    for &user in entrants {
        giveaway.toggle_entry(UserId::new(user), &[], now).unwrap();
    }
    giveaway.details.channel = None;
    giveaway.details.ends_at = Some(now - Duration::minutes(1));
    giveaway
}

fn guild_with(giveaway: Giveaway) -> Mutex<GuildData> {
    let mut guild = GuildData::new(GuildId::new(1));
    guild.giveaways.insert(giveaway);
    Mutex::new(guild)
}

/// Logs in fine, then fails every other request.
async fn failing_stub() -> String {
    let logins = Arc::new(AtomicUsize::new(0));
    spawn_stub(move |req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/auth/login") => login_response(&logins),
        _ => (500, r#"{"error":"boom"}"#.to_string()),
    })
    .await
}

type Saved = Arc<StdMutex<Vec<(String, serde_json::Value)>>>;

fn record_put(saved: &Saved, req: &Request) -> (u16, String) {
    let body = serde_json::from_str(&req.body).unwrap_or(serde_json::Value::Null);
    saved.lock().unwrap().push((req.path.clone(), body));
    (200, String::new())
}

#[tokio::test]
async fn failed_save_leaves_activity_running() {
    let base = failing_stub().await;
    let (http, api) = (discord(&base), client(&base));
    let guild = guild_with(due_giveaway(5, &[10]));

    let result =
        lifecycle::conclude::<Giveaway>(&http, &api, &guild, 5, &ActivityDefaults::default())
            .await;
    assert!(result.is_err());

    let guild = guild.lock().await;
    let stored = guild.giveaways.get(5).unwrap();
    assert_eq!(stored.details.status, ActivityStatus::Active);
    assert!(stored.details.winners.is_empty());
    assert!(stored.details.past_winners.is_empty());
    // The next sweep tries again.
    assert_eq!(guild.giveaways.due(Utc::now()), vec![5]);
}

#[tokio::test]
async fn conclude_saves_the_draw() {
    let logins = Arc::new(AtomicUsize::new(0));
    let saved: Saved = Arc::default();
    let puts = saved.clone();
    let base = spawn_stub(move |req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/auth/login") => login_response(&logins),
        ("PUT", _) => record_put(&puts, req),
        _ => (500, String::new()),
    })
    .await;
    let (http, api) = (discord(&base), client(&base));
    let guild = guild_with(due_giveaway(5, &[]));

    let (ended, report) =
        lifecycle::conclude::<Giveaway>(&http, &api, &guild, 5, &ActivityDefaults::default())
            .await
            .unwrap();
    assert_eq!(ended.details.status, ActivityStatus::Ended);
    assert!(report.dm.is_empty() && report.failed.is_empty());

    let saved = saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "/guilds/1/giveaways/5");
    assert_eq!(saved[0].1["status"], "ended");
    assert_eq!(
        guild.lock().await.giveaways.get(5).unwrap().details.status,
        ActivityStatus::Ended
    );
}

#[tokio::test]
async fn failed_reroll_keeps_previous_winners() {
    let base = failing_stub().await;
    let (http, api) = (discord(&base), client(&base));
    let mut giveaway = due_giveaway(6, &[10, 11, 12]);
    giveaway.conclude(Utc::now(), &mut rand::rng()).unwrap();
    let before = giveaway.details.clone();
    let guild = guild_with(giveaway);

    let result = lifecycle::reroll::<Giveaway>(
        &http,
        &api,
        &guild,
        6,
        None,
        &ActivityDefaults::default(),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(guild.lock().await.giveaways.get(6).unwrap().details, before);
}

#[tokio::test]
async fn failed_cancel_keeps_activity_open() {
    let base = failing_stub().await;
    let (http, api) = (discord(&base), client(&base));
    let guild = guild_with(due_giveaway(7, &[]));

    let result =
        lifecycle::cancel::<Giveaway>(&http, &api, &guild, 7, &ActivityDefaults::default()).await;
    assert!(result.is_err());
    assert_eq!(
        guild.lock().await.giveaways.get(7).unwrap().details.status,
        ActivityStatus::Active
    );
}

#[tokio::test]
async fn deleted_post_is_forgotten_and_saved_again() {
    let logins = Arc::new(AtomicUsize::new(0));
    let saved: Saved = Arc::default();
    let puts = saved.clone();
    let base = spawn_stub(move |req| match req.method.as_str() {
        "POST" if req.path == "/auth/login" => login_response(&logins),
        "PUT" => record_put(&puts, req),
        // Editing the posted message on Discord.
        "PATCH" => (404, r#"{"code":10008,"message":"Unknown Message"}"#.to_string()),
        _ => (500, String::new()),
    })
    .await;
    let (http, api) = (discord(&base), client(&base));
    let mut giveaway = due_giveaway(8, &[]);
    giveaway.details.message = Some(LazyMessage::new(ChannelId::new(3), MessageId::new(4)));
    let guild = guild_with(giveaway.clone());

    let outcome = lifecycle::push(&http, &api, &guild, &giveaway, &ActivityDefaults::default())
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Missing);
    assert!(guild
        .lock()
        .await
        .giveaways
        .get(8)
        .unwrap()
        .details
        .message
        .is_none());

    let saved = saved.lock().unwrap();
    assert_eq!(saved.len(), 2);
    assert!(!saved[0].1["message"].is_null());
    assert!(saved[1].1["message"].is_null());
}
