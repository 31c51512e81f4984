//! Smoke client for a live chat server.
//!
//! Run with: cargo run -p smoke-client -- <host> <port> <user> <password>
//!
//! Any argument can instead come from `POLLCHAT_HOST`, `POLLCHAT_PORT`,
//! `POLLCHAT_USER` and `POLLCHAT_PASSWORD`. Set `POLLCHAT_SEND_TO` and
//! `POLLCHAT_SEND_BODY` to send one message (use `all` to broadcast).

use std::{env, time::Duration};

use anyhow::{Context, bail};
use pollchat_core::{EngineConfig, Recipient};
use pollchat_session::{EngineEvent, SendOutcome, SessionEngine};
use pollchat_transport::HttpConnector;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,pollchat_session=debug";

struct Args {
    host: String,
    port: String,
    username: String,
    password: String,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut positional = env::args().skip(1);
        let mut next = |var: &str| positional.next().or_else(|| env::var(var).ok());

        let host = next("POLLCHAT_HOST").unwrap_or_else(|| "localhost".to_owned());
        let port = next("POLLCHAT_PORT").unwrap_or_default();
        let username = next("POLLCHAT_USER").context("missing username (arg 3 or POLLCHAT_USER)")?;
        let password =
            next("POLLCHAT_PASSWORD").context("missing password (arg 4 or POLLCHAT_PASSWORD)")?;
        Ok(Self {
            host,
            port,
            username,
            password,
        })
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter_from_env())
        .init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(value) = env::var("POLLCHAT_LOG").ok().filter(|v| !v.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(value) {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse()?;
    let config = EngineConfig::from_env()?;
    let engine = SessionEngine::new(HttpConnector::new(config.request_timeout), config);

    if !engine.ping(&args.host, &args.port).await {
        bail!("server at {}:{} did not answer ping", args.host, args.port);
    }
    tracing::info!("ping ok");

    let mut events = engine.subscribe();
    engine
        .login(&args.host, &args.port, &args.username, &args.password)
        .await
        .context("login failed")?;

    let first_tick = async {
        while let Ok(event) = events.recv().await {
            if matches!(event, EngineEvent::RosterUpdated { .. }) {
                break;
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), first_tick).await.is_err() {
        tracing::warn!("no roster received within 10s");
    }

    for user in engine.roster().iter() {
        let status = if user.is_online { "online" } else { "offline" };
        println!("{:<24} {status}", user.username);
    }

    if let (Ok(to), Ok(body)) = (env::var("POLLCHAT_SEND_TO"), env::var("POLLCHAT_SEND_BODY")) {
        match engine.send(&body, &to).await {
            SendOutcome::Broadcast(handle) => {
                let report = handle.report().await;
                println!(
                    "broadcast: {} delivered, {} failed",
                    report.delivered.len(),
                    report.failed.len()
                );
            }
            outcome => println!("send to {to}: {outcome:?}"),
        }
    }

    for message in engine.messages() {
        let to = match &message.recipient {
            Recipient::Everyone => "everyone",
            Recipient::Me => "me",
            Recipient::User(name) => name.as_str(),
        };
        println!("{} -> {to}: {}", message.sender, message.body);
    }

    engine.shutdown().await;
    tracing::info!("logged out");
    Ok(())
}
