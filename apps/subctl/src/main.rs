use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shared::domain::{FetchFrequency, Subscription, SubscriptionId, UserId};
use subscription_engine::{
    hour_to_time_string, EngineError, EngineEvent, EngineOptions, HttpApiOptions, HttpRemoteApi,
    Notice, NoticeLevel, PendingAction, SubscriptionEngine,
};
use tokio::sync::broadcast;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod settings;

use settings::load_settings;

#[derive(Parser, Debug)]
#[command(name = "subctl", about = "Manage content subscriptions and the fetch schedule")]
struct Cli {
    #[arg(long, default_value = "subctl.toml")]
    config: PathBuf,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    user_id: Option<i64>,
    /// Skip the confirmation prompt for gated actions.
    #[arg(long, short = 'y', global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the source catalog.
    Search { query: Vec<String> },
    /// List current subscriptions.
    List,
    /// Subscribe to a catalog template.
    Add {
        template_id: String,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Catalog search text used to find the template; defaults to its id.
        #[arg(long)]
        query: Option<String>,
    },
    Delete { id: i64 },
    Enable { id: i64 },
    Disable { id: i64 },
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    AutoFetch { state: Switch },
    Quota,
    FetchNow,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        frequency: Option<FetchFrequency>,
        /// Preferred fetch time as HH:00.
        #[arg(long)]
        time: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(url) = cli.api_url {
        settings.api_url = url;
    }
    if let Some(user_id) = cli.user_id {
        settings.user_id = user_id;
    }
    debug!("subctl: using api_url={} user_id={}", settings.api_url, settings.user_id);

    let mut api_options = HttpApiOptions::new(settings.api_url.clone(), UserId(settings.user_id));
    api_options.bearer_token = settings.bearer_token.clone();
    api_options.request_timeout = settings.request_timeout();
    api_options.search_limit = settings.search_limit;
    let api = HttpRemoteApi::new(api_options)?;

    let engine = SubscriptionEngine::new(
        Arc::new(api),
        EngineOptions {
            debounce: settings.debounce(),
            ..EngineOptions::default()
        },
    );
    let mut events = engine.subscribe_events();

    let result = run(&engine, cli.command, cli.yes).await;
    print_notices(&mut events);
    result
}

async fn run(engine: &SubscriptionEngine, command: Command, yes: bool) -> Result<()> {
    match command {
        Command::Search { query } => {
            let text = query.join(" ");
            let outcome = engine.search().search(&text).await;
            let results = outcome.results();
            if results.is_empty() {
                println!("no matching sources");
            }
            for result in results {
                println!("{}\t{}\t{}", result.id, result.platform, result.display_name);
            }
        }
        Command::List => {
            engine.subscriptions().list().await?;
            print_subscriptions(&engine.subscriptions().subscriptions());
        }
        Command::Add {
            template_id,
            params,
            query,
        } => {
            let text = query.unwrap_or_else(|| template_id.clone());
            let outcome = engine.search().search(&text).await;
            let Some(source) = outcome
                .results()
                .iter()
                .find(|result| result.id.as_str() == template_id)
            else {
                bail!("template '{template_id}' not found in catalog search for '{text}'");
            };
            let mut form = engine.select(source);
            debug!("subctl: filling form for {}", form.source().display_name);
            for (name, value) in params {
                if !form.set_value(&name, value) {
                    let known: Vec<&str> =
                        form.schema().iter().map(|field| field.name.as_str()).collect();
                    bail!(
                        "template '{template_id}' has no parameter '{name}' (expected: {})",
                        known.join(", ")
                    );
                }
            }
            engine.subscriptions().list().await?;
            match engine.submit(&mut form).await {
                Ok(created) => println!("subscribed id={} {}", created.id, created.display_name),
                Err(EngineError::Validation(errors)) => {
                    for (field, message) in errors {
                        eprintln!("{field}: {message}");
                    }
                    bail!("subscription form is invalid");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Delete { id } => {
            let id = SubscriptionId(id);
            let store = engine.subscriptions();
            store.list().await?;
            let action = store.delete(id)?;
            if confirm_action(yes, &action)? {
                store.confirm(id).await?;
                println!("deleted subscription {id}");
            } else {
                store.cancel(id)?;
                println!("cancelled");
            }
        }
        Command::Enable { id } => toggle_subscription(engine, SubscriptionId(id), true, yes).await?,
        Command::Disable { id } => {
            toggle_subscription(engine, SubscriptionId(id), false, yes).await?
        }
        Command::Config { action } => {
            let settings = engine.fetch_config();
            let config = settings.load().await?;
            match action {
                ConfigCommand::Show => {
                    println!("auto_fetch\t{}", on_off(config.auto_fetch_enabled));
                    println!(
                        "frequency\t{} (every {} day(s))",
                        config.frequency,
                        config.frequency.interval_days()
                    );
                    println!(
                        "time\t{}",
                        hour_to_time_string(i64::from(config.preferred_hour))
                    );
                    println!("daily_limit\t{}", config.daily_limit);
                    if let Some(timezone) = &config.timezone {
                        println!("timezone\t{timezone}");
                    }
                }
                ConfigCommand::Set { frequency, time } => {
                    if frequency.is_none() && time.is_none() {
                        bail!("nothing to change; pass --frequency and/or --time");
                    }
                    if let Some(frequency) = frequency {
                        settings.set_frequency(frequency)?;
                    }
                    if let Some(time) = time {
                        settings.set_preferred_time(&time).map_err(|err| match err {
                            EngineError::Validation(errors) => anyhow::anyhow!(errors
                                .into_values()
                                .collect::<Vec<_>>()
                                .join("; ")),
                            other => other.into(),
                        })?;
                    }
                    let saved = settings.save().await?;
                    println!(
                        "saved: {} at {}",
                        saved.frequency,
                        hour_to_time_string(i64::from(saved.preferred_hour))
                    );
                }
            }
        }
        Command::AutoFetch { state } => {
            let enabled = matches!(state, Switch::On);
            let settings = engine.fetch_config();
            settings.load().await?;
            let action = settings.request_auto_fetch(enabled)?;
            if confirm_action(yes, &action)? {
                let config = settings.confirm_auto_fetch().await?;
                println!("auto-fetch is {}", on_off(config.auto_fetch_enabled));
            } else {
                settings.cancel_auto_fetch()?;
                println!(
                    "cancelled; auto-fetch stays {}",
                    on_off(settings.displayed_auto_fetch().unwrap_or(!enabled))
                );
            }
        }
        Command::Quota => {
            let quota = engine.fetch_config().refresh_quota().await?;
            println!(
                "used {}/{} today, {} remaining",
                quota.current_count, quota.daily_limit, quota.remaining_count
            );
            if let Some(last) = quota.last_fetch_at {
                println!("last fetch at {}", last.to_rfc3339());
            }
        }
        Command::FetchNow => {
            let settings = engine.fetch_config();
            settings.refresh_quota().await?;
            let action = settings.request_manual_fetch()?;
            if confirm_action(yes, &action)? {
                let report = settings.confirm_manual_fetch().await?;
                println!("{}", report.message);
                if let Some(quota) = settings.quota() {
                    println!("{} fetches remaining today", quota.remaining_count);
                }
            } else {
                settings.cancel_manual_fetch()?;
                println!("cancelled");
            }
        }
    }
    Ok(())
}

async fn toggle_subscription(
    engine: &SubscriptionEngine,
    id: SubscriptionId,
    value: bool,
    yes: bool,
) -> Result<()> {
    let store = engine.subscriptions();
    store.list().await?;
    let action = store.set_active(id, value)?;
    if confirm_action(yes, &action)? {
        let updated = store.confirm(id).await?;
        if let Some(subscription) = updated {
            println!(
                "subscription {} is {}",
                subscription.id,
                on_off(subscription.is_active)
            );
        }
    } else {
        store.cancel(id)?;
        println!("cancelled");
    }
    Ok(())
}

fn confirm_action(yes: bool, action: &PendingAction) -> Result<bool> {
    if yes {
        info!("subctl: confirmed {:?} on {} via --yes", action.kind, action.target);
        return Ok(true);
    }
    print!("{:?} {}? [y/N] ", action.kind, action.target);
    io::stdout().flush().context("failed to flush prompt")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_subscriptions(subscriptions: &[Subscription]) {
    if subscriptions.is_empty() {
        println!("no subscriptions");
        return;
    }
    for subscription in subscriptions {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            subscription.id,
            on_off(subscription.is_active),
            subscription.platform,
            subscription.display_name,
            subscription.target_identifier
        );
    }
}

fn print_notices(events: &mut broadcast::Receiver<EngineEvent>) {
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::Notice(Notice {
            level,
            title,
            message,
        }) = event
        {
            match level {
                NoticeLevel::Success => eprintln!("{title}: {message}"),
                NoticeLevel::Failure => eprintln!("error: {title}: {message}"),
            }
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
