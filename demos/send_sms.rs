//! Send an SMS through the configured providers, failing over when enabled.
//!
//! Providers come from `config/*.toml` or `SMSRELAY__PROVIDERS__*` variables,
//! e.g. `SMSRELAY__PROVIDERS__NEXMO__API_KEY`.
use smsrelay::prelude::*;
use smsrelay::telemetry::init_tracing;

use std::env;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);

    let to = arg_or_env("--to", "SMS_TO");
    let text = arg_or_env("--text", "SMS_TEXT");
    let driver = optional_arg("--driver");

    let registry = ProviderRegistry::from_config(&config.providers, &config.dispatch)?;
    let transport = HttpTransport::new(Duration::from_secs(
        config.dispatch.request_timeout_seconds,
    ))?;
    let events = BroadcastNotifier::new(16);
    let mut rx = events.subscribe();
    let engine = DispatchEngine::new(Arc::new(registry), Arc::new(transport))
        .with_policy(FailoverPolicy::from(&config.dispatch))
        .with_notifier(Arc::new(
            Notifiers::new()
                .with(Arc::new(TracingNotifier))
                .with(Arc::new(events)),
        ));

    let message = Cli {
        intent: MessageIntent::builder().to([to]).message(text).build()?,
        driver,
    };
    let report = engine.dispatch(&message, config.dispatch.failover).await?;

    while let Ok(event) = rx.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    match report.body {
        Some(body) => println!("Sent (tried {:?})\nRaw: {}", report.queued, body),
        None => println!("Not sent (tried {:?})", report.queued),
    }
    Ok(())
}

struct Cli {
    intent: MessageIntent,
    driver: Option<String>,
}

impl SmsMessage for Cli {
    fn handle(&self) -> Result<MessageIntent, SmsError> {
        Ok(self.intent.clone())
    }

    fn driver(&self) -> Option<&str> {
        self.driver.as_deref()
    }
}

fn optional_arg(flag: &str) -> Option<String> {
    let args: Vec<String> = env::args().collect();
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).cloned()
}

fn arg_or_env(flag: &str, env_key: &str) -> String {
    optional_arg(flag)
        .or_else(|| env::var(env_key).ok())
        .unwrap_or_else(|| panic!("missing {} (arg {} or env {})", flag, flag, env_key))
}
