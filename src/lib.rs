//! # smsrelay
//!
//! Multi-provider SMS dispatch with automatic failover.
//!
//! ## Features
//!
//! - **Interchangeable gateways**: Nexmo, Twilio, Yunpian and iSMS behind one [`ProviderAdapter`] contract
//! - **Failover**: when a gateway rejects a message, the next eligible provider in registry order is tried, never the same one twice
//! - **Lenient selection**: unknown provider names resolve to the configured default
//! - **Outcome events**: every attempt is reported to an [`OutcomeNotifier`](notifier::OutcomeNotifier)
//! - **Configuration**: files plus `SMSRELAY__*` environment variables
//! - **Observability**: structured logging through `tracing`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smsrelay::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let registry = ProviderRegistry::from_config(&config.providers, &config.dispatch)?;
//!     let transport = HttpTransport::new(std::time::Duration::from_secs(30))?;
//!     let engine = DispatchEngine::new(Arc::new(registry), Arc::new(transport));
//!
//!     let intent = MessageIntent::builder()
//!         .to(["60123456789"])
//!         .message("Hello from smsrelay!")
//!         .build()?;
//!
//!     match engine.send(&intent, true).await? {
//!         Some(body) => println!("accepted: {body}"),
//!         None => println!("every provider failed"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod notifier;
pub mod registry;
pub mod telemetry;
pub mod transport;

pub use crate::config::*;
pub use engine::{
    AttemptOutcome, DispatchAttempt, DispatchEngine, DispatchReport, FailoverPolicy,
    next_candidate,
};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use sms_core::ProviderAdapter;
pub use transport::HttpTransport;

/// Common imports for smsrelay usage
pub mod prelude {
    pub use crate::config::{AppConfig, DispatchConfig, LoggingConfig, ProvidersConfig};
    pub use crate::engine::{
        AttemptOutcome, DispatchAttempt, DispatchEngine, DispatchReport, FailoverPolicy,
    };
    pub use crate::notifier::{
        BroadcastNotifier, Notifiers, OutcomeNotifier, SmsEvent, SmsFailed, SmsSent,
        TracingNotifier,
    };
    pub use crate::registry::ProviderRegistry;
    pub use crate::transport::HttpTransport;
    pub use sms_core::*;
    pub use sms_isms::IsmsProvider;
    pub use sms_nexmo::NexmoProvider;
    pub use sms_twilio::TwilioProvider;
    pub use sms_yunpian::YunpianProvider;
}
