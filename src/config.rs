use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use sms_core::{ProviderAdapter, SmsError};
use sms_isms::IsmsProvider;
use sms_nexmo::NexmoProvider;
use sms_twilio::TwilioProvider;
use sms_yunpian::YunpianProvider;
use std::env;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// SMS providers configuration
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Provider selection and failover behavior
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SMS providers configuration. A provider is registered only when its section is present.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    pub nexmo: Option<NexmoConfig>,
    pub twilio: Option<TwilioConfig>,
    pub yunpian: Option<YunpianConfig>,
    pub isms: Option<IsmsConfig>,
}

fn enabled() -> bool {
    true
}

/// Nexmo provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NexmoConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Default sender id
    pub from: Option<String>,
    /// API base URL override
    pub base_url: Option<String>,
    /// May be picked as a failover target (default: true)
    #[serde(default = "enabled")]
    pub enable_switching: bool,
}

/// Twilio provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TwilioConfig {
    /// Twilio Account SID
    pub account_sid: String,
    /// Twilio Auth Token
    pub auth_token: String,
    /// Default `From` number
    pub from: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "enabled")]
    pub enable_switching: bool,
}

/// Yunpian provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YunpianConfig {
    pub api_key: String,
    /// Extended sender code (`uid`)
    pub from: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "enabled")]
    pub enable_switching: bool,
}

/// iSMS provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IsmsConfig {
    pub username: String,
    pub password: String,
    /// Registered sender id
    pub send_id: String,
    pub base_url: Option<String>,
    #[serde(default = "enabled")]
    pub enable_switching: bool,
}

/// Provider selection and failover configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    /// Provider used when a message names no driver (default: nexmo)
    pub default_provider: String,
    /// Registry order, which is also the failover order
    pub order: Vec<String>,
    /// Fail over to another provider when one rejects (default: false)
    pub failover: bool,
    /// Also fail over on network faults, not just gateway rejections (default: true)
    pub failover_on_transport_fault: bool,
    /// HTTP request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: json or pretty (default: json)
    pub format: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_provider: sms_nexmo::PROVIDER.to_string(),
            order: vec![
                sms_twilio::PROVIDER.to_string(),
                sms_nexmo::PROVIDER.to_string(),
                sms_yunpian::PROVIDER.to_string(),
                sms_isms::PROVIDER.to_string(),
            ],
            failover: false,
            failover_on_transport_fault: true,
            request_timeout_seconds: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl NexmoConfig {
    pub fn build(&self) -> Result<NexmoProvider, SmsError> {
        let provider = match &self.base_url {
            Some(url) => NexmoProvider::with_base_url(&self.api_key, &self.api_secret, url)?,
            None => NexmoProvider::new(&self.api_key, &self.api_secret)?,
        };
        let provider = match &self.from {
            Some(from) => provider.with_sender(from),
            None => provider,
        };
        Ok(provider.with_failover(self.enable_switching))
    }
}

impl TwilioConfig {
    pub fn build(&self) -> Result<TwilioProvider, SmsError> {
        let provider = match &self.base_url {
            Some(url) => TwilioProvider::with_base_url(&self.account_sid, &self.auth_token, url)?,
            None => TwilioProvider::new(&self.account_sid, &self.auth_token)?,
        };
        let provider = match &self.from {
            Some(from) => provider.with_sender(from),
            None => provider,
        };
        Ok(provider.with_failover(self.enable_switching))
    }
}

impl YunpianConfig {
    pub fn build(&self) -> Result<YunpianProvider, SmsError> {
        let provider = match &self.base_url {
            Some(url) => YunpianProvider::with_base_url(&self.api_key, url)?,
            None => YunpianProvider::new(&self.api_key)?,
        };
        let provider = match &self.from {
            Some(from) => provider.with_sender(from),
            None => provider,
        };
        Ok(provider.with_failover(self.enable_switching))
    }
}

impl IsmsConfig {
    pub fn build(&self) -> Result<IsmsProvider, SmsError> {
        let provider = match &self.base_url {
            Some(url) => {
                IsmsProvider::with_base_url(&self.username, &self.password, &self.send_id, url)?
            }
            None => IsmsProvider::new(&self.username, &self.password, &self.send_id)?,
        };
        Ok(provider.with_failover(self.enable_switching))
    }
}

impl ProvidersConfig {
    /// Construct every configured adapter, failing on the first missing credential.
    pub fn build_adapters(&self) -> Result<Vec<Arc<dyn ProviderAdapter>>, SmsError> {
        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
        if let Some(twilio) = &self.twilio {
            adapters.push(Arc::new(twilio.build()?));
        }
        if let Some(nexmo) = &self.nexmo {
            adapters.push(Arc::new(nexmo.build()?));
        }
        if let Some(yunpian) = &self.yunpian {
            adapters.push(Arc::new(yunpian.build()?));
        }
        if let Some(isms) = &self.isms {
            adapters.push(Arc::new(isms.build()?));
        }
        Ok(adapters)
    }
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(Config::try_from(&AppConfig::default())?)
            // Add configuration file based on environment
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (gitignored)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (prefixed with SMSRELAY_)
            .add_source(
                Environment::with_prefix("SMSRELAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("dispatch.order")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
