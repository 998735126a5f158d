//! # Twilio SMS Provider
//!
//! Twilio Programmable Messaging adapter for smsrelay.
//!
//! - The endpoint is templated with the account SID
//! - Requests authenticate with HTTP basic auth (`account_sid:auth_token`)
//! - `To` and `From` are normalized to E.164 by prefixing `+` when missing
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_twilio::TwilioProvider;
//!
//! let twilio = TwilioProvider::new("AC123", "token")?.with_sender("15005550006");
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sms_core::{
    ExtraFields, MessageIntent, OutboundRequest, ProviderAdapter, SmsError, add_plus_prefix,
};
use tracing::debug;

pub const PROVIDER: &str = "twilio";

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Twilio REST adapter.
#[derive(Clone, Debug)]
pub struct TwilioProvider {
    account_sid: String,
    auth_token: String,
    from: Option<String>,
    base_url: String,
    allows_failover: bool,
}

impl TwilioProvider {
    pub fn new<S: Into<String>>(account_sid: S, auth_token: S) -> Result<Self, SmsError> {
        Self::with_base_url(account_sid, auth_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url<S: Into<String>>(
        account_sid: S,
        auth_token: S,
        base_url: &str,
    ) -> Result<Self, SmsError> {
        Ok(Self {
            account_sid: sms_core::require(PROVIDER, "account_sid", account_sid)?,
            auth_token: sms_core::require(PROVIDER, "auth_token", auth_token)?,
            from: None,
            base_url: sms_core::base_url(PROVIDER, base_url)?,
            allows_failover: true,
        })
    }

    /// Default `From` number when the intent names none.
    pub fn with_sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_failover(mut self, allowed: bool) -> Self {
        self.allows_failover = allowed;
        self
    }

    pub fn url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.account_sid, self.auth_token);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

impl ProviderAdapter for TwilioProvider {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn allows_failover(&self) -> bool {
        self.allows_failover
    }

    fn build_request(&self, intent: &MessageIntent, extra: &ExtraFields) -> OutboundRequest {
        let to = add_plus_prefix(intent.first_recipient());
        if to != intent.first_recipient() {
            debug!("twilio: normalized recipient to {}", to);
        }
        let from = intent
            .sender()
            .or(self.from.as_deref())
            .map(add_plus_prefix);

        OutboundRequest::post(self.url())
            .header("Authorization", self.authorization())
            .field("To", to)
            .field_opt("From", from)
            .field("Body", intent.body())
            .merge_extra(extra)
    }
}
