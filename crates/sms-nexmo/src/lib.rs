use sms_core::{ExtraFields, MessageIntent, OutboundRequest, ProviderAdapter, SmsError};
use tracing::debug;

pub const PROVIDER: &str = "nexmo";

const DEFAULT_BASE_URL: &str = "https://rest.nexmo.com";

/// Nexmo (Vonage) SMS API adapter.
///
/// Credentials travel in the form body; no auth header is set.
#[derive(Clone, Debug)]
pub struct NexmoProvider {
    api_key: String,
    api_secret: String,
    /// Default sender id when the intent names none.
    from: Option<String>,
    /// API base URL; override for testing/mocking.
    base_url: String,
    allows_failover: bool,
}

impl NexmoProvider {
    pub fn new<S: Into<String>>(api_key: S, api_secret: S) -> Result<Self, SmsError> {
        Self::with_base_url(api_key, api_secret, DEFAULT_BASE_URL)
    }

    pub fn with_base_url<S: Into<String>>(
        api_key: S,
        api_secret: S,
        base_url: &str,
    ) -> Result<Self, SmsError> {
        Ok(Self {
            api_key: sms_core::require(PROVIDER, "api_key", api_key)?,
            api_secret: sms_core::require(PROVIDER, "api_secret", api_secret)?,
            from: None,
            base_url: sms_core::base_url(PROVIDER, base_url)?,
            allows_failover: true,
        })
    }

    pub fn with_sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_failover(mut self, allowed: bool) -> Self {
        self.allows_failover = allowed;
        self
    }

    pub fn url(&self) -> String {
        format!("{}/sms/json", self.base_url)
    }
}

impl ProviderAdapter for NexmoProvider {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn allows_failover(&self) -> bool {
        self.allows_failover
    }

    fn build_request(&self, intent: &MessageIntent, extra: &ExtraFields) -> OutboundRequest {
        let from = intent.sender().or(self.from.as_deref());
        if from.is_none() {
            debug!("nexmo: no sender id configured, gateway default applies");
        }
        OutboundRequest::post(self.url())
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret)
            .field_opt("from", from)
            .field("to", intent.first_recipient())
            .field("text", intent.body())
            .merge_extra(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> MessageIntent {
        MessageIntent::builder()
            .to(["60123456789", "60111111111"])
            .message("hi")
            .build()
            .unwrap()
    }

    #[test]
    fn missing_credentials_fail_fast() {
        assert!(matches!(
            NexmoProvider::new("", "secret"),
            Err(SmsError::Configuration(_))
        ));
        assert!(matches!(
            NexmoProvider::new("key", ""),
            Err(SmsError::Configuration(_))
        ));
    }

    #[test]
    fn builds_form_request() {
        let provider = NexmoProvider::new("key", "secret").unwrap().with_sender("ACME");
        let req = provider.build_request(&intent(), &ExtraFields::new());

        assert_eq!(req.url, "https://rest.nexmo.com/sms/json");
        assert_eq!(req.form_value("api_key"), Some("key"));
        assert_eq!(req.form_value("api_secret"), Some("secret"));
        assert_eq!(req.form_value("from"), Some("ACME"));
        assert_eq!(req.form_value("to"), Some("60123456789"));
        assert_eq!(req.form_value("text"), Some("hi"));
        assert!(req.headers.is_empty());
    }

    #[test]
    fn intent_sender_wins_and_extras_cannot_override() {
        let provider = NexmoProvider::with_base_url("key", "secret", "http://localhost:9/")
            .unwrap()
            .with_sender("ACME");
        let intent = MessageIntent::builder()
            .to(["1"])
            .message("hi")
            .sender("SHOP")
            .build()
            .unwrap();
        let mut extra = ExtraFields::new();
        extra.insert("api_key".into(), "other".into());
        extra.insert("template_id".into(), "42".into());

        let req = provider.build_request(&intent, &extra);
        assert_eq!(req.url, "http://localhost:9/sms/json");
        assert_eq!(req.form_value("from"), Some("SHOP"));
        assert_eq!(req.form_value("api_key"), Some("key"));
        assert_eq!(req.form_value("template_id"), Some("42"));
    }

    #[test]
    fn failover_flag() {
        let provider = NexmoProvider::new("key", "secret").unwrap();
        assert!(provider.allows_failover());
        assert!(!provider.with_failover(false).allows_failover());
    }
}
