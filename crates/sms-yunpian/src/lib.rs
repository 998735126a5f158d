use sms_core::{
    ExtraFields, MessageIntent, OutboundRequest, ProviderAdapter, SmsError, TEMPLATE_ID_FIELD,
    TEMPLATE_VALUE_FIELD,
};

pub const PROVIDER: &str = "yunpian";

const DEFAULT_BASE_URL: &str = "https://yunpian.com";

/// Yunpian single-send adapter.
#[derive(Clone, Debug)]
pub struct YunpianProvider {
    api_key: String,
    /// Extended sender code sent as `uid`.
    from: Option<String>,
    base_url: String,
    allows_failover: bool,
}

impl YunpianProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SmsError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Result<Self, SmsError> {
        Ok(Self {
            api_key: sms_core::require(PROVIDER, "api_key", api_key)?,
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
        format!("{}/v2/sms/single_send.json", self.base_url)
    }
}

impl ProviderAdapter for YunpianProvider {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn allows_failover(&self) -> bool {
        self.allows_failover
    }

    fn build_request(&self, intent: &MessageIntent, extra: &ExtraFields) -> OutboundRequest {
        // Yunpian names its template fields tpl_id / tpl_value.
        let mut extra = extra.clone();
        let tpl_id = extra.remove(TEMPLATE_ID_FIELD);
        let tpl_value = extra.remove(TEMPLATE_VALUE_FIELD);

        OutboundRequest::post(self.url())
            .field("apikey", &self.api_key)
            .field_opt("uid", intent.sender().or(self.from.as_deref()))
            .field("mobile", intent.first_recipient())
            .field("text", intent.body())
            .field_opt("tpl_id", tpl_id)
            .field_opt("tpl_value", tpl_value)
            .merge_extra(&extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_fails() {
        assert!(matches!(
            YunpianProvider::new("   "),
            Err(SmsError::Configuration(_))
        ));
    }

    #[test]
    fn maps_fields_and_template() {
        let provider = YunpianProvider::new("key").unwrap().with_sender("1001");
        let intent = MessageIntent::builder()
            .to(["8613800000000"])
            .message("验证码 {code}")
            .template_id("77")
            .template_value("code", "1234")
            .build()
            .unwrap();

        let req = provider.build_request(&intent.prepared(), &intent.extra_fields());
        assert_eq!(req.url, "https://yunpian.com/v2/sms/single_send.json");
        assert_eq!(req.form_value("apikey"), Some("key"));
        assert_eq!(req.form_value("uid"), Some("1001"));
        assert_eq!(req.form_value("mobile"), Some("8613800000000"));
        assert_eq!(req.form_value("text"), Some("验证码 1234"));
        assert_eq!(req.form_value("tpl_id"), Some("77"));
        assert_eq!(req.form_value("tpl_value"), Some("code=1234"));
        assert_eq!(req.form_value("template_id"), None);
    }
}
