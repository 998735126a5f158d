use sms_core::{ExtraFields, MessageIntent, OutboundRequest, ProviderAdapter, SmsError};

pub const PROVIDER: &str = "isms";

const DEFAULT_BASE_URL: &str = "http://www.isms.com.my";

/// Message encodings understood by iSMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// English, Bahasa Melayu and other ASCII text, 153 characters per part.
    Ascii = 1,
    /// Chinese, Japanese and other non-ASCII text, 63 characters per part.
    Unicode = 2,
}

impl MessageType {
    pub fn for_text(text: &str) -> Self {
        if text.is_ascii() {
            MessageType::Ascii
        } else {
            MessageType::Unicode
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            MessageType::Ascii => "1",
            MessageType::Unicode => "2",
        }
    }
}

/// iSMS (isms.com.my) adapter. Credentials go in the form body.
#[derive(Clone, Debug)]
pub struct IsmsProvider {
    username: String,
    password: String,
    send_id: String,
    base_url: String,
    allows_failover: bool,
}

impl IsmsProvider {
    pub fn new<S: Into<String>>(username: S, password: S, send_id: S) -> Result<Self, SmsError> {
        Self::with_base_url(username, password, send_id, DEFAULT_BASE_URL)
    }

    pub fn with_base_url<S: Into<String>>(
        username: S,
        password: S,
        send_id: S,
        base_url: &str,
    ) -> Result<Self, SmsError> {
        Ok(Self {
            username: sms_core::require(PROVIDER, "username", username)?,
            password: sms_core::require(PROVIDER, "password", password)?,
            send_id: sms_core::require(PROVIDER, "send_id", send_id)?,
            base_url: sms_core::base_url(PROVIDER, base_url)?,
            allows_failover: true,
        })
    }

    pub fn with_failover(mut self, allowed: bool) -> Self {
        self.allows_failover = allowed;
        self
    }

    pub fn url(&self) -> String {
        format!("{}/isms_send.php", self.base_url)
    }
}

impl ProviderAdapter for IsmsProvider {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn allows_failover(&self) -> bool {
        self.allows_failover
    }

    fn build_request(&self, intent: &MessageIntent, extra: &ExtraFields) -> OutboundRequest {
        OutboundRequest::post(self.url())
            .field("un", &self.username)
            .field("pwd", &self.password)
            .field("type", MessageType::for_text(intent.body()).code())
            // International numbers are expected with a 00 prefix.
            .field("dstno", intent.first_recipient())
            .field("msg", intent.body())
            .field("sendid", intent.sender().unwrap_or(&self.send_id))
            .field("agreedterm", "YES")
            .merge_extra(extra)
    }
}
