//! # SMS Core
//!
//! Core traits and types for the smsrelay multi-provider SMS dispatcher.
//!
//! This crate provides the building blocks every gateway integration shares:
//! - [`MessageIntent`], the normalized, validated message a caller wants sent
//! - [`ProviderAdapter`], which turns an intent into a gateway-specific [`OutboundRequest`]
//! - [`Transport`], the injected HTTP boundary that executes a request
//! - [`SmsMessage`], the caller contract with its `handle`/`success`/`error` hooks
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{MessageIntent, ProviderAdapter};
//!
//! let intent = MessageIntent::builder()
//!     .to(["60123456789"])
//!     .message("Your code is {code}")
//!     .template_value("code", "4821")
//!     .build()?;
//! let request = adapter.build_request(&intent.prepared(), &intent.extra_fields());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors that can occur during SMS operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmsError {
    /// Missing credentials or an unusable provider/registry setup
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The caller handed over an invalid message
    #[error("invalid request: {0}")]
    Invalid(String),
    /// The gateway answered with a status outside the accepted set
    #[error("provider {provider} rejected the request with HTTP {status}")]
    Rejected { provider: String, status: u16 },
    /// Network-level failure before any gateway answer
    #[error("http error: {0}")]
    Http(String),
}

/// HTTP statuses a gateway may answer with for the send to count as delivered.
pub const ACCEPTED_STATUS: [u16; 2] = [200, 201];

/// Extra-field key carrying the template id.
pub const TEMPLATE_ID_FIELD: &str = "template_id";
/// Extra-field key carrying the url-encoded template substitutions.
pub const TEMPLATE_VALUE_FIELD: &str = "template_value";

/// Lightweight header representation to avoid tying the core to any HTTP framework.
pub type Headers = Vec<(String, String)>;

/// Fields passed through to an adapter on top of the ones it builds itself.
pub type ExtraFields = BTreeMap<String, String>;

/// A validated message a caller wants delivered.
///
/// Built through [`MessageIntent::builder`]. Once constructed the intent is
/// never mutated; [`MessageIntent::prepared`] derives the copy that actually
/// goes out on the wire. Deserializing runs the same checks as the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MessageIntentBuilder")]
pub struct MessageIntent {
    recipients: Vec<String>,
    body: String,
    signature: Option<String>,
    from: Option<String>,
    template_id: Option<String>,
    template_values: BTreeMap<String, String>,
}

impl MessageIntent {
    pub fn builder() -> MessageIntentBuilder {
        MessageIntentBuilder::default()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Gateways here deliver to one number per call; only this one is used.
    pub fn first_recipient(&self) -> &str {
        // Both the builder and deserialization reject an empty recipient list.
        self.recipients.first().map(String::as_str).unwrap_or_default()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Sender id requested by the caller, if any.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    pub fn template_values(&self) -> &BTreeMap<String, String> {
        &self.template_values
    }

    /// The wire form of this intent: `{key}` placeholders substituted, then the
    /// signature prepended as `"{signature} {body}"`.
    ///
    /// The returned intent carries no signature, so preparing it again leaves
    /// the body untouched.
    pub fn prepared(&self) -> MessageIntent {
        let mut body = substitute(&self.body, &self.template_values);
        if let Some(signature) = &self.signature {
            body = format!("{signature} {body}");
        }
        MessageIntent {
            body,
            signature: None,
            ..self.clone()
        }
    }

    /// Template passthrough fields for gateways with server-side templates.
    pub fn extra_fields(&self) -> ExtraFields {
        let mut extra = ExtraFields::new();
        if let Some(id) = &self.template_id {
            extra.insert(TEMPLATE_ID_FIELD.to_string(), id.clone());
        }
        if !self.template_values.is_empty() {
            let encoded = serde_urlencoded::to_string(&self.template_values).unwrap_or_default();
            extra.insert(TEMPLATE_VALUE_FIELD.to_string(), encoded);
        }
        extra
    }
}

/// Single pass over `body`; inserted values are never scanned again.
fn substitute(body: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let hit = tail
            .find('}')
            .and_then(|close| values.get(&tail[..close]).map(|value| (close, value)));
        match hit {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Builder for [`MessageIntent`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageIntentBuilder {
    recipients: Vec<String>,
    body: String,
    signature: Option<String>,
    from: Option<String>,
    template_id: Option<String>,
    template_values: BTreeMap<String, String>,
}

impl MessageIntentBuilder {
    /// Replace the recipient list.
    pub fn to<I, S>(mut self, phones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = phones.into_iter().map(Into::into).collect();
        self
    }

    /// Append a single recipient.
    pub fn recipient(mut self, phone: impl Into<String>) -> Self {
        self.recipients.push(phone.into());
        self
    }

    pub fn message(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Prefix placed in front of the body, as some regulators require.
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.from = Some(sender.into());
        self
    }

    pub fn template_id(mut self, id: impl Into<String>) -> Self {
        self.template_id = Some(id.into());
        self
    }

    pub fn template_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.template_values.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<MessageIntent, SmsError> {
        if self.recipients.is_empty() {
            return Err(SmsError::Invalid("phone number is required".into()));
        }
        if self.recipients.iter().any(|r| r.trim().is_empty()) {
            return Err(SmsError::Invalid("phone number must not be blank".into()));
        }
        if self.body.is_empty() {
            return Err(SmsError::Invalid("message body is required".into()));
        }
        if matches!(self.signature.as_deref(), Some("")) {
            return Err(SmsError::Invalid("message signature must not be empty".into()));
        }
        Ok(MessageIntent {
            recipients: self.recipients,
            body: self.body,
            signature: self.signature,
            from: self.from,
            template_id: self.template_id,
            template_values: self.template_values,
        })
    }
}

impl TryFrom<MessageIntentBuilder> for MessageIntent {
    type Error = SmsError;

    fn try_from(builder: MessageIntentBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Post => "POST",
        }
    }
}

/// Gateway-specific request descriptor produced by a [`ProviderAdapter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    /// Form fields sent as `application/x-www-form-urlencoded`.
    pub form: BTreeMap<String, String>,
}

impl OutboundRequest {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Headers::new(),
            form: BTreeMap::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    /// Insert a field only when a value is present.
    pub fn field_opt(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.field(name, value),
            None => self,
        }
    }

    /// Merge passthrough fields; fields the adapter already set are kept.
    pub fn merge_extra(mut self, extra: &ExtraFields) -> Self {
        for (name, value) in extra {
            self.form
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Translates a normalized message into one gateway's request shape.
///
/// Adapters hold only static configuration and are shared between dispatches;
/// per-call state never lives on them.
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider key, e.g. "twilio", "nexmo".
    fn provider(&self) -> &'static str;

    /// Whether this provider may be picked as a failover target.
    fn allows_failover(&self) -> bool;

    /// Build the request for `intent`, which is already in its wire form.
    fn build_request(&self, intent: &MessageIntent, extra: &ExtraFields) -> OutboundRequest;
}

/// What the gateway answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        ACCEPTED_STATUS.contains(&self.status)
    }
}

/// HTTP boundary. Implementations enforce their own timeouts.
///
/// A non-accepted status is still `Ok`; `Err` is reserved for faults where no
/// gateway answer was received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, SmsError>;
}

/// Caller contract for anything that can be dispatched.
pub trait SmsMessage: Send + Sync {
    /// Define recipients and body.
    fn handle(&self) -> Result<MessageIntent, SmsError>;

    /// Provider to try first; unknown names fall back to the registry default.
    fn driver(&self) -> Option<&str> {
        None
    }

    /// Called once for the attempt that succeeded.
    fn success(&self, _response: &TransportResponse, _body: &str) {}

    /// Called once per failed attempt.
    fn error(&self, _error: &SmsError, _body: Option<&str>) {}
}

impl SmsMessage for MessageIntent {
    fn handle(&self) -> Result<MessageIntent, SmsError> {
        Ok(self.clone())
    }
}

/// Prefix a phone number with `+` unless it already carries one.
pub fn add_plus_prefix(number: &str) -> String {
    if number.starts_with('+') {
        number.to_string()
    } else {
        format!("+{number}")
    }
}

/// Fail fast on a missing credential.
pub fn require(provider: &str, name: &str, value: impl Into<String>) -> Result<String, SmsError> {
    let value = value.into();
    if value.trim().is_empty() {
        return Err(SmsError::Configuration(format!(
            "{provider}: missing {name}"
        )));
    }
    Ok(value)
}

/// Validate a base URL override and strip its trailing slash.
pub fn base_url(provider: &str, raw: &str) -> Result<String, SmsError> {
    let parsed = url::Url::parse(raw).map_err(|e| {
        SmsError::Configuration(format!("{provider}: invalid base url {raw:?}: {e}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SmsError::Configuration(format!(
            "{provider}: base url must be http(s), got {raw:?}"
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
