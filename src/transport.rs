use std::time::Duration;

use async_trait::async_trait;
use sms_core::{Headers, Method, OutboundRequest, SmsError, Transport, TransportResponse};
use tracing::debug;

/// `reqwest`-backed [`Transport`]. Posts the request's form fields with its headers.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, SmsError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmsError::Configuration(format!("http client: {}", e)))?;
        Ok(Self { http })
    }

    /// Reuse an existing client, e.g. one shared with the rest of the application.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, SmsError> {
        let mut builder = match request.method {
            Method::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!("POST {}", request.url);
        let res = builder
            .form(&request.form)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status().as_u16();
        let headers: Headers = res
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
