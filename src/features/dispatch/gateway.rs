//! Messaging gateway client.
//!
//! One endpoint matters: `POST {api_base}{send_path}` with a JSON body of
//! destination, text, and session. Success is any 2xx; the raw body is
//! returned verbatim either way so the operator sees exactly what the
//! gateway said.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use crate::core::Config;
use crate::error::{Error, Result};

/// Outbound message transport.
///
/// The dispatcher and scheduler only know this trait; tests substitute an
/// in-memory fake to observe (or fail) sends without a network.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Deliver `text` to `destination`. Returns the raw gateway response
    /// body on success.
    async fn send_text(&self, destination: &str, text: &str) -> Result<String>;
}

#[derive(Serialize)]
struct SendTextBody<'a> {
    destination: &'a str,
    text: &'a str,
    session: &'a str,
}

/// HTTP implementation of [`MessageGateway`] backed by the WhatsApp bridge.
pub struct HttpGateway {
    client: reqwest::Client,
    send_url: String,
    session: String,
}

impl HttpGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .map_err(|e| Error::Gateway(format!("failed to build http client: {e}")))?;

        Ok(HttpGateway {
            client,
            send_url: config.send_url(),
            session: config.api_session.clone(),
        })
    }
}

#[async_trait]
impl MessageGateway for HttpGateway {
    async fn send_text(&self, destination: &str, text: &str) -> Result<String> {
        debug!("POST {} -> {destination}", self.send_url);

        let response = self
            .client
            .post(&self.send_url)
            .json(&SendTextBody {
                destination,
                text,
                session: &self.session,
            })
            .send()
            .await
            .map_err(|e| Error::Gateway(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Gateway(format!("failed to read response body: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::Gateway(format!("HTTP {}: {body}", status.as_u16())))
        }
    }
}
