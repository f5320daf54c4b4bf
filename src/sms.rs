use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::config::SmsConfig;

/// SmsService
///
/// Outbound text messages (OTP codes, password reset tokens). Swappable between the
/// HTTP gateway client and the in-process mock, like `StorageService`.
#[async_trait]
pub trait SmsService: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), String>;
}

pub type SmsState = Arc<dyn SmsService>;

#[derive(Serialize)]
struct GatewayMessage<'a> {
    to: &'a str,
    sender: &'a str,
    message: &'a str,
}

/// HttpSmsClient
///
/// Posts messages as JSON to a generic SMS gateway, authenticating with a bearer
/// API key.
#[derive(Clone)]
pub struct HttpSmsClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_id: String,
}

impl HttpSmsClient {
    pub fn new(api_url: &str, api_key: &str, sender_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            sender_id: sender_id.to_string(),
        }
    }
}

#[async_trait]
impl SmsService for HttpSmsClient {
    async fn send(&self, phone: &str, message: &str) -> Result<(), String> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&GatewayMessage {
                to: phone,
                sender: &self.sender_id,
                message,
            })
            .send()
            .await
            .map_err(|e| format!("SMS gateway unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("SMS gateway returned {}", response.status()))
        }
    }
}

/// MockSmsService
///
/// Records messages instead of sending them. Used in local mode and tests.
#[derive(Clone, Default)]
pub struct MockSmsService {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    pub should_fail: bool,
}

impl MockSmsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Every `(phone, message)` pair sent so far.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_message_to(&self, phone: &str) -> Option<String> {
        self.sent_messages()
            .into_iter()
            .rev()
            .find(|(to, _)| to == phone)
            .map(|(_, message)| message)
    }
}

#[async_trait]
impl SmsService for MockSmsService {
    async fn send(&self, phone: &str, message: &str) -> Result<(), String> {
        if self.should_fail {
            return Err("Mock SMS Error: Simulation requested".to_string());
        }
        tracing::info!(to = %phone, "mock sms delivered");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((phone.to_string(), message.to_string()));
        }
        Ok(())
    }
}

/// Picks the gateway client when a URL is configured, the mock otherwise.
/// `AppConfig::load` refuses to start production without a URL.
pub fn sms_from_config(config: &SmsConfig) -> SmsState {
    match &config.api_url {
        Some(url) => Arc::new(HttpSmsClient::new(url, &config.api_key, &config.sender_id)),
        None => {
            tracing::warn!("SMS_API_URL not set, messages are only logged");
            Arc::new(MockSmsService::new())
        }
    }
}
