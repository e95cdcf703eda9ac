//! Outbound messaging transport.
//!
//! The messaging transport is external.  relaydesk posts outbound actions
//! (text, document, transcription requests) to a webhook, or logs them when
//! no webhook is configured.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use rd_domain::config::TransportConfig;
use rd_assistant::util::from_reqwest;
use rd_domain::error::{Error, Result};

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, tenant_id: &str, chat_id: &str, text: &str) -> Result<()>;

    /// Send a named document with an optional caption.
    async fn send_document(
        &self,
        tenant_id: &str,
        chat_id: &str,
        document: &str,
        caption: &str,
    ) -> Result<()>;

    /// Transcribe a voice note identified by the transport's media ref.
    async fn transcribe(&self, tenant_id: &str, media_ref: &str) -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    tenant: &'a str,
    chat_id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<&'a str>,
}

pub struct WebhookTransport {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(base_url: &str, token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            client,
        })
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "{url}: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait::async_trait]
impl Transport for WebhookTransport {
    async fn send_text(&self, tenant_id: &str, chat_id: &str, text: &str) -> Result<()> {
        let req = SendRequest {
            tenant: tenant_id,
            chat_id,
            kind: "text",
            body: text,
            document: None,
        };
        self.post("/send", &req).await.map(|_| ())
    }

    async fn send_document(
        &self,
        tenant_id: &str,
        chat_id: &str,
        document: &str,
        caption: &str,
    ) -> Result<()> {
        let req = SendRequest {
            tenant: tenant_id,
            chat_id,
            kind: "document",
            body: caption,
            document: Some(document),
        };
        self.post("/send", &req).await.map(|_| ())
    }

    async fn transcribe(&self, tenant_id: &str, media_ref: &str) -> Result<String> {
        let resp = self
            .post(
                "/transcribe",
                &serde_json::json!({ "tenant": tenant_id, "mediaRef": media_ref }),
            )
            .await?;
        resp.get("text")
            .and_then(|t| t.as_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::Transport("transcription response has no 'text'".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Log-only transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Used when `[transport] outbound_url` is unset.
pub struct LogTransport;

#[async_trait::async_trait]
impl Transport for LogTransport {
    async fn send_text(&self, tenant_id: &str, chat_id: &str, text: &str) -> Result<()> {
        tracing::info!(tenant = tenant_id, chat_id, text, "outbound text (not delivered)");
        Ok(())
    }

    async fn send_document(
        &self,
        tenant_id: &str,
        chat_id: &str,
        document: &str,
        caption: &str,
    ) -> Result<()> {
        tracing::info!(
            tenant = tenant_id,
            chat_id,
            document,
            caption,
            "outbound document (not delivered)"
        );
        Ok(())
    }

    async fn transcribe(&self, _tenant_id: &str, _media_ref: &str) -> Result<String> {
        Err(Error::Transport("no transcription backend configured".into()))
    }
}

/// Build the transport from config.
pub fn from_config(cfg: &TransportConfig) -> Result<std::sync::Arc<dyn Transport>> {
    match &cfg.outbound_url {
        Some(url) => {
            let token = std::env::var(&cfg.outbound_token_env)
                .ok()
                .filter(|t| !t.is_empty());
            if token.is_none() {
                tracing::warn!(
                    env = %cfg.outbound_token_env,
                    "outbound transport token not set; sending unauthenticated"
                );
            }
            Ok(std::sync::Arc::new(WebhookTransport::new(
                url,
                token,
                cfg.request_timeout_secs,
            )?))
        }
        None => {
            tracing::warn!("no [transport] outbound_url configured; outbound messages are only logged");
            Ok(std::sync::Arc::new(LogTransport))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: String,
        text: String,
    },
    Document {
        chat_id: String,
        document: String,
        caption: String,
    },
}

impl Sent {
    pub fn chat_id(&self) -> &str {
        match self {
            Sent::Text { chat_id, .. } | Sent::Document { chat_id, .. } => chat_id,
        }
    }
}

/// Records outbound traffic instead of delivering it.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<Sent>>,
    transcripts: Mutex<std::collections::HashMap<String, String>>,
    fail_chats: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the text returned for a media ref.  Unknown refs fail.
    pub fn set_transcript(&self, media_ref: &str, text: &str) {
        self.transcripts
            .lock()
            .insert(media_ref.to_owned(), text.to_owned());
    }

    /// Make every send to `chat_id` fail.
    pub fn fail_sends_to(&self, chat_id: &str) {
        self.fail_chats.lock().push(chat_id.to_owned());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn texts_to(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Text { chat_id: c, text } if c == chat_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn check(&self, chat_id: &str) -> Result<()> {
        if self.fail_chats.lock().iter().any(|c| c == chat_id) {
            return Err(Error::Transport(format!("send to {chat_id} failed")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&self, _tenant_id: &str, chat_id: &str, text: &str) -> Result<()> {
        self.check(chat_id)?;
        self.sent.lock().push(Sent::Text {
            chat_id: chat_id.to_owned(),
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn send_document(
        &self,
        _tenant_id: &str,
        chat_id: &str,
        document: &str,
        caption: &str,
    ) -> Result<()> {
        self.check(chat_id)?;
        self.sent.lock().push(Sent::Document {
            chat_id: chat_id.to_owned(),
            document: document.to_owned(),
            caption: caption.to_owned(),
        });
        Ok(())
    }

    async fn transcribe(&self, _tenant_id: &str, media_ref: &str) -> Result<String> {
        self.transcripts
            .lock()
            .get(media_ref)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("cannot transcribe {media_ref}")))
    }
}
