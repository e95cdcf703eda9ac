use serde::{Deserialize, Serialize};

/// Kind of an inbound transport message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Document,
    Video,
    Location,
    Order,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Video => "video",
            Self::Location => "location",
            Self::Order => "order",
        }
    }
}

/// An inbound message event as delivered by the messaging transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Transport chat identifier; also the debounce key.
    pub chat_id: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub has_quoted_message: bool,
    /// Text of the quoted message, when the transport supplies it.
    #[serde(default)]
    pub quoted_body: Option<String>,
    /// Opaque reference the transport can resolve to media bytes.
    #[serde(default)]
    pub media_ref: Option<String>,
}

impl InboundMessage {
    pub fn text(chat_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            author_id: None,
            body: body.into(),
            kind: MessageKind::Text,
            has_quoted_message: false,
            quoted_body: None,
            media_ref: None,
        }
    }

    /// Contact identifier for session lookup.  Group chats carry the real
    /// author in `author_id`; direct chats use the chat id itself.
    pub fn contact_id(&self) -> &str {
        self.author_id.as_deref().unwrap_or(&self.chat_id)
    }
}

/// Role of a message on an assistant thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}
