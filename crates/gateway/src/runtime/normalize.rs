//! Inbound message normalization.
//!
//! Every message type is reduced to text before it is buffered, so a
//! flushed conversation is homogeneous.

use rd_domain::message::{InboundMessage, MessageKind};

use crate::transport::Transport;

pub async fn normalize(
    msg: &InboundMessage,
    tenant_id: &str,
    transport: &dyn Transport,
    transcription_apology: &str,
) -> String {
    let body = msg.body.trim();
    let text = match msg.kind {
        MessageKind::Text => body.to_owned(),
        MessageKind::Audio => match msg.media_ref.as_deref() {
            Some(media_ref) => match transport.transcribe(tenant_id, media_ref).await {
                Ok(t) => t.trim().to_owned(),
                Err(e) => {
                    tracing::warn!(
                        tenant = tenant_id,
                        chat_id = %msg.chat_id,
                        error = %e,
                        "voice transcription failed"
                    );
                    transcription_apology.to_owned()
                }
            },
            None => transcription_apology.to_owned(),
        },
        MessageKind::Image | MessageKind::Document | MessageKind::Video => {
            tagged(msg.kind.as_str(), body)
        }
        MessageKind::Location | MessageKind::Order => tagged(msg.kind.as_str(), body),
    };

    if !msg.has_quoted_message {
        return text;
    }
    match msg.quoted_body.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => format!("[replying to: \"{q}\"] {text}"),
        _ => format!("[reply] {text}"),
    }
}

fn tagged(kind: &str, body: &str) -> String {
    if body.is_empty() {
        format!("[{kind}]")
    } else {
        format!("[{kind}] {body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    const SORRY: &str = "[voice message could not be transcribed]";

    fn msg(kind: MessageKind, body: &str) -> InboundMessage {
        InboundMessage {
            kind,
            ..InboundMessage::text("c1", body)
        }
    }

    #[tokio::test]
    async fn text_passes_through() {
        let t = MemoryTransport::new();
        assert_eq!(normalize(&msg(MessageKind::Text, " hi "), "acme", &t, SORRY).await, "hi");
    }

    #[tokio::test]
    async fn audio_is_transcribed_or_apologized() {
        let t = MemoryTransport::new();
        t.set_transcript("m1", "I want a quote");
        let mut m = msg(MessageKind::Audio, "");
        m.media_ref = Some("m1".into());
        assert_eq!(normalize(&m, "acme", &t, SORRY).await, "I want a quote");

        m.media_ref = Some("missing".into());
        assert_eq!(normalize(&m, "acme", &t, SORRY).await, SORRY);
    }

    #[tokio::test]
    async fn media_and_structured_kinds_are_tagged() {
        let t = MemoryTransport::new();
        assert_eq!(
            normalize(&msg(MessageKind::Image, "my car"), "acme", &t, SORRY).await,
            "[image] my car"
        );
        assert_eq!(normalize(&msg(MessageKind::Video, ""), "acme", &t, SORRY).await, "[video]");
        assert_eq!(
            normalize(&msg(MessageKind::Location, "-23.5,-46.6"), "acme", &t, SORRY).await,
            "[location] -23.5,-46.6"
        );
    }

    #[tokio::test]
    async fn quoted_replies_are_prefixed() {
        let t = MemoryTransport::new();
        let mut m = msg(MessageKind::Text, "yes");
        m.has_quoted_message = true;
        assert_eq!(normalize(&m, "acme", &t, SORRY).await, "[reply] yes");
        m.quoted_body = Some("Tuesday at 3?".into());
        assert_eq!(
            normalize(&m, "acme", &t, SORRY).await,
            "[replying to: \"Tuesday at 3?\"] yes"
        );
    }
}
