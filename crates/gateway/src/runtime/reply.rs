//! Multi-part replies.
//!
//! A reply is split on the configured delimiter; each part is delivered
//! separately, in order.  A part of the form `[document:<name>] caption`
//! becomes a document attachment.

use std::sync::OnceLock;

use regex::Regex;

use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPart {
    Text(String),
    Document { name: String, caption: String },
}

pub fn split_reply(reply: &str, delimiter: &str) -> Vec<ReplyPart> {
    static DOCUMENT: OnceLock<Regex> = OnceLock::new();
    let doc_re = DOCUMENT.get_or_init(|| {
        Regex::new(r"(?s)^\[document:\s*([^\]]+?)\s*\]\s*(.*)$").expect("document pattern is valid")
    });

    let pieces: Vec<&str> = if delimiter.is_empty() {
        vec![reply]
    } else {
        reply.split(delimiter).collect()
    };

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match doc_re.captures(p) {
            Some(caps) => ReplyPart::Document {
                name: caps[1].to_owned(),
                caption: caps[2].trim().to_owned(),
            },
            None => ReplyPart::Text(p.to_owned()),
        })
        .collect()
}

/// Deliver parts in order.  A failed part is logged and skipped.  Returns
/// the number of parts delivered.
pub async fn deliver(
    transport: &dyn Transport,
    tenant_id: &str,
    chat_id: &str,
    parts: &[ReplyPart],
) -> usize {
    let mut delivered = 0;
    for part in parts {
        let result = match part {
            ReplyPart::Text(text) => transport.send_text(tenant_id, chat_id, text).await,
            ReplyPart::Document { name, caption } => {
                transport
                    .send_document(tenant_id, chat_id, name, caption)
                    .await
            }
        };
        match result {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(
                tenant = tenant_id,
                chat_id,
                error = %e,
                "reply part delivery failed"
            ),
        }
    }
    delivered
}
