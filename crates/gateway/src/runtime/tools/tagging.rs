use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use rd_domain::config::ToolCategory;
use rd_domain::error::{Error, Result};
use rd_domain::tool::ToolDefinition;

use crate::runtime::contacts::ContactStore;

use super::{parse_args, ToolContext, ToolHandler};

/// `tag_contact`: attach a label to the contact record.
pub struct TagContact {
    contacts: Arc<ContactStore>,
}

impl TagContact {
    pub fn new(contacts: Arc<ContactStore>) -> Self {
        Self { contacts }
    }
}

#[derive(Deserialize)]
struct Args {
    tag: String,
}

#[async_trait::async_trait]
impl ToolHandler for TagContact {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tag_contact".into(),
            description: "Attach a tag to the current contact (e.g. lead stage or interest).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "tag": { "type": "string", "description": "Tag to add" }
                },
                "required": ["tag"]
            }),
        }
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Tagging
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let args: Args = parse_args(args)?;
        let tag = args.tag.trim();
        if tag.is_empty() {
            return Err(Error::Validation("tag must not be empty".into()));
        }
        let added = self.contacts.add_tag(&ctx.tenant.id, &ctx.contact_id, tag)?;
        Ok(json!({
            "status": if added { "tagged" } else { "unchanged" },
            "tag": tag,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[tokio::test]
    async fn tags_are_deduplicated() {
        let fx = fixture();
        let tool = TagContact::new(fx.services.contacts.clone());
        let ctx = ctx(tenant(|_| {}));

        let first = tool.call(&ctx, &json!({ "tag": " hot-lead " })).await.unwrap();
        assert_eq!(first["status"], "tagged");
        let again = tool.call(&ctx, &json!({ "tag": "hot-lead" })).await.unwrap();
        assert_eq!(again["status"], "unchanged");

        let rec = fx.services.contacts.get("acme", "5511").unwrap().unwrap();
        assert_eq!(rec.tags, vec!["hot-lead"]);
    }

    #[tokio::test]
    async fn blank_tag_is_rejected() {
        let fx = fixture();
        let tool = TagContact::new(fx.services.contacts.clone());
        let err = tool.call(&ctx(tenant(|_| {})), &json!({ "tag": "  " })).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
