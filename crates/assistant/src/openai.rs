//! Adapter for OpenAI-Assistants-compatible APIs (v2 wire format).

use std::time::Duration;

use rd_domain::config::AssistantConfig;
use rd_domain::error::{Error, Result};
use rd_domain::message::Role;
use rd_domain::tool::{ToolCall, ToolDefinition, ToolOutput};
use serde_json::Value;

use crate::traits::{AssistantApi, RunSnapshot, RunStatus, ThreadMessage};
use crate::util::from_reqwest;

pub struct OpenAiAssistants {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiAssistants {
    /// Build the adapter.  The API key is read from `cfg.api_key_env`.
    pub fn from_config(cfg: &AssistantConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            Error::Config(format!(
                "environment variable '{}' not set or not valid UTF-8",
                cfg.api_key_env
            ))
        })?;
        Self::new(&cfg.base_url, api_key, cfg.request_timeout_secs)
    }

    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    // ── Internal: authenticated requests ───────────────────────────

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .header("Content-Type", "application/json")
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = self.authed(req).send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Assistant(format!(
                "HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "assistant POST");
        self.send(self.client.post(&url).json(&body)).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "assistant GET");
        self.send(self.client.get(&url)).await
    }
}

#[async_trait::async_trait]
impl AssistantApi for OpenAiAssistants {
    async fn create_thread(&self) -> Result<String> {
        let resp = self.post("/threads", serde_json::json!({})).await?;
        id_of(&resp)
    }

    async fn add_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()> {
        let role = match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        self.post(
            &format!("/threads/{thread_id}/messages"),
            serde_json::json!({ "role": role, "content": content }),
        )
        .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        tools: &[ToolDefinition],
    ) -> Result<String> {
        let mut body = serde_json::json!({ "assistant_id": assistant_id });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_to_openai).collect());
        }
        let resp = self
            .post(&format!("/threads/{thread_id}/runs"), body)
            .await?;
        id_of(&resp)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        let resp = self
            .get(&format!("/threads/{thread_id}/runs/{run_id}"))
            .await?;
        parse_run(&resp)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        self.post(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            serde_json::json!({ "tool_outputs": outputs }),
        )
        .await?;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let resp = self
            .get(&format!("/threads/{thread_id}/messages?order=desc&limit=20"))
            .await?;
        Ok(parse_messages(&resp))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.post(
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
            serde_json::json!({}),
        )
        .await?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn id_of(resp: &Value) -> Result<String> {
    resp.get("id")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::Assistant("response has no 'id'".into()))
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn parse_run(resp: &Value) -> Result<RunSnapshot> {
    let raw = resp
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Assistant("run has no 'status'".into()))?;
    let status = RunStatus::parse(raw)
        .ok_or_else(|| Error::Assistant(format!("unknown run status '{raw}'")))?;

    let mut tool_calls = Vec::new();
    if status == RunStatus::RequiresAction {
        let calls = resp
            .pointer("/required_action/submit_tool_outputs/tool_calls")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        tool_calls = calls.iter().filter_map(parse_tool_call).collect();
    }
    Ok(RunSnapshot { status, tool_calls })
}

fn parse_tool_call(tc: &Value) -> Option<ToolCall> {
    let call_id = tc.get("id")?.as_str()?.to_string();
    let func = tc.get("function")?;
    let tool_name = func.get("name")?.as_str()?.to_string();
    let args_str = func.get("arguments").and_then(|a| a.as_str()).unwrap_or("{}");
    let arguments: Value =
        serde_json::from_str(args_str).unwrap_or_else(|_| Value::String(args_str.to_string()));
    Some(ToolCall {
        call_id,
        tool_name,
        arguments,
    })
}

fn parse_messages(resp: &Value) -> Vec<ThreadMessage> {
    let Some(data) = resp.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };
    data.iter()
        .filter_map(|m| {
            let role = match m.get("role")?.as_str()? {
                "assistant" => Role::Assistant,
                _ => Role::User,
            };
            let content = m
                .get("content")
                .and_then(|c| c.as_array())
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.pointer("/text/value").and_then(|v| v.as_str()))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            Some(ThreadMessage {
                id: m.get("id")?.as_str()?.to_string(),
                role,
                content,
                created_at: m.get("created_at").and_then(|v| v.as_i64()).unwrap_or(0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requires_action_run() {
        let resp = serde_json::json!({
            "id": "run_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {
                            "id": "call_a",
                            "type": "function",
                            "function": { "name": "tag_contact", "arguments": "{\"tag\":\"vip\"}" }
                        },
                        {
                            "id": "call_b",
                            "type": "function",
                            "function": { "name": "noop", "arguments": "not json" }
                        }
                    ]
                }
            }
        });
        let snap = parse_run(&resp).unwrap();
        assert_eq!(snap.status, RunStatus::RequiresAction);
        assert_eq!(snap.tool_calls.len(), 2);
        assert_eq!(snap.tool_calls[0].arguments["tag"], "vip");
        assert_eq!(snap.tool_calls[1].arguments, Value::String("not json".into()));
    }

    #[test]
    fn completed_run_ignores_required_action() {
        let snap = parse_run(&serde_json::json!({ "status": "completed" })).unwrap();
        assert_eq!(snap, RunSnapshot::status(RunStatus::Completed));
        assert!(parse_run(&serde_json::json!({ "status": "weird" })).is_err());
    }

    #[test]
    fn parses_message_list() {
        let resp = serde_json::json!({
            "data": [
                {
                    "id": "msg_2",
                    "role": "assistant",
                    "created_at": 20,
                    "content": [
                        { "type": "text", "text": { "value": "Hello", "annotations": [] } },
                        { "type": "text", "text": { "value": "there", "annotations": [] } }
                    ]
                },
                {
                    "id": "msg_1",
                    "role": "user",
                    "created_at": 10,
                    "content": [ { "type": "text", "text": { "value": "hi" } } ]
                }
            ]
        });
        let msgs = parse_messages(&resp);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::Assistant);
        assert_eq!(msgs[0].content, "Hello\nthere");
        assert_eq!(msgs[1].created_at, 10);
    }

    #[test]
    fn tool_definition_wire_shape() {
        let def = ToolDefinition {
            name: "tag_contact".into(),
            description: "Tag".into(),
            parameters: serde_json::json!({ "type": "object" }),
        };
        let v = tool_to_openai(&def);
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "tag_contact");
    }
}
