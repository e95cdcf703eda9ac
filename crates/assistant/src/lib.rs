//! Hosted-assistant capability: the [`AssistantApi`] trait, an adapter for
//! OpenAI-Assistants-compatible HTTP APIs, and a scripted in-memory
//! implementation for tests.

pub mod openai;
pub mod scripted;
pub mod traits;
pub mod util;

pub use openai::OpenAiAssistants;
pub use scripted::{ScriptedAssistant, Step};
pub use traits::{AssistantApi, RunSnapshot, RunStatus, ThreadMessage};
