//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use rd_assistant::{AssistantApi, OpenAiAssistants};
use rd_domain::clock::{Clock, SystemClock};
use rd_domain::config::{Config, ConfigSeverity};
use rd_sessions::{SessionStore, ThreadManager};
use rd_store::DocumentStore;

use crate::runtime::assignment::{AssignmentEngine, RosterCache, RoundRobin};
use crate::runtime::contacts::ContactStore;
use crate::runtime::debounce::Debouncer;
use crate::runtime::followups::{FollowUpRunner, FollowUpScheduler};
use crate::runtime::runs::{RunEngine, RunSettings};
use crate::runtime::tools::{ToolRegistry, ToolServices};
use crate::runtime::turn::TurnEngine;
use crate::state::AppState;
use crate::tenants::TenantRegistry;
use crate::transport::{self, Transport};

/// External collaborators the runtime is wired around.  Tests build this
/// with in-memory implementations.
pub struct Dependencies {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub docs: Arc<DocumentStore>,
    pub assistant: Arc<dyn AssistantApi>,
    pub transport: Arc<dyn Transport>,
    pub api_token_hash: Option<Vec<u8>>,
    pub inbound_secret: Option<Vec<u8>>,
}

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Document store ───────────────────────────────────────────────
    let docs = Arc::new(
        DocumentStore::from_config(&config.storage).context("opening document store")?,
    );
    if config.storage.in_memory {
        tracing::warn!("document store is in-memory; state is lost on restart");
    } else {
        tracing::info!(path = %config.storage.state_path.display(), "document store ready");
    }

    // ── Assistant ────────────────────────────────────────────────────
    let assistant: Arc<dyn AssistantApi> = Arc::new(
        OpenAiAssistants::from_config(&config.assistant)
            .context("initializing assistant client")?,
    );
    tracing::info!(base_url = %config.assistant.base_url, "assistant client ready");

    // ── Transport ────────────────────────────────────────────────────
    let transport = transport::from_config(&config.transport).context("initializing transport")?;

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!("API bearer-token auth DISABLED; set the {env_var} env var");
                None
            }
        }
    };

    // ── Inbound webhook secret ───────────────────────────────────────
    let inbound_secret = {
        let env_var = &config.transport.inbound_secret_env;
        let secret = std::env::var(env_var).ok().filter(|s| !s.is_empty());
        if secret.is_none() {
            tracing::warn!("inbound signature check DISABLED; set the {env_var} env var");
        }
        secret.map(String::into_bytes)
    };

    Ok(wire_app_state(Dependencies {
        config,
        clock: Arc::new(SystemClock),
        docs,
        assistant,
        transport,
        api_token_hash,
        inbound_secret,
    }))
}

/// Assemble the runtime around already-built collaborators.
pub fn wire_app_state(deps: Dependencies) -> AppState {
    let Dependencies {
        config,
        clock,
        docs,
        assistant,
        transport,
        api_token_hash,
        inbound_secret,
    } = deps;

    let tenants = Arc::new(TenantRegistry::from_config(&config));
    tracing::info!(tenants = tenants.len(), "tenant table ready");

    // ── Sessions ─────────────────────────────────────────────────────
    let threads = Arc::new(ThreadManager::new(
        SessionStore::new(docs.clone(), clock.clone()),
        assistant.clone(),
    ));

    // ── Scheduling & assignment ──────────────────────────────────────
    let scheduler = Arc::new(FollowUpScheduler::new(docs.clone(), clock.clone()));
    let followup_runner = Arc::new(FollowUpRunner::new(scheduler.clone(), transport.clone()));
    let contacts = Arc::new(ContactStore::new(docs.clone()));
    let roster = Arc::new(RosterCache::new());
    let assignment = Arc::new(AssignmentEngine::new(
        roster.clone(),
        RoundRobin::new(docs.clone(), clock.clone()),
        contacts.clone(),
        transport.clone(),
    ));

    // ── Tools & turn pipeline ────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::standard(&ToolServices {
        docs: docs.clone(),
        clock: clock.clone(),
        scheduler: scheduler.clone(),
        contacts: contacts.clone(),
        assignment: assignment.clone(),
        roster: roster.clone(),
        transport: transport.clone(),
    }));
    tracing::info!(tools = tools.len(), "tool registry ready");

    let runs = Arc::new(RunEngine::new(
        assistant.clone(),
        tools.clone(),
        RunSettings::from_config(&config.assistant),
    ));
    let turns = Arc::new(TurnEngine::new(
        tenants.clone(),
        threads.clone(),
        assistant.clone(),
        runs,
        transport.clone(),
        config.assistant.part_delimiter.clone(),
    ));
    let debouncer = Arc::new(Debouncer::new(turns.clone()));

    AppState {
        config,
        clock,
        docs,
        tenants,
        assistant,
        threads,
        tools,
        turns,
        debouncer,
        transport,
        scheduler,
        followup_runner,
        contacts,
        roster,
        assignment,
        api_token_hash,
        inbound_secret,
    }
}

/// Spawn the long-running background tokio tasks (follow-up runner, idle
/// contact-lock pruning).
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Follow-up runner ─────────────────────────────────────────────
    if state.config.followups.runner_enabled {
        let runner = state.followup_runner.clone();
        let tick = Duration::from_secs(state.config.followups.tick_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                runner.tick().await;
            }
        });
        tracing::info!(tick_secs = tick.as_secs(), "follow-up runner started");
    } else {
        tracing::info!("follow-up runner disabled");
    }

    // ── Periodic contact lock pruning ────────────────────────────────
    {
        let threads = state.threads.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                threads.prune_idle_locks();
            }
        });
    }
    tracing::info!("background tasks spawned");
}
