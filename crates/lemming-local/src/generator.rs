//! Generator implementations that need no network provider.
//!
//! - [`ScriptedGenerator`] replays canned responses per agent.
//! - [`RetryingGenerator`] wraps any generator with bounded retries.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use lemming_contracts::{
    error::{LemmingError, LemmingResult},
    prompt::PromptMessage,
};
use lemming_core::{context::prompt_agent, traits::Generator};

/// A well-formed response that does nothing.
pub const IDLE_RESPONSE: &str =
    r#"{"outbox_entries": [], "tool_calls": [], "memory_updates": [], "notes": ""}"#;

// ── ScriptedGenerator ─────────────────────────────────────────────────────────

/// TOML form of a script.
///
/// ```toml
/// idle = '{"outbox_entries": [], "tool_calls": [], "memory_updates": [], "notes": "waiting"}'
///
/// [agents]
/// scout = ['{"outbox_entries": [{"kind": "message", "payload": {"text": "hi"}}], ...}']
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Script {
    #[serde(default)]
    idle: Option<String>,
    #[serde(default)]
    agents: BTreeMap<String, Vec<String>>,
}

/// Answers each agent from its own queue, in order. Once the queue is empty
/// the agent gets the idle response.
pub struct ScriptedGenerator {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    idle: String,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self { queues: Mutex::new(HashMap::new()), idle: IDLE_RESPONSE.to_string() }
    }

    pub fn from_toml_str(s: &str) -> LemmingResult<Self> {
        let script: Script = toml::from_str(s).map_err(|e| LemmingError::ConfigError {
            reason: format!("failed to parse script TOML: {}", e),
        })?;

        let generator = Self::new();
        let mut generator = match script.idle {
            Some(idle) => generator.with_idle(idle),
            None => generator,
        };
        for (agent, responses) in script.agents {
            generator = generator.with_responses(agent, responses);
        }
        Ok(generator)
    }

    pub fn from_file(path: &Path) -> LemmingResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LemmingError::ConfigError {
            reason: format!("failed to read script file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_idle(mut self, idle: impl Into<String>) -> Self {
        self.idle = idle.into();
        self
    }

    /// Queue `responses` after anything already queued for `agent`.
    pub fn with_responses<I, S>(self, agent: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(agent.into()).or_default().extend(responses.into_iter().map(Into::into));
        }
        self
    }

    /// Responses still queued for `agent`.
    pub fn remaining(&self, agent: &str) -> usize {
        self.queues.lock().map_or(0, |q| q.get(agent).map_or(0, VecDeque::len))
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, model_key: &str, messages: &[PromptMessage], _temperature: f64) -> LemmingResult<String> {
        let agent = prompt_agent(messages).ok_or_else(|| LemmingError::Generation {
            reason: "prompt does not name an agent".to_string(),
        })?;

        let mut queues = self.queues.lock().map_err(|e| LemmingError::Generation {
            reason: format!("script lock poisoned: {}", e),
        })?;
        let next = queues.get_mut(agent).and_then(VecDeque::pop_front);
        debug!(agent, model_key, scripted = next.is_some(), "scripted response");
        Ok(next.unwrap_or_else(|| self.idle.clone()))
    }
}

// ── RetryingGenerator ─────────────────────────────────────────────────────────

/// Retries a failing inner generator up to `attempts` times with a fixed
/// pause between tries. Only the final outcome reaches the caller.
pub struct RetryingGenerator<G> {
    inner: G,
    attempts: u32,
    backoff: Duration,
}

impl<G: Generator> RetryingGenerator<G> {
    /// `attempts` counts the first call; values below 1 mean 1.
    pub fn new(inner: G, attempts: u32, backoff: Duration) -> Self {
        Self { inner, attempts: attempts.max(1), backoff }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: Generator> Generator for RetryingGenerator<G> {
    fn generate(&self, model_key: &str, messages: &[PromptMessage], temperature: f64) -> LemmingResult<String> {
        let mut attempt = 1;
        loop {
            match self.inner.generate(model_key, messages, temperature) {
                Ok(text) => return Ok(text),
                Err(e) if attempt >= self.attempts => {
                    warn!(model_key, attempts = self.attempts, error = %e, "generation failed, giving up");
                    return Err(e);
                }
                Err(e) => {
                    warn!(model_key, attempt, attempts = self.attempts, error = %e, "generation failed, retrying");
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
