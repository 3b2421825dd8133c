//! `LocalRuntime`: an `Engine` wired to the file-backed collaborators of one
//! workspace.

use std::path::PathBuf;

use tracing::info;

use lemming_config::{agents::load_agents, settings::load_or_default, TomlAgentDirectory, Workspace};
use lemming_contracts::{config::EngineConfig, error::LemmingResult, turn::TickReport};
use lemming_core::{
    engine::{Collaborators, Engine, StopSignal},
    traits::Generator,
    TickClock,
};
use lemming_outbox::FsOutboxStore;
use lemming_verify::JsonResponseDecoder;

use crate::credits::JsonCreditLedger;
use crate::logger::TracingActionLogger;
use crate::memory::FsMemoryStore;
use crate::tools::BuiltinTools;

pub struct LocalRuntime {
    workspace: Workspace,
    engine: Engine,
}

impl LocalRuntime {
    /// Open the workspace at `base` with its `engine.toml` (or defaults).
    pub fn open(base: impl Into<PathBuf>, generator: Box<dyn Generator>) -> LemmingResult<Self> {
        let workspace = Workspace::new(base);
        let config = load_or_default(&workspace.engine_config_path())?;
        Self::with_config(workspace, config, generator)
    }

    /// Open `workspace` with an explicit config.
    ///
    /// Agents missing from the credit ledger are seeded with their
    /// descriptor's `max_credits`.
    pub fn with_config(workspace: Workspace, config: EngineConfig, generator: Box<dyn Generator>) -> LemmingResult<Self> {
        let agents_dir = workspace.agents_dir();

        let ledger = JsonCreditLedger::open(workspace.credits_path())?;
        ledger.seed(&load_agents(&agents_dir)?)?;

        let parts = Collaborators {
            agents: Box::new(TomlAgentDirectory::new(&agents_dir)),
            outbox: Box::new(FsOutboxStore::new(&agents_dir)),
            generator,
            decoder: Box::new(JsonResponseDecoder::default()),
            tools: Box::new(BuiltinTools::with_defaults()),
            memory: Box::new(FsMemoryStore::new(&agents_dir)),
            credits: Box::new(ledger),
            logger: Box::new(TracingActionLogger::with_activity_logs(&agents_dir)),
        };
        let engine = Engine::new(parts, TickClock::new(workspace.tick_path()), config);

        info!(base = %workspace.base().display(), next_tick = engine.current_tick(), "local runtime ready");
        Ok(Self { workspace, engine })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// A read handle on the same outbox directories the engine writes.
    pub fn outbox(&self) -> FsOutboxStore {
        FsOutboxStore::new(self.workspace.agents_dir())
    }

    pub fn run_once(&self) -> LemmingResult<TickReport> {
        self.engine.run_once(None)
    }

    /// Run `count` consecutive ticks from the persisted clock, stopping at
    /// the first failure.
    pub fn run_ticks(&self, count: u64) -> LemmingResult<Vec<TickReport>> {
        (0..count).map(|_| self.engine.run_once(None)).collect()
    }

    pub fn run_forever(&self, stop: &StopSignal) -> LemmingResult<u64> {
        self.engine.run_forever(stop)
    }
}
