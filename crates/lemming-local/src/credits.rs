//! `JsonCreditLedger`: per-agent credit balances in `credits.json`.
//!
//! ```json
//! { "scout": { "credits_left": 9.5 } }
//! ```
//!
//! Unknown agents have a zero balance. Every deduction is rounded to four
//! decimals and written back before it returns. Keys other than
//! `credits_left` survive a rewrite untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use lemming_contracts::{
    agent::{AgentDescriptor, AgentId, Balance},
    error::{LemmingError, LemmingResult},
};
use lemming_core::{persist::write_json_atomic, traits::CreditLedger};

/// One agent's ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAccount {
    #[serde(default)]
    pub credits_left: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CreditAccount {
    fn with_credits(credits_left: f64) -> Self {
        Self { credits_left, extra: Map::new() }
    }
}

/// Round to the ledger's precision of four decimals.
pub fn round_credits(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub struct JsonCreditLedger {
    path: PathBuf,
    accounts: Mutex<BTreeMap<String, CreditAccount>>,
}

impl JsonCreditLedger {
    /// Open the ledger at `path`. A missing file is an empty ledger; a
    /// malformed one is an error.
    pub fn open(path: impl Into<PathBuf>) -> LemmingResult<Self> {
        let path = path.into();
        let accounts = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| LemmingError::CreditLedger {
                reason: format!("failed to parse {}: {}", path.display(), e),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(LemmingError::CreditLedger {
                    reason: format!("failed to read {}: {}", path.display(), e),
                })
            }
        };
        debug!(path = %path.display(), "credit ledger opened");
        Ok(Self { path, accounts: Mutex::new(accounts) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> LemmingResult<std::sync::MutexGuard<'_, BTreeMap<String, CreditAccount>>> {
        self.accounts.lock().map_err(|e| LemmingError::CreditLedger {
            reason: format!("ledger lock poisoned: {}", e),
        })
    }

    fn persist(&self, accounts: &BTreeMap<String, CreditAccount>) -> LemmingResult<()> {
        write_json_atomic(&self.path, accounts).map_err(|e| LemmingError::CreditLedger {
            reason: format!("failed to write {}: {}", self.path.display(), e),
        })
    }

    /// Give every agent missing from the ledger its descriptor's
    /// `max_credits`. Existing balances are left alone. Returns how many
    /// accounts were created.
    pub fn seed(&self, agents: &[AgentDescriptor]) -> LemmingResult<usize> {
        let mut accounts = self.lock()?;
        let mut created = 0usize;
        for agent in agents {
            if !accounts.contains_key(agent.id.as_str()) {
                accounts.insert(
                    agent.id.to_string(),
                    CreditAccount::with_credits(round_credits(agent.credits.max_credits)),
                );
                created += 1;
            }
        }
        if created > 0 {
            self.persist(&accounts)?;
            info!(created, "credit ledger seeded");
        }
        Ok(created)
    }

    /// Overwrite an agent's balance.
    pub fn set(&self, agent: &AgentId, credits_left: f64) -> LemmingResult<()> {
        let mut accounts = self.lock()?;
        accounts
            .entry(agent.to_string())
            .or_insert_with(|| CreditAccount::with_credits(0.0))
            .credits_left = round_credits(credits_left);
        self.persist(&accounts)
    }
}

impl CreditLedger for JsonCreditLedger {
    fn balance(&self, agent: &AgentId) -> LemmingResult<Balance> {
        let accounts = self.lock()?;
        let credits_left = accounts.get(agent.as_str()).map_or(0.0, |a| a.credits_left);
        Ok(Balance { credits_left })
    }

    fn deduct(&self, agent: &AgentId, amount: f64) -> LemmingResult<Balance> {
        let mut accounts = self.lock()?;
        let account = accounts
            .entry(agent.to_string())
            .or_insert_with(|| CreditAccount::with_credits(0.0));
        account.credits_left = round_credits(account.credits_left - amount);
        let balance = Balance { credits_left: account.credits_left };

        self.persist(&accounts)?;
        debug!(agent = %agent, amount, credits_left = balance.credits_left, "credits deducted");
        Ok(balance)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_agent_has_zero_balance() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonCreditLedger::open(dir.path().join("credits.json")).unwrap();
        let balance = ledger.balance(&AgentId::new("ghost")).unwrap();
        assert_eq!(balance.credits_left, 0.0);
        assert!(balance.is_exhausted());
    }

    #[test]
    fn deductions_round_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/credits.json");
        let agent = AgentId::new("scout");

        let ledger = JsonCreditLedger::open(&path).unwrap();
        ledger.set(&agent, 1.0).unwrap();
        for _ in 0..3 {
            ledger.deduct(&agent, 0.1).unwrap();
        }
        assert_eq!(ledger.balance(&agent).unwrap().credits_left, 0.7);

        let reopened = JsonCreditLedger::open(&path).unwrap();
        assert_eq!(reopened.balance(&agent).unwrap().credits_left, 0.7);
    }

    #[test]
    fn seed_only_fills_missing_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonCreditLedger::open(dir.path().join("credits.json")).unwrap();
        let mut scout = AgentDescriptor::new("scout");
        scout.credits.max_credits = 5.0;
        let writer = AgentDescriptor::new("writer");

        ledger.set(&writer.id, 2.5).unwrap();
        assert_eq!(ledger.seed(&[scout.clone(), writer.clone()]).unwrap(), 1);
        assert_eq!(ledger.seed(&[scout.clone(), writer.clone()]).unwrap(), 0);

        assert_eq!(ledger.balance(&scout.id).unwrap().credits_left, 5.0);
        assert_eq!(ledger.balance(&writer.id).unwrap().credits_left, 2.5);
    }

    #[test]
    fn extra_keys_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credits.json");
        fs::write(&path, r#"{"scout": {"credits_left": 3.0, "model": "small"}}"#).unwrap();

        let ledger = JsonCreditLedger::open(&path).unwrap();
        ledger.deduct(&AgentId::new("scout"), 1.0).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["scout"]["credits_left"], 2.0);
        assert_eq!(raw["scout"]["model"], "small");
    }

    #[test]
    fn malformed_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credits.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(JsonCreditLedger::open(&path), Err(LemmingError::CreditLedger { .. })));
    }
}
