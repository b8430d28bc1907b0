//! Scenario replay.
//!
//! A scenario is a JSON file naming accounts and a timed list of actions.
//! The node replays it against a fresh pool backed by in-memory custody and
//! reports the outcome of every step.
//!
//! ```json
//! {
//!   "owner": "admin",
//!   "judger": "admin",
//!   "reserve": 20000000000,
//!   "accounts": {
//!     "admin": { "address": "0101010101010101010101010101010101010101" },
//!     "alice": { "address": "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1", "balance": 11000000000 }
//!   },
//!   "steps": [
//!     { "at": 0, "action": { "initialize": { "caller": "admin" } } },
//!     { "at": 0, "action": { "open_position": { "caller": "alice", "principal": 11000000000 } } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use umbra_ledger::memory::{InMemoryCustody, InMemoryReserve, RoleTable};
use umbra_ledger::{CoverTerms, InsurancePool, LedgerError, PoolConfig, PoolSummary};
use umbra_pricing::LinearPremiumOracle;
use umbra_types::{Address, Amount, PolicyId, PositionId};

use crate::events::EventBus;

/// Custody account holding the risk reserve's funds.
pub const RESERVE_ACCOUNT: Address = Address::repeat_byte(0xEE);

/// Pool type used by the node.
pub type SimulatedPool = InsurancePool<InMemoryCustody, InMemoryReserve>;

/// Scenario failure.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("unknown account {0:?}")]
    UnknownAccount(String),

    #[error("steps out of order at step {0}")]
    OutOfOrder(usize),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("reading scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing scenario: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScenarioError>;

/// A named account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    #[serde(default)]
    pub balance: Amount,
}

/// A complete scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub judger: Option<String>,
    #[serde(default)]
    pub official: Option<String>,
    /// Initial risk reserve.
    #[serde(default)]
    pub reserve: Amount,
    pub accounts: BTreeMap<String, Account>,
    pub steps: Vec<Step>,
}

/// One timed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unix timestamp the action runs at.
    pub at: u64,
    pub action: Action,
}

/// Pool entry points, with actors by account name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Initialize {
        caller: String,
    },
    Poke,
    OpenPosition {
        caller: String,
        principal: Amount,
    },
    OpenViaProxy {
        caller: String,
        owner: String,
        principal: Amount,
    },
    SetMiningProxy {
        caller: String,
        proxy: String,
    },
    ClaimRewards {
        caller: String,
        position: PositionId,
    },
    SignalExit {
        caller: String,
        position: PositionId,
    },
    Exit {
        caller: String,
        position: PositionId,
        #[serde(default)]
        immediate: bool,
    },
    WithdrawAfterExit {
        caller: String,
        position: PositionId,
    },
    TransferPosition {
        caller: String,
        position: PositionId,
        to: String,
    },
    MintPolicy {
        caller: String,
        beneficiary: String,
        coverage: Amount,
        duration_days: u32,
        #[serde(default)]
        spot: u128,
        #[serde(default)]
        strike: u128,
    },
    ClaimApply {
        caller: String,
        policy: PolicyId,
    },
    ApproveApply {
        caller: String,
        policy: PolicyId,
    },
    RefuseApply {
        caller: String,
        policy: PolicyId,
    },
    Settle {
        caller: String,
        policy: PolicyId,
    },
    CancelPolicy {
        caller: String,
        policy: PolicyId,
    },
    UpdateRiskParameters {
        caller: String,
        max_insurable_bps: u32,
        initial_risk_bps: u32,
        risk_slope_bps: u32,
    },
    SetStandardRisk {
        caller: String,
        standard_risk: Amount,
    },
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: usize,
    pub at: u64,
    /// Returned id or amount, if any.
    pub value: Option<u128>,
    pub error: Option<String>,
}

/// Result of a full replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub name: String,
    pub outcomes: Vec<StepOutcome>,
    pub failed: usize,
    pub summary: PoolSummary,
}

impl Scenario {
    /// Read a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn address(&self, name: &str) -> Result<Address> {
        self.accounts
            .get(name)
            .map(|account| account.address)
            .ok_or_else(|| ScenarioError::UnknownAccount(name.to_string()))
    }

    /// Build a fresh pool with funded accounts, roles and the event bus.
    pub fn build_pool(&self, config: PoolConfig, bus: EventBus) -> Result<SimulatedPool> {
        let mut custody = InMemoryCustody::new();
        for account in self.accounts.values() {
            custody.mint(account.address, account.balance);
        }
        custody.mint(RESERVE_ACCOUNT, self.reserve);

        let mut roles = RoleTable::new(self.address(&self.owner)?);
        if let Some(judger) = &self.judger {
            roles = roles.with_judger(self.address(judger)?);
        }
        if let Some(official) = &self.official {
            roles = roles.with_official(self.address(official)?);
        }

        let mut pool = InsurancePool::new(
            config,
            custody,
            InMemoryReserve::new(RESERVE_ACCOUNT, self.reserve),
            Box::new(roles),
            Box::new(LinearPremiumOracle::new()),
        )?;
        pool.add_observer(Box::new(bus));
        Ok(pool)
    }

    /// Replay every step. Ledger errors are recorded per step; unknown
    /// accounts and time running backwards abort the replay.
    pub fn replay(&self, pool: &mut SimulatedPool) -> Result<ReplayReport> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        let mut last_at = 0;
        for (index, step) in self.steps.iter().enumerate() {
            if step.at < last_at {
                return Err(ScenarioError::OutOfOrder(index));
            }
            last_at = step.at;

            let outcome = match self.apply(pool, step) {
                Ok(value) => StepOutcome {
                    step: index,
                    at: step.at,
                    value,
                    error: None,
                },
                Err(ScenarioError::Ledger(err)) => {
                    warn!(step = index, at = step.at, error = %err, "step failed");
                    StepOutcome {
                        step: index,
                        at: step.at,
                        value: None,
                        error: Some(err.to_string()),
                    }
                }
                Err(other) => return Err(other),
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        let summary = pool.pool_summary(last_at)?;
        info!(
            name = %self.name,
            steps = outcomes.len(),
            failed,
            total_liquidity = summary.total_liquidity,
            "scenario replayed"
        );
        Ok(ReplayReport {
            name: self.name.clone(),
            outcomes,
            failed,
            summary,
        })
    }

    fn apply(&self, pool: &mut SimulatedPool, step: &Step) -> Result<Option<u128>> {
        let now = step.at;
        let value = match &step.action {
            Action::Initialize { caller } => {
                pool.initialize(self.address(caller)?, now)?;
                None
            }
            Action::Poke => Some(u128::from(pool.poke(now)?)),
            Action::OpenPosition { caller, principal } => Some(u128::from(
                pool.open_position(self.address(caller)?, *principal, now)?,
            )),
            Action::OpenViaProxy {
                caller,
                owner,
                principal,
            } => Some(u128::from(pool.open_via_proxy(
                self.address(caller)?,
                self.address(owner)?,
                *principal,
                now,
            )?)),
            Action::SetMiningProxy { caller, proxy } => {
                pool.set_mining_proxy(self.address(caller)?, self.address(proxy)?, now)?;
                None
            }
            Action::ClaimRewards { caller, position } => {
                Some(pool.claim_rewards(self.address(caller)?, *position, now)?)
            }
            Action::SignalExit { caller, position } => Some(u128::from(pool.signal_exit(
                self.address(caller)?,
                *position,
                now,
            )?)),
            Action::Exit {
                caller,
                position,
                immediate,
            } => pool.exit(self.address(caller)?, *position, *immediate, now)?,
            Action::WithdrawAfterExit { caller, position } => {
                Some(pool.withdraw_after_exit(self.address(caller)?, *position, now)?)
            }
            Action::TransferPosition {
                caller,
                position,
                to,
            } => {
                pool.transfer_position(self.address(caller)?, *position, self.address(to)?, now)?;
                None
            }
            Action::MintPolicy {
                caller,
                beneficiary,
                coverage,
                duration_days,
                spot,
                strike,
            } => {
                let terms = CoverTerms::new(*coverage, *duration_days).with_trigger(*spot, *strike);
                Some(u128::from(pool.mint_policy(
                    self.address(caller)?,
                    self.address(beneficiary)?,
                    terms,
                    now,
                )?))
            }
            Action::ClaimApply { caller, policy } => {
                pool.claim_apply(self.address(caller)?, *policy, now)?;
                None
            }
            Action::ApproveApply { caller, policy } => {
                Some(pool.approve_apply(self.address(caller)?, *policy, now)?)
            }
            Action::RefuseApply { caller, policy } => {
                pool.refuse_apply(self.address(caller)?, *policy, now)?;
                None
            }
            Action::Settle { caller, policy } => {
                Some(pool.settle(self.address(caller)?, *policy, now)?)
            }
            Action::CancelPolicy { caller, policy } => {
                Some(pool.cancel_policy(self.address(caller)?, *policy, now)?)
            }
            Action::UpdateRiskParameters {
                caller,
                max_insurable_bps,
                initial_risk_bps,
                risk_slope_bps,
            } => {
                pool.update_risk_parameters(
                    self.address(caller)?,
                    *max_insurable_bps,
                    *initial_risk_bps,
                    *risk_slope_bps,
                    now,
                )?;
                None
            }
            Action::SetStandardRisk {
                caller,
                standard_risk,
            } => {
                pool.set_standard_risk(self.address(caller)?, *standard_risk, now)?;
                None
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use umbra_types::units;

    use super::*;

    const DAY: u64 = 86_400;

    fn scenario() -> Scenario {
        serde_json::from_str(
            r#"{
                "name": "smoke",
                "owner": "admin",
                "judger": "admin",
                "accounts": {
                    "admin": { "address": "0101010101010101010101010101010101010101" },
                    "alice": { "address": "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1", "balance": 11000000000 },
                    "bob": { "address": "b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0", "balance": 100000000 }
                },
                "steps": [
                    { "at": 0, "action": { "initialize": { "caller": "admin" } } },
                    { "at": 0, "action": { "open_position": { "caller": "alice", "principal": 11000000000 } } },
                    { "at": 86400, "action": { "mint_policy": { "caller": "bob", "beneficiary": "bob", "coverage": 1000000000, "duration_days": 365 } } },
                    { "at": 86400, "action": { "claim_apply": { "caller": "bob", "policy": 1 } } },
                    { "at": 172800, "action": "poke" }
                ]
            }"#,
        )
        .expect("parse")
    }

    fn config() -> PoolConfig {
        PoolConfig {
            risk_slope_bps: 0,
            reserve_premium_bps: 0,
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_replay_records_outcomes() {
        let scenario = scenario();
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut pool = scenario.build_pool(config(), bus).expect("pool");
        let report = scenario.replay(&mut pool).expect("replay");

        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.outcomes[1].value, Some(1));
        assert_eq!(report.outcomes[2].value, Some(1));
        // Policy not yet in force during its mint epoch.
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.outcomes[3].error.as_deref(),
            Some("policy is not in force")
        );
        assert_eq!(report.summary.current_epoch, 2);
        assert_eq!(report.summary.total_liquidity, units(11_000));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_unknown_account_aborts() {
        let mut scenario = scenario();
        scenario.steps.push(Step {
            at: 3 * DAY,
            action: Action::ClaimApply {
                caller: "mallory".to_string(),
                policy: 1,
            },
        });
        let mut pool = scenario
            .build_pool(config(), EventBus::new(8))
            .expect("pool");
        assert!(matches!(
            scenario.replay(&mut pool),
            Err(ScenarioError::UnknownAccount(name)) if name == "mallory"
        ));
    }

    #[test]
    fn test_out_of_order_steps() {
        let mut scenario = scenario();
        scenario.steps.push(Step {
            at: 10,
            action: Action::Poke,
        });
        let mut pool = scenario
            .build_pool(config(), EventBus::new(8))
            .expect("pool");
        assert!(matches!(
            scenario.replay(&mut pool),
            Err(ScenarioError::OutOfOrder(5))
        ));
    }
}
