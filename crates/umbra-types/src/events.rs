//! Pool lifecycle events.
//!
//! Events are published to observers after a call commits. Nothing in the
//! accounting core reads them back.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, EpochId, PolicyId, PositionId};

/// A committed state transition of the pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolEvent {
    EpochAdvanced {
        epoch: EpochId,
        acc_rps: u128,
        acc_sps: u128,
        total_liquidity: Amount,
    },
    PositionOpened {
        position: PositionId,
        owner: Address,
        principal: Amount,
        entered_epoch: EpochId,
    },
    PositionExitSignalled {
        position: PositionId,
        exited_epoch: EpochId,
    },
    PositionWithdrawn {
        position: PositionId,
        owner: Address,
        released: Amount,
        losses: Amount,
    },
    PositionTransferred {
        position: PositionId,
        from: Address,
        to: Address,
    },
    RewardsClaimed {
        position: PositionId,
        owner: Address,
        amount: Amount,
        epoch: EpochId,
    },
    PolicyMinted {
        policy: PolicyId,
        beneficiary: Address,
        coverage: Amount,
        fee: Amount,
        duration_days: u32,
        entered_epoch: EpochId,
    },
    ClaimApplied {
        policy: PolicyId,
    },
    ClaimApproved {
        policy: PolicyId,
        payout: Amount,
        from_reserve: Amount,
        from_pool: Amount,
    },
    ClaimRefused {
        policy: PolicyId,
    },
    PolicySettled {
        policy: PolicyId,
        settler: Address,
        settle_fee: Amount,
    },
    PolicyCancelled {
        policy: PolicyId,
        refund: Amount,
    },
}

impl PoolEvent {
    /// Short category name used for filtering subscriptions.
    pub fn category(&self) -> &'static str {
        match self {
            PoolEvent::EpochAdvanced { .. } => "epoch",
            PoolEvent::PositionOpened { .. }
            | PoolEvent::PositionExitSignalled { .. }
            | PoolEvent::PositionWithdrawn { .. }
            | PoolEvent::PositionTransferred { .. }
            | PoolEvent::RewardsClaimed { .. } => "position",
            PoolEvent::PolicyMinted { .. }
            | PoolEvent::ClaimApplied { .. }
            | PoolEvent::ClaimApproved { .. }
            | PoolEvent::ClaimRefused { .. }
            | PoolEvent::PolicySettled { .. }
            | PoolEvent::PolicyCancelled { .. } => "policy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = PoolEvent::ClaimApplied { policy: 7 };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["claim_applied"]["policy"], 7);
    }

    #[test]
    fn test_categories() {
        assert_eq!(PoolEvent::ClaimRefused { policy: 1 }.category(), "policy");
        assert_eq!(
            PoolEvent::PositionExitSignalled {
                position: 1,
                exited_epoch: 2
            }
            .category(),
            "position"
        );
        assert_eq!(
            PoolEvent::EpochAdvanced {
                epoch: 1,
                acc_rps: 0,
                acc_sps: 0,
                total_liquidity: 0
            }
            .category(),
            "epoch"
        );
    }
}
