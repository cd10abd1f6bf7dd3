/// Transaction operation kinds and their lifecycle states

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, PoolId};

/// Mutating operations the orchestrator can run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Approve,
    Stake,
    Withdraw,
    Claim,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Approve,
        OperationKind::Stake,
        OperationKind::Withdraw,
        OperationKind::Claim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Approve => "approve",
            OperationKind::Stake => "stake",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Claim => "claim",
        }
    }

    /// Whether the operation carries a token amount
    pub fn takes_amount(&self) -> bool {
        matches!(self, OperationKind::Stake | OperationKind::Withdraw)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one operation attempt
///
/// `Idle -> Validating -> Submitting -> Confirming -> {Succeeded, Failed}`;
/// validation failures go straight to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    Idle,
    Validating,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }

    /// States during which a duplicate request is refused
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            OperationState::Validating | OperationState::Submitting | OperationState::Confirming
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Submitting)
                | (Validating, Failed)
                | (Submitting, Confirming)
                | (Submitting, Failed)
                | (Confirming, Succeeded)
                | (Confirming, Failed)
                | (Succeeded, Idle)
                | (Failed, Idle)
        )
    }
}

/// Serialization key for in-flight operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub address: Address,
    /// `None` for approve, which is not tied to a pool
    pub pool: Option<PoolId>,
    pub kind: OperationKind,
}

impl OperationKey {
    pub fn new(address: Address, pool: Option<PoolId>, kind: OperationKind) -> Self {
        Self { address, pool, kind }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pool {
            Some(pool) => write!(f, "{}:{}:{}", self.address, pool, self.kind),
            None => write!(f, "{}:{}", self.address, self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        use OperationState::*;
        assert!(Idle.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Failed));
        assert!(Confirming.can_transition_to(Succeeded));
        assert!(!Idle.can_transition_to(Submitting));
        assert!(!Submitting.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Failed));
    }

    #[test]
    fn test_in_flight_states() {
        assert!(OperationState::Submitting.is_in_flight());
        assert!(OperationState::Confirming.is_in_flight());
        assert!(!OperationState::Failed.is_in_flight());
        assert!(!OperationState::Idle.is_in_flight());
    }
}
