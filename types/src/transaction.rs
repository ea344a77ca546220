//! Transactions and their typed payloads.
//!
//! Signature verification and the binary wire format belong to the transport
//! layer; by the time a transaction reaches this core its sender is trusted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Amount, Identity, ResolutionId, TypesError, VotableEvent};

/// Discriminant used to key the route table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PayloadType {
    Transfer,
    ValidatorJoin,
    ValidatorApprove,
    ValidatorRemove,
    ValidatorLeave,
    ValidatorVoteIds,
    ValidatorVoteBodies,
    CreateResolution,
    ApproveResolution,
}

impl PayloadType {
    pub const ALL: [PayloadType; 9] = [
        PayloadType::Transfer,
        PayloadType::ValidatorJoin,
        PayloadType::ValidatorApprove,
        PayloadType::ValidatorRemove,
        PayloadType::ValidatorLeave,
        PayloadType::ValidatorVoteIds,
        PayloadType::ValidatorVoteBodies,
        PayloadType::CreateResolution,
        PayloadType::ApproveResolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::Transfer => "transfer",
            PayloadType::ValidatorJoin => "validator_join",
            PayloadType::ValidatorApprove => "validator_approve",
            PayloadType::ValidatorRemove => "validator_remove",
            PayloadType::ValidatorLeave => "validator_leave",
            PayloadType::ValidatorVoteIds => "validator_vote_ids",
            PayloadType::ValidatorVoteBodies => "validator_vote_bodies",
            PayloadType::CreateResolution => "create_resolution",
            PayloadType::ApproveResolution => "approve_resolution",
        }
    }

    /// Payload types refused while the network is migrating.
    pub fn frozen_during_migration(&self) -> bool {
        matches!(
            self,
            PayloadType::ValidatorJoin
                | PayloadType::ValidatorApprove
                | PayloadType::ValidatorRemove
                | PayloadType::ValidatorLeave
                | PayloadType::ValidatorVoteIds
                | PayloadType::ValidatorVoteBodies
                | PayloadType::Transfer
        )
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PayloadType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TypesError::UnknownPayloadType(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Transfer { to: Identity, amount: Amount },
    /// Request to join the validator set with the given power.
    ValidatorJoin { power: u64 },
    /// Existing validator approving a pending join.
    ValidatorApprove { candidate: Identity },
    /// Existing validator voting to remove another.
    ValidatorRemove { validator: Identity },
    ValidatorLeave,
    /// Approvals for resolutions whose bodies are already on chain.
    ValidatorVoteIds { resolution_ids: Vec<ResolutionId> },
    /// Full event bodies, submitted by the block proposer.
    ValidatorVoteBodies { events: Vec<VotableEvent> },
    CreateResolution { resolution: VotableEvent },
    ApproveResolution { resolution_id: ResolutionId },
}

impl Payload {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Payload::Transfer { .. } => PayloadType::Transfer,
            Payload::ValidatorJoin { .. } => PayloadType::ValidatorJoin,
            Payload::ValidatorApprove { .. } => PayloadType::ValidatorApprove,
            Payload::ValidatorRemove { .. } => PayloadType::ValidatorRemove,
            Payload::ValidatorLeave => PayloadType::ValidatorLeave,
            Payload::ValidatorVoteIds { .. } => PayloadType::ValidatorVoteIds,
            Payload::ValidatorVoteBodies { .. } => PayloadType::ValidatorVoteBodies,
            Payload::CreateResolution { .. } => PayloadType::CreateResolution,
            Payload::ApproveResolution { .. } => PayloadType::ApproveResolution,
        }
    }

    /// Value moved by the payload on top of the fee.
    pub fn declared_value(&self) -> Amount {
        match self {
            Payload::Transfer { amount, .. } => *amount,
            _ => Amount::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub payload: Payload,
    /// Maximum amount the sender consents to pay for execution.
    pub fee: Amount,
    /// Must equal the sender's current nonce + 1.
    pub nonce: u64,
    #[serde(default)]
    pub chain_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Identity,
    pub body: TxBody,
}

impl Transaction {
    pub fn new(sender: impl Into<Identity>, payload: Payload, fee: Amount, nonce: u64) -> Self {
        Self {
            sender: sender.into(),
            body: TxBody {
                payload,
                fee,
                nonce,
                chain_id: String::new(),
            },
        }
    }

    pub fn payload_type(&self) -> PayloadType {
        self.body.payload.payload_type()
    }

    pub fn payload(&self) -> &Payload {
        &self.body.payload
    }

    pub fn fee(&self) -> Amount {
        self.body.fee
    }

    pub fn nonce(&self) -> u64 {
        self.body.nonce
    }
}
