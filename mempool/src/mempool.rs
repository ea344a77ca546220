//! Provisional account state and the admission checks run against it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tally_ledger::Accounts;
use tally_store::ReadTxn;
use tally_types::{Account, Amount, Identity, Payload, ResolutionId, Transaction, TxContext};
use tally_voting::ValidatorSet;

use crate::MempoolError;

/// Re-queues this node's votes after a vote transaction failed to enter
/// the mempool, so they are not silently lost.
pub trait Rebroadcaster: Send + Sync {
    fn mark_rebroadcast(&self, ids: &[ResolutionId]);
}

pub struct Mempool {
    accounts: Mutex<HashMap<Identity, Account>>,
    ledger: Arc<dyn Accounts>,
    validators: Arc<ValidatorSet>,
    /// Identity of the local node, used to recognise its own votes.
    identity: Identity,
}

impl Mempool {
    pub fn new(ledger: Arc<dyn Accounts>, validators: Arc<ValidatorSet>, identity: Identity) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            ledger,
            validators,
            identity,
        }
    }

    /// Admit `tx` against the provisional state, updating it on success.
    pub fn apply_transaction(
        &self,
        ctx: &TxContext,
        tx: &Transaction,
        db: &dyn ReadTxn,
        rebroadcaster: Option<&dyn Rebroadcaster>,
    ) -> Result<(), MempoolError> {
        let payload_type = tx.payload_type();
        if ctx.params().migration_status.is_migrating() && payload_type.frozen_during_migration() {
            return Err(MempoolError::NetworkInMigration(payload_type));
        }

        match tx.payload() {
            Payload::ValidatorVoteIds { resolution_ids } => {
                self.require_validator(&tx.sender)?;
                let max = ctx.params().max_votes_per_tx;
                if resolution_ids.len() > max {
                    return Err(MempoolError::TooManyVotes {
                        count: resolution_ids.len(),
                        max,
                    });
                }
            }
            Payload::ValidatorVoteBodies { .. } => self.require_validator(&tx.sender)?,
            _ => {}
        }

        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);

        let acct = match accounts.get(&tx.sender) {
            Some(acct) => acct.clone(),
            None => {
                let acct = self.ledger.get_account(db, &tx.sender)?;
                accounts.insert(tx.sender.clone(), acct.clone());
                acct
            }
        };

        if ctx.gas_enabled() && acct.is_unfunded() {
            accounts.remove(&tx.sender);
            tracing::debug!(sender = %tx.sender, "rejecting transaction from unfunded account");
            return Err(MempoolError::Unfunded(tx.sender.clone()));
        }

        let expected = acct.nonce + 1;
        if tx.nonce() != expected {
            if let (Payload::ValidatorVoteIds { resolution_ids }, Some(rebroadcaster)) =
                (tx.payload(), rebroadcaster)
            {
                if tx.sender == self.identity {
                    tracing::info!(
                        votes = resolution_ids.len(),
                        "own vote transaction rejected, queueing votes for rebroadcast"
                    );
                    rebroadcaster.mark_rebroadcast(resolution_ids);
                }
            }
            return Err(MempoolError::InvalidNonce {
                expected,
                got: tx.nonce(),
            });
        }

        let value = tx.payload().declared_value();
        if value > acct.balance {
            return Err(MempoolError::InsufficientBalance {
                needed: value,
                balance: acct.balance,
            });
        }

        // Execution charges nothing when gas is off, so neither does admission.
        let fee = if ctx.gas_enabled() { tx.fee() } else { Amount::ZERO };
        let spend = fee.saturating_add(value);
        let debit = spend.min(acct.balance);

        accounts.insert(
            tx.sender.clone(),
            Account {
                id: acct.id,
                balance: acct.balance.saturating_sub(debit),
                nonce: tx.nonce(),
            },
        );
        Ok(())
    }

    fn require_validator(&self, sender: &Identity) -> Result<(), MempoolError> {
        if self.validators.get_power(sender) == 0 {
            return Err(MempoolError::NotAValidator(sender.clone()));
        }
        Ok(())
    }

    /// Provisional state for `id` if the mempool has seen it, otherwise the
    /// committed ledger state.
    pub fn account_info(&self, db: &dyn ReadTxn, id: &Identity) -> Result<Account, MempoolError> {
        if let Some(acct) = self
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Ok(acct.clone());
        }
        Ok(self.ledger.get_account(db, id)?)
    }

    /// Drop all provisional state.
    pub fn reset(&self) {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
