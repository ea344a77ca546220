//! The [`Accounts`] collaborator and its store-backed implementation.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use tally_store::{codec, ReadTxn, Savepoint, WriteTxn};
use tally_types::{Account, Amount, Identity};

use crate::LedgerError;

pub const ACCOUNTS_TABLE: &str = "accounts";

/// A successful spend recorded during the current block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spend {
    pub account: Identity,
    pub amount: Amount,
    pub nonce: u64,
}

/// Balance and nonce bookkeeping used by the executor and the mempool.
pub trait Accounts: Send + Sync {
    /// Never fails for unknown identities; they read as a zero account.
    fn get_account(&self, db: &dyn ReadTxn, id: &Identity) -> Result<Account, LedgerError>;

    /// Add `amount`, creating the account if needed.
    fn credit(&self, db: &mut dyn WriteTxn, id: &Identity, amount: Amount)
        -> Result<(), LedgerError>;

    /// Debit `amount` and advance the nonce, which must be exactly the
    /// current nonce plus one. An unknown account is created when the
    /// amount is zero and the nonce is 1.
    fn spend(
        &self,
        db: &mut dyn WriteTxn,
        id: &Identity,
        amount: Amount,
        nonce: u64,
    ) -> Result<(), LedgerError>;

    /// Move `amount` between accounts, creating `to` if needed.
    fn transfer(
        &self,
        db: &mut dyn WriteTxn,
        from: &Identity,
        to: &Identity,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    fn commit(&self);

    fn rollback(&self);

    fn block_spends(&self) -> Vec<Spend>;

    fn num_accounts(&self, db: &dyn ReadTxn) -> Result<usize, LedgerError>;
}

#[derive(Serialize, Deserialize)]
struct AccountRow {
    balance: Amount,
    nonce: u64,
}

#[derive(Default)]
pub struct AccountLedger {
    spends: Mutex<Vec<Spend>>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(db: &dyn ReadTxn, id: &Identity) -> Result<Option<Account>, LedgerError> {
        let Some(bytes) = db.get(ACCOUNTS_TABLE, id.as_bytes())? else {
            return Ok(None);
        };
        let row: AccountRow = codec::decode(ACCOUNTS_TABLE, &bytes)?;
        Ok(Some(Account {
            id: id.clone(),
            balance: row.balance,
            nonce: row.nonce,
        }))
    }

    fn store(
        db: &mut dyn WriteTxn,
        id: &Identity,
        balance: Amount,
        nonce: u64,
    ) -> Result<(), LedgerError> {
        let row = codec::encode(&AccountRow { balance, nonce })?;
        db.put(ACCOUNTS_TABLE, id.as_bytes(), &row)?;
        Ok(())
    }

    fn record_spend(&self, account: &Identity, amount: Amount, nonce: u64) {
        self.spends
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Spend {
                account: account.clone(),
                amount,
                nonce,
            });
        tracing::debug!(account = %account, %amount, nonce, "recorded spend");
    }
}

impl Accounts for AccountLedger {
    fn get_account(&self, db: &dyn ReadTxn, id: &Identity) -> Result<Account, LedgerError> {
        Ok(Self::load(db, id)?.unwrap_or_else(|| Account::empty(id.clone())))
    }

    fn credit(
        &self,
        db: &mut dyn WriteTxn,
        id: &Identity,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let (balance, nonce) = match Self::load(db.as_read(), id)? {
            Some(acct) => (acct.balance, acct.nonce),
            None => (Amount::ZERO, 0),
        };
        let balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(id.clone()))?;
        Self::store(db, id, balance, nonce)
    }

    fn spend(
        &self,
        db: &mut dyn WriteTxn,
        id: &Identity,
        amount: Amount,
        nonce: u64,
    ) -> Result<(), LedgerError> {
        let Some(acct) = Self::load(db.as_read(), id)? else {
            if amount.is_zero() && nonce == 1 {
                return Self::store(db, id, Amount::ZERO, 1);
            }
            return Err(LedgerError::AccountNotFound(id.clone()));
        };

        if acct.nonce + 1 != nonce {
            return Err(LedgerError::InvalidNonce {
                expected: acct.nonce + 1,
                got: nonce,
            });
        }

        let balance = acct
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: id.clone(),
                needed: amount,
                balance: acct.balance,
            })?;

        self.record_spend(id, amount, nonce);
        Self::store(db, id, balance, nonce)
    }

    fn transfer(
        &self,
        db: &mut dyn WriteTxn,
        from: &Identity,
        to: &Identity,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let mut sp = Savepoint::begin(db)?;

        let sender = self.get_account(sp.as_read(), from)?;
        let remaining = sender
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: from.clone(),
                needed: amount,
                balance: sender.balance,
            })?;

        // Debit first so a self-transfer reads the debited balance.
        Self::store(&mut sp, from, remaining, sender.nonce)?;
        self.credit(&mut sp, to, amount)?;

        sp.commit()?;
        Ok(())
    }

    fn commit(&self) {
        self.spends
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn rollback(&self) {
        self.spends
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn block_spends(&self) -> Vec<Spend> {
        self.spends
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn num_accounts(&self, db: &dyn ReadTxn) -> Result<usize, LedgerError> {
        Ok(db.scan(ACCOUNTS_TABLE)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::MemoryStore;

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    fn funded(balance: u128) -> (AccountLedger, MemoryStore) {
        let ledger = AccountLedger::new();
        let mut db = MemoryStore::new();
        ledger.credit(&mut db, &id("alice"), Amount::new(balance)).unwrap();
        (ledger, db)
    }

    #[test]
    fn unknown_account_reads_as_zero() {
        let ledger = AccountLedger::new();
        let db = MemoryStore::new();
        let acct = ledger.get_account(&db, &id("nobody")).unwrap();
        assert_eq!(acct, Account::empty(id("nobody")));
        assert_eq!(ledger.num_accounts(&db).unwrap(), 0);
    }

    #[test]
    fn spend_advances_nonce_and_debits() {
        let (ledger, mut db) = funded(100);
        ledger.spend(&mut db, &id("alice"), Amount::new(30), 1).unwrap();
        let acct = ledger.get_account(&db, &id("alice")).unwrap();
        assert_eq!(acct.balance, Amount::new(70));
        assert_eq!(acct.nonce, 1);
        assert_eq!(ledger.block_spends().len(), 1);
    }

    #[test]
    fn spend_rejects_wrong_nonce() {
        let (ledger, mut db) = funded(100);
        let err = ledger
            .spend(&mut db, &id("alice"), Amount::new(1), 2)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidNonce {
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn spend_rejects_overdraft_without_touching_state() {
        let (ledger, mut db) = funded(5);
        let err = ledger
            .spend(&mut db, &id("alice"), Amount::new(10), 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.get_account(&db, &id("alice")).unwrap().nonce, 0);
        assert!(ledger.block_spends().is_empty());
    }

    #[test]
    fn zero_spend_creates_unknown_account() {
        let ledger = AccountLedger::new();
        let mut db = MemoryStore::new();
        ledger.spend(&mut db, &id("new"), Amount::ZERO, 1).unwrap();
        assert_eq!(ledger.get_account(&db, &id("new")).unwrap().nonce, 1);
    }

    #[test]
    fn nonzero_spend_on_unknown_account_fails() {
        let ledger = AccountLedger::new();
        let mut db = MemoryStore::new();
        let err = ledger
            .spend(&mut db, &id("new"), Amount::new(1), 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
    }

    #[test]
    fn transfer_moves_funds_and_creates_receiver() {
        let (ledger, mut db) = funded(100);
        ledger
            .transfer(&mut db, &id("alice"), &id("bob"), Amount::new(40))
            .unwrap();
        assert_eq!(
            ledger.get_account(&db, &id("alice")).unwrap().balance,
            Amount::new(60)
        );
        let bob = ledger.get_account(&db, &id("bob")).unwrap();
        assert_eq!(bob.balance, Amount::new(40));
        assert_eq!(bob.nonce, 0);
    }

    #[test]
    fn failed_transfer_leaves_no_partial_writes() {
        let (ledger, mut db) = funded(10);
        let before = db.state_hash();
        assert!(ledger
            .transfer(&mut db, &id("alice"), &id("bob"), Amount::new(11))
            .is_err());
        assert_eq!(db.depth(), 0);
        assert_eq!(db.state_hash(), before);
    }

    #[test]
    fn self_transfer_preserves_balance() {
        let (ledger, mut db) = funded(10);
        ledger
            .transfer(&mut db, &id("alice"), &id("alice"), Amount::new(4))
            .unwrap();
        assert_eq!(
            ledger.get_account(&db, &id("alice")).unwrap().balance,
            Amount::new(10)
        );
    }

    #[test]
    fn commit_clears_spend_log() {
        let (ledger, mut db) = funded(10);
        ledger.spend(&mut db, &id("alice"), Amount::new(1), 1).unwrap();
        ledger.commit();
        assert!(ledger.block_spends().is_empty());
    }
}
