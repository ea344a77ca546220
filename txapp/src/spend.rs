//! Charging a transaction before its route runs.

use std::fmt;

use tally_ledger::{Accounts, LedgerError};
use tally_store::WriteTxn;
use tally_types::{Amount, Transaction, TxCode, TxContext};

use crate::Route;

/// Why a transaction did not get past charging, and what it paid anyway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeError {
    pub spend: Amount,
    pub code: TxCode,
    pub message: String,
}

impl ChargeError {
    fn new(spend: Amount, code: TxCode, message: impl Into<String>) -> Self {
        Self {
            spend,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ChargeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (spent {}): {}", self.code, self.spend, self.message)
    }
}

impl std::error::Error for ChargeError {}

/// Charge the sender for `tx` and return the amount spent.
///
/// Every path that reaches the ledger performs exactly one successful spend,
/// possibly of zero or of the whole remaining balance, so the sender's nonce
/// advances even when the transaction is rejected here.
pub fn check_and_spend(
    accounts: &dyn Accounts,
    db: &mut dyn WriteTxn,
    ctx: &TxContext,
    tx: &Transaction,
    route: &dyn Route,
) -> Result<Amount, ChargeError> {
    let price = if ctx.gas_enabled() {
        route
            .price(tx)
            .map_err(|e| ChargeError::new(Amount::ZERO, TxCode::UnknownError, e.to_string()))?
    } else {
        Amount::ZERO
    };

    let sender = &tx.sender;
    let fee = tx.fee();
    let nonce = tx.nonce();

    if fee < price {
        return match accounts.spend(db, sender, fee, nonce) {
            Ok(()) => Err(ChargeError::new(
                fee,
                TxCode::InsufficientFee,
                format!("transaction fee {fee} is below the required {price}"),
            )),
            Err(LedgerError::InsufficientFunds { .. }) => {
                let spent = spend_remaining(accounts, db, tx)?;
                Err(ChargeError::new(
                    spent,
                    TxCode::InsufficientBalance,
                    format!("transaction tries to spend {price} tokens, but account only has {spent}"),
                ))
            }
            Err(e) => Err(spend_failure(e)),
        };
    }

    match accounts.spend(db, sender, price, nonce) {
        Ok(()) => Ok(price),
        Err(LedgerError::InsufficientFunds { .. }) => {
            let spent = spend_remaining(accounts, db, tx)?;
            Err(ChargeError::new(
                spent,
                TxCode::InsufficientBalance,
                format!("transaction tries to spend {price} tokens, but account only has {spent}"),
            ))
        }
        Err(e) => Err(spend_failure(e)),
    }
}

/// Spend whatever the sender has left.
fn spend_remaining(
    accounts: &dyn Accounts,
    db: &mut dyn WriteTxn,
    tx: &Transaction,
) -> Result<Amount, ChargeError> {
    let account = accounts
        .get_account(db.as_read(), &tx.sender)
        .map_err(|e| ChargeError::new(Amount::ZERO, TxCode::UnknownError, e.to_string()))?;
    accounts
        .spend(db, &tx.sender, account.balance, tx.nonce())
        .map_err(spend_failure)?;
    Ok(account.balance)
}

fn spend_failure(e: LedgerError) -> ChargeError {
    match e {
        LedgerError::AccountNotFound(_) => ChargeError::new(
            Amount::ZERO,
            TxCode::InsufficientBalance,
            "account has zero balance",
        ),
        e => ChargeError::new(Amount::ZERO, TxCode::UnknownError, e.to_string()),
    }
}
