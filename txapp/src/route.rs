//! The route abstraction and the table that dispatches to it.

use std::collections::BTreeMap;
use std::fmt;

use tally_ledger::LedgerError;
use tally_types::{Amount, PayloadType, Transaction, TxCode, TxContext};
use tally_voting::{App, VotingError};

use crate::routes;
use crate::TxAppError;

/// A failed route step: the code reported to the submitter plus a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteError {
    pub code: TxCode,
    pub message: String,
}

impl RouteError {
    pub fn new(code: TxCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RouteError {}

impl From<VotingError> for RouteError {
    fn from(e: VotingError) -> Self {
        Self::new(TxCode::UnknownError, e.to_string())
    }
}

impl From<LedgerError> for RouteError {
    fn from(e: LedgerError) -> Self {
        let code = match e {
            LedgerError::InsufficientFunds { .. } => TxCode::InsufficientBalance,
            LedgerError::Overflow(_) => TxCode::InvalidAmount,
            _ => TxCode::UnknownError,
        };
        Self::new(code, e.to_string())
    }
}

/// Handler for one payload type.
///
/// The executor charges the sender using `price`, then calls `pre_tx`, then
/// runs `in_tx` inside a nested transaction that is rolled back if it fails.
/// Routes are stateless; everything they need comes from the transaction
/// and the context.
pub trait Route: Send + Sync {
    fn payload_type(&self) -> PayloadType;

    fn price(&self, tx: &Transaction) -> Result<Amount, RouteError>;

    /// Checks that need no state, such as migration gates and payload shape.
    fn pre_tx(&self, _ctx: &TxContext, _tx: &Transaction) -> Result<(), RouteError> {
        Ok(())
    }

    fn in_tx(&self, ctx: &TxContext, app: &mut App<'_>, tx: &Transaction)
        -> Result<(), RouteError>;
}

#[derive(Default)]
pub struct RouteTable {
    routes: BTreeMap<PayloadType, Box<dyn Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every built-in route.
    pub fn builtin() -> Result<Self, TxAppError> {
        let mut table = Self::new();
        for route in routes::all() {
            table.register(route)?;
        }
        Ok(table)
    }

    pub fn register(&mut self, route: Box<dyn Route>) -> Result<(), TxAppError> {
        let payload_type = route.payload_type();
        if self.routes.contains_key(&payload_type) {
            return Err(TxAppError::DuplicateRoute(payload_type));
        }
        self.routes.insert(payload_type, route);
        Ok(())
    }

    pub fn get(&self, payload_type: PayloadType) -> Option<&dyn Route> {
        self.routes.get(&payload_type).map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
