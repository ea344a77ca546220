//! Transaction router and block executor.
//!
//! [`TxApp`] is driven by the consensus layer once per block, strictly in
//! this order: `begin`, `execute` for every transaction, `finalize`, then
//! `commit` or `rollback`. Each transaction is charged before its route runs
//! and the charge survives any failure of the route itself. At block end,
//! resolutions that reached their confirmation threshold are applied and
//! stale ones expire.

pub mod credit;
pub mod error;
pub mod pricing;
pub mod route;
pub mod routes;
pub mod spend;
pub mod txapp;
mod votes;

pub use credit::CreditMap;
pub use error::TxAppError;
pub use route::{Route, RouteError, RouteTable};
pub use spend::{check_and_spend, ChargeError};
pub use txapp::{FinalizeOutcome, TxApp, TxResponse};
