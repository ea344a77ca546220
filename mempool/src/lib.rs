//! Transaction admission.
//!
//! The mempool keeps a provisional `(balance, nonce)` per sender so that a
//! sequence of pending transactions from one account can be admitted before
//! any of them is in a block. The provisional state is dropped every block.

pub mod error;
pub mod mempool;

pub use error::MempoolError;
pub use mempool::{Mempool, Rebroadcaster};
