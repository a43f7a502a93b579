//! # Proxy Ledger
//!
//! Durable storage for the LLM API proxy: API-key users, the append-only
//! usage ledger, the error trace log, and the cost-aggregation queries that
//! serve admin reports.
//!
//! The store is SQLite behind an sqlx pool. Usage appends are independent
//! atomic inserts, so concurrent in-flight requests never coordinate; cost
//! queries recompute from the ledger on every call rather than maintaining
//! an in-memory aggregate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod costs;
pub mod schema;
pub mod store;
pub mod usage;
pub mod users;
pub mod window;

pub use costs::{ModelCost, UserCost};
pub use store::LedgerStore;
pub use users::User;
pub use window::TimeWindow;
