//! Data layer module
//!
//! Handles all data persistence and caching:
//! - Persistence contract (table store)
//! - Remote table store adapter
//! - In-process table store
//! - Profile cache (volatile)

mod cache;
mod memory;
mod models;
mod rest;
mod store;

pub use cache::ProfileCache;
pub use memory::{MemoryStore, StoreOp};
pub use models::*;
pub use rest::RestStore;
pub use store::{Condition, Filter, Op, Order, Persistence, Select, compare_values};
