//! `cashflow-core`: shared building blocks for the cash-flow engine.
//!
//! This crate contains **pure** primitives (no IO): identifiers, the domain
//! error model and integer-cents money helpers.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{AdjustmentId, SnapshotId, TenantId};
pub use money::{Cents, to_cents};
