//! Domain layer types and invariants.

pub mod cursor;
pub mod error;
pub mod feed;
