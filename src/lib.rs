//! Cursor-paginated feed API with a Redis response cache kept coherent by a
//! Redis Streams invalidation consumer.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
