//! Application services: feed paging and health reporting.

pub mod error;
pub mod feed;
pub mod health;
pub mod repos;
