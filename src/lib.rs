//! PetFriends contract harness
//!
//! Black-box checks of the PetFriends pet-catalog REST API: a transport
//! client, a declarative scenario runner and a report aggregator.

pub mod cli;
pub mod client;
pub mod commands;
pub mod common;
pub mod testing;

// Re-export commonly used types for tests
pub use client::{ApiResponse, PetApi, PetFriendsClient};
pub use common::{Error, Result};
