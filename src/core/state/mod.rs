// src/core/state/mod.rs

//! Defines the central `ProxyState` context object and the shared server records.

mod core;
mod server_info;

pub use core::{Collaborators, ProxyState};
pub use server_info::ServerInfo;
