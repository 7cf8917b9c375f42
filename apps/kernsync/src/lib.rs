//! # kernsync
//!
//! Kernel and session synchronizer - THE BINARY's library half.
//!
//! - [`sync`] - reconciliation engine, collaborator traits, scheduler
//! - [`host`] - built-in collaborators for standalone use
//! - [`api`] - HTTP trigger (`POST /api/sync`)
//! - [`config`] - TOML configuration
//! - [`cli`] - command-line interface
//!
//! Records, merge semantics and the kernel table live in `kernsync-core`.

pub mod api;
pub mod cli;
pub mod config;
pub mod host;
pub mod sync;
