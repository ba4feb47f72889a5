//! SSH transport session provider.
//!
//! Implements the `deploy-core` transport traits on top of the system `ssh`
//! client: one multiplexed control-master connection per session, chunked
//! stdin uploads with byte-level progress, and remote command execution with
//! full output drain. Public-key authentication is mandatory; hosts that
//! only offer other methods fail the connect step with a configuration
//! fault.

mod auth;
mod command;
mod ssh;

pub use ssh::{SshSession, SshSessionProvider};
