//! Peer-to-peer directory and file copy over a libp2p overlay.
//!
//! A sender and a receiver locate each other on the overlay using a
//! short identifier derived from the sender's node ID, authenticate
//! with a shared secret, then stream a file or directory tree between
//! them through a reliable channel that tolerates the underlying
//! transport streams being reset mid-transfer.

pub mod archive;
pub mod auth;
pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod interrupt;
pub mod node;
pub mod secret;
pub mod transfer;
