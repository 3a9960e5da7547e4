//! Sender and receiver session orchestration (spec.md §4.4): discovery,
//! connect, authenticate, multiplex the `auth`/`transfer`/`error`
//! protocols over one node, and drive the archive layer through the
//! reliable channel.

pub mod receiver;
pub mod sender;

pub use receiver::{run_receiver, ReceiverOptions};
pub use sender::{run_sender, SenderIdentity, SenderOptions};

/// `transfer/0.1.0` protocol identifier (spec.md §6).
pub const TRANSFER_PROTOCOL_ID: &str = "/p2pxfer/transfer/0.1.0";

fn transfer_protocol() -> libp2p::StreamProtocol {
    libp2p::StreamProtocol::new(TRANSFER_PROTOCOL_ID)
}

/// Message sent over the `error/0.1.0` protocol when the local session
/// cancels due to the user pressing Ctrl-C (spec.md §4.4 step 4).
pub const CANCEL_MESSAGE: &str = "Transfer canceled.";
