//! Stdin/stdout prompts (spec.md §6): the sender's identity banner and
//! the receiver's randomart confirmation and secret entry. Falls back
//! to a plain blocking `stdin` read when `dialoguer`'s terminal probing
//! fails (non-tty / piped contexts, e.g. test harnesses).

use dialoguer::{Confirm, Password};

use p2pxfer::identity::NodeId;
use p2pxfer::transfer::SenderIdentity;

pub fn print_sender_identity(identity: &SenderIdentity) {
    println!("Node ID:    {}", identity.node_id);
    println!("{}", identity.randomart);
    println!("Identifier: {}", identity.identifier);
    println!("Secret:     {}", identity.secret);
}

/// Requires the user to type `y` before continuing past an unconfirmed
/// short-topic rendezvous (spec.md §4.4 step 2).
pub fn confirm_randomart(node_id: &NodeId, art: &str) -> bool {
    println!("Counterpart node ID: {}", node_id);
    println!("{}", art);
    Confirm::new()
        .with_prompt("Does this randomart match the sender's? Continue?")
        .default(false)
        .interact()
        .unwrap_or_else(|_| read_yes_from_plain_stdin())
}

fn read_yes_from_plain_stdin() -> bool {
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    line.trim().eq_ignore_ascii_case("y")
}

/// Reads the PIN or token from stdin (spec.md §6 "prompts for PIN/token
/// on stdin, requires ≥ 6 chars").
pub fn read_secret() -> String {
    Password::new()
        .with_prompt("Secret")
        .interact()
        .unwrap_or_else(|_| read_plain_stdin())
}

fn read_plain_stdin() -> String {
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    line.trim().to_string()
}
