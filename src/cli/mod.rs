//! Command-line surface (spec.md §6): `clap` derive parser, process
//! exit-code mapping, and the `indicatif`/`dialoguer` glue that
//! implements the archive layer's `Progress` trait and the receiver's
//! randomart confirmation prompt.

pub mod progress;
pub mod prompt;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use p2pxfer::config::Config;
use p2pxfer::error::{Error, ErrorKind};
use p2pxfer::transfer::{self, ReceiverOptions, SenderOptions};

#[derive(Parser)]
#[command(name = "p2pxfer", about = "Peer-to-peer directory and file copy", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Advertise a directory or file for a receiver to pull.
    Send {
        /// Directory or file to send (defaults to the current directory).
        path: Option<PathBuf>,
        /// Use a strong token and the full node ID instead of a 6-digit PIN.
        #[arg(short = 's', long)]
        strict: bool,
        /// Disable WAN discovery and relays; LAN-only.
        #[arg(short = 'p', long)]
        private: bool,
        /// Raise logging verbosity to debug.
        #[arg(short = 'd', long)]
        debug: bool,
    },
    /// Pull a directory or file from a sender.
    Receive {
        /// The sender's identifier (full node ID or 7-character topic).
        id: String,
        /// Destination directory (defaults to the current directory).
        path: Option<PathBuf>,
        /// Disable WAN discovery and relays; LAN-only.
        #[arg(short = 'p', long)]
        private: bool,
        /// Raise logging verbosity to debug.
        #[arg(short = 'd', long)]
        debug: bool,
    },
}

impl Cli {
    pub fn debug(&self) -> bool {
        match &self.command {
            Command::Send { debug, .. } => *debug,
            Command::Receive { debug, .. } => *debug,
        }
    }
}

/// Runs the parsed command to completion, returning the process exit
/// code (spec.md §6: 0 success, 1 any error).
pub async fn run(cli: Cli) -> i32 {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let result = match cli.command {
        Command::Send { path, strict, private, .. } => {
            run_send(&config, path, strict, private, cancel).await
        }
        Command::Receive { id, path, private, .. } => {
            run_receive(&config, id, path, private, cancel).await
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

async fn run_send(
    config: &Config,
    path: Option<PathBuf>,
    strict: bool,
    private: bool,
    cancel: CancellationToken,
) -> p2pxfer::error::Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    let metadata = std::fs::metadata(&path).map_err(|e| Error::wrapped(ErrorKind::Validation, e.to_string()))?;
    if !metadata.is_file() && !metadata.is_dir() {
        return Err(Error::wrapped(ErrorKind::Validation, "path must be a regular file or directory"));
    }

    let mut progress = progress::IndicatifProgress::new();
    let opts = SenderOptions { path, strict, private };

    transfer::run_sender(
        config,
        opts,
        &mut progress,
        |identity| prompt::print_sender_identity(identity),
        cancel,
    )
    .await
}

async fn run_receive(
    config: &Config,
    id: String,
    path: Option<PathBuf>,
    private: bool,
    cancel: CancellationToken,
) -> p2pxfer::error::Result<()> {
    let destination = path.unwrap_or_else(|| PathBuf::from("."));
    let mut progress = progress::IndicatifProgress::new_receiver();
    let opts = ReceiverOptions { identifier: id, destination, private };

    transfer::run_receiver(
        config,
        opts,
        &mut progress,
        prompt::confirm_randomart,
        prompt::read_secret,
        cancel,
    )
    .await
}
