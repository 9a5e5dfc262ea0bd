//! CLI Module
//!
//! Command-line interface for the stemmix diagnostic binary.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stemmix - stem-mixing engine diagnostics
#[derive(Parser, Debug)]
#[command(name = "stemmix-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the load barrier against a manifest or a stem directory
    #[command(name = "probe")]
    Probe {
        /// Path to a track manifest (JSON) or a directory of WAV stems
        path: PathBuf,

        /// Per-stem fetch timeout in seconds
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,

        /// Retries per stem after the first attempt
        #[arg(short, long, default_value_t = 3)]
        retries: u32,
    },

    /// Parse a track manifest and pretty-print it
    #[command(name = "manifest")]
    Manifest {
        /// Path to the manifest JSON
        path: PathBuf,
    },
}
