//! CLI module - Command-line interface for MediScan
//!
//! Server-side commands work on the database directly; the rest go through
//! the HTTP API with the persisted session.

mod commands;

use clap::{Parser, Subcommand};

/// MediScan - chest X-ray screening service
#[derive(Parser)]
#[command(name = "mediscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API until Ctrl+C
    #[command(alias = "daemon", alias = "-d", alias = "--daemon")]
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Create the test user if it does not exist
    Seed,

    /// List registered users
    #[command(alias = "ls")]
    Users,

    /// Show a user's analyses from the database
    #[command(alias = "h")]
    History {
        /// E-mail of the user
        email: String,
        /// Number of entries to show
        #[arg(long, default_value = "10")]
        limit: u64,
    },

    /// Create an account through the API and log in
    Register {
        name: String,
        email: String,
        password: String,
    },

    /// Log in through the API and save the session
    Login {
        email: String,
        password: String,
        /// Use direct login and keep an emergency key
        #[arg(long)]
        emergency: bool,
    },

    /// Forget the saved session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Upload an X-ray image and print the findings
    #[command(alias = "a")]
    Analyze {
        /// Path to a PNG or JPEG image
        path: String,
        /// Use the emergency endpoint
        #[arg(long)]
        emergency: bool,
    },

    /// Print the text report of an analysis
    Report {
        /// Analysis ID
        id: i32,
    },

    /// Check whether the API is reachable
    Status {
        /// Keep polling and print every change
        #[arg(long)]
        watch: bool,
    },
}

pub use commands::*;
