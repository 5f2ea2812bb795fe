//! Command-line argument parsing for DeskPilot
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, GeneratorBackend};

/// DeskPilot - multi-tenant customer support assistant
#[derive(Parser, Debug)]
#[command(name = "deskpilot")]
#[command(version)]
#[command(about = "Retrieval-backed customer support assistant over Qdrant", long_about = None)]
pub struct Args {
    /// Configuration file path (~/.deskpilot/config.toml by default)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Generation backend: ollama or gemini
    #[arg(long)]
    pub backend: Option<String>,

    /// Generation model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Qdrant gRPC URL
    #[arg(long)]
    pub qdrant_url: Option<String>,

    /// Disable the semantic cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive support chat
    Chat {
        /// Tenant partition; classified from each query when omitted
        #[arg(short, long)]
        tenant: Option<String>,

        /// Customer identifier
        #[arg(long, value_parser = non_blank)]
        customer: String,
    },

    /// Check a returned item from a photo referenced in the query
    CheckReturn {
        #[arg(short, long, value_parser = non_blank)]
        tenant: String,

        #[arg(long, value_parser = non_blank)]
        customer: String,

        /// Also require the item to be free of defects
        #[arg(long)]
        quality: bool,

        /// Request naming the order id and the photo path
        query: String,
    },

    /// Create the Qdrant collections and payload indexes
    Setup,

    /// Display the effective configuration
    Config,
}

fn non_blank(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("must not be blank".to_string());
    }
    Ok(value.to_string())
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Apply command-line overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) -> Result<(), String> {
        if let Some(backend) = &self.backend {
            config.generation.backend = match backend.to_lowercase().as_str() {
                "ollama" => GeneratorBackend::Ollama,
                "gemini" => GeneratorBackend::Gemini,
                other => return Err(format!("Unknown backend '{}'. Use ollama or gemini.", other)),
            };
        }
        if let Some(model) = &self.model {
            config.generation.model = model.clone();
        }
        if let Some(url) = &self.qdrant_url {
            config.qdrant.url = url.clone();
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        Ok(())
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default tracing filter when RUST_LOG is unset
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "deskpilot=info",
            Verbosity::VeryVerbose => "deskpilot=debug",
        }
    }

    /// Check if the telemetry summary is printed on exit
    pub fn show_summary(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
