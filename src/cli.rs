//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - A PATH ending in a separator is a shallow operand (stub state only, no content moved).
//! - --debug is a shorthand for --log-level debug, --verbose for --log-level info.

use clap::{Parser, ValueHint};
use std::path::PathBuf;

use crate::config::types::{Config, LogLevel};
use crate::resolve::Direction;

/// Move subtrees between two roots, leaving stubs behind.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Move subtrees between two roots, leaving typed stubs behind")]
pub struct Args {
    /// put: origin -> archive; get: archive -> origin.
    #[arg(value_enum, required_unless_present = "print_config")]
    pub direction: Option<Direction>,

    /// Paths under either root. A trailing separator makes the operand shallow.
    #[arg(value_name = "PATH", required_unless_present = "print_config", num_args = 1.., value_hint = ValueHint::AnyPath)]
    pub paths: Vec<String>,

    /// Origin root (`/path` or `host:/path`); overrides the config file.
    #[arg(long, value_name = "ROOT", value_hint = ValueHint::DirPath)]
    pub origin: Option<String>,

    /// Archive root (`/path` or `host:/path`); overrides the config file.
    #[arg(long, value_name = "ROOT", value_hint = ValueHint::DirPath)]
    pub archive: Option<String>,

    /// Path to leave in place (repeatable).
    #[arg(short = 'x', long = "exclude", value_name = "PATH", value_hint = ValueHint::AnyPath)]
    pub excludes: Vec<String>,

    /// Report every entry moved or stubbed (same as --log-level info).
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, help = "Enable debug logging (shorthand for --log-level debug)")]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Also append logs to this file.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, help = "Emit logs in structured JSON")]
    pub json: bool,

    /// Print where stub_move will look for the config file, then exit.
    #[arg(long, help = "Print the config file location used by stub_move and exit")]
    pub print_config: bool,
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --verbose > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        if self.verbose {
            return Some(LogLevel::Info);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(o) = &self.origin {
            cfg.origin = Some(o.clone());
        }
        if let Some(a) = &self.archive {
            cfg.archive = Some(a.clone());
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(f) = &self.log_file {
            cfg.log_file = Some(f.clone());
        }
        if self.json {
            cfg.json = true;
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
