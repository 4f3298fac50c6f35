//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler, resolves
//! operands against the roots, and runs the mirror engine.

use anyhow::Result;
use clap::CommandFactory;
use clap::error::ErrorKind;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use stub_move::cli::Args;
use stub_move::config::CONFIG_ENV;
use stub_move::output as out;
use stub_move::{default_config_path, load_config, mirror, resolve_all, Config, Sessions, StubMoveError};

use crate::logging::init_tracing;

fn print_config_location() {
    if let Ok(cfg_env) = std::env::var(CONFIG_ENV) {
        out::print_info(&format!("Using {CONFIG_ENV} (explicit):\n  {cfg_env}\n"));
        out::print_info(&format!("To override, unset {CONFIG_ENV} or set it to another file."));
        return;
    }
    match default_config_path() {
        Ok(p) => {
            out::print_info(&format!("Default stub_move config path:\n  {}\n", p.display()));
            if p.exists() {
                out::print_info("A config file exists at that location.");
            } else {
                out::print_info("No config file exists there yet; pass --origin and --archive or create one:\n\n<config>\n  <origin>/path/to/origin</origin>\n  <archive>host:/path/to/archive</archive>\n</config>\n");
            }
        }
        Err(e) => out::print_error(&format!("Could not determine a default config path: {e}")),
    }
}

fn usage_error(msg: &str) -> ! {
    Args::command().error(ErrorKind::MissingRequiredArgument, msg).exit()
}

fn log_failure(e: &anyhow::Error) {
    match e.downcast_ref::<StubMoveError>() {
        Some(sm) => error!(code = sm.code(), kind = sm.kind(), error = %sm, "Run failed"),
        None => error!(error = %e, "Run failed"),
    }
}

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    if args.print_config {
        print_config_location();
        return Ok(());
    }

    // Config file first, CLI wins.
    let mut cfg = load_config()?.unwrap_or_else(Config::default);
    args.apply_overrides(&mut cfg);

    let Some(direction) = args.direction else {
        usage_error("a direction (put or get) is required");
    };
    if cfg.origin.is_none() || cfg.archive.is_none() {
        usage_error("both roots are required: pass --origin and --archive or set them in the config file");
    }

    let guard_opt = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), cfg.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
        e
    })?;

    // Dropping the guard on SIGINT flushes the file appender.
    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            out::clear_status();
            out::print_warn("Received interrupt; stopping.");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
            std::process::exit(130);
        })?;
    }

    debug!("Starting stub_move: {:?}", args);

    let result = (|| -> Result<()> {
        let cwd = std::env::current_dir()?;
        let roots = cfg.roots(&cwd)?;
        let resolved = resolve_all(&args.paths, &args.excludes, &roots, &cwd)?;

        let mut sessions = Sessions::new(cfg.ssh.clone());
        let stats = mirror::run(&mut sessions, &roots, direction, &resolved)?;

        info!(
            files = stats.files_moved,
            links = stats.links_moved,
            bytes = stats.bytes_moved,
            stubs = stats.stubs_written,
            "Run completed"
        );
        if stats.is_noop() {
            out::print_success("Nothing to do; both sides already agree.");
        } else {
            out::print_success(&stats.to_string());
        }
        Ok(())
    })();

    if let Err(e) = &result {
        out::clear_status();
        log_failure(e);
    }

    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }

    result
}
