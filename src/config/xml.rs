//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - A missing file means "use defaults"; a malformed one or an unknown field is an error.
//!
//! Example:
//! <config>
//!   <origin>/home/me/projects</origin>
//!   <archive>nas:/srv/archive/projects</archive>
//!   <log_level>normal</log_level>
//!   <log_file>/home/me/.local/share/stub_move/stub_move.log</log_file>
//!   <ssh_program>ssh</ssh_program>
//!   <ssh_options>-o BatchMode=yes -p 2222</ssh_options>
//! </config>

use anyhow::{Context, Result};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::paths::default_config_path;
use crate::config::types::{Config, LogLevel};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    origin: Option<String>,
    archive: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
    #[serde(default, deserialize_with = "de_bool_trimmed_opt")]
    json: Option<bool>,
    ssh_program: Option<String>,
    ssh_options: Option<String>,
}

// Tolerate surrounding whitespace around boolean values.
fn de_bool_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<bool>().ok()))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|t| !t.is_empty())
}

// Map XmlConfig -> Config, leaving defaults for anything unset.
fn xml_to_config(parsed: XmlConfig) -> Config {
    let mut cfg = Config::default();

    cfg.origin = non_empty(parsed.origin.as_deref()).map(str::to_string);
    cfg.archive = non_empty(parsed.archive.as_deref()).map(str::to_string);
    cfg.log_file = non_empty(parsed.log_file.as_deref()).map(PathBuf::from);
    if let Some(level) = non_empty(parsed.log_level.as_deref()).and_then(LogLevel::parse) {
        cfg.log_level = level;
    }
    cfg.json = parsed.json.unwrap_or(false);

    if let Some(program) = non_empty(parsed.ssh_program.as_deref()) {
        cfg.ssh.program = program.to_string();
    }
    if let Some(opts) = parsed.ssh_options.as_deref() {
        cfg.ssh.options = opts.split_whitespace().map(str::to_string).collect();
    }

    cfg
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    Ok(xml_to_config(parsed))
}

/// Load the config from `$STUB_MOVE_CONFIG` or the default path.
/// Returns Ok(None) when no file exists there.
pub fn load_config() -> Result<Option<Config>> {
    let path = default_config_path()?;
    if !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(None);
    }
    debug!(path = %path.display(), "loading config");
    load_config_from_xml_path(&path).map(Some)
}
