use anyhow::{bail, Context, Result};
use bird_tool_utils::external_command_checker::*;

pub const CDHIT_MIN_VERSION: &str = "4.6";

/// Check that cd-hit-est is usable, returning its version.
pub fn check_for_dependencies() -> Result<String> {
    check_for_cdhit()
}

pub fn check_for_cdhit() -> Result<String> {
    self::check_for_external_command_presence("cd-hit-est", "which cd-hit-est");
    // cd-hit has no --version flag, the version is in the -h banner.
    self::default_version_check(
        "cd-hit-est",
        CDHIT_MIN_VERSION,
        false,
        Some("cd-hit-est -h 2>&1 | sed -n 's/.*CD-HIT version \\([0-9.]*\\).*/\\1/p' | head -1"),
    );
    cdhit_version()
}

/// Version of the cd-hit-est found on the PATH, e.g. "4.8.1".
pub fn cdhit_version() -> Result<String> {
    // Exits non-zero after printing help, so only the output is used.
    let output = std::process::Command::new("cd-hit-est")
        .arg("-h")
        .output()
        .context("Failed to run cd-hit-est to find its version")?;
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    match parse_cdhit_version(&text) {
        Some(version) => {
            debug!("Found cd-hit-est version {}", version);
            Ok(version)
        }
        None => bail!("Failed to find the cd-hit-est version in the output of 'cd-hit-est -h'"),
    }
}

fn parse_cdhit_version(text: &str) -> Option<String> {
    const MARKER: &str = "CD-HIT version ";
    let start = text.find(MARKER)? + MARKER.len();
    let version: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let version = version.trim_end_matches('.');
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}
