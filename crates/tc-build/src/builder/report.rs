//! Build summaries: section headers, durations, install instructions and
//! the provenance record kept in the install folder.

use super::exec::Exec;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Name of the provenance record inside the install folder.
pub const PROVENANCE_FILE: &str = "tc-build.json";

pub fn header(text: &str) {
    println!("\n=== {text} ===\n");
}

/// `1h 2m 3s`, leading zero units dropped.
pub fn duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Tell the user where the tools are and how to use them, then let each
/// installed tool report its own version.
pub fn show_install_info(exec: &mut Exec, install: &Path, tools: &[String]) -> Result<()> {
    let bin = install.join("bin");
    if !bin.exists() && !exec.dry_run() {
        bail!("bin folder does not exist in {}, did the build run?", install.display());
    }

    header("Installation information");
    println!("Toolchain is available at: {}\n", install.display());
    println!("To use, either run:\n");
    println!("\t$ export PATH={}:$PATH\n", bin.display());
    println!("or add:\n");
    println!("\tPATH={}:$PATH\n", bin.display());
    println!("before the command you want to use this toolchain.\n");

    for tool in tools {
        let binary = bin.join(tool);
        if binary.exists() {
            let mut cmd = Command::new(&binary);
            cmd.arg("--version");
            exec.run(cmd)?;
            println!();
        }
    }
    Ok(())
}

/// What produced the contents of an install folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Component version or source revision.
    pub version: String,
    pub host: String,
    /// Compiler that built stage 1, e.g. `clang 18.1.8`.
    pub host_compiler: String,
    pub targets: Vec<String>,
    pub built_at: String,
}

impl Provenance {
    pub fn new(version: String, host: String, host_compiler: String, targets: Vec<String>) -> Self {
        Self {
            version,
            host,
            host_compiler,
            targets,
            built_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Record `provenance` for `component`, keeping other components' entries.
pub fn write_provenance(install: &Path, component: &str, provenance: &Provenance) -> Result<()> {
    let path = install.join(PROVENANCE_FILE);
    let mut records = read_provenance(install)?;
    records.insert(component.to_string(), provenance.clone());

    fs::create_dir_all(install).with_context(|| format!("Creating {}", install.display()))?;
    let json = serde_json::to_string_pretty(&records)?;
    fs::write(&path, json + "\n").with_context(|| format!("Writing {}", path.display()))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// All recorded components, empty when nothing was installed yet.
pub fn read_provenance(install: &Path) -> Result<BTreeMap<String, Provenance>> {
    let path = install.join(PROVENANCE_FILE);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("Reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}
