//! Inspect command implementation.

use super::{print_json, CommandResult};
use std::path::Path;
use unitmirror_engine::{InspectReport, LocalMirrors};

/// Runs the inspect command.
pub fn run(root: &Path, format: &str) -> CommandResult {
    let mirrors = LocalMirrors::open(root)?;
    let report = mirrors.inspect()?;

    match format {
        "json" => print_json(&report),
        "text" => {
            print_text(&report);
            Ok(())
        }
        other => Err(format!("Unknown format: {}", other).into()),
    }
}

fn print_text(report: &InspectReport) {
    println!("Local mirrors at {}", report.root.display());
    println!();
    if report.mirrors.is_empty() {
        println!("  (none)");
    }
    for mirror in &report.mirrors {
        println!(
            "  {:<24} {:>6} units  {}",
            mirror.repo_id,
            mirror.units,
            mirror.manifest_url.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("Objects in store: {}", report.objects);
}
