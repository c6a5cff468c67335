//! Publish command implementation.

use super::{print_json, CommandResult};
use serde::Serialize;
use std::fs;
use std::path::Path;
use unitmirror_protocol::{ContentUnit, MirrorSource};
use unitmirror_publish::{LinkMode, PublishConfig, PublishReport, Publisher};

/// Options for publishing one repository.
#[derive(Debug, Default)]
pub struct PublishArgs {
    /// Base URL the destination root is served under.
    pub base_url: Option<String>,
    /// Advertise HTTPS to consumers.
    pub https: bool,
    /// Host advertised to consumers.
    pub host: Option<String>,
    /// Expose objects through symlinks instead of hard links.
    pub symlink: bool,
}

#[derive(Serialize)]
struct PublishOutput {
    report: PublishReport,
    source: MirrorSource,
}

/// Runs the publish command.
///
/// `units_file` holds a JSON array of content units.
pub fn run(root: &Path, repo_id: &str, units_file: &Path, args: PublishArgs) -> CommandResult {
    let data = fs::read(units_file)
        .map_err(|e| format!("cannot read {}: {}", units_file.display(), e))?;
    let units: Vec<ContentUnit> = serde_json::from_slice(&data)
        .map_err(|e| format!("invalid units file {}: {}", units_file.display(), e))?;

    let mut config = PublishConfig::new(root).with_https(args.https);
    if let Some(base_url) = args.base_url {
        config = config.with_base_url(base_url);
    }
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if args.symlink {
        config = config.with_link_mode(LinkMode::Symlink);
    }

    let publisher = Publisher::new(config)?;
    let report = publisher.publish(&units, repo_id)?;
    let source = publisher.consumer_payload(repo_id)?;
    print_json(&PublishOutput { report, source })
}
