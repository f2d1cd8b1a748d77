//! Hosts-file maintenance.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

/// Address already mapped to `hostname`, if any.
#[must_use]
pub fn lookup(contents: &str, hostname: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let address = fields.next()?;
        fields
            .any(|name| name == hostname)
            .then(|| address.to_string())
    })
}

/// Map `hostname` to `address` unless the hosts file already maps it.
///
/// Returns whether an entry was appended. A missing hosts file is created.
///
/// # Errors
///
/// Returns an error if the file cannot be read or appended to.
pub fn ensure_entry(path: &Path, address: &str, hostname: &str) -> std::io::Result<bool> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    if let Some(existing) = lookup(&contents, hostname) {
        if existing != address {
            warn!(
                hostname,
                existing = %existing,
                wanted = address,
                "Hosts file already maps this name to a different address; leaving it"
            );
        }
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let separator = if contents.is_empty() || contents.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    writeln!(file, "{separator}{address} {hostname}")?;
    info!(hostname, address, file = %path.display(), "Added hosts entry");
    Ok(true)
}
