//! Bundle artifact: one text file holding every script of a profile.
//!
//! Wire format, shared with the injection scheduler:
//!
//! ```text
//! // ===== Script 1: First Script =====
//! <content>
//! // ===== Script 2: Second Script =====
//! <content>
//! ```
//!
//! Each delimiter occupies a whole line. A section's content runs up to the
//! next delimiter line; the single newline the joiner appends after each
//! section is removed again on split.

use crate::error::BundleError;
use crate::fetcher::FetchedRequire;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name prefix of every artifact this crate writes.
pub const ARTIFACT_PREFIX: &str = "userscript-launcher-bundle-";

static DELIMITER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^// ===== Script (\d+): (.*) =====$").expect("delimiter regex")
});

/// One named piece of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub content: String,
}

impl Section {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

pub fn delimiter_line(index: usize, name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    format!("// ===== Script {}: {} =====", index, name)
}

/// Build the content of one script's section: its requires, each behind a
/// traceability comment, then the script's own code.
pub fn section_content(requires: &[FetchedRequire], code: &str) -> String {
    let mut content = String::new();
    for require in requires {
        match &require.body {
            Ok(body) => {
                content.push_str(&format!("// @require {}\n", require.url));
                content.push_str(body);
                content.push('\n');
            }
            Err(e) => {
                content.push_str(&format!("// @require {} (failed: {})\n", require.url, e));
            }
        }
    }
    content.push_str(code);
    content
}

pub fn join(sections: &[Section]) -> String {
    let mut bundle = String::new();
    for (i, section) in sections.iter().enumerate() {
        bundle.push_str(&delimiter_line(i + 1, &section.name));
        bundle.push('\n');
        bundle.push_str(&section.content);
        bundle.push('\n');
    }
    bundle
}

/// Inverse of [`join`]. Text before the first delimiter is ignored.
pub fn split(bundle: &str) -> Vec<Section> {
    let headers: Vec<(usize, usize, String)> = DELIMITER_RE
        .captures_iter(bundle)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), whole.end(), caps[2].to_string()))
        })
        .collect();

    let mut sections = Vec::with_capacity(headers.len());
    for (i, (_, header_end, name)) in headers.iter().enumerate() {
        let body_start = (header_end + 1).min(bundle.len());
        let body_end = headers
            .get(i + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(bundle.len());

        let body = &bundle[body_start..body_end.max(body_start)];
        let content = body.strip_suffix('\n').unwrap_or(body);
        sections.push(Section::new(name.clone(), content));
    }
    sections
}

/// Bundle file on disk. Removed when dropped unless [`BundleArtifact::keep`]
/// was called.
#[derive(Debug)]
pub struct BundleArtifact {
    path: PathBuf,
    persist: bool,
}

impl BundleArtifact {
    pub fn write(dir: &Path, text: &str) -> Result<Self, BundleError> {
        let path = dir.join(format!("{}{}.js", ARTIFACT_PREFIX, Uuid::new_v4()));
        let write_err = |source| BundleError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(write_err)?;
        fs::write(&path, text).map_err(write_err)?;
        info!(path = %path.display(), bytes = text.len(), "bundle artifact written");

        Ok(Self {
            path,
            persist: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the file in place after this handle is gone.
    pub fn keep(mut self) -> PathBuf {
        self.persist = true;
        self.path.clone()
    }
}

impl Drop for BundleArtifact {
    fn drop(&mut self) {
        if self.persist {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "bundle artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove bundle artifact"),
        }
    }
}

/// Remove artifacts left behind by sessions that ended abnormally.
pub fn sweep_stale(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(ARTIFACT_PREFIX) && name.ends_with(".js") {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = name, error = %e, "failed to remove stale bundle artifact"),
            }
        }
    }
    if removed > 0 {
        info!(removed, "removed stale bundle artifacts");
    }
    removed
}
