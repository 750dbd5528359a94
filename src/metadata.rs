//! Userscript header parsing.
//!
//! A header is the first block between `// ==UserScript==` and
//! `// ==/UserScript==`. Each line inside it is read as `// @<directive> <value>`.
//! This is the only definition of the header grammar; both the bundler and
//! the injection scheduler go through [`parse_metadata`].

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

pub const DEFAULT_NAME: &str = "Unnamed Script";
pub const DEFAULT_VERSION: &str = "1.0";

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)//\s*==UserScript==(.*?)//\s*==/UserScript==").expect("header block regex")
});

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*//\s*@([\w:-]+)(?:[ \t]+(.*))?$").expect("directive regex")
});

/// Page lifecycle moment a script is injected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunAt {
    DocumentStart,
    DocumentBody,
    #[default]
    DocumentEnd,
    DocumentIdle,
}

impl RunAt {
    pub const ALL: [RunAt; 4] = [
        RunAt::DocumentStart,
        RunAt::DocumentBody,
        RunAt::DocumentEnd,
        RunAt::DocumentIdle,
    ];

    /// Unrecognized values fall back to `document-end`.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "document-start" => RunAt::DocumentStart,
            "document-body" => RunAt::DocumentBody,
            "document-idle" => RunAt::DocumentIdle,
            _ => RunAt::DocumentEnd,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunAt::DocumentStart => "document-start",
            RunAt::DocumentBody => "document-body",
            RunAt::DocumentEnd => "document-end",
            RunAt::DocumentIdle => "document-idle",
        }
    }
}

impl fmt::Display for RunAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directives recovered from a script header. Derived from code, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlock {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub update_url: Option<String>,
    pub requires: Vec<String>,
    pub run_at: RunAt,
}

impl Default for MetadataBlock {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            description: None,
            update_url: None,
            requires: Vec::new(),
            run_at: RunAt::default(),
        }
    }
}

pub fn parse_metadata(code: &str) -> MetadataBlock {
    let mut metadata = MetadataBlock::default();

    let Some(block) = BLOCK_RE.captures(code).and_then(|caps| caps.get(1)) else {
        return metadata;
    };

    for line in block.as_str().lines() {
        let Some(caps) = DIRECTIVE_RE.captures(line) else {
            continue;
        };
        let directive = &caps[1];
        let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if value.is_empty() {
            continue;
        }

        match directive {
            "name" => metadata.name = value.to_string(),
            "version" => metadata.version = value.to_string(),
            "description" => metadata.description = Some(value.to_string()),
            "updateURL" => metadata.update_url = Some(value.to_string()),
            "run-at" => metadata.run_at = RunAt::parse(value),
            "require" => metadata.requires.push(value.to_string()),
            _ => {}
        }
    }

    metadata
}
