//! Partitioning of a bundle into run-at buckets.
//!
//! The bundle is split back into sections, each section's header is parsed
//! again to recover its `@run-at`, and sections are grouped per lifecycle
//! moment keeping their relative order. Requires are not fetched here; the
//! bundler already flattened them into the section content.

use crate::bundle::{self, Section};
use crate::error::BundleError;
use crate::metadata::{parse_metadata, RunAt};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Sections grouped by injection timing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionPlan {
    pub document_start: Vec<Section>,
    pub document_body: Vec<Section>,
    pub document_end: Vec<Section>,
    pub document_idle: Vec<Section>,
}

impl InjectionPlan {
    pub fn from_sections(sections: Vec<Section>) -> Self {
        let mut plan = Self::default();
        for section in sections {
            let run_at = parse_metadata(&section.content).run_at;
            debug!(name = %section.name, %run_at, "section scheduled");
            plan.bucket_mut(run_at).push(section);
        }
        plan
    }

    pub fn from_bundle(text: &str) -> Self {
        Self::from_sections(bundle::split(text))
    }

    /// Read an artifact written by [`bundle::BundleArtifact::write`].
    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let text = fs::read_to_string(path).map_err(|source| BundleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let plan = Self::from_bundle(&text);
        info!(
            path = %path.display(),
            start = plan.document_start.len(),
            body = plan.document_body.len(),
            end = plan.document_end.len(),
            idle = plan.document_idle.len(),
            "injection plan loaded"
        );
        Ok(plan)
    }

    pub fn bucket(&self, run_at: RunAt) -> &[Section] {
        match run_at {
            RunAt::DocumentStart => &self.document_start,
            RunAt::DocumentBody => &self.document_body,
            RunAt::DocumentEnd => &self.document_end,
            RunAt::DocumentIdle => &self.document_idle,
        }
    }

    fn bucket_mut(&mut self, run_at: RunAt) -> &mut Vec<Section> {
        match run_at {
            RunAt::DocumentStart => &mut self.document_start,
            RunAt::DocumentBody => &mut self.document_body,
            RunAt::DocumentEnd => &mut self.document_end,
            RunAt::DocumentIdle => &mut self.document_idle,
        }
    }

    pub fn len(&self) -> usize {
        RunAt::ALL.iter().map(|r| self.bucket(*r).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(name: &str, run_at: Option<&str>) -> Section {
        let header = match run_at {
            Some(r) => format!("// ==UserScript==\n// @name {name}\n// @run-at {r}\n// ==/UserScript==\n"),
            None => format!("// ==UserScript==\n// @name {name}\n// ==/UserScript==\n"),
        };
        Section::new(name, format!("{header}log('{name}');"))
    }

    fn names(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn partitions_by_run_at_preserving_order() {
        let text = bundle::join(&[
            script("a", Some("document-idle")),
            script("b", None),
            script("c", Some("document-start")),
            script("d", Some("document-body")),
            script("e", None),
            script("f", Some("document-whenever")),
            script("g", Some("document-start")),
        ]);
        let plan = InjectionPlan::from_bundle(&text);

        assert_eq!(names(&plan.document_start), ["c", "g"]);
        assert_eq!(names(&plan.document_body), ["d"]);
        assert_eq!(names(&plan.document_end), ["b", "e", "f"]);
        assert_eq!(names(&plan.document_idle), ["a"]);
        assert_eq!(plan.len(), 7);
    }

    #[test]
    fn load_reports_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = InjectionPlan::load(&dir.path().join("missing.js")).unwrap_err();
        assert!(matches!(err, BundleError::Read { .. }));
    }
}
