//! From a selected profile to a bundle artifact on disk.

use crate::bundle::{self, BundleArtifact, Section};
use crate::error::LaunchError;
use crate::fetcher::{resolve_requires, validate_url, Fetch};
use crate::metadata::parse_metadata;
use crate::store::{Game, Profile};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Everything the shell needs to open a game window.
#[derive(Debug)]
pub struct PreparedLaunch {
    pub url: String,
    pub title: String,
    pub artifact: BundleArtifact,
}

/// Resolve requires for every script of `profile`, bundle them and write the
/// artifact into `bundle_dir`.
///
/// Require failures only drop that require. A failed artifact write aborts
/// the launch.
pub fn prepare_launch<F: Fetch + ?Sized>(
    fetcher: &F,
    game: &Game,
    profile: &Profile,
    bundle_dir: &Path,
) -> Result<PreparedLaunch, LaunchError> {
    let sections: Vec<Section> = profile
        .scripts
        .iter()
        .map(|script| {
            let metadata = parse_metadata(&script.code);
            let requires = resolve_requires(fetcher, &metadata.requires);
            Section::new(script.name.clone(), bundle::section_content(&requires, &script.code))
        })
        .collect();

    let artifact = BundleArtifact::write(bundle_dir, &bundle::join(&sections))?;
    info!(game = %game.id, profile = %profile.name, scripts = sections.len(), "launch prepared");

    Ok(PreparedLaunch {
        url: game.url.clone(),
        title: game.name.clone(),
        artifact,
    })
}

/// Admits one launch at a time, from the first check until its window exists.
#[derive(Debug, Default)]
pub struct LaunchSlot {
    busy: AtomicBool,
}

impl LaunchSlot {
    /// `None` while another launch holds the slot.
    pub fn try_claim(&self) -> Option<LaunchClaim<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LaunchClaim { slot: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one launch; frees the slot when dropped,
/// including on every error path.
#[derive(Debug)]
pub struct LaunchClaim<'a> {
    slot: &'a LaunchSlot,
}

impl Drop for LaunchClaim<'_> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

/// Read a profile from an http(s) URL or a local file path.
pub fn import_profile<F: Fetch + ?Sized>(fetcher: &F, source: &str) -> Result<Profile, LaunchError> {
    let source = source.trim();
    let text = if validate_url(source).is_ok() {
        fetcher.get(source)?
    } else {
        let path = PathBuf::from(source);
        fs::read_to_string(&path).map_err(|source| LaunchError::ReadProfile { path, source })?
    };
    let profile: Profile = serde_json::from_str(&text)?;
    info!(name = %profile.name, scripts = profile.scripts.len(), "profile imported");
    Ok(profile)
}

/// Pretty JSON for sharing a profile.
pub fn export_profile(profile: &Profile) -> Result<String, LaunchError> {
    Ok(serde_json::to_string_pretty(profile)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::FakeFetcher;
    use crate::scheduler::InjectionPlan;
    use crate::store::ScriptRecord;

    fn game() -> Game {
        Game {
            id: "miniblox".to_string(),
            name: "Miniblox".to_string(),
            url: "https://miniblox.io".to_string(),
        }
    }

    #[test]
    fn bundles_scripts_in_profile_order_with_requires() {
        let fetcher = FakeFetcher::default()
            .with("https://cdn.test/lib.js", "window.lib = true;")
            .failing("https://cdn.test/broken.js", 500);
        let profile = Profile {
            name: "Custom".to_string(),
            locked: false,
            scripts: vec![
                ScriptRecord::from_code(
                    "// ==UserScript==\n// @name First\n// @require https://cdn.test/lib.js\n// @require https://cdn.test/broken.js\n// ==/UserScript==\nfirst();",
                ),
                ScriptRecord::from_code("second();"),
            ],
        };
        let dir = tempfile::tempdir().unwrap();

        let launch = prepare_launch(&fetcher, &game(), &profile, dir.path()).unwrap();
        assert_eq!(launch.url, "https://miniblox.io");

        let plan = InjectionPlan::load(launch.artifact.path()).unwrap();
        let names: Vec<_> = plan.document_end.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["First", "Unnamed Script"]);
        let first = &plan.document_end[0].content;
        assert!(first.find("window.lib = true;").unwrap() < first.find("first();").unwrap());
        assert!(first.contains("// @require https://cdn.test/broken.js (failed:"));

        let path = launch.artifact.path().to_path_buf();
        drop(launch);
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_bundle_dir_fails_the_launch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "").unwrap();
        let profile = Profile::locked_default();

        let err = prepare_launch(&FakeFetcher::default(), &game(), &profile, &file).unwrap_err();
        assert!(matches!(err, LaunchError::Bundle(_)));
    }

    #[test]
    fn second_launch_is_refused_until_the_first_finishes() {
        let slot = LaunchSlot::default();
        let first = slot.try_claim().unwrap();
        assert!(slot.is_busy());
        assert!(slot.try_claim().is_none());

        drop(first);
        assert!(!slot.is_busy());

        let failed: Result<(), LaunchError> = (|| {
            let _claim = slot.try_claim().unwrap();
            Err(LaunchError::Fetch(crate::error::FetchError::NoUpdateUrl))
        })();
        assert!(failed.is_err());
        assert!(slot.try_claim().is_some());
    }

    #[test]
    fn import_reads_urls_and_files() {
        let json = r#"{ "name": "Shared", "scripts": [{ "name": "A", "code": "a();" }] }"#;
        let fetcher = FakeFetcher::default().with("https://share.test/p.json", json);
        let from_url = import_profile(&fetcher, "https://share.test/p.json").unwrap();
        assert_eq!(from_url.name, "Shared");
        assert!(!from_url.locked);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, export_profile(&from_url).unwrap()).unwrap();
        let from_file = import_profile(&fetcher, path.to_str().unwrap()).unwrap();
        assert_eq!(from_file, from_url);

        assert!(matches!(
            import_profile(&fetcher, dir.path().join("missing.json").to_str().unwrap()),
            Err(LaunchError::ReadProfile { .. })
        ));
    }
}
