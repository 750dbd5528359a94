//! Loading progress inferred from page console text.
//!
//! Best effort by nature: pages log whatever they like, so matching is a
//! fixed substring table plus a fallback timer that forces completion a few
//! seconds after the page reports loaded. Progress only ever moves forward.

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Waiting = 0,
    Loading = 33,
    Initializing = 66,
    Ready = 100,
}

impl Stage {
    pub fn percent(self) -> u8 {
        self as u8
    }

    pub fn status(self) -> &'static str {
        match self {
            Stage::Waiting => "Waiting...",
            Stage::Loading => "Loading...",
            Stage::Initializing => "Initializing...",
            Stage::Ready => "Ready!",
        }
    }
}

/// Checked top to bottom; the first row with a matching needle decides the
/// stage a message maps to.
const MATCH_TABLE: &[(Stage, &[&str])] = &[
    (Stage::Loading, &["Loading"]),
    (Stage::Initializing, &["Initializing", "Init"]),
    (Stage::Ready, &["Ready", "Initialized", "Complete", "loaded"]),
];

/// Payload of the `loading-progress` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub status: String,
}

impl ProgressUpdate {
    fn stage(stage: Stage) -> Self {
        Self {
            progress: stage.percent(),
            status: stage.status().to_string(),
        }
    }
}

pub fn classify(message: &str) -> Option<Stage> {
    MATCH_TABLE
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| message.contains(needle)))
        .map(|(stage, _)| *stage)
}

#[derive(Debug)]
pub struct ProgressTracker {
    stage: Stage,
    fallback: Duration,
    loaded_at: Option<Instant>,
}

impl ProgressTracker {
    pub fn new(fallback: Duration) -> Self {
        Self {
            stage: Stage::Waiting,
            fallback,
            loaded_at: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn progress(&self) -> u8 {
        self.stage.percent()
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Ready
    }

    /// Feed one console line. Returns an update only when progress advanced.
    pub fn observe(&mut self, message: &str) -> Option<ProgressUpdate> {
        let stage = classify(message)?;
        self.advance(stage)
    }

    /// Record a page-load signal. Returns `true` for the first one, which is
    /// when the caller should arm the fallback timer.
    pub fn page_loaded(&mut self, now: Instant) -> bool {
        if self.loaded_at.is_some() {
            return false;
        }
        self.loaded_at = Some(now);
        true
    }

    pub fn fallback_deadline(&self) -> Option<Instant> {
        self.loaded_at.map(|at| at + self.fallback)
    }

    /// Force completion once the fallback deadline has passed.
    pub fn check_fallback(&mut self, now: Instant) -> Option<ProgressUpdate> {
        let deadline = self.fallback_deadline()?;
        if now < deadline {
            return None;
        }
        self.advance(Stage::Ready)
    }

    fn advance(&mut self, stage: Stage) -> Option<ProgressUpdate> {
        if stage <= self.stage {
            return None;
        }
        self.stage = stage;
        Some(ProgressUpdate::stage(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_first_match_in_table_order() {
        assert_eq!(classify("Loading textures"), Some(Stage::Loading));
        assert_eq!(classify("Initializing graphics"), Some(Stage::Initializing));
        assert_eq!(classify("Game Ready"), Some(Stage::Ready));
        assert_eq!(classify("assets loaded"), Some(Stage::Ready));
        // "Initialized" also contains "Init", which is checked first.
        assert_eq!(classify("Initialized game"), Some(Stage::Initializing));
        assert_eq!(classify("Loading complete, Ready"), Some(Stage::Loading));
        assert_eq!(classify("hello"), None);
    }

    #[test]
    fn progress_never_decreases() {
        let mut tracker = ProgressTracker::new(Duration::from_secs(5));
        assert_eq!(tracker.observe("Initializing graphics").map(|u| u.progress), Some(66));
        assert_eq!(tracker.observe("Loading textures"), None);
        assert_eq!(tracker.progress(), 66);
        let done = tracker.observe("Ready").unwrap();
        assert_eq!(done, ProgressUpdate { progress: 100, status: "Ready!".to_string() });
        assert!(tracker.is_complete());
        assert_eq!(tracker.observe("Ready"), None);
    }

    #[test]
    fn fallback_forces_completion_after_deadline() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Duration::from_secs(5));
        assert_eq!(tracker.check_fallback(start + Duration::from_secs(60)), None);

        assert!(tracker.page_loaded(start));
        assert!(!tracker.page_loaded(start + Duration::from_secs(1)));
        assert_eq!(tracker.fallback_deadline(), Some(start + Duration::from_secs(5)));

        tracker.observe("Loading");
        assert_eq!(tracker.check_fallback(start + Duration::from_secs(4)), None);
        assert_eq!(
            tracker.check_fallback(start + Duration::from_secs(5)).map(|u| u.progress),
            Some(100)
        );
        assert_eq!(tracker.check_fallback(start + Duration::from_secs(6)), None);
    }
}
