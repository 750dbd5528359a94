//! Userscript launcher: keeps per-game profiles of userscripts, bundles a
//! profile's scripts with their `@require` dependencies and injects them into
//! the game page at the requested document stage.

pub mod bundle;
pub mod error;
pub mod fetcher;
pub mod launch;
pub mod metadata;
pub mod preload;
pub mod progress;
pub mod scheduler;
pub mod settings;
pub mod shim;
pub mod state;
pub mod store;

#[cfg(feature = "desktop")]
pub mod desktop;

pub use error::{BundleError, ConfigError, FetchError, LaunchError, StoreError};
pub use fetcher::{Fetch, HttpFetcher};
pub use metadata::{parse_metadata, MetadataBlock, RunAt};
pub use scheduler::InjectionPlan;
pub use settings::Settings;
pub use store::{ConfigStore, Game, LauncherConfig, Profile, ScriptRecord};
