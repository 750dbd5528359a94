//! Games, profiles and their scripts, persisted as one JSON document.
//!
//! Every game owns a locked profile with id [`DEFAULT_PROFILE`]. Locked
//! profiles reject rename, delete and all script mutations; the check runs
//! before anything is changed.

use crate::error::{ConfigError, StoreError};
use crate::metadata::parse_metadata;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
}

impl ScriptRecord {
    /// Build a record from code, taking name and update URL from its header.
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        let metadata = parse_metadata(&code);
        Self {
            name: metadata.name,
            update_url: metadata.update_url,
            code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub scripts: Vec<ScriptRecord>,
}

impl Profile {
    pub fn locked_default() -> Self {
        Self {
            name: DEFAULT_PROFILE.to_string(),
            locked: true,
            scripts: Vec::new(),
        }
    }

    fn ensure_unlocked(&self) -> Result<(), ConfigError> {
        if self.locked {
            return Err(ConfigError::Locked(self.name.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub url: String,
}

pub type GameProfiles = IndexMap<String, Profile>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub profiles: BTreeMap<String, GameProfiles>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let games = vec![
            Game {
                id: "miniblox".to_string(),
                name: "Miniblox".to_string(),
                url: "https://miniblox.io".to_string(),
            },
            Game {
                id: "bloxd".to_string(),
                name: "Bloxd".to_string(),
                url: "https://bloxd.io".to_string(),
            },
        ];
        let mut config = Self {
            games,
            profiles: BTreeMap::new(),
        };
        config.ensure_default_profiles();
        config
    }
}

/// Game id for a display name: trimmed, lowercased, whitespace runs become `-`.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

impl LauncherConfig {
    /// Give every game a locked default profile if it lacks one.
    pub fn ensure_default_profiles(&mut self) {
        for game in &self.games {
            self.profiles
                .entry(game.id.clone())
                .or_default()
                .entry(DEFAULT_PROFILE.to_string())
                .or_insert_with(Profile::locked_default);
        }
    }

    /// Swap in a whole config from the UI.
    ///
    /// Rejected if a profile locked here comes back changed, or if any game's
    /// `default` profile comes back unlocked. Locked profiles left out of a game
    /// that is kept are put back. On rejection nothing changes.
    pub fn replace_with(&mut self, mut incoming: LauncherConfig) -> Result<(), ConfigError> {
        for (game_id, profiles) in &self.profiles {
            for (profile_id, profile) in profiles.iter().filter(|(_, p)| p.locked) {
                let returned = incoming.profiles.get(game_id).and_then(|p| p.get(profile_id));
                match returned {
                    Some(p) if p != profile => return Err(ConfigError::Locked(profile.name.clone())),
                    Some(_) => {}
                    // Dropped along with its game, or dropped alone and put back.
                    None if incoming.game(game_id).is_none() => {}
                    None => {
                        incoming
                            .profiles
                            .entry(game_id.clone())
                            .or_default()
                            .insert(profile_id.clone(), profile.clone());
                    }
                }
            }
        }

        incoming.ensure_default_profiles();
        for profiles in incoming.profiles.values() {
            if let Some(default) = profiles.get(DEFAULT_PROFILE).filter(|p| !p.locked) {
                return Err(ConfigError::Locked(default.name.clone()));
            }
        }

        *self = incoming;
        Ok(())
    }

    pub fn game(&self, game_id: &str) -> Option<&Game> {
        self.games.iter().find(|g| g.id == game_id)
    }

    pub fn profiles(&self, game_id: &str) -> Option<&GameProfiles> {
        self.profiles.get(game_id)
    }

    pub fn profile(&self, game_id: &str, profile_id: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(game_id)
            .ok_or_else(|| ConfigError::UnknownGame(game_id.to_string()))?
            .get(profile_id)
            .ok_or_else(|| ConfigError::UnknownProfile(profile_id.to_string()))
    }

    /// Like [`Self::profile`], but fails for locked profiles.
    pub fn writable_profile(&self, game_id: &str, profile_id: &str) -> Result<&Profile, ConfigError> {
        let profile = self.profile(game_id, profile_id)?;
        profile.ensure_unlocked()?;
        Ok(profile)
    }

    fn profile_mut(&mut self, game_id: &str, profile_id: &str) -> Result<&mut Profile, ConfigError> {
        self.profiles
            .get_mut(game_id)
            .ok_or_else(|| ConfigError::UnknownGame(game_id.to_string()))?
            .get_mut(profile_id)
            .ok_or_else(|| ConfigError::UnknownProfile(profile_id.to_string()))
    }

    fn unlocked_profile_mut(&mut self, game_id: &str, profile_id: &str) -> Result<&mut Profile, ConfigError> {
        let profile = self.profile_mut(game_id, profile_id)?;
        profile.ensure_unlocked()?;
        Ok(profile)
    }

    pub fn add_game(&mut self, name: &str, url: &str) -> Result<&Game, ConfigError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() {
            return Err(ConfigError::Empty("game name"));
        }
        if url.is_empty() {
            return Err(ConfigError::Empty("game URL"));
        }

        let id = slugify(name);
        if self.game(&id).is_some() {
            return Err(ConfigError::DuplicateGame(id));
        }

        self.games.push(Game {
            id: id.clone(),
            name: name.to_string(),
            url: url.to_string(),
        });
        let mut profiles = GameProfiles::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), Profile::locked_default());
        self.profiles.insert(id, profiles);

        Ok(&self.games[self.games.len() - 1])
    }

    pub fn delete_game(&mut self, game_id: &str) -> Result<Game, ConfigError> {
        let index = self
            .games
            .iter()
            .position(|g| g.id == game_id)
            .ok_or_else(|| ConfigError::UnknownGame(game_id.to_string()))?;
        self.profiles.remove(game_id);
        Ok(self.games.remove(index))
    }

    /// Add an empty unlocked profile. Returns its id.
    pub fn add_profile(&mut self, game_id: &str, name: &str) -> Result<String, ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::Empty("profile name"));
        }
        self.insert_profile(
            game_id,
            Profile {
                name: name.to_string(),
                locked: false,
                scripts: Vec::new(),
            },
        )
    }

    /// Insert a complete profile (used by import). The stored copy is always
    /// unlocked. Returns the new profile id.
    pub fn insert_profile(&mut self, game_id: &str, mut profile: Profile) -> Result<String, ConfigError> {
        if self.game(game_id).is_none() {
            return Err(ConfigError::UnknownGame(game_id.to_string()));
        }
        profile.locked = false;

        let profiles = self.profiles.entry(game_id.to_string()).or_default();
        let mut stamp = chrono::Utc::now().timestamp_millis();
        while profiles.contains_key(&stamp.to_string()) {
            stamp += 1;
        }
        let id = stamp.to_string();
        profiles.insert(id.clone(), profile);
        Ok(id)
    }

    pub fn rename_profile(&mut self, game_id: &str, profile_id: &str, name: &str) -> Result<(), ConfigError> {
        let profile = self.unlocked_profile_mut(game_id, profile_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::Empty("profile name"));
        }
        profile.name = name.to_string();
        Ok(())
    }

    pub fn delete_profile(&mut self, game_id: &str, profile_id: &str) -> Result<Profile, ConfigError> {
        self.unlocked_profile_mut(game_id, profile_id)?;
        self.profiles
            .get_mut(game_id)
            .and_then(|profiles| profiles.shift_remove(profile_id))
            .ok_or_else(|| ConfigError::UnknownProfile(profile_id.to_string()))
    }

    /// Add a script from raw code. Name and update URL come from its header.
    pub fn add_script(&mut self, game_id: &str, profile_id: &str, code: &str) -> Result<&ScriptRecord, ConfigError> {
        let profile = self.unlocked_profile_mut(game_id, profile_id)?;
        if code.trim().is_empty() {
            return Err(ConfigError::Empty("script code"));
        }
        profile.scripts.push(ScriptRecord::from_code(code));
        Ok(&profile.scripts[profile.scripts.len() - 1])
    }

    /// Append an already built record (import from URL).
    pub fn push_script(&mut self, game_id: &str, profile_id: &str, script: ScriptRecord) -> Result<(), ConfigError> {
        self.unlocked_profile_mut(game_id, profile_id)?.scripts.push(script);
        Ok(())
    }

    /// Replace a script's code; name and update URL are re-derived from it.
    pub fn edit_script(&mut self, game_id: &str, profile_id: &str, index: usize, code: &str) -> Result<(), ConfigError> {
        let profile = self.unlocked_profile_mut(game_id, profile_id)?;
        if code.trim().is_empty() {
            return Err(ConfigError::Empty("script code"));
        }
        let script = profile
            .scripts
            .get_mut(index)
            .ok_or(ConfigError::UnknownScript(index))?;
        *script = ScriptRecord::from_code(code);
        Ok(())
    }

    pub fn rename_script(&mut self, game_id: &str, profile_id: &str, index: usize, name: &str) -> Result<(), ConfigError> {
        let profile = self.unlocked_profile_mut(game_id, profile_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::Empty("script name"));
        }
        let script = profile
            .scripts
            .get_mut(index)
            .ok_or(ConfigError::UnknownScript(index))?;
        script.name = name.to_string();
        Ok(())
    }

    pub fn delete_script(&mut self, game_id: &str, profile_id: &str, index: usize) -> Result<ScriptRecord, ConfigError> {
        let profile = self.unlocked_profile_mut(game_id, profile_id)?;
        if index >= profile.scripts.len() {
            return Err(ConfigError::UnknownScript(index));
        }
        Ok(profile.scripts.remove(index))
    }

    /// Swap in a refreshed copy of a script (update from its update URL).
    pub fn replace_script(
        &mut self,
        game_id: &str,
        profile_id: &str,
        index: usize,
        script: ScriptRecord,
    ) -> Result<(), ConfigError> {
        let profile = self.unlocked_profile_mut(game_id, profile_id)?;
        let slot = profile
            .scripts
            .get_mut(index)
            .ok_or(ConfigError::UnknownScript(index))?;
        *slot = script;
        Ok(())
    }

    pub fn script(&self, game_id: &str, profile_id: &str, index: usize) -> Result<&ScriptRecord, ConfigError> {
        self.profile(game_id, profile_id)?
            .scripts
            .get(index)
            .ok_or(ConfigError::UnknownScript(index))
    }
}

/// JSON file holding a [`LauncherConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config. A missing or malformed file yields the defaults.
    pub fn load(&self) -> LauncherConfig {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to read config, using defaults");
                }
                return LauncherConfig::default();
            }
        };

        match serde_json::from_str::<LauncherConfig>(&content) {
            Ok(mut config) => {
                config.ensure_default_profiles();
                info!(path = %self.path.display(), games = config.games.len(), "config loaded");
                config
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed config, using defaults");
                LauncherConfig::default()
            }
        }
    }

    pub fn save(&self, config: &LauncherConfig) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(config)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, content).map_err(write_err)?;
        Ok(())
    }
}
