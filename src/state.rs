//! Selection state of the launcher UI.
//!
//! All changes go through named transitions so they can be tested without a
//! window. Transitions validate ids against the config and leave the state
//! untouched when they fail.

use crate::error::ConfigError;
use crate::store::{Game, LauncherConfig, Profile, DEFAULT_PROFILE};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// Game shown in the sidebar and launched by the launch button
    pub current_game: Option<String>,
    /// Profile the launch button uses
    pub current_profile: String,
    /// Profile opened in the detail view, if any
    pub viewing_profile: Option<String>,
}

impl UiState {
    pub fn new(config: &LauncherConfig) -> Self {
        Self {
            current_game: config.games.first().map(|g| g.id.clone()),
            current_profile: DEFAULT_PROFILE.to_string(),
            viewing_profile: None,
        }
    }

    pub fn select_game(&mut self, config: &LauncherConfig, game_id: &str) -> Result<(), ConfigError> {
        if config.game(game_id).is_none() {
            return Err(ConfigError::UnknownGame(game_id.to_string()));
        }
        self.current_game = Some(game_id.to_string());
        self.current_profile = DEFAULT_PROFILE.to_string();
        self.viewing_profile = None;
        Ok(())
    }

    pub fn select_profile(&mut self, config: &LauncherConfig, profile_id: &str) -> Result<(), ConfigError> {
        let game = self.require_game()?;
        config.profile(game, profile_id)?;
        self.current_profile = profile_id.to_string();
        Ok(())
    }

    pub fn view_profile(&mut self, config: &LauncherConfig, profile_id: &str) -> Result<(), ConfigError> {
        let game = self.require_game()?;
        config.profile(game, profile_id)?;
        self.viewing_profile = Some(profile_id.to_string());
        Ok(())
    }

    pub fn back_to_list(&mut self) {
        self.viewing_profile = None;
    }

    /// Follow-up after a profile of the current game was deleted.
    pub fn profile_removed(&mut self, profile_id: &str) {
        if self.current_profile == profile_id {
            self.current_profile = DEFAULT_PROFILE.to_string();
        }
        if self.viewing_profile.as_deref() == Some(profile_id) {
            self.viewing_profile = None;
        }
    }

    /// Follow-up after a game was deleted.
    pub fn game_removed(&mut self, config: &LauncherConfig, game_id: &str) {
        if self.current_game.as_deref() == Some(game_id) {
            *self = Self::new(config);
        }
    }

    /// Game and profile id of the detail view, for script mutations.
    pub fn viewed(&self) -> Result<(&str, &str), ConfigError> {
        let game = self.require_game()?;
        let profile = self
            .viewing_profile
            .as_deref()
            .ok_or(ConfigError::NothingSelected("profile"))?;
        Ok((game, profile))
    }

    pub fn launch_target<'a>(&self, config: &'a LauncherConfig) -> Result<(&'a Game, &'a Profile), ConfigError> {
        let game_id = self.require_game()?;
        let game = config
            .game(game_id)
            .ok_or_else(|| ConfigError::UnknownGame(game_id.to_string()))?;
        let profile = config.profile(game_id, &self.current_profile)?;
        Ok((game, profile))
    }

    fn require_game(&self) -> Result<&str, ConfigError> {
        self.current_game
            .as_deref()
            .ok_or(ConfigError::NothingSelected("game"))
    }
}
