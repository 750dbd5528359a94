//! Tauri shell: selector window, loading window and the game window.

use crate::bundle::{self, BundleArtifact};
use crate::error::ConfigError;
use crate::fetcher::{fetch_script, fetch_update, HttpFetcher};
use crate::launch::{
    export_profile as render_profile, import_profile as read_profile, prepare_launch, LaunchSlot, PreparedLaunch,
};
use crate::preload::{self, PreloadOptions};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::settings::Settings;
use crate::state::UiState;
use crate::store::{ConfigStore, Game, LauncherConfig, ScriptRecord};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, Emitter, Manager, WebviewUrl, WebviewWindowBuilder, WindowEvent};
use tracing::{debug, error, info, warn};

const SELECTOR_WINDOW: &str = "selector";
const LOADING_WINDOW: &str = "loading";
const GAME_WINDOW: &str = "game";

/// One launched game window and what it owns.
struct GameSession {
    tracker: ProgressTracker,
    // Removed from disk when the session is dropped.
    _artifact: BundleArtifact,
}

struct AppState {
    config: Mutex<LauncherConfig>,
    ui: Mutex<UiState>,
    session: Mutex<Option<GameSession>>,
    launch: LaunchSlot,
    store: ConfigStore,
    settings: Settings,
}

impl AppState {
    fn new(settings: Settings) -> Self {
        let store = ConfigStore::new(settings.config_path());
        let config = store.load();
        let ui = UiState::new(&config);

        AppState {
            config: Mutex::new(config),
            ui: Mutex::new(ui),
            session: Mutex::new(None),
            launch: LaunchSlot::default(),
            store,
            settings,
        }
    }

    /// Apply a config change and persist it.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut LauncherConfig, &mut UiState) -> Result<T, ConfigError>,
    ) -> Result<T, String> {
        let mut config = lock(&self.config);
        let mut ui = lock(&self.ui);
        let value = change(&mut config, &mut ui).map_err(|e| e.to_string())?;
        self.store.save(&config).map_err(|e| e.to_string())?;
        Ok(value)
    }

    fn viewed(&self) -> Result<(String, String), String> {
        let ui = lock(&self.ui);
        let (game, profile) = ui.viewed().map_err(|e| e.to_string())?;
        Ok((game.to_string(), profile.to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run blocking fetches off the async runtime.
async fn with_fetcher<T, F>(settings: &Settings, job: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&HttpFetcher) -> Result<T, String> + Send + 'static,
{
    let settings = settings.clone();
    tauri::async_runtime::spawn_blocking(move || {
        let fetcher = HttpFetcher::from_settings(&settings).map_err(|e| e.to_string())?;
        job(&fetcher)
    })
    .await
    .map_err(|e| format!("Task error: {}", e))?
}

#[tauri::command]
fn get_config(state: tauri::State<AppState>) -> Result<LauncherConfig, String> {
    Ok(lock(&state.config).clone())
}

#[tauri::command]
fn save_config(config: LauncherConfig, state: tauri::State<AppState>) -> Result<(), String> {
    state.mutate(|current, ui| {
        current.replace_with(config)?;
        if ui.launch_target(current).is_err() {
            *ui = UiState::new(current);
        }
        Ok(())
    })
}

#[tauri::command]
fn get_ui_state(state: tauri::State<AppState>) -> Result<UiState, String> {
    Ok(lock(&state.ui).clone())
}

#[tauri::command]
fn select_game(game_id: String, state: tauri::State<AppState>) -> Result<UiState, String> {
    let config = lock(&state.config);
    let mut ui = lock(&state.ui);
    ui.select_game(&config, &game_id).map_err(|e| e.to_string())?;
    Ok(ui.clone())
}

#[tauri::command]
fn select_profile(profile_id: String, state: tauri::State<AppState>) -> Result<UiState, String> {
    let config = lock(&state.config);
    let mut ui = lock(&state.ui);
    ui.select_profile(&config, &profile_id).map_err(|e| e.to_string())?;
    Ok(ui.clone())
}

#[tauri::command]
fn view_profile(profile_id: String, state: tauri::State<AppState>) -> Result<UiState, String> {
    let config = lock(&state.config);
    let mut ui = lock(&state.ui);
    ui.view_profile(&config, &profile_id).map_err(|e| e.to_string())?;
    Ok(ui.clone())
}

#[tauri::command]
fn back_to_profiles(state: tauri::State<AppState>) -> Result<UiState, String> {
    let mut ui = lock(&state.ui);
    ui.back_to_list();
    Ok(ui.clone())
}

#[tauri::command]
fn add_game(name: String, url: String, state: tauri::State<AppState>) -> Result<Game, String> {
    state.mutate(|config, _| config.add_game(&name, &url).cloned())
}

#[tauri::command]
fn delete_game(game_id: String, state: tauri::State<AppState>) -> Result<(), String> {
    state.mutate(|config, ui| {
        config.delete_game(&game_id)?;
        ui.game_removed(config, &game_id);
        Ok(())
    })
}

#[tauri::command]
fn add_profile(name: String, state: tauri::State<AppState>) -> Result<String, String> {
    state.mutate(|config, ui| {
        let game = ui
            .current_game
            .clone()
            .ok_or(ConfigError::NothingSelected("game"))?;
        config.add_profile(&game, &name)
    })
}

#[tauri::command]
fn rename_profile(profile_id: String, name: String, state: tauri::State<AppState>) -> Result<(), String> {
    state.mutate(|config, ui| {
        let game = ui
            .current_game
            .clone()
            .ok_or(ConfigError::NothingSelected("game"))?;
        config.rename_profile(&game, &profile_id, &name)
    })
}

#[tauri::command]
fn delete_profile(profile_id: String, state: tauri::State<AppState>) -> Result<(), String> {
    state.mutate(|config, ui| {
        let game = ui
            .current_game
            .clone()
            .ok_or(ConfigError::NothingSelected("game"))?;
        config.delete_profile(&game, &profile_id)?;
        ui.profile_removed(&profile_id);
        Ok(())
    })
}

#[tauri::command]
fn add_script(code: String, state: tauri::State<AppState>) -> Result<ScriptRecord, String> {
    let (game, profile) = state.viewed()?;
    state.mutate(|config, _| config.add_script(&game, &profile, &code).cloned())
}

#[tauri::command]
fn edit_script(index: usize, code: String, state: tauri::State<AppState>) -> Result<(), String> {
    let (game, profile) = state.viewed()?;
    state.mutate(|config, _| config.edit_script(&game, &profile, index, &code))
}

#[tauri::command]
fn rename_script(index: usize, name: String, state: tauri::State<AppState>) -> Result<(), String> {
    let (game, profile) = state.viewed()?;
    state.mutate(|config, _| config.rename_script(&game, &profile, index, &name))
}

#[tauri::command]
fn delete_script(index: usize, state: tauri::State<AppState>) -> Result<(), String> {
    let (game, profile) = state.viewed()?;
    state.mutate(|config, _| config.delete_script(&game, &profile, index).map(|_| ()))
}

#[tauri::command]
async fn fetch_script_from_url(url: String, state: tauri::State<'_, AppState>) -> Result<ScriptRecord, String> {
    with_fetcher(&state.settings, move |fetcher| {
        fetch_script(fetcher, &url).map_err(|e| e.to_string())
    })
    .await
}

#[tauri::command]
async fn import_script_from_url(url: String, state: tauri::State<'_, AppState>) -> Result<ScriptRecord, String> {
    let (game, profile) = state.viewed()?;
    // Reject locked profiles before touching the network.
    lock(&state.config)
        .writable_profile(&game, &profile)
        .map_err(|e| e.to_string())?;

    let script = with_fetcher(&state.settings, move |fetcher| {
        fetch_script(fetcher, &url).map_err(|e| e.to_string())
    })
    .await?;
    state.mutate(|config, _| config.push_script(&game, &profile, script.clone()))?;
    Ok(script)
}

#[tauri::command]
async fn update_script(index: usize, state: tauri::State<'_, AppState>) -> Result<ScriptRecord, String> {
    let (game, profile) = state.viewed()?;
    let current = {
        let config = lock(&state.config);
        config.writable_profile(&game, &profile).map_err(|e| e.to_string())?;
        config.script(&game, &profile, index).map_err(|e| e.to_string())?.clone()
    };

    let updated = with_fetcher(&state.settings, move |fetcher| {
        fetch_update(fetcher, &current).map_err(|e| e.to_string())
    })
    .await?;
    state.mutate(|config, _| config.replace_script(&game, &profile, index, updated.clone()))?;
    Ok(updated)
}

#[tauri::command]
async fn import_profile(source: String, state: tauri::State<'_, AppState>) -> Result<String, String> {
    let profile = with_fetcher(&state.settings, move |fetcher| {
        read_profile(fetcher, &source).map_err(|e| e.to_string())
    })
    .await?;
    state.mutate(|config, ui| {
        let game = ui
            .current_game
            .clone()
            .ok_or(ConfigError::NothingSelected("game"))?;
        config.insert_profile(&game, profile)
    })
}

#[tauri::command]
fn export_profile(game_id: String, profile_id: String, state: tauri::State<AppState>) -> Result<String, String> {
    let config = lock(&state.config);
    let profile = config.profile(&game_id, &profile_id).map_err(|e| e.to_string())?;
    render_profile(profile).map_err(|e| e.to_string())
}

#[tauri::command]
async fn open_external_url(url: String) -> Result<(), String> {
    open::that(&url).map_err(|e| format!("Failed to open URL: {}", e))
}

#[tauri::command]
async fn launch_game(app: AppHandle, state: tauri::State<'_, AppState>) -> Result<(), String> {
    // Held until the game window exists; a second click is refused meanwhile.
    let _claim = state
        .launch
        .try_claim()
        .ok_or_else(|| "A game is already launching".to_string())?;
    if app.get_webview_window(GAME_WINDOW).is_some() {
        return Err("A game is already running".to_string());
    }

    let (game, profile) = {
        let config = lock(&state.config);
        let ui = lock(&state.ui);
        let (game, profile) = ui.launch_target(&config).map_err(|e| e.to_string())?;
        (game.clone(), profile.clone())
    };
    info!(game = %game.id, profile = %profile.name, "launching");

    let bundle_dir = state.settings.bundle_dir.clone();
    let prepared = with_fetcher(&state.settings, move |fetcher| {
        prepare_launch(fetcher, &game, &profile, &bundle_dir).map_err(|e| e.to_string())
    })
    .await?;
    let url: tauri::Url = prepared
        .url
        .parse()
        .map_err(|e| format!("Invalid game URL {}: {}", prepared.url, e))?;

    open_game(&app, &state, prepared, url).map_err(|e| format!("Failed to create window: {}", e))?;

    if let Some(selector) = app.get_webview_window(SELECTOR_WINDOW) {
        let _ = selector.close();
    }
    Ok(())
}

fn open_game(app: &AppHandle, state: &AppState, prepared: PreparedLaunch, url: tauri::Url) -> tauri::Result<()> {
    let init_script = preload::render_from_artifact(
        prepared.artifact.path(),
        &PreloadOptions::from_settings(&state.settings),
    );

    *lock(&state.session) = Some(GameSession {
        tracker: ProgressTracker::new(state.settings.progress_fallback),
        _artifact: prepared.artifact,
    });

    WebviewWindowBuilder::new(app, LOADING_WINDOW, WebviewUrl::App("loading.html".into()))
        .title("Loading")
        .inner_size(600.0, 300.0)
        .resizable(false)
        .decorations(false)
        .always_on_top(true)
        .build()?;

    let game_window = WebviewWindowBuilder::new(app, GAME_WINDOW, WebviewUrl::External(url))
        .title(&prepared.title)
        .inner_size(1280.0, 720.0)
        .resizable(true)
        .visible(false)
        .initialization_script(&init_script)
        .on_page_load(|window, payload| {
            if payload.event() == PageLoadEvent::Finished {
                debug!(url = %payload.url(), "game page loaded");
                game_page_loaded(window.app_handle());
            }
        })
        .build()?;

    let handle = app.clone();
    game_window.on_window_event(move |event| {
        if let WindowEvent::Destroyed = event {
            let state = handle.state::<AppState>();
            let session = lock(&state.session).take();
            drop(session);
            if let Some(loading) = handle.get_webview_window(LOADING_WINDOW) {
                let _ = loading.close();
            }
            info!("game window closed");
        }
    });

    Ok(())
}

fn game_page_loaded(app: &AppHandle) {
    let state = app.state::<AppState>();
    let first = lock(&state.session)
        .as_mut()
        .map(|session| session.tracker.page_loaded(Instant::now()))
        .unwrap_or(false);
    if !first {
        return;
    }

    let fallback = state.settings.progress_fallback;
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        tokio::time::sleep(fallback).await;
        let state = app.state::<AppState>();
        let update = lock(&state.session)
            .as_mut()
            .and_then(|session| session.tracker.check_fallback(Instant::now()));
        if let Some(update) = update {
            warn!("no completion signal from page, forcing progress to 100");
            publish_progress(&app, update);
        }
    });
}

#[tauri::command]
fn report_console(message: String, app: AppHandle, state: tauri::State<AppState>) -> Result<(), String> {
    debug!(%message, "page console");
    let update = lock(&state.session)
        .as_mut()
        .and_then(|session| session.tracker.observe(&message));
    if let Some(update) = update {
        publish_progress(&app, update);
    }
    Ok(())
}

fn publish_progress(app: &AppHandle, update: ProgressUpdate) {
    info!(progress = update.progress, status = %update.status, "loading progress");
    if let Some(loading) = app.get_webview_window(LOADING_WINDOW) {
        let _ = loading.emit("loading-progress", update.clone());
    }
    if update.progress < 100 {
        return;
    }

    let delay = app.state::<AppState>().settings.reveal_delay;
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(game) = app.get_webview_window(GAME_WINDOW) {
            let _ = game.show();
            let _ = game.set_focus();
        }
        if let Some(loading) = app.get_webview_window(LOADING_WINDOW) {
            let _ = loading.close();
        }
    });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    if let Err(e) = run_with(Settings::from_env()) {
        error!(error = %e, "error while running tauri application");
    }
}

pub fn run_with(settings: Settings) -> tauri::Result<()> {
    bundle::sweep_stale(&settings.bundle_dir);

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .manage(AppState::new(settings))
        .invoke_handler(tauri::generate_handler![
            get_config,
            save_config,
            get_ui_state,
            select_game,
            select_profile,
            view_profile,
            back_to_profiles,
            add_game,
            delete_game,
            add_profile,
            rename_profile,
            delete_profile,
            add_script,
            edit_script,
            rename_script,
            delete_script,
            fetch_script_from_url,
            import_script_from_url,
            update_script,
            import_profile,
            export_profile,
            open_external_url,
            launch_game,
            report_console
        ])
        .setup(|app| {
            WebviewWindowBuilder::new(app, SELECTOR_WINDOW, WebviewUrl::App("index.html".into()))
                .title("Userscript Launcher")
                .inner_size(450.0, 640.0)
                .resizable(false)
                .build()?;
            Ok(())
        })
        .run(tauri::generate_context!())
}
