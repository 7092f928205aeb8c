use std::path::PathBuf;

use debug_menu::{DebugMenuSettings, SettingsError};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SETTINGS_PATH_ENV_VAR: &str = "GDM_SETTINGS_PATH";
const SAVE_DIR_ENV_VAR: &str = "GDM_SAVE_DIR";
const FRAMES_ENV_VAR: &str = "GDM_FRAMES";
const DEFAULT_FRAMES: u32 = 120;

pub(crate) struct AppWiring {
    pub(crate) settings: DebugMenuSettings,
    pub(crate) frames: u32,
}

pub(crate) fn build_app() -> Result<AppWiring, SettingsError> {
    init_tracing();
    info!("=== Debug Menu Demo Startup ===");

    let mut settings = match std::env::var_os(SETTINGS_PATH_ENV_VAR) {
        Some(path) => DebugMenuSettings::load(&PathBuf::from(path))?,
        None => DebugMenuSettings::default(),
    };
    if let Some(dir) = std::env::var_os(SAVE_DIR_ENV_VAR) {
        settings.save_dir = PathBuf::from(dir);
    }
    info!(
        save_dir = %settings.save_dir.display(),
        slot = settings.save_slot_name.as_str(),
        "demo_settings_resolved"
    );

    Ok(AppWiring {
        settings,
        frames: parse_frames_from_env(),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_frames_from_env() -> u32 {
    std::env::var(FRAMES_ENV_VAR)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(DEFAULT_FRAMES)
}
