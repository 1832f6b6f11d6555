//! Where noor keeps its config file and downloaded models

use std::path::{Path, PathBuf};

const APP_DIR: &str = "noor";

/// `base/noor`, or `$HOME/<home_relative>/noor` when the platform has no
/// such directory, or `./.noor` with no home either
fn app_dir(base: Option<PathBuf>, home_relative: &[&str]) -> PathBuf {
    if let Some(base) = base {
        return base.join(APP_DIR);
    }
    match dirs::home_dir() {
        Some(home) => home_relative
            .iter()
            .fold(home, |dir, part| dir.join(part))
            .join(APP_DIR),
        None => PathBuf::from(".noor"),
    }
}

fn overridden(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Config file: `$NOOR_CONFIG`, else `config.json` in the platform config dir
pub fn config_path() -> PathBuf {
    overridden("NOOR_CONFIG").unwrap_or_else(|| {
        config_file_in(&app_dir(dirs::config_dir(), &[".config"]))
    })
}

fn config_file_in(dir: &Path) -> PathBuf {
    dir.join("config.json")
}

/// Data dir for model downloads: `$NOOR_DATA_DIR`, else the platform data dir
pub fn data_dir() -> PathBuf {
    overridden("NOOR_DATA_DIR")
        .unwrap_or_else(|| app_dir(dirs::data_dir(), &[".local", "share"]))
}
