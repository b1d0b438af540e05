// Host file locations, per spec.md §6: XDG-style config/data/screenshot
// directories with a `$HOME`-relative fallback when the XDG variable is
// unset.

use std::path::PathBuf;

fn xdg_or_home_fallback(xdg_var: &str, home_suffix: &str) -> Option<PathBuf> {
    if let Ok(base) = std::env::var(xdg_var) {
        if !base.is_empty() {
            return Some(PathBuf::from(base).join("washdc"));
        }
    }
    std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(home_suffix).join("washdc"))
}

pub fn config_dir() -> Option<PathBuf> {
    xdg_or_home_fallback("XDG_CONFIG_HOME", ".config")
}

pub fn data_dir() -> Option<PathBuf> {
    xdg_or_home_fallback("XDG_DATA_HOME", ".local/share")
}

pub fn screenshot_dir() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("screenshots"))
}
