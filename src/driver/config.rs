//! Locate and read `rebind.toml`
//!
//! The first `rebind.toml` found walking up from the working
//! directory wins, then `~/.rebind.toml`. Missing files just mean
//! defaults.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;

use crate::eval::settings::EvalSettings;

use super::error::RebindError;

pub const CONFIG_FILE: &str = "rebind.toml";

/// Search for a configuration file starting at `dir`
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|d| d.join(CONFIG_FILE))
        .find(|p| p.is_file())
        .or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(format!(".{}", CONFIG_FILE)))
                .filter(|p| p.is_file())
        })
}

/// Parse settings from configuration text
pub fn parse_settings(text: &str) -> Result<EvalSettings, RebindError> {
    Ok(toml::from_str(text)?)
}

/// Load settings from an explicit path, or by searching, falling back
/// to defaults
pub fn load_settings(explicit: Option<&Path>) -> Result<EvalSettings, RebindError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => std::env::current_dir().ok().and_then(|cwd| find_config(&cwd)),
    };

    match path {
        Some(p) => {
            debug!("reading settings from {}", p.display());
            let text = fs::read_to_string(&p)
                .map_err(|_| RebindError::FileCouldNotBeRead(p.display().to_string()))?;
            parse_settings(&text)
        }
        None => Ok(EvalSettings::default()),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_parse_settings() {
        let settings = parse_settings("heap-limit = 2000\ngc-ballast = 64").unwrap();
        assert_eq!(settings.heap_limit, Some(2000));
        assert_eq!(settings.gc_ballast, Some(64));
        assert_eq!(settings.max_depth, EvalSettings::default().max_depth);
    }

    #[test]
    pub fn test_bad_settings() {
        assert!(matches!(
            parse_settings("max-depth = \"deep\""),
            Err(RebindError::Config(_))
        ));
    }

    #[test]
    pub fn test_explicit_missing_file() {
        assert!(matches!(
            load_settings(Some(Path::new("/nonexistent/rebind.toml"))),
            Err(RebindError::FileCouldNotBeRead(_))
        ));
    }
}
