use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;

use crate::{Error, Result};

use super::{Config, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

/// Load the user config, writing a default file on first run.
pub fn load_or_default() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = Config::default();
        cfg.save_to_path(&path)?;
        super::validate(&cfg)?;
        return Ok(cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        super::validate(&cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    parse(&raw).map_err(|err| match err {
        Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, format!("# tftbridge config\n{body}"))?;
    Ok(())
}

pub fn parse(raw: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(raw)?;
    super::validate(&cfg)?;
    Ok(cfg)
}

pub(super) fn config_path() -> Result<PathBuf> {
    let dirs = BaseDirs::new()
        .ok_or_else(|| Error::Config("HOME not set; cannot locate config directory".into()))?;
    Ok(dirs.home_dir().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_is_commented_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        save_to_path(&Config::default(), &path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# tftbridge config"));
        assert!(contents.contains("device = \"/dev/ttyS0\""));
        assert!(contents.contains("dialect = \"auto\""));
        assert!(contents.contains("fallback_dialect = \"ok-prefixed\""));
    }

    #[test]
    fn load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "baud = \"fast\"").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(format!("{err}").contains(CONFIG_FILE_NAME), "{err}");
    }
}
