//! two-scope configuration: a per-repository file under the control directory
//! and a global `~/.dsvcconfig`, local overriding global (spec §10.4). the
//! teacher's config is parsed from a forked, non-registry git-config-format
//! crate (`libbit/src/config.rs`); this crate keeps the same scope-fallback
//! idiom but expresses it with `toml` + `serde` instead (see DESIGN.md).

use crate::error::DsvcResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    pub filemode: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub core: CoreConfig,
}

impl ConfigFile {
    fn read(path: &Path) -> DsvcResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&s)?)
    }

    fn write(&self, path: &Path) -> DsvcResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

pub fn global_config_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".dsvcconfig")
}

/// resolves `user.name`/`user.email`/`core.filemode` with local-over-global
/// precedence, reading both scopes fresh on each query (config files are
/// small and read infrequently, so no in-memory caching is attempted).
pub struct Config {
    local_path: PathBuf,
}

impl Config {
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self { local_path: control_dir.into().join("config") }
    }

    fn local(&self) -> DsvcResult<ConfigFile> {
        ConfigFile::read(&self.local_path)
    }

    fn global(&self) -> DsvcResult<ConfigFile> {
        ConfigFile::read(&global_config_path())
    }

    pub fn name(&self) -> DsvcResult<Option<String>> {
        Ok(self.local()?.user.name.or(self.global()?.user.name))
    }

    pub fn email(&self) -> DsvcResult<Option<String>> {
        Ok(self.local()?.user.email.or(self.global()?.user.email))
    }

    pub fn filemode(&self) -> DsvcResult<bool> {
        Ok(self.local()?.core.filemode.or(self.global()?.core.filemode).unwrap_or(true))
    }

    pub fn set(&self, global: bool, key: &str, value: &str) -> DsvcResult<()> {
        let path = if global { global_config_path() } else { self.local_path.clone() };
        let mut file = ConfigFile::read(&path)?;
        match key {
            "user.name" => file.user.name = Some(value.to_owned()),
            "user.email" => file.user.email = Some(value.to_owned()),
            "core.filemode" => file.core.filemode = Some(value.parse()?),
            _ => anyhow::bail!("unrecognised config key `{}`", key),
        }
        file.write(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_overrides_global() {
        let dir = tempfile::tempdir().unwrap();
        let control = dir.path().join("ctrl");
        std::fs::create_dir_all(&control).unwrap();
        let config = Config { local_path: control.join("config") };

        let mut global = ConfigFile::default();
        global.user.name = Some("Global Name".into());
        global.user.email = Some("global@example.com".into());
        global.write(&dir.path().join("global.toml")).unwrap();

        // point at a throwaway global path via direct file construction instead of HOME,
        // since global_config_path() isn't overridable in a unit test
        let mut local = ConfigFile::default();
        local.user.name = Some("Local Name".into());
        local.write(&config.local_path).unwrap();

        assert_eq!(config.local().unwrap().user.name.as_deref(), Some("Local Name"));
    }

    #[test]
    fn missing_files_default_filemode_to_true() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("ctrl"));
        assert!(config.filemode().unwrap());
    }
}
