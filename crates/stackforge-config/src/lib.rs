//! StackForge project configuration
//!
//! A project is described by a `stackforge.yaml` file:
//!
//! ```yaml
//! project_name: file-management
//! region: us-east-1
//! admin:
//!   admin_email: ops@example.com
//!   admin_phone: "+15550100"
//!   admin_default_password: Change-me-1
//! wait:
//!   max_attempts: 60
//!   interval_secs: 30
//! artifacts_dir: todeploy
//! ```
//!
//! The directory holding the file is the project root; the state record lives
//! under `<project root>/.stackforge/`.

pub mod error;

pub use error::*;

use serde::Deserialize;
use stackforge_cloud::{AdminContacts, FunctionSettings, ProjectSettings, WaitBudget};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "STACKFORGE_CONFIG";

const CANDIDATES: [&str; 2] = ["stackforge.local.yaml", "stackforge.yaml"];

/// Locate the project configuration file
///
/// Search order:
/// 1. `STACKFORGE_CONFIG` env var (direct path)
/// 2. Current directory: stackforge.local.yaml, stackforge.yaml
/// 3. `./.stackforge/stackforge.yaml`
/// 4. `~/.config/stackforge/stackforge.yaml` (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points to missing file {}", CONFIG_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir_config = current_dir.join(".stackforge").join("stackforge.yaml");
    if project_dir_config.exists() {
        return Ok(project_dir_config);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackforge").join("stackforge.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Contents of `stackforge.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    pub project_name: String,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub admin: AdminContacts,

    #[serde(default)]
    pub wait: WaitBudget,

    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    #[serde(default)]
    pub functions: FunctionSettings,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("todeploy")
}

impl StackConfig {
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `STACKFORGE_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(project) = std::env::var("STACKFORGE_PROJECT") {
            self.project_name = project;
        }
        if let Ok(region) = std::env::var("STACKFORGE_REGION") {
            self.region = Some(region);
        }
        if let Ok(email) = std::env::var("STACKFORGE_ADMIN_EMAIL") {
            self.admin.admin_email = Some(email);
        }
        if let Ok(phone) = std::env::var("STACKFORGE_ADMIN_PHONE") {
            self.admin.admin_phone = Some(phone);
        }
        if let Ok(password) = std::env::var("STACKFORGE_ADMIN_PASSWORD") {
            self.admin.admin_default_password = Some(password);
        }
    }

    /// Settings handed to providers; relative paths resolve against `project_root`
    pub fn settings(&self, project_root: &Path) -> ProjectSettings {
        let artifacts_dir = if self.artifacts_dir.is_absolute() {
            self.artifacts_dir.clone()
        } else {
            project_root.join(&self.artifacts_dir)
        };

        ProjectSettings {
            project_name: self.project_name.clone(),
            admin: self.admin.clone(),
            wait: self.wait,
            functions: self.functions.clone(),
            artifacts_dir,
        }
    }
}

/// A parsed, overridden and validated configuration and where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: StackConfig,
    pub path: PathBuf,
    pub project_root: PathBuf,
}

impl LoadedConfig {
    pub fn settings(&self) -> ProjectSettings {
        self.config.settings(&self.project_root)
    }
}

/// Load the configuration from `explicit` or the search path
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    if !path.exists() {
        return Err(ConfigError::ConfigFileNotFound);
    }

    let content = std::fs::read_to_string(&path)?;
    let mut config = StackConfig::from_yaml(&content, &path)?;
    config.apply_env_overrides();

    let project_root = match path.parent() {
        Some(parent) if parent.file_name().is_some_and(|name| name == ".stackforge") => parent
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| parent.to_path_buf()),
        Some(parent) if parent.as_os_str().is_empty() => std::env::current_dir()?,
        Some(parent) => parent.to_path_buf(),
        None => std::env::current_dir()?,
    };

    config
        .settings(&project_root)
        .validate()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(LoadedConfig {
        config,
        path,
        project_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const MINIMAL: &str = "project_name: file-management\n";

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = StackConfig::from_yaml(MINIMAL, Path::new("stackforge.yaml")).unwrap();

        assert_eq!(config.project_name, "file-management");
        assert_eq!(config.region, None);
        assert_eq!(config.wait, WaitBudget::default());
        assert_eq!(config.artifacts_dir, PathBuf::from("todeploy"));
        assert_eq!(config.functions.runtime, "provided.al2023");
        assert!(config.admin.admin_email.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
project_name: file-management
region: sa-east-1
admin:
  admin_email: ops@example.com
  admin_phone: "+15550100"
  admin_default_password: Change-me-1
wait:
  max_attempts: 10
  interval_secs: 5
artifacts_dir: build
functions:
  memory_mb: 256
"#;
        let config = StackConfig::from_yaml(yaml, Path::new("stackforge.yaml")).unwrap();

        assert_eq!(config.region.as_deref(), Some("sa-east-1"));
        assert_eq!(config.admin.admin_phone.as_deref(), Some("+15550100"));
        assert_eq!(config.wait.max_attempts, 10);
        assert_eq!(config.wait.interval_secs, 5);
        assert_eq!(config.functions.memory_mb, 256);
        assert_eq!(config.functions.timeout_secs, 30);

        let settings = config.settings(Path::new("/srv/app"));
        assert_eq!(settings.artifacts_dir, PathBuf::from("/srv/app/build"));
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let yaml = "project_name: demo\nadmin:\n  email: ops@example.com\n";
        let err = StackConfig::from_yaml(yaml, Path::new("stackforge.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_misspelled_nested_keys_are_rejected() {
        for yaml in [
            "project_name: demo\nadmin:\n  admin_emial: ops@example.com\n",
            "project_name: demo\nwait:\n  max_attempt: 5\n",
            "project_name: demo\nfunctions:\n  memory: 256\n",
        ] {
            let err = StackConfig::from_yaml(yaml, Path::new("stackforge.yaml")).unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }), "accepted: {}", yaml);
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                ("STACKFORGE_PROJECT", Some("override-app")),
                ("STACKFORGE_REGION", Some("eu-west-1")),
                ("STACKFORGE_ADMIN_EMAIL", Some("admin@example.com")),
                ("STACKFORGE_ADMIN_PHONE", None),
                ("STACKFORGE_ADMIN_PASSWORD", None),
            ],
            || {
                let mut config =
                    StackConfig::from_yaml(MINIMAL, Path::new("stackforge.yaml")).unwrap();
                config.apply_env_overrides();

                assert_eq!(config.project_name, "override-app");
                assert_eq!(config.region.as_deref(), Some("eu-west-1"));
                assert_eq!(config.admin.admin_email.as_deref(), Some("admin@example.com"));
                assert!(config.admin.admin_phone.is_none());
            },
        );
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackforge.yaml"), MINIMAL).unwrap();
        fs::write(temp_dir.path().join("stackforge.local.yaml"), MINIMAL).unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("stackforge.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let dir = temp_dir.path().join(".stackforge");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("stackforge.yaml"), MINIMAL).unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".stackforge/stackforge.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, MINIMAL).unwrap();

        let result = temp_env::with_var(CONFIG_ENV, Some(&config_path), find_config_file);
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_load_config_resolves_project_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join(".stackforge");
        fs::create_dir(&dir).unwrap();
        let path = dir.join("stackforge.yaml");
        fs::write(&path, MINIMAL).unwrap();

        let loaded = temp_env::with_var_unset("STACKFORGE_PROJECT", || {
            load_config(Some(&path)).unwrap()
        });

        assert_eq!(loaded.project_root, temp_dir.path());
        assert_eq!(
            loaded.settings().artifacts_dir,
            temp_dir.path().join("todeploy")
        );
    }

    #[test]
    #[serial]
    fn test_load_config_validates_project_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackforge.yaml");
        fs::write(&path, "project_name: Not Valid\n").unwrap();

        let err = temp_env::with_var_unset("STACKFORGE_PROJECT", || {
            load_config(Some(&path)).unwrap_err()
        });
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_config_missing_explicit_path() {
        let err = load_config(Some(Path::new("/nonexistent/stackforge.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigFileNotFound));
    }
}
