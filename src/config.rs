use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "CLASSTRACK_CONFIG";

/// Ten years.
pub const MAX_SESSION_TTL_MINUTES: i64 = 525_600 * 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub auth: AuthConfig,
    pub thresholds: Thresholds,
    pub seed: SeedConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Opened at startup when set; `workspace.select` can still switch later.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_minutes: i64,
    /// Password given to the `admin` account created on an empty database.
    pub bootstrap_admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 720,
            bootstrap_admin_password: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub low_attendance_percent: f64,
    pub low_grade: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_attendance_percent: 75.0,
            low_grade: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub subjects: bool,
    pub demo_students: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            subjects: true,
            demo_students: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(raw).context("invalid config toml")?;
        let ttl = cfg.auth.session_ttl_minutes;
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&ttl) {
            anyhow::bail!(
                "auth.session_ttl_minutes must be between 1 and {}, got {}",
                MAX_SESSION_TTL_MINUTES,
                ttl
            );
        }
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// `--config <path>` wins over `CLASSTRACK_CONFIG`; neither means defaults.
    pub fn discover<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut from_args: Option<PathBuf> = None;
        while let Some(a) = args.next() {
            if a == "--config" {
                let Some(p) = args.next() else {
                    anyhow::bail!("--config requires a path");
                };
                from_args = Some(PathBuf::from(p));
            } else if let Some(p) = a.strip_prefix("--config=") {
                from_args = Some(PathBuf::from(p));
            }
        }
        let path = from_args.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(p) => Self::load(&p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = Config::from_toml_str("").expect("parse");
        assert_eq!(cfg.auth.session_ttl_minutes, 720);
        assert_eq!(cfg.thresholds.low_attendance_percent, 75.0);
        assert_eq!(cfg.thresholds.low_grade, 60.0);
        assert!(cfg.seed.demo_students);
        assert!(cfg.workspace.path.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = Config::from_toml_str(
            "[thresholds]\nlow_grade = 50.0\n\n[seed]\ndemo_students = false\n",
        )
        .expect("parse");
        assert_eq!(cfg.thresholds.low_grade, 50.0);
        assert_eq!(cfg.thresholds.low_attendance_percent, 75.0);
        assert!(!cfg.seed.demo_students);
        assert!(cfg.seed.subjects);
    }

    #[test]
    fn rejects_non_positive_ttl() {
        assert!(Config::from_toml_str("[auth]\nsession_ttl_minutes = 0\n").is_err());
    }

    #[test]
    fn rejects_ttl_beyond_ten_years() {
        assert!(Config::from_toml_str("[auth]\nsession_ttl_minutes = 1000000000000\n").is_err());
        let max = format!("[auth]\nsession_ttl_minutes = {}\n", MAX_SESSION_TTL_MINUTES);
        let cfg = Config::from_toml_str(&max).expect("upper bound is accepted");
        assert_eq!(cfg.auth.session_ttl_minutes, MAX_SESSION_TTL_MINUTES);
        let over = format!("[auth]\nsession_ttl_minutes = {}\n", MAX_SESSION_TTL_MINUTES + 1);
        assert!(Config::from_toml_str(&over).is_err());
    }

    #[test]
    fn discover_without_flag_or_env_uses_defaults() {
        if std::env::var_os(CONFIG_ENV).is_some() {
            return;
        }
        let cfg = Config::discover(vec!["classtrackd".to_string()]).expect("defaults");
        assert_eq!(cfg.log.filter, "info");
    }

    #[test]
    fn discover_flag_without_path_is_error() {
        assert!(Config::discover(vec!["--config".to_string()]).is_err());
    }
}
