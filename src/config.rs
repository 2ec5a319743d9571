use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;

pub const DEFAULT_INSTITUTION: &str = "JNCT College";
pub const DEFAULT_MIRROR_FILE: &str = "Student_Data.csv";
pub const DEFAULT_OTP_TTL_MINUTES: i64 = 10;

/// Process configuration, loaded once at startup and handed to the
/// collaborators that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub institution: String,
    /// Master sender address. Delivery is refused while unset.
    pub system_email: Option<String>,
    pub mirror_file: String,
    /// Overrides `<workspace>/outbox`.
    pub outbox_dir: Option<PathBuf>,
    pub otp_ttl_minutes: i64,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            institution: DEFAULT_INSTITUTION.to_string(),
            system_email: None,
            mirror_file: DEFAULT_MIRROR_FILE.to_string(),
            outbox_dir: None,
            otp_ttl_minutes: DEFAULT_OTP_TTL_MINUTES,
            log_level: Level::INFO,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        let otp_ttl_minutes = match get("RESULTSD_OTP_TTL_MINUTES") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(v) if v > 0 => v,
                _ => {
                    tracing::warn!("ignoring invalid RESULTSD_OTP_TTL_MINUTES={raw}");
                    defaults.otp_ttl_minutes
                }
            },
            None => defaults.otp_ttl_minutes,
        };
        let log_level = match get("RESULTSD_LOG") {
            Some(raw) => Level::from_str(&raw).unwrap_or_else(|_| {
                tracing::warn!("ignoring invalid RESULTSD_LOG={raw}");
                defaults.log_level
            }),
            None => defaults.log_level,
        };

        Self {
            institution: get("RESULTSD_INSTITUTION").unwrap_or(defaults.institution),
            system_email: get("RESULTSD_SYSTEM_EMAIL"),
            mirror_file: get("RESULTSD_MIRROR_FILE").unwrap_or(defaults.mirror_file),
            outbox_dir: get("RESULTSD_OUTBOX_DIR").map(PathBuf::from),
            otp_ttl_minutes,
            log_level,
        }
    }

    pub fn mirror_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.mirror_file)
    }

    pub fn outbox_path(&self, workspace: &Path) -> PathBuf {
        self.outbox_dir
            .clone()
            .unwrap_or_else(|| workspace.join("outbox"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg.institution, DEFAULT_INSTITUTION);
        assert_eq!(cfg.system_email, None);
        assert_eq!(cfg.mirror_file, DEFAULT_MIRROR_FILE);
        assert_eq!(cfg.otp_ttl_minutes, 10);
        assert_eq!(cfg.log_level, Level::INFO);
    }

    #[test]
    fn overrides_are_read_and_invalid_numbers_fall_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("RESULTSD_INSTITUTION", "Test Institute"),
            ("RESULTSD_SYSTEM_EMAIL", " results@example.edu "),
            ("RESULTSD_OTP_TTL_MINUTES", "-3"),
            ("RESULTSD_LOG", "debug"),
            ("RESULTSD_OUTBOX_DIR", "/tmp/outbox"),
        ]));
        assert_eq!(cfg.institution, "Test Institute");
        assert_eq!(cfg.system_email.as_deref(), Some("results@example.edu"));
        assert_eq!(cfg.otp_ttl_minutes, DEFAULT_OTP_TTL_MINUTES);
        assert_eq!(cfg.log_level, Level::DEBUG);
        assert_eq!(
            cfg.outbox_path(Path::new("/ws")),
            PathBuf::from("/tmp/outbox")
        );
        assert_eq!(
            cfg.mirror_path(Path::new("/ws")),
            PathBuf::from("/ws/Student_Data.csv")
        );
    }
}
