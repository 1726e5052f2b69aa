use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use taskgrid_core::{SchedulerOptions, ServiceConfig};

use crate::state::{default_store_path, ensure_taskgrid_home};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule: ScheduleSection,
    pub layout: LayoutSection,
    pub display: DisplaySection,
    pub backend: BackendSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    /// Whole weeks before the current week covered by every rebuild.
    pub weeks_before: u32,
    pub weeks_after: u32,
    pub rebuild_timeout_ms: u64,
    /// Upper bound on occurrences expanded per recurring task.
    pub max_occurrences: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSection {
    pub max_split_segments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub kind: BackendKind,
    pub base_url: String,
    pub user_id: u64,
    /// Extra attempts after a transport failure.
    pub retries: u32,
    pub backoff_ms: u64,
    /// For kind = "local": JSON store (default: ~/.taskgrid/store.json)
    pub store_path: Option<PathBuf>,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        let service = ServiceConfig::default();
        Self {
            weeks_before: service.weeks_before,
            weeks_after: service.weeks_after,
            rebuild_timeout_ms: service.rebuild_timeout_ms,
            max_occurrences: SchedulerOptions::default().max_occurrences,
        }
    }
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            max_split_segments: ServiceConfig::default().max_split_segments,
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            base_url: "http://localhost:8080/api".to_string(),
            user_id: 1,
            retries: 3,
            backoff_ms: 200,
            store_path: None,
        }
    }
}

impl Config {
    pub fn service(&self) -> ServiceConfig {
        ServiceConfig {
            weeks_before: self.schedule.weeks_before,
            weeks_after: self.schedule.weeks_after,
            rebuild_timeout_ms: self.schedule.rebuild_timeout_ms,
            max_split_segments: self.layout.max_split_segments,
        }
    }

    pub fn scheduler(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_occurrences: self.schedule.max_occurrences,
            ..SchedulerOptions::default()
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.display
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown timezone '{}': {e}", self.display.timezone))
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.backend.store_path {
            Some(p) => Ok(p.clone()),
            None => default_store_path(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_taskgrid_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let cfg: Config = toml::from_str(
            r#"
            [schedule]
            weeks_after = 4

            [backend]
            kind = "http"
            base_url = "https://tasks.example.org/api"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.schedule.weeks_after, 4);
        assert_eq!(cfg.schedule.weeks_before, 2);
        assert_eq!(cfg.backend.kind, BackendKind::Http);
        assert_eq!(cfg.backend.retries, 3);
        assert_eq!(cfg.layout, LayoutSection::default());
    }

    #[test]
    fn defaults_survive_a_toml_round() {
        let cfg = Config::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), cfg);
    }

    #[test]
    fn sections_feed_the_core_options() {
        let mut cfg = Config::default();
        cfg.schedule.max_occurrences = 12;
        cfg.layout.max_split_segments = 3;
        assert_eq!(cfg.scheduler().max_occurrences, 12);
        assert_eq!(cfg.service().max_split_segments, 3);
    }

    #[test]
    fn bad_timezone_is_reported() {
        let mut cfg = Config::default();
        cfg.display.timezone = "Mars/Olympus".into();
        assert!(cfg.timezone().is_err());
        cfg.display.timezone = "Europe/Moscow".into();
        assert_eq!(cfg.timezone().unwrap(), chrono_tz::Europe::Moscow);
    }
}
