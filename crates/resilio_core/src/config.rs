use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fanout::DEFAULT_FANOUT_CAPACITY;
use crate::store::SqliteIncidentStore;

pub const ENV_DB_PATH: &str = "RESILIO_DB_PATH";
pub const ENV_FANOUT_CAPACITY: &str = "RESILIO_FANOUT_CAPACITY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// SQLite file backing the store. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    /// Events buffered per subscriber before it is considered lagged.
    pub fanout_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(raw) = lookup(ENV_FANOUT_CAPACITY) {
            config.fanout_capacity = raw.trim().parse().map_err(|e| {
                AppError::validation(
                    "CONFIG_INVALID",
                    format!("{ENV_FANOUT_CAPACITY} must be a positive integer"),
                )
                .with_details(format!("value={raw}; err={e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.fanout_capacity == 0 {
            return Err(AppError::validation(
                "CONFIG_INVALID",
                "Fan-out capacity must be at least 1",
            ));
        }
        if let Some(path) = &self.db_path {
            if path.is_dir() {
                return Err(AppError::validation(
                    "CONFIG_INVALID",
                    "Database path must be a file (not a directory)",
                )
                .with_details(path.display().to_string()));
            }
        }
        Ok(())
    }

    pub fn open_store(&self) -> Result<SqliteIncidentStore, AppError> {
        self.validate()?;
        match &self.db_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::store("DB_PATH_FAILED", "Failed to create database directory")
                            .with_details(format!("path={}; err={}", parent.display(), e))
                    })?;
                }
                SqliteIncidentStore::open(path)
            }
            None => SqliteIncidentStore::open_in_memory(),
        }
    }
}
