//! State store location parsing.
//!
//! Accepted forms:
//!
//! ```text
//! memory://                  ephemeral in-memory store
//! file:///var/lib/x.redb     on-disk store
//! /var/lib/x.redb            on-disk store (bare path)
//! ```
//!
//! Remote object-store schemes (`s3://`, `gs://`, `do://`, ...) are rejected.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{StateError, StateResult};
use crate::store::StateStore;

/// Where the desired-state store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl StoreLocation {
    /// Open the store at this location.
    pub fn open(&self) -> StateResult<StateStore> {
        match self {
            StoreLocation::Memory => StateStore::open_in_memory(),
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StateError::Open(format!("{}: {e}", parent.display())))?;
                }
                StateStore::open(path)
            }
        }
    }
}

impl FromStr for StoreLocation {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StateError::UnsupportedLocation("empty location".to_string()));
        }
        if s == "memory://" {
            return Ok(StoreLocation::Memory);
        }
        if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(StateError::UnsupportedLocation(s.to_string()));
            }
            return Ok(StoreLocation::File(PathBuf::from(path)));
        }
        if s.contains("://") {
            return Err(StateError::UnsupportedLocation(s.to_string()));
        }
        Ok(StoreLocation::File(PathBuf::from(s)))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Memory => write!(f, "memory://"),
            StoreLocation::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}
