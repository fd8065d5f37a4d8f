//! Persistent threshold storage for the disk tier
//!
//! Thresholds live in `<cacheDir>/properties.meta` as a JSON object so that every
//! process sharing a cache directory converges on the same settings. Reads come
//! from an in-memory copy refreshed at most once per [`PropertyManager::LOAD_DELAY`].

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

use super::utilities::{create_temp_file, delete_quietly};
use crate::cache::config::Thresholds;
use crate::cache::traits::CacheResult;

/// One persisted threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    CleanTimeDelay,
    CleanModificationCount,
    MaxAge,
    MaxSize,
    ExpirationTime,
}

impl Property {
    pub const ALL: [Property; 5] = [
        Property::CleanTimeDelay,
        Property::CleanModificationCount,
        Property::MaxAge,
        Property::MaxSize,
        Property::ExpirationTime,
    ];

    /// Name used in the properties file
    pub const fn name(self) -> &'static str {
        match self {
            Property::CleanTimeDelay => "clean-time-delay",
            Property::CleanModificationCount => "clean-modification-count",
            Property::MaxAge => "max-age",
            Property::MaxSize => "max-size",
            Property::ExpirationTime => "expiration-time",
        }
    }

    fn select(self, thresholds: &Thresholds) -> i64 {
        match self {
            Property::CleanTimeDelay => thresholds.clean_time_delay,
            Property::CleanModificationCount => thresholds.clean_modification_count,
            Property::MaxAge => thresholds.max_age,
            Property::MaxSize => thresholds.max_size,
            Property::ExpirationTime => thresholds.expiration_time,
        }
    }
}

struct PropertyState {
    values: BTreeMap<String, Value>,
    loaded_at: Option<Instant>,
}

pub struct PropertyManager {
    properties_file: PathBuf,
    scratch_directory: PathBuf,
    defaults: Thresholds,
    state: Mutex<PropertyState>,
}

impl PropertyManager {
    pub const FILE_NAME: &'static str = "properties.meta";
    pub const LOAD_DELAY: Duration = Duration::from_secs(60);

    /// Manager for `<cache_directory>/properties.meta`
    ///
    /// Temp files for atomic writes are created in `scratch_directory`, which must
    /// live on the same file system.
    pub fn new(cache_directory: &Path, scratch_directory: PathBuf, defaults: Thresholds) -> Self {
        Self {
            properties_file: cache_directory.join(Self::FILE_NAME),
            scratch_directory,
            defaults,
            state: Mutex::new(PropertyState {
                values: BTreeMap::new(),
                loaded_at: None,
            }),
        }
    }

    #[inline]
    pub fn defaults(&self) -> &Thresholds {
        &self.defaults
    }

    pub fn get(&self, property: Property) -> i64 {
        let mut state = self.lock_state();
        self.refresh(&mut state, false);
        self.value_in(&state, property)
    }

    /// All thresholds from one consistent view of the file
    pub fn thresholds(&self) -> Thresholds {
        let mut state = self.lock_state();
        self.refresh(&mut state, false);
        Thresholds {
            clean_time_delay: self.value_in(&state, Property::CleanTimeDelay),
            clean_modification_count: self.value_in(&state, Property::CleanModificationCount),
            max_age: self.value_in(&state, Property::MaxAge),
            max_size: self.value_in(&state, Property::MaxSize),
            expiration_time: self.value_in(&state, Property::ExpirationTime),
        }
    }

    /// Persist one threshold
    ///
    /// The current file content is re-read and merged so that values written by
    /// other processes survive. On failure nothing changes in memory.
    pub fn set(&self, property: Property, value: i64) -> CacheResult<()> {
        let mut state = self.lock_state();

        let mut merged = self.read_file();
        merged.insert(property.name().to_string(), Value::from(value));
        self.write_file(&merged)?;

        log::debug!("stored {} = {} in {:?}", property.name(), value, self.properties_file);
        state.values = merged;
        state.loaded_at = Some(Instant::now());
        Ok(())
    }

    /// Drop the in-memory copy so the next read goes to disk
    pub fn reload(&self) {
        let mut state = self.lock_state();
        self.refresh(&mut state, true);
    }

    fn lock_state(&self) -> MutexGuard<'_, PropertyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn value_in(&self, state: &PropertyState, property: Property) -> i64 {
        state
            .values
            .get(property.name())
            .and_then(Value::as_i64)
            .unwrap_or_else(|| property.select(&self.defaults))
    }

    fn refresh(&self, state: &mut PropertyState, force: bool) {
        let stale = state
            .loaded_at
            .is_none_or(|loaded_at| loaded_at.elapsed() >= Self::LOAD_DELAY);
        if force || stale {
            state.values = self.read_file();
            state.loaded_at = Some(Instant::now());
        }
    }

    fn read_file(&self) -> BTreeMap<String, Value> {
        let file = match File::open(&self.properties_file) {
            Ok(file) => file,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::debug!("cannot open {:?}: {}", self.properties_file, e);
                }
                return BTreeMap::new();
            }
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(values) => values,
            Err(e) => {
                log::warn!("ignoring unreadable {:?}: {}", self.properties_file, e);
                BTreeMap::new()
            }
        }
    }

    fn write_file(&self, values: &BTreeMap<String, Value>) -> CacheResult<()> {
        let temp_file = create_temp_file(false, "properties-", "-temp", &self.scratch_directory)?;

        let result = (|| -> CacheResult<()> {
            let mut out = BufWriter::new(File::create(&temp_file)?);
            serde_json::to_writer_pretty(&mut out, values)?;
            out.flush()?;
            out.get_ref().sync_all()?;
            fs::rename(&temp_file, &self.properties_file)?;
            Ok(())
        })();

        if result.is_err() {
            delete_quietly(&temp_file);
        }
        result
    }
}
