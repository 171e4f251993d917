//! File-backed key-value store.
//!
//! A store is a directory in which every key is a JSON document `<key>.json`.
//! Values are written to a temporary file of the same directory which is then renamed onto the key,
//! so that a reader observes either the previous value, the new value, or no value, but never a partial one.
//! Files are opened and closed within each operation.
//!
//! Concurrent writers on the same store are not coordinated: the last rename wins.
use log::trace;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::SpikeCodeError;

const EXTENSION: &str = "json";

/// A handle on a key-value store directory.
#[derive(Debug, PartialEq, Clone)]
pub struct KvStore {
    root: PathBuf,
}

impl KvStore {
    /// Open an existing store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SpikeCodeError> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(SpikeCodeError::StorageFailure(format!(
                "{} is not a key-value store",
                root.display()
            )));
        }
        Ok(KvStore { root })
    }

    /// Open a store, creating it if necessary.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SpikeCodeError> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            SpikeCodeError::StorageFailure(format!("Cannot create {}: {}", root.display(), e))
        })?;
        Ok(KvStore { root })
    }

    /// Returns whether a store exists at the given path.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, SpikeCodeError> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(SpikeCodeError::InvalidArgument(format!(
                "Invalid store key: {:?}",
                key
            )));
        }
        Ok(self.root.join(format!("{}.{}", key, EXTENSION)))
    }

    /// Returns whether the key is present in the store.
    pub fn contains(&self, key: &str) -> bool {
        self.key_path(key).map(|path| path.is_file()).unwrap_or(false)
    }

    /// Returns the keys of the store, sorted.
    pub fn keys(&self) -> Result<Vec<String>, SpikeCodeError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;
        let mut keys = vec![];
        for entry in entries {
            let path = entry
                .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?
                .path();
            if path.extension().map_or(false, |ext| ext == EXTENSION) && path.is_file() {
                if let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) {
                    if !key.starts_with('.') {
                        keys.push(key.to_string());
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Read the value of a key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, SpikeCodeError> {
        let path = self.key_path(key)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SpikeCodeError::MissingData(format!(
                "Key {} not found in {}",
                key,
                self.root.display()
            )),
            _ => SpikeCodeError::StorageFailure(format!("Cannot open {}: {}", path.display(), e)),
        })?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| {
            SpikeCodeError::StorageFailure(format!("Cannot read {}: {}", path.display(), e))
        })
    }

    /// Write the value of a key, replacing any previous value atomically.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SpikeCodeError> {
        let path = self.key_path(key)?;
        let tmp = NamedTempFile::new_in(&self.root)
            .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;

        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer(&mut writer, value)
            .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;
        let tmp = writer
            .into_inner()
            .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;

        tmp.persist(&path).map_err(|e| {
            SpikeCodeError::StorageFailure(format!("Cannot write {}: {}", path.display(), e))
        })?;
        trace!("Key {} written to {}", key, self.root.display());
        Ok(())
    }

    /// Remove a key from the store, if present.
    pub fn remove(&self, key: &str) -> Result<(), SpikeCodeError> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SpikeCodeError::StorageFailure(e.to_string())),
        }
    }
}
