//! # File I/O Module
//!
//! Reads and writes quotes and their reference data:
//! - **Atomic saves**: write to `.tmp`, sync, rename over the target
//! - **File locking**: keep two estimators from editing one quote
//! - **Version validation**: refuse quotes written by a newer schema
//! - **Reference data**: catalog and association rule files
//!
//! ## File Format
//!
//! Quotes are JSON files (`*.quote.json` by convention). The lock lives next
//! to the quote with `.lock` appended to its extension and holds who took it.
//!
//! Catalog files map reference codes to entries; rule files map principal
//! definition codes to their associated components:
//!
//! ```text
//! catalog.json  { "AGL18": { "thickness_mm": 18, "net_price": 12.5, "waste_fraction": 0.15 } }
//! rules.json    { "SHELF": [ { "associated_code": "PIN", "quantity_rule": "double_sibling" } ] }
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use quote_core::file_io::{load_quote, save_quote, FileLock};
//! use std::path::Path;
//!
//! let path = Path::new("kitchen.quote.json");
//! let lock = FileLock::acquire(path, "ana@workshop.example")?;
//!
//! let mut quote = load_quote(path)?;
//! quote.touch();
//! save_quote(&quote, path)?;
//!
//! drop(lock);
//! # Ok::<(), quote_core::errors::QuoteError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{AssociationTable, MemoryCatalog};
use crate::errors::{QuoteError, QuoteResult};
use crate::quote::{Quote, SCHEMA_VERSION};

/// Lock file metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// User identifier (email or username)
    pub user_id: String,
    pub machine: String,
    pub pid: u32,
    pub locked_at: DateTime<Utc>,
}

impl LockInfo {
    /// Lock info for the current process.
    pub fn new(user_id: impl Into<String>) -> Self {
        LockInfo {
            user_id: user_id.into(),
            machine: hostname().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            locked_at: Utc::now(),
        }
    }

    /// Locks older than a day, or held by a dead process on this machine,
    /// can be taken over.
    pub fn is_stale(&self) -> bool {
        if Utc::now() - self.locked_at > chrono::Duration::hours(24) {
            return true;
        }
        match hostname() {
            Some(machine) if machine == self.machine => !process_alive(self.pid),
            _ => false,
        }
    }
}

fn hostname() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOSTNAME").ok().or_else(|| std::env::var("HOST").ok())
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
        .unwrap_or(true)
}

#[cfg(not(any(unix, windows)))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Exclusive lock on a quote file, released when dropped.
///
/// Holds an OS-level lock (fs2) on the `.lock` file and writes [`LockInfo`]
/// into it so other users can see who is editing.
pub struct FileLock {
    quote_path: PathBuf,
    lock_path: PathBuf,
    _lock_file: File,
    pub info: LockInfo,
}

impl FileLock {
    /// Acquire the lock for `path`.
    ///
    /// Fails with [`QuoteError::FileLocked`] while someone else holds a
    /// non-stale lock.
    pub fn acquire(path: &Path, user_id: impl Into<String>) -> QuoteResult<Self> {
        let lock_path = lock_path_for(path);
        let info = LockInfo::new(user_id);

        if let Some(existing) = read_lock_info(&lock_path) {
            if !existing.is_stale() {
                return Err(QuoteError::file_locked(
                    path.display().to_string(),
                    format!("{} ({})", existing.user_id, existing.machine),
                    existing.locked_at.to_rfc3339(),
                ));
            }
            debug!(path = %lock_path.display(), holder = %existing.user_id, "taking over stale lock");
        }

        let mut lock_file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| io_error("create lock", &lock_path, e))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| QuoteError::file_locked(path.display().to_string(), "another process", "unknown"))?;

        let json = to_json(&info)?;
        lock_file
            .write_all(json.as_bytes())
            .and_then(|_| lock_file.sync_all())
            .map_err(|e| io_error("write lock", &lock_path, e))?;

        info!(path = %path.display(), user = %info.user_id, "quote locked");
        Ok(FileLock {
            quote_path: path.to_path_buf(),
            lock_path,
            _lock_file: lock_file,
            info,
        })
    }

    /// Current holder of the lock on `path`, if any.
    pub fn check(path: &Path) -> Option<LockInfo> {
        read_lock_info(&lock_path_for(path)).filter(|info| !info.is_stale())
    }

    pub fn quote_path(&self) -> &Path {
        &self.quote_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn lock_path_for(quote_path: &Path) -> PathBuf {
    let mut lock_path = quote_path.to_path_buf();
    let extension = lock_path
        .extension()
        .map(|e| format!("{}.lock", e.to_string_lossy()))
        .unwrap_or_else(|| "lock".to_string());
    lock_path.set_extension(extension);
    lock_path
}

fn read_lock_info(lock_path: &Path) -> Option<LockInfo> {
    let contents = fs::read_to_string(lock_path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn io_error(operation: &str, path: &Path, error: std::io::Error) -> QuoteError {
    QuoteError::file_error(operation, path.display().to_string(), error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> QuoteResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| QuoteError::SerializationError { reason: e.to_string() })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> QuoteResult<T> {
    let contents = fs::read_to_string(path).map_err(|e| io_error("read", path, e))?;
    serde_json::from_str(&contents).map_err(|e| QuoteError::SerializationError {
        reason: format!("Invalid JSON in {}: {}", path.display(), e),
    })
}

/// Save a quote atomically: write `.tmp`, fsync, rename over `path`.
pub fn save_quote(quote: &Quote, path: &Path) -> QuoteResult<()> {
    let json = to_json(quote)?;
    let tmp_path = tmp_path_for(path);

    let mut tmp_file = File::create(&tmp_path).map_err(|e| io_error("create temp file", &tmp_path, e))?;
    tmp_file
        .write_all(json.as_bytes())
        .and_then(|_| tmp_file.sync_all())
        .map_err(|e| io_error("write temp file", &tmp_path, e))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_error("rename to final", path, e)
    })?;

    debug!(path = %path.display(), rows = quote.rows.len(), "quote saved");
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load a quote and check its schema version.
pub fn load_quote(path: &Path) -> QuoteResult<Quote> {
    let quote: Quote = read_json(path)?;
    validate_version(&quote.meta.version)?;
    Ok(quote)
}

/// Load a quote along with whoever currently holds its lock.
pub fn load_quote_with_lock_check(path: &Path) -> QuoteResult<(Quote, Option<LockInfo>)> {
    let quote = load_quote(path)?;
    Ok((quote, FileLock::check(path)))
}

/// Load a catalog file (reference code → entry).
pub fn load_catalog(path: &Path) -> QuoteResult<MemoryCatalog> {
    let catalog: MemoryCatalog = read_json(path)?;
    debug!(path = %path.display(), entries = catalog.len(), "catalog loaded");
    Ok(catalog)
}

/// Load an association rule file (definition code → entries).
pub fn load_rules(path: &Path) -> QuoteResult<AssociationTable> {
    read_json(path)
}

/// Major versions must match; on 0.x a newer minor is refused.
fn validate_version(file_version: &str) -> QuoteResult<()> {
    let mismatch = || QuoteError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };
    let parse = |v: &str| -> Option<(u32, u32)> {
        let mut parts = v.split('.').map(|p| p.parse::<u32>().ok());
        Some((parts.next()??, parts.next().flatten().unwrap_or(0)))
    };

    let (file_major, file_minor) = parse(file_version).ok_or_else(mismatch)?;
    let (major, minor) = parse(SCHEMA_VERSION).ok_or_else(mismatch)?;

    if file_major != major || (major == 0 && file_minor > minor) {
        return Err(mismatch());
    }
    Ok(())
}
