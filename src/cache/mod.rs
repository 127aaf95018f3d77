//! File content cache.
//!
//! Maps request paths (`/dir/file.html`) to read-only memory mappings of the
//! files under the content root. The map is filled eagerly by [`FileCache::rebuild`]
//! and kept coherent by the [`watcher`] thread, which rebuilds it wholesale on
//! every filesystem change. Readers never block on a rebuild: each key is
//! replaced with a single atomic insert, so a reader sees either the old or
//! the new mapping of a file, never a half-written entry.

pub mod watcher;

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use dashmap::DashMap;
use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("content root {}: {source}", .root.display())]
    Root {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid walk pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid resource path {0}")]
    InvalidPath(String),
    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Immutable, randomly accessible bytes of one file.
#[derive(Debug)]
pub struct Region {
    map: Option<Mmap>,
    path: PathBuf,
    etag: String,
}

impl Region {
    /// Maps `path` read-only.
    pub fn map(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "not a regular file",
            ));
        }

        // Empty files cannot be mapped.
        let map = if meta.len() == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only. Content edited in place while
            // mapped is picked up by the watcher's rebuild, and
            // `FileContent::prepare` refuses regions whose file shrank.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            map,
            path: path.to_path_buf(),
            etag: fingerprint(meta.len(), meta.modified().ok()),
        })
    }

    /// File the region was mapped from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validator derived from the file's size and modification time at
    /// mapping time.
    pub fn etag(&self) -> &str {
        &self.etag
    }
}

impl Deref for Region {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

/// `<size>-<mtime nanos>` in hex. Stable across restarts and rebuilds for an
/// unchanged file.
pub fn fingerprint(size: u64, modified: Option<SystemTime>) -> String {
    let mtime = modified
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{:x}-{:x}", size, mtime)
}

pub struct FileCache {
    root: PathBuf,
    enabled: bool,
    entries: DashMap<String, Arc<Region>>,
    rebuilding: Mutex<()>,
}

impl FileCache {
    /// The root is made absolute and stripped of `.` components, so walked
    /// paths and the root share one prefix whatever form the root was given
    /// in.
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root)
            .unwrap_or(root)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        Self {
            root,
            enabled,
            entries: DashMap::new(),
            rebuilding: Mutex::new(()),
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self::new(cfg.root.clone(), cfg.enabled)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Returns the content of `path` (e.g. `/index.html`).
    ///
    /// Served from the map when caching is enabled and the path is cached;
    /// otherwise the file is mapped fresh and not remembered.
    pub fn get(&self, path: &str) -> Result<Arc<Region>, CacheError> {
        if self.enabled {
            if let Some(region) = self.entries.get(path) {
                return Ok(Arc::clone(region.value()));
            }
        }

        let file = self.resolve(path)?;
        let region = Region::map(&file).map_err(|source| CacheError::Open {
            path: path.to_string(),
            source,
        })?;
        Ok(Arc::new(region))
    }

    /// Walks the content root and maps every regular file, replacing stale
    /// entries and dropping entries whose file is gone. Returns the number
    /// of cached files.
    ///
    /// Rebuilds are serialized; readers keep working throughout.
    pub fn rebuild(&self) -> Result<usize, CacheError> {
        let _guard = self
            .rebuilding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let meta = std::fs::metadata(&self.root).map_err(|source| CacheError::Root {
            root: self.root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(CacheError::Root {
                root: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            });
        }

        let pattern = format!(
            "{}/**/*",
            glob::Pattern::escape(&self.root.to_string_lossy())
        );
        let paths = glob::glob(&pattern).map_err(|source| CacheError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        let mut seen = HashSet::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            let Some(key) = self.key_for(&path) else {
                continue;
            };

            match Region::map(&path) {
                Ok(region) => {
                    self.entries.insert(key.clone(), Arc::new(region));
                    seen.insert(key);
                }
                // Most likely removed mid-walk; its own event triggers another rebuild.
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot map file"),
            }
        }

        self.entries.retain(|key, _| seen.contains(key));

        let cached = self.entries.len();
        info!(files = cached, "Cache is up-to-date");
        Ok(cached)
    }

    /// Cache key for a file under the root: its relative path with `/`
    /// separators and a leading `/`.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut key = String::new();
        for component in relative.components() {
            let Component::Normal(part) = component else {
                return None;
            };
            key.push('/');
            key.push_str(part.to_str()?);
        }
        (!key.is_empty()).then_some(key)
    }

    /// Maps a request path onto the filesystem, refusing anything that
    /// could step outside the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, CacheError> {
        let mut file = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." || segment.contains('\\') {
                debug!(path, "Rejected path outside content root");
                return Err(CacheError::InvalidPath(path.to_string()));
            }
            file.push(segment);
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_uses_forward_slashes_and_leading_separator() {
        let cache = FileCache::new("/srv/www", true);

        assert_eq!(
            cache.key_for(Path::new("/srv/www/a/b.html")).as_deref(),
            Some("/a/b.html")
        );
        assert_eq!(cache.key_for(Path::new("/srv/www")), None);
        assert_eq!(cache.key_for(Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn root_is_normalized() {
        let cwd = std::env::current_dir().unwrap();

        assert_eq!(FileCache::new(".", true).root(), cwd.as_path());
        assert_eq!(FileCache::new("./", true).root(), cwd.as_path());
        assert_eq!(FileCache::new("./site/./www", true).root(), cwd.join("site/www"));
        assert_eq!(FileCache::new("/srv/www/", true).root(), Path::new("/srv/www"));
    }

    #[test]
    fn resolve_rejects_parent_segments() {
        let cache = FileCache::new("/srv/www", true);

        assert_eq!(
            cache.resolve("/a//b.txt").unwrap(),
            PathBuf::from("/srv/www/a/b.txt")
        );
        assert!(matches!(
            cache.resolve("/a/../../etc/passwd"),
            Err(CacheError::InvalidPath(_))
        ));
    }

    #[test]
    fn fingerprint_changes_with_size_and_mtime() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1);

        assert_eq!(fingerprint(16, Some(t)), "10-3b9aca00");
        assert_ne!(fingerprint(16, Some(t)), fingerprint(17, Some(t)));
        assert_eq!(fingerprint(0, None), "0-0");
    }
}
