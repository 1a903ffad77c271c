use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    content: Bytes,
    modified_time: SystemTime,
}

/// Bytes of recently served static files, keyed by filesystem path. An
/// entry is only valid while the file's mtime is unchanged.
pub struct FileCache {
    cache: LruCache<PathBuf, CacheEntry>,
    max_file_size: u64,
}

impl FileCache {
    // 容量为0时按1处理
    pub fn from_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            max_file_size: 1 << 20,
        }
    }

    pub fn resize(&mut self, capacity: usize) {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self.cache.resize(capacity);
    }

    pub fn push(&mut self, path: &Path, bytes: Bytes, modified_time: SystemTime) {
        if bytes.len() as u64 > self.max_file_size {
            return;
        }
        let entry = CacheEntry {
            content: bytes,
            modified_time,
        };
        self.cache.put(path.to_path_buf(), entry);
    }

    pub fn find(&mut self, path: &Path, current_modified_time: SystemTime) -> Option<Bytes> {
        match self.cache.get(path) {
            Some(entry) if entry.modified_time == current_modified_time => {
                Some(entry.content.clone())
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
