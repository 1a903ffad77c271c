//! Recursive traversal of a site root, yielding classified simplates.

use log::{debug, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::mpsc::{sync_channel, Receiver, SyncSender},
    thread,
};
use walkdir::WalkDir;

use crate::{exception::Exception, param::SITE_INDEX_FILENAME, simplate::Simplate};

/// Items in flight between the walking thread and the consumer.
const STREAM_BOUND: usize = 16;

pub struct TreeWalker {
    package_name: String,
    root: PathBuf,
}

impl TreeWalker {
    pub fn new(package_name: &str, root: impl AsRef<Path>) -> Result<Self, Exception> {
        let root = root.as_ref();
        if package_name.trim().is_empty() {
            return Err(Exception::EmptyPackageName);
        }
        if !root.is_dir() {
            return Err(Exception::InvalidTreeWalkerRoot(root.display().to_string()));
        }
        Ok(Self {
            package_name: package_name.to_string(),
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a walk on a background thread. The stream ends after the last
    /// file, or right after the first `Err` item if the walk had to abort.
    ///
    /// A file that can't be read is logged and skipped. A file that can't be
    /// classified, or a directory that can't be listed, aborts the walk.
    pub fn simplates(&self) -> Receiver<Result<Simplate, Exception>> {
        let (send, recv) = sync_channel(STREAM_BOUND);
        let package_name = self.package_name.clone();
        let root = self.root.clone();
        thread::spawn(move || walk(&package_name, &root, send));
        recv
    }
}

fn walk(package_name: &str, root: &Path, send: SyncSender<Result<Simplate, Exception>>) {
    let index_path = root.join(SITE_INDEX_FILENAME);
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_dangling_leaf(&e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
            Err(e) => {
                warn!("Aborting walk of {}: {}", root.display(), e);
                let _ = send.send(Err(Exception::Io(io::Error::from(e))));
                return;
            }
        };
        if !entry.file_type().is_file() || entry.path() == index_path {
            continue;
        }

        let content = match fs::read(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let item = Simplate::from_bytes(package_name, root, entry.path(), &content);
        let failed = item.is_err();
        if let Err(ref e) = item {
            warn!("Aborting walk of {}: {}", root.display(), e);
        }
        if send.send(item).is_err() {
            debug!("Walk of {} abandoned by its consumer", root.display());
            return;
        }
        if failed {
            return;
        }
    }
    debug!("Walk of {} finished", root.display());
}

/// A broken symlink below the root. Loops and unlistable directories are
/// not leaves.
fn is_dangling_leaf(e: &walkdir::Error) -> bool {
    e.depth() > 0
        && e.loop_ancestor().is_none()
        && e.io_error().map(|io| io.kind()) == Some(io::ErrorKind::NotFound)
}
