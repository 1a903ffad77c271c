//! # 站点构建与索引
//!
//! `SiteBuilder` 遍历一次站点根目录，为每个动态 simplate 注册处理函数，
//! 并把所有 simplate 记录到 `SiteIndex` 中，写到内容旁边的 `.simplate-index.json`：
//!
//! ```json
//! {
//!   "root_dir": "/srv/www",
//!   "simplates": {
//!     "/index.html": { "type": "rendered", "content_type": "text/html" }
//!   }
//! }
//! ```

use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    exception::Exception,
    handler::{AssignmentLogic, LogicRunner, SimplateHandler},
    param::SITE_INDEX_FILENAME,
    simplate::{Simplate, SimplateType},
    walker::TreeWalker,
    website::Website,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "type")]
    pub simplate_type: SimplateType,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteIndex {
    pub root_dir: String,
    pub simplates: BTreeMap<String, IndexEntry>,
}

impl SiteIndex {
    pub fn new(root_dir: &Path) -> Self {
        Self {
            root_dir: root_dir.to_string_lossy().into_owned(),
            simplates: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, simplate: &Simplate) {
        self.simplates.insert(
            simplate.request_path(),
            IndexEntry {
                simplate_type: simplate.simplate_type(),
                content_type: simplate.content_type().to_string(),
            },
        );
    }

    pub fn path_in(root: &Path) -> PathBuf {
        root.join(SITE_INDEX_FILENAME)
    }

    /// Writes the index as pretty JSON into `root`.
    pub fn dump(&self, root: &Path) -> Result<PathBuf, Exception> {
        let path = Self::path_in(root);
        let encoded = serde_json::to_string_pretty(self)?;
        fs::write(&path, encoded)?;
        debug!("Wrote {} entries to {}", self.simplates.len(), path.display());
        Ok(path)
    }

    pub fn load(root: &Path) -> Result<Self, Exception> {
        let raw = fs::read_to_string(Self::path_in(root))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

pub struct SiteBuilder {
    package_name: String,
    root: PathBuf,
    runner: Arc<dyn LogicRunner>,
}

impl SiteBuilder {
    pub fn new(package_name: &str, root: impl AsRef<Path>) -> Self {
        Self {
            package_name: package_name.to_string(),
            root: root.as_ref().to_path_buf(),
            runner: Arc::new(AssignmentLogic),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn LogicRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Indexes the site without registering anything.
    pub fn build(&self) -> Result<SiteIndex, Exception> {
        self.walk(None)
    }

    /// Indexes the site and registers a handler for each dynamic simplate
    /// with `website`.
    pub fn build_into(&self, website: &Website) -> Result<SiteIndex, Exception> {
        self.walk(Some(website))
    }

    fn walk(&self, website: Option<&Website>) -> Result<SiteIndex, Exception> {
        let walker = TreeWalker::new(&self.package_name, &self.root)?;
        let mut index = SiteIndex::new(&self.root);
        for simplate in walker.simplates() {
            let simplate = simplate?;
            if let Some(website) = website {
                if simplate.simplate_type() != SimplateType::Static {
                    let handler = SimplateHandler::new(&simplate, Arc::clone(&self.runner))?;
                    website.register_simplate(&simplate, handler.into_handler_func())?;
                }
            }
            index.add(&simplate);
        }
        index.dump(&self.root)?;
        info!(
            "Built {} with {} simplates",
            self.package_name,
            index.simplates.len()
        );
        Ok(index)
    }
}
