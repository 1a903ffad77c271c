// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态文件处理模块
//!
//! 管线的最后一个阶段。把请求路径映射到 www 根目录下并提供找到的内容：
//! - 文件，媒体类型由扩展名推出；
//! - 目录，返回其中第一个配置的索引文件，启用列目录时生成目录列表；
//! - `/favicon.ico`，站点没有自己的图标时返回内嵌图标。
//!
//! 动态 simplate 的源文件既不返回也不列出。

use bytes::Bytes;
use log::{debug, error, warn};
use std::{
    collections::HashSet,
    fs,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use crate::{
    cache::FileCache,
    param::*,
    pipeline::Stage,
    request::Request,
    response::Response,
    util::{lock_mutex, read_lock, write_lock, HtmlBuilder, FAVICON_ICO},
    website::Settings,
};

pub struct StaticStage {
    settings: Arc<RwLock<Settings>>,
    cache: Mutex<FileCache>,
    /// 动态 simplate 的请求路径，其源文件不得直接返回
    hidden: RwLock<HashSet<String>>,
}

impl StaticStage {
    pub fn new(settings: Arc<RwLock<Settings>>, cache_size: usize) -> Self {
        Self {
            settings,
            cache: Mutex::new(FileCache::from_capacity(cache_size)),
            hidden: RwLock::new(HashSet::new()),
        }
    }

    /// Never serve or list the file behind `request_path`.
    pub fn hide(&self, request_path: &str) {
        debug!("Hiding source of {:?} from the static stage", request_path);
        write_lock(&self.hidden).insert(request_path.to_string());
    }

    pub fn is_hidden(&self, request_path: &str) -> bool {
        read_lock(&self.hidden).contains(request_path)
    }

    pub fn resize_cache(&self, cache_size: usize) {
        lock_mutex(&self.cache).resize(cache_size);
    }

    fn serve_file(&self, path: &Path, settings: &Settings) -> Option<Response> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Can't stat {}: {}", path.display(), e);
                return None;
            }
        };
        let modified = metadata.modified().ok();

        let cached = modified.and_then(|m| lock_mutex(&self.cache).find(path, m));
        let content = match cached {
            Some(bytes) => {
                debug!("Cache hit for {}", path.display());
                bytes
            }
            None => {
                let bytes = match fs::read(path) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(e) => {
                        error!("Can't read {}: {}", path.display(), e);
                        return Some(Response::from_status_code(500, &settings.charset_static));
                    }
                };
                if let Some(m) = modified {
                    lock_mutex(&self.cache).push(path, bytes.clone(), m);
                }
                bytes
            }
        };

        let media_type: &str = match path.to_str().and_then(mime_for_extension) {
            Some(media_type) => media_type,
            None => &settings.default_content_type,
        };
        let content_type = with_charset(media_type, &settings.charset_static);
        Some(Response::with_body(200, &content_type, content))
    }

    fn serve_dir(
        &self,
        request_path: &str,
        web_path: &str,
        dir: &Path,
        settings: &Settings,
    ) -> Option<Response> {
        if !request_path.ends_with('/') {
            return Some(Response::redirect(&format!("{}/", request_path), 301));
        }
        let web_dir = match web_path {
            "/" => "/".to_string(),
            _ => format!("{}/", web_path),
        };
        for index in &settings.indices {
            let candidate = dir.join(index);
            if candidate.is_file() && !self.is_hidden(&format!("{}{}", web_dir, index)) {
                debug!("Serving index {} for {}", candidate.display(), request_path);
                return self.serve_file(&candidate, settings);
            }
        }
        if !settings.list_dirs {
            return None;
        }
        let hidden = read_lock(&self.hidden).clone();
        match HtmlBuilder::from_dir(&web_dir, dir, &hidden) {
            Ok(listing) => Some(Response::with_body(
                200,
                &format!("text/html; charset={}", settings.charset_static),
                listing.build(),
            )),
            Err(e) => {
                error!("Can't list {}: {}", dir.display(), e);
                Some(Response::from_status_code(500, &settings.charset_static))
            }
        }
    }
}

impl Stage for StaticStage {
    fn name(&self) -> &'static str {
        "static"
    }

    fn try_serve(&self, request: &mut Request) -> Option<Response> {
        let settings = read_lock(&self.settings).clone();
        let request_path = request.path();
        let (fs_path, web_path) = match resolve(&settings.www_root, request_path) {
            Some(resolved) => resolved,
            None => {
                warn!("Refusing path {:?}", request_path);
                return None;
            }
        };

        if fs_path.is_dir() {
            return self.serve_dir(request_path, &web_path, &fs_path, &settings);
        }
        if fs_path.is_file() {
            if self.is_hidden(&web_path) {
                warn!("Refusing to serve the source of {:?}", web_path);
                return None;
            }
            return self.serve_file(&fs_path, &settings);
        }
        if request_path == "/favicon.ico" {
            debug!("Serving embedded favicon");
            return Some(Response::with_body(200, "image/x-icon", Bytes::from_static(FAVICON_ICO)));
        }
        None
    }
}

/// Joins `request_path` onto `root`, returning the filesystem path and the
/// normalised request path (`/a/./b/` -> `/a/b`). Paths leaving the root and
/// the site index are refused.
fn resolve(root: &Path, request_path: &str) -> Option<(PathBuf, String)> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                parts.push(part.to_string_lossy().into_owned());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if relative == Path::new(SITE_INDEX_FILENAME) || request_path.contains('\0') {
        return None;
    }
    Some((resolved, format!("/{}", parts.join("/"))))
}
