//! # 请求分发管线
//!
//! 固定顺序的阶段链，每个阶段要么应答请求，要么交给下一个阶段：
//!
//! 1. 管线入口注入内部请求头；
//! 2. `StringMatchStage` 应答字面路径；
//! 3. `PatternStage` 通过注册展开时创建的 `DirectoryHandler` 应答虚拟路径和扩展名通配路径；
//! 4. `StaticStage` 提供 www 根目录下的文件和目录。
//!
//! 没有任何阶段应答的请求得到固定的 404 页面。

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    exception::Exception,
    param::*,
    request::Request,
    response::Response,
    static_handler::StaticStage,
    util::{read_lock, write_lock},
    website::Settings,
};

/// A request handler bound to one registered path.
pub type HandlerFunc = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

lazy_static! {
    static ref VIRTUAL_PART: Regex = Regex::new("%([a-zA-Z_][-a-zA-Z0-9_]*)").unwrap();
}

/// What a `%name` segment captures.
const VIRTUAL_CAPTURE: &str = "[-a-zA-Z0-9_]+";

/// One stage of the chain. `None` hands the request to the next stage.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_serve(&self, request: &mut Request) -> Option<Response>;
}

#[derive(Clone)]
pub struct HandlerFuncRegistration {
    pub request_path: String,
    pub handler: HandlerFunc,
    /// Registered as the `path.*` companion of an extension-less path.
    pub negotiated: bool,
    /// The path contains `%name` segments.
    pub is_virtual: bool,
    /// Set for every path matched by regex instead of string comparison.
    pub regexp: Option<Regex>,
    /// `(group, name)` for each `%name`; group names can't hold `-`.
    pub variables: Vec<(String, String)>,
    /// Directory of the `DirectoryHandler` that took this registration.
    pub receiver: Option<String>,
}

impl HandlerFuncRegistration {
    pub fn new(request_path: &str, handler: HandlerFunc) -> Result<Self, Exception> {
        let is_virtual = is_virtual_path(request_path);
        let regexp = match is_virtual {
            true => Some(virtual_to_regexp(request_path, "")?),
            false => None,
        };
        Ok(Self {
            request_path: request_path.to_string(),
            handler,
            negotiated: false,
            is_virtual,
            regexp,
            variables: virtual_variables(request_path),
            receiver: None,
        })
    }

    /// The `request_path + ".*"` registration for an extension-less path.
    pub fn negotiated_glob(request_path: &str, handler: HandlerFunc) -> Result<Self, Exception> {
        Ok(Self {
            request_path: format!("{}.*", request_path),
            handler,
            negotiated: true,
            is_virtual: is_virtual_path(request_path),
            regexp: Some(virtual_to_regexp(request_path, r"\.[^./]+")?),
            variables: virtual_variables(request_path),
            receiver: None,
        })
    }

    pub fn is_pattern(&self) -> bool {
        self.regexp.is_some()
    }

    /// The closest directory that holds no `%name` segment, e.g.
    /// `/users/%id/posts` -> `/users/`.
    pub fn directory(&self) -> String {
        let path = self.request_path.trim_end_matches(".*");
        let mut dir = parent_dir(path);
        while is_virtual_path(&dir) {
            dir = parent_dir(dir.trim_end_matches('/'));
        }
        dir
    }
}

pub fn is_virtual_path(request_path: &str) -> bool {
    VIRTUAL_PART.is_match(request_path)
}

/// Regex group name and variable name of every `%name` in `request_path`.
pub fn virtual_variables(request_path: &str) -> Vec<(String, String)> {
    VIRTUAL_PART
        .captures_iter(request_path)
        .filter_map(|caps| caps.get(1))
        .map(|name| (group_name(name.as_str()), name.as_str().to_string()))
        .collect()
}

fn group_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Compiles `request_path` into an anchored regex, each `%name` becoming a
/// named capture group and `suffix` appended verbatim.
pub fn virtual_to_regexp(request_path: &str, suffix: &str) -> Result<Regex, Exception> {
    let mut pattern = String::from("^");
    let mut last = 0;
    for caps in VIRTUAL_PART.captures_iter(request_path) {
        let (whole, name) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(name)) => (whole, name),
            _ => continue,
        };
        pattern.push_str(&regex::escape(&request_path[last..whole.start()]));
        pattern.push_str(&format!("(?P<{}>{})", group_name(name.as_str()), VIRTUAL_CAPTURE));
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&request_path[last..]));
    pattern.push_str(suffix);
    pattern.push('$');
    Ok(Regex::new(&pattern)?)
}

/// `/a/b` -> `/a/`, `/a` -> `/`.
pub fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(pos) => path[..=pos].to_string(),
        None => "/".to_string(),
    }
}

/// Literal paths. An exact match wins; otherwise a registered key equal to
/// the request path up to a trailing slash, the longest such key first.
#[derive(Default)]
pub struct StringMatchStage {
    routes: RwLock<HashMap<String, HandlerFunc>>,
}

impl StringMatchStage {
    /// Keeps the first handler registered for `request_path`.
    pub fn insert(&self, request_path: &str, handler: HandlerFunc) -> bool {
        let mut routes = write_lock(&self.routes);
        if routes.contains_key(request_path) {
            debug!("Keeping first registration for {:?}", request_path);
            return false;
        }
        routes.insert(request_path.to_string(), handler);
        true
    }

    pub fn contains(&self, request_path: &str) -> bool {
        read_lock(&self.routes).contains_key(request_path)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.routes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, path: &str) -> Option<HandlerFunc> {
        let routes = read_lock(&self.routes);
        if let Some(handler) = routes.get(path) {
            return Some(Arc::clone(handler));
        }
        let wanted = path.trim_end_matches('/');
        if wanted.is_empty() {
            return None;
        }
        routes
            .iter()
            .filter(|(key, _)| key.trim_end_matches('/') == wanted)
            .max_by_key(|(key, _)| key.len())
            .map(|(_, handler)| Arc::clone(handler))
    }
}

impl Stage for StringMatchStage {
    fn name(&self) -> &'static str {
        "string-match"
    }

    fn try_serve(&self, request: &mut Request) -> Option<Response> {
        let handler = self.lookup(request.path())?;
        debug!("{} stage matched {:?}", self.name(), request.path());
        Some(handler(&*request))
    }
}

struct PatternEntry {
    request_path: String,
    regexp: Regex,
    variables: Vec<(String, String)>,
    handler: HandlerFunc,
}

/// The patterns registered below one directory, in registration order.
pub struct DirectoryHandler {
    dir: String,
    patterns: Vec<PatternEntry>,
}

impl DirectoryHandler {
    fn new(dir: &str) -> Self {
        debug!("Creating directory handler for {:?}", dir);
        Self {
            dir: dir.to_string(),
            patterns: vec![],
        }
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn request_paths(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.request_path.as_str()).collect()
    }

    /// The first pattern matching `path` and its variables, keyed by the
    /// names written in the registered path.
    fn find(&self, path: &str) -> Option<(&PatternEntry, HashMap<String, String>)> {
        if !path.starts_with(&self.dir) {
            return None;
        }
        for entry in &self.patterns {
            if let Some(caps) = entry.regexp.captures(path) {
                let vars = entry
                    .variables
                    .iter()
                    .filter_map(|(group, name)| {
                        caps.name(group).map(|m| (name.clone(), m.as_str().to_string()))
                    })
                    .collect();
                return Some((entry, vars));
            }
        }
        None
    }
}

/// Directory handlers, the longest directory first.
#[derive(Default)]
pub struct PatternStage {
    dirs: RwLock<Vec<DirectoryHandler>>,
}

impl PatternStage {
    /// Adds `registration` to the handler for `dir`, creating it on first
    /// use. A request path already present under `dir` is left alone.
    pub fn add(&self, dir: &str, registration: &HandlerFuncRegistration) {
        let regexp = match &registration.regexp {
            Some(regexp) => regexp.clone(),
            None => return,
        };
        let mut dirs = write_lock(&self.dirs);
        let index = match dirs.iter().position(|d| d.dir == dir) {
            Some(index) => index,
            None => {
                let at = dirs
                    .iter()
                    .position(|d| d.dir.len() < dir.len())
                    .unwrap_or(dirs.len());
                dirs.insert(at, DirectoryHandler::new(dir));
                at
            }
        };
        let handler = &mut dirs[index];
        if handler
            .patterns
            .iter()
            .any(|p| p.request_path == registration.request_path)
        {
            return;
        }
        handler.patterns.push(PatternEntry {
            request_path: registration.request_path.clone(),
            regexp,
            variables: registration.variables.clone(),
            handler: Arc::clone(&registration.handler),
        });
    }

    pub fn dirs(&self) -> Vec<String> {
        read_lock(&self.dirs).iter().map(|d| d.dir.clone()).collect()
    }

    pub fn request_paths(&self, dir: &str) -> Vec<String> {
        read_lock(&self.dirs)
            .iter()
            .find(|d| d.dir == dir)
            .map(|d| d.request_paths().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }
}

impl Stage for PatternStage {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn try_serve(&self, request: &mut Request) -> Option<Response> {
        let (handler, vars) = {
            let dirs = read_lock(&self.dirs);
            let (entry, vars) = dirs.iter().find_map(|d| d.find(request.path()))?;
            debug!(
                "{} stage matched {:?} with {:?}",
                self.name(),
                request.path(),
                entry.request_path
            );
            (Arc::clone(&entry.handler), vars)
        };
        request.set_path_vars(vars);
        Some(handler(&*request))
    }
}

pub struct Pipeline {
    package_name: String,
    settings: Arc<RwLock<Settings>>,
    string_match: StringMatchStage,
    patterns: PatternStage,
    statics: StaticStage,
}

impl Pipeline {
    pub fn new(package_name: &str, settings: Arc<RwLock<Settings>>, cache_size: usize) -> Self {
        Self {
            package_name: package_name.to_string(),
            statics: StaticStage::new(Arc::clone(&settings), cache_size),
            settings,
            string_match: StringMatchStage::default(),
            patterns: PatternStage::default(),
        }
    }

    pub fn string_match(&self) -> &StringMatchStage {
        &self.string_match
    }

    pub fn patterns(&self) -> &PatternStage {
        &self.patterns
    }

    pub fn statics(&self) -> &StaticStage {
        &self.statics
    }

    pub fn resize_cache(&self, cache_size: usize) {
        self.statics.resize_cache(cache_size);
    }

    fn stages(&self) -> [&dyn Stage; 3] {
        [&self.string_match, &self.patterns, &self.statics]
    }

    pub fn serve(&self, request: &mut Request) -> Response {
        self.inject_headers(request);
        for stage in self.stages() {
            if let Some(response) = stage.try_serve(request) {
                return response;
            }
        }
        debug!("No stage answered {:?}", request.path());
        let charset = request
            .header(CHARSET_DYNAMIC_HEADER)
            .unwrap_or(DEFAULT_CHARSET)
            .to_string();
        Response::from_status_code(404, &charset)
    }

    fn inject_headers(&self, request: &mut Request) {
        let settings = read_lock(&self.settings).clone();
        let translated = settings
            .www_root
            .join(request.path().trim_start_matches('/'));

        request.set_header(PACKAGE_NAME_HEADER, &self.package_name);
        request.set_header(WWW_ROOT_HEADER, &settings.www_root.to_string_lossy());
        request.set_header(PATH_TRANSLATED_HEADER, &translated.to_string_lossy());
        request.set_header(CHARSET_DYNAMIC_HEADER, &settings.charset_dynamic);
        request.set_header(CHARSET_STATIC_HEADER, &settings.charset_static);
        request.set_header(DEBUG_HEADER, if settings.debug { "true" } else { "false" });

        let last_segment = request.path().rsplit('/').next().unwrap_or("");
        match mime_for_extension(last_segment) {
            Some(media_type) => request.set_header(INTERNAL_ACCEPT_HEADER, media_type),
            None => request.remove_header(INTERNAL_ACCEPT_HEADER),
        }
    }
}
