// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 站点模块
//!
//! `Website` 是一个包对外提供的全部内容：配置、启动前收集的处理函数注册，
//! 以及这些注册最终绑定的分发管线。
//!
//! 注册分三步：
//! 1. `new_handler_func_registration` 记录路径（先注册者优先）；
//! 2. `expand_all_handler_func_registrations` 把每个模式路径交给所在目录的 `DirectoryHandler`；
//! 3. `register_all_handler_funcs` 把字面路径以及索引文件的 `/dir/`、`/dir` 别名绑定到字符串匹配阶段。

use log::{debug, info};
use serde_json::Value;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use crate::{
    config::Config,
    exception::Exception,
    handler::Context,
    param::*,
    pipeline::{parent_dir, HandlerFunc, HandlerFuncRegistration, Pipeline},
    request::Request,
    response::Response,
    server,
    simplate::{Simplate, SimplateType},
    util::{read_lock, write_lock},
};

/// The part of `Config` the pipeline reads while serving.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub www_root: PathBuf,
    pub charset_dynamic: String,
    pub charset_static: String,
    pub default_content_type: String,
    pub indices: Vec<String>,
    pub list_dirs: bool,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from(&Config::new())
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            www_root: PathBuf::from(config.www_root()),
            charset_dynamic: config.charset_dynamic().to_string(),
            charset_static: config.charset_static().to_string(),
            default_content_type: config.default_content_type().to_string(),
            indices: config.indices(),
            list_dirs: config.list_dirs(),
            debug: config.debug(),
        }
    }
}

pub struct Website {
    package_name: String,
    settings: Arc<RwLock<Settings>>,
    config: RwLock<Option<Config>>,
    registrations: RwLock<Vec<HandlerFuncRegistration>>,
    pipeline: Pipeline,
}

impl Website {
    pub fn new(package_name: &str) -> Self {
        let config = Config::new();
        let settings = Arc::new(RwLock::new(Settings::from(&config)));
        Self {
            package_name: package_name.to_string(),
            pipeline: Pipeline::new(package_name, Arc::clone(&settings), config.cache_size()),
            settings,
            config: RwLock::new(None),
            registrations: RwLock::new(vec![]),
        }
    }

    pub fn configure(&self, config: &Config) {
        info!(
            "Configuring {} with www root {:?}",
            self.package_name,
            config.www_root()
        );
        *write_lock(&self.settings) = Settings::from(config);
        self.pipeline.resize_cache(config.cache_size());
        *write_lock(&self.config) = Some(config.clone());
    }

    pub fn is_configured(&self) -> bool {
        read_lock(&self.config).is_some()
    }

    /// Registers `request_path`; an extension-less path that doesn't end in
    /// `/` also gets a `request_path.*` companion answering any extension.
    pub fn new_handler_func_registration(
        &self,
        request_path: &str,
        handler: HandlerFunc,
    ) -> Result<(), Exception> {
        if !request_path.starts_with('/') {
            return Err(Exception::InvalidPath(request_path.to_string()));
        }
        let mut pending = vec![HandlerFuncRegistration::new(request_path, Arc::clone(&handler))?];
        if !request_path.ends_with('/') && Path::new(request_path).extension().is_none() {
            pending.push(HandlerFuncRegistration::negotiated_glob(request_path, handler)?);
        }

        let mut registrations = write_lock(&self.registrations);
        for registration in pending {
            if registrations
                .iter()
                .any(|r| r.request_path == registration.request_path)
            {
                debug!("Ignoring repeated registration of {:?}", registration.request_path);
                continue;
            }
            debug!(
                "Registered {:?} (virtual: {}, negotiated: {})",
                registration.request_path, registration.is_virtual, registration.negotiated
            );
            registrations.push(registration);
        }
        Ok(())
    }

    pub fn register_simplate(&self, simplate: &Simplate, handler: HandlerFunc) -> Result<(), Exception> {
        self.register_simplate_type(simplate.simplate_type(), &simplate.request_path(), handler)
    }

    /// Static simplates are left to the static stage; the source file of
    /// any other simplate is hidden from it.
    pub fn register_simplate_type(
        &self,
        simplate_type: SimplateType,
        request_path: &str,
        handler: HandlerFunc,
    ) -> Result<(), Exception> {
        if simplate_type == SimplateType::Static {
            debug!("Not registering static simplate {:?}", request_path);
            return Ok(());
        }
        self.new_handler_func_registration(request_path, handler)?;
        self.pipeline.statics().hide(request_path);
        Ok(())
    }

    pub fn expand_all_handler_func_registrations(&self) -> Result<(), Exception> {
        let mut registrations = write_lock(&self.registrations);
        let owned_dirs: HashSet<String> = registrations
            .iter()
            .filter(|r| !r.is_pattern() && r.request_path.ends_with('/'))
            .map(|r| r.request_path.clone())
            .collect();

        for registration in registrations
            .iter_mut()
            .filter(|r| r.is_pattern() && r.receiver.is_none())
        {
            let mut dir = registration.directory();
            while owned_dirs.contains(&dir) {
                if dir == "/" {
                    return Err(Exception::DirectoryHandlerConflict(
                        registration.request_path.clone(),
                    ));
                }
                dir = parent_dir(dir.trim_end_matches('/'));
            }
            debug!("Expanding {:?} into {:?}", registration.request_path, dir);
            self.pipeline.patterns().add(&dir, registration);
            registration.receiver = Some(dir);
        }
        Ok(())
    }

    pub fn register_all_handler_funcs(&self) {
        let index_path = format!("/{}", SITE_INDEX_FILENAME);
        self.pipeline.string_match().insert(&index_path, Arc::new(serve_404));

        let indices = read_lock(&self.settings).indices.clone();
        let registrations = read_lock(&self.registrations);
        for registration in registrations.iter().filter(|r| !r.is_pattern()) {
            let path = registration.request_path.as_str();
            self.pipeline
                .string_match()
                .insert(path, Arc::clone(&registration.handler));

            let base = path.rsplit('/').next().unwrap_or("");
            if !indices.iter().any(|index| index == base) {
                continue;
            }
            let dir = parent_dir(path);
            debug!("Registering {:?} with the same handler as {:?}", dir, path);
            self.pipeline
                .string_match()
                .insert(&dir, Arc::clone(&registration.handler));
            if dir != "/" {
                let target = dir.clone();
                self.pipeline.string_match().insert(
                    dir.trim_end_matches('/'),
                    Arc::new(move |_: &Request| Response::redirect(&target, 301)),
                );
            }
        }
    }

    /// Fails with `NotConfigured` unless `configure` ran first. Blocks
    /// until the process exits.
    pub fn run_server(self: &Arc<Self>) -> Result<(), Exception> {
        let config = read_lock(&self.config)
            .clone()
            .ok_or(Exception::NotConfigured)?;
        self.expand_all_handler_func_registrations()?;
        self.register_all_handler_funcs();
        server::run(Arc::clone(self), &config)
    }

    pub fn serve(&self, request: &mut Request) -> Response {
        self.pipeline.serve(request)
    }

    /// Copies the path variables the pattern stage captured into `ctx`.
    pub fn update_context_from_virtual_paths(ctx: &mut Context, request: &Request) {
        for (name, value) in request.path_vars() {
            ctx.insert(name.clone(), Value::String(value.clone()));
        }
    }
}

impl Website {
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn settings(&self) -> Settings {
        read_lock(&self.settings).clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Registered request paths, in registration order.
    pub fn registrations(&self) -> Vec<String> {
        read_lock(&self.registrations)
            .iter()
            .map(|r| r.request_path.clone())
            .collect()
    }
}

fn serve_404(request: &Request) -> Response {
    let charset = request
        .header(CHARSET_DYNAMIC_HEADER)
        .unwrap_or(DEFAULT_CHARSET);
    Response::from_status_code(404, charset)
}
