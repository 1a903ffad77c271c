// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # simplate-server
//!
//! 启动流程：
//! 1. 从 `config/log4rs.yaml` 初始化日志；
//! 2. 读取 `config/development.toml`（或第一个命令行参数指定的文件）；
//! 3. 遍历 www root，为每个动态 simplate 注册处理函数并写出站点索引；
//! 4. 启动监听循环，直到收到 SIGQUIT 或 Ctrl-C。

use log::{error, info};
use simplate_server::{Config, Exception, Registry, SiteBuilder};
use std::{env, process};

const LOG_CONFIG: &str = "config/log4rs.yaml";
const DEFAULT_CONFIG: &str = "config/development.toml";

fn main() {
    if let Err(e) = log4rs::init_file(LOG_CONFIG, Default::default()) {
        eprintln!("无法从{}初始化日志: {}", LOG_CONFIG, e);
        process::exit(1);
    }

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = match Config::from_toml(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("无法载入配置文件{}: {}", config_path, e);
            process::exit(1);
        }
    };
    info!("配置文件已载入");

    if let Err(e) = start(config) {
        error!("服务器启动失败: {}", e);
        process::exit(1);
    }
}

fn start(config: Config) -> Result<(), Exception> {
    let registry = Registry::new();
    let website = registry.declare_website(config.package_name())?;
    website.configure(&config);
    info!("www root: {}", config.www_root());

    let index = SiteBuilder::new(config.package_name(), config.www_root()).build_into(&website)?;
    info!(
        "{}个simplate已注册，站点索引已写入",
        index.simplates.len()
    );
    website.run_server()
}
