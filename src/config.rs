use serde_derive::{Deserialize, Serialize};

use log::{debug, warn};
use std::{
    fs,
    io::{Read, Write},
    net::{Ipv4Addr, SocketAddrV4},
};

use crate::{exception::Exception, param::*};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_package_name")]
    package_name: String,
    www_root: String,
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_cache_size")]
    cache_size: usize,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default = "default_charset")]
    charset_dynamic: String,
    #[serde(default = "default_charset")]
    charset_static: String,
    #[serde(default = "default_content_type")]
    default_content_type: String,
    #[serde(default = "default_indices")]
    indices: Indices,
    #[serde(default)]
    list_dirs: bool,
    #[serde(default)]
    debug: bool,
}

fn default_package_name() -> String {
    "simplate_site".to_string()
}

fn default_cache_size() -> usize {
    5
}

fn default_local() -> bool {
    true
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_indices() -> Indices {
    Indices::Joined(DEFAULT_INDICES.to_string())
}

/// `indices = "index.html, index.txt"` or `indices = ["index.html", "index.txt"]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum Indices {
    Joined(String),
    List(Vec<String>),
}

/// A configuration step run in-process, in order, before the site starts.
pub trait Configurer {
    fn configure(&self, config: Config) -> Result<Config, Exception>;
}

impl<F> Configurer for F
where
    F: Fn(Config) -> Result<Config, Exception>,
{
    fn configure(&self, config: Config) -> Result<Config, Exception> {
        self(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            package_name: default_package_name(),
            www_root: ".".to_string(),
            port: 9182,
            worker_threads: 0,
            cache_size: default_cache_size(),
            local: true,
            charset_dynamic: default_charset(),
            charset_static: default_charset(),
            default_content_type: default_content_type(),
            indices: default_indices(),
            list_dirs: false,
            debug: false,
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let raw = fs::read_to_string(filename)?;
        let config: Config = toml::from_str(&raw)?;
        debug!("Loaded configuration from {}", filename);
        config.normalized()
    }

    /// Reads a JSON encoded configuration, as written by `dump`.
    pub fn load<R: Read>(mut reader: R) -> Result<Self, Exception> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.normalized()
    }

    pub fn dump<W: Write>(&self, mut writer: W) -> Result<(), Exception> {
        let encoded = serde_json::to_vec(self)?;
        writer.write_all(&encoded)?;
        Ok(())
    }

    pub fn apply_configurers(self, configurers: &[&dyn Configurer]) -> Result<Self, Exception> {
        let mut config = self;
        for configurer in configurers {
            config = configurer.configure(config)?;
        }
        config.normalized()
    }

    fn normalized(mut self) -> Result<Self, Exception> {
        if self.package_name.trim().is_empty() {
            return Err(Exception::InvalidConfig("package_name is empty".to_string()));
        }
        if self.www_root.is_empty() {
            return Err(Exception::InvalidConfig("www_root is empty".to_string()));
        }
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.cache_size == 0 {
            warn!("cache_size was 0; the static file cache can't be disabled, using 5");
            self.cache_size = 5;
        }
        Ok(self)
    }
}

impl Config {
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    // 0 表示使用 CPU 核心数
    pub fn worker_threads(&self) -> usize {
        match self.worker_threads {
            0 => num_cpus::get(),
            n => n,
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn charset_dynamic(&self) -> &str {
        &self.charset_dynamic
    }

    pub fn charset_static(&self) -> &str {
        &self.charset_static
    }

    pub fn default_content_type(&self) -> &str {
        &self.default_content_type
    }

    /// Index filenames in configured order, trimmed, empty and repeated
    /// names dropped.
    pub fn indices(&self) -> Vec<String> {
        let parts: Vec<&str> = match &self.indices {
            Indices::Joined(joined) => joined.split(',').collect(),
            Indices::List(list) => list.iter().map(String::as_str).collect(),
        };
        let mut out: Vec<String> = Vec::new();
        for part in parts {
            let trimmed = part.trim();
            if trimmed.is_empty() || out.iter().any(|i| i == trimmed) {
                continue;
            }
            out.push(trimmed.to_string());
        }
        out
    }

    pub fn list_dirs(&self) -> bool {
        self.list_dirs
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn bind_address(&self) -> SocketAddrV4 {
        let address = match self.local {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        SocketAddrV4::new(address, self.port)
    }

    pub fn set_www_root(&mut self, www_root: &str) -> &mut Self {
        self.www_root = www_root.to_string();
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_indices(&mut self, indices: &str) -> &mut Self {
        self.indices = Indices::Joined(indices.to_string());
        self
    }

    pub fn set_list_dirs(&mut self, list_dirs: bool) -> &mut Self {
        self.list_dirs = list_dirs;
        self
    }

    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    pub fn set_package_name(&mut self, package_name: &str) -> &mut Self {
        self.package_name = package_name.to_string();
        self
    }
}
