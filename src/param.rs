// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 请求解析、响应写出和分发管线共用的 HTTP 常量：
//! - 状态码及其原因短语；
//! - 扩展名到媒体类型的映射表；
//! - 管线入口注入到每个请求中的内部请求头。

use lazy_static::lazy_static;
use std::{collections::HashMap, fmt, path::Path};

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "simplate-server";

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// The single byte separating the pages of a simplate (ASCII form feed).
pub const PAGE_BREAK: char = '\x0C';

/// Written at the site root after a build pass; never served.
pub const SITE_INDEX_FILENAME: &str = ".simplate-index.json";

pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const DEFAULT_INDICES: &str = "index.html, index.json, index.txt";
pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const DEFAULT_RENDERER: &str = "#!text/template";

// Headers set by the pipeline entry. Whatever the client sent under these
// names is overwritten.
pub const INTERNAL_ACCEPT_HEADER: &str = "X-Simplate-Accept";
pub const PATH_TRANSLATED_HEADER: &str = "X-HTTP-Path-Translated";
pub const PACKAGE_NAME_HEADER: &str = "X-Simplate-PackageName";
pub const WWW_ROOT_HEADER: &str = "X-Simplate-WwwRoot";
pub const CHARSET_STATIC_HEADER: &str = "X-Simplate-CharsetStatic";
pub const CHARSET_DYNAMIC_HEADER: &str = "X-Simplate-CharsetDynamic";
pub const DEBUG_HEADER: &str = "X-Simplate-Debug";
pub const ERROR_HEADER: &str = "X-Simplate-Error";

lazy_static! {
    /// 服务器当前允许处理的 HTTP 方法列表。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = {
        vec![
            HttpRequestMethod::Get,
            HttpRequestMethod::Head,
            HttpRequestMethod::Options,
            HttpRequestMethod::Post,
        ]
    };
}

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(100, "Continue");
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(204, "No Content");
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(408, "Request Timeout");
        map.insert(410, "Gone");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(418, "I'm a teapot");
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表。
    ///
    /// Values carry no charset; `with_charset` appends one for `text/*`.
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("atom", "application/atom+xml");
        map.insert("avif", "image/avif");
        map.insert("bmp", "image/bmp");
        map.insert("css", "text/css");
        map.insert("csv", "text/csv");
        map.insert("gif", "image/gif");
        map.insert("gz", "application/gzip");
        map.insert("htm", "text/html");
        map.insert("html", "text/html");
        map.insert("ico", "image/x-icon");
        map.insert("ics", "text/calendar");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("js", "text/javascript");
        map.insert("json", "application/json");
        map.insert("jsonld", "application/ld+json");
        map.insert("md", "text/markdown");
        map.insert("mjs", "text/javascript");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("otf", "font/otf");
        map.insert("pdf", "application/pdf");
        map.insert("png", "image/png");
        map.insert("rss", "application/rss+xml");
        map.insert("svg", "image/svg+xml");
        map.insert("tar", "application/x-tar");
        map.insert("ttf", "font/ttf");
        map.insert("txt", "text/plain");
        map.insert("wasm", "application/wasm");
        map.insert("webm", "video/webm");
        map.insert("webp", "image/webp");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("xhtml", "application/xhtml+xml");
        map.insert("xml", "application/xml");
        map.insert("zip", "application/zip");
        map
    };
}

/// Media type registered for the extension of `path`, if any.
pub fn mime_for_extension(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    MIME_TYPES.get(ext.to_ascii_lowercase().as_str()).copied()
}

/// Like `mime_for_extension`, falling back to `application/octet-stream`.
pub fn mime_for_path(path: &str) -> &'static str {
    mime_for_extension(path).unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Appends `; charset=<charset>` to `text/*` types that carry none.
pub fn with_charset(content_type: &str, charset: &str) -> String {
    if content_type.starts_with("text/") && !content_type.contains("charset=") {
        format!("{}; charset={}", content_type, charset)
    } else {
        content_type.to_string()
    }
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
}

/// 支持的内容编码（压缩）格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    Gzip,
    Deflate,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "1.0"),
            HttpVersion::V1_1 => write!(f, "1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}

impl fmt::Display for HttpEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_lookup() {
        assert_eq!(mime_for_extension("/a/b.html"), Some("text/html"));
        assert_eq!(mime_for_extension("page.JSON"), Some("application/json"));
        assert_eq!(mime_for_extension("README"), None);
        assert_eq!(mime_for_path("blob.unknown"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_with_charset() {
        assert_eq!(with_charset("text/plain", "utf-8"), "text/plain; charset=utf-8");
        assert_eq!(
            with_charset("text/plain; charset=latin1", "utf-8"),
            "text/plain; charset=latin1"
        );
        assert_eq!(with_charset("image/png", "utf-8"), "image/png");
    }
}
