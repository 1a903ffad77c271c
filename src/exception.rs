// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 服务端可能遇到的所有错误，从解析 Socket 上的请求到分类 simplate、渲染模板，
//! 都是 `Exception` 的一个变体。上层按变体决定 HTTP 状态码：
//! - 分类、遍历、注册错误会中止启动；
//! - `NotAcceptable` 对应 406；
//! - 处理请求时产生的其他错误一律对应 500。

use std::{fmt, io};

#[derive(Debug)]
pub enum Exception {
    /// The request bytes are not valid UTF-8.
    RequestIsNotUtf8,
    /// The request line uses a method we do not serve.
    UnSupportedRequestMethod,
    /// The request line uses an HTTP version we do not speak.
    UnsupportedHttpVersion,
    /// The request line is missing parts.
    MalformedRequest(String),
    /// Request path is empty, relative, or escapes the www root.
    InvalidPath(String),
    /// A simplate with 1 or 2 page breaks has no file extension.
    RenderedWithoutExtension(String),
    /// A simplate with more than 2 page breaks has a file extension.
    NegotiatedWithExtension(String),
    /// A negotiated template page does not start with `[renderer] media/type`.
    MalformedSpecline(String),
    /// Two template pages of one negotiated simplate declare the same media type.
    DuplicateContentType(String),
    /// The tree walker root is missing or is not a directory.
    InvalidTreeWalkerRoot(String),
    /// The tree walker was given an empty package name.
    EmptyPackageName,
    /// A pattern registration cannot find a directory to live in.
    DirectoryHandlerConflict(String),
    /// `run_server` was called before `configure`.
    NotConfigured,
    /// The configuration is unusable.
    InvalidConfig(String),
    /// No registered content type satisfies the Accept header (406).
    NotAcceptable,
    /// `respond_json` was called without a body object.
    BodyNotSet,
    /// A template page could not be rendered.
    TemplateError(String),
    /// A logic or init page could not be evaluated.
    LogicError(String),
    /// A template page names a renderer we do not have.
    UnknownRenderer(String),
    Io(io::Error),
    Json(serde_json::Error),
    Toml(toml::de::Error),
    Regex(regex::Error),
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MalformedRequest(line) => write!(f, "Malformed request line {:?}", line),
            InvalidPath(p) => write!(f, "Invalid request path {:?}", p),
            RenderedWithoutExtension(name) => write!(
                f,
                "1 or 2 page breaks found in simplate {:?}: rendered simplates must have an extension",
                name
            ),
            NegotiatedWithExtension(name) => write!(
                f,
                "More than 2 page breaks found in simplate {:?}: negotiated simplates must not have an extension",
                name
            ),
            MalformedSpecline(line) => write!(
                f,
                "A negotiated resource specline must have one or two parts: [renderer] media/type. Yours is {:?}",
                line
            ),
            DuplicateContentType(t) => {
                write!(f, "Content type {:?} is declared by more than one page", t)
            }
            InvalidTreeWalkerRoot(root) => write!(f, "Invalid tree walker root given: {:?}", root),
            EmptyPackageName => write!(f, "Package name must be non-empty"),
            DirectoryHandlerConflict(dir) => {
                write!(f, "Cannot add pattern to directory handler for {:?}", dir)
            }
            NotConfigured => write!(f, "Can't run the server when we aren't configured"),
            InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            NotAcceptable => write!(f, "406: No acceptable media type available"),
            BodyNotSet => write!(f, "JSON response body not set"),
            TemplateError(msg) => write!(f, "Template error: {}", msg),
            LogicError(msg) => write!(f, "Logic error: {}", msg),
            UnknownRenderer(r) => write!(f, "Unknown renderer {:?}", r),
            Io(e) => write!(f, "I/O error: {}", e),
            Json(e) => write!(f, "JSON error: {}", e),
            Toml(e) => write!(f, "TOML error: {}", e),
            Regex(e) => write!(f, "Regex error: {}", e),
        }
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Io(e) => Some(e),
            Json(e) => Some(e),
            Toml(e) => Some(e),
            Regex(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Io(e)
    }
}

impl From<serde_json::Error> for Exception {
    fn from(e: serde_json::Error) -> Self {
        Json(e)
    }
}

impl From<toml::de::Error> for Exception {
    fn from(e: toml::de::Error) -> Self {
        Toml(e)
    }
}

impl From<regex::Error> for Exception {
    fn from(e: regex::Error) -> Self {
        Regex(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_rule() {
        let e = RenderedWithoutExtension("foo".to_string());
        assert!(e.to_string().contains("rendered simplates must have an extension"));
        let e = NegotiatedWithExtension("foo.txt".to_string());
        assert!(e
            .to_string()
            .contains("negotiated simplates must not have an extension"));
    }

    #[test]
    fn test_io_error_converts() {
        let e: Exception = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, Io(_)));
        assert!(std::error::Error::source(&e).is_some());
    }
}
