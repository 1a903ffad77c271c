//! Wire-level HTTP response: status line, headers and a buffered body.
//!
//! Handlers build a `Response` (usually through `HttpResponseWrapper`); the
//! server loop calls `finalize` for the request it answers and writes
//! `as_bytes` to the socket.

use crate::{
    param::*,
    request::Request,
    util::{canned_page, HtmlBuilder},
};

use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};

use std::io::{self, Write};

#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    content: Bytes,
    content_encoding: Option<HttpEncoding>,
    date: DateTime<Utc>,
    head_only: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            information: "OK".to_string(),
            headers: vec![],
            content: Bytes::new(),
            content_encoding: None,
            date: Utc::now(),
            head_only: false,
        }
    }

    pub fn with_body(code: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        response.set_header("Content-Type", content_type);
        response.content = body.into();
        response
    }

    /// One of the themed pages for 404, 406 or 500; any other code gets a
    /// generic page naming the status.
    pub fn from_status_code(code: u16, charset: &str) -> Self {
        let body = match canned_page(code) {
            Some(page) => page.to_string(),
            None => HtmlBuilder::from_status_code(code, None).build(),
        };
        Self::with_body(code, &format!("text/html; charset={}", charset), body)
    }

    pub fn redirect(location: &str, code: u16) -> Self {
        let mut response = Self::from_status_code(code, DEFAULT_CHARSET);
        response.set_header("Location", location);
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&reason) => reason.to_string(),
            None => {
                error!("非法的状态码：{}，使用空的原因短语", code);
                String::new()
            }
        };
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.content = body.into();
        self
    }

    /// Adapts the response to the request it answers: picks a content
    /// encoding the client accepts and drops the body for HEAD.
    pub fn finalize(mut self, request: &Request) -> Self {
        self.date = Utc::now();
        self.head_only = request.method() == HttpRequestMethod::Head;
        let compressible = self
            .header("Content-Type")
            .map_or(false, |t| !should_skip_compression(t));
        if compressible && !self.content.is_empty() && self.content_encoding.is_none() {
            if let Some(encoding) = decide_encoding(request.accept_encoding()) {
                match compress(self.content.to_vec(), Some(encoding)) {
                    Ok(compressed) => {
                        self.content = Bytes::from(compressed);
                        self.content_encoding = Some(encoding);
                    }
                    Err(e) => error!("压缩失败: {}，返回未压缩内容", e),
                }
            }
        }
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "HTTP/1.1 {} {}{}",
            self.status_code, self.information, CRLF
        );
        for (name, value) in &self.headers {
            header.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        if let Some(encoding) = self.content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", encoding, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", self.content.len(), CRLF));
        header.push_str(&format!("Date: {}{}", format_date(&self.date), CRLF));
        header.push_str(&format!("Server: {}{}", SERVER_NAME, CRLF));
        header.push_str(CRLF);

        let mut out = header.into_bytes();
        if !self.head_only {
            out.extend_from_slice(&self.content);
        }
        out
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn body(&self) -> &Bytes {
        &self.content
    }

    pub fn content_encoding(&self) -> Option<HttpEncoding> {
        self.content_encoding
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        None => Ok(data),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }
    result
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/",
        "video/",
        "audio/",
        "font/woff",
        "application/zip",
        "application/gzip",
        "application/x-tar",
        "application/wasm",
    ];
    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else {
        None
    }
}
