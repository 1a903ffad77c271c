// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 把从 Socket 读到的原始字节解析为 `Request`：
//! 1. 请求行（方法、目标、版本）；
//! 2. 请求头，保持到达顺序，按名称大小写不敏感匹配；
//! 3. `Accept-Encoding`，只保留我们能产生的编码。
//!
//! 分发过程中管线附加的状态也保存在 `Request` 上：管线入口写入的内部请求头，
//! 以及模式阶段捕获的路径变量。

use crate::{exception::Exception, param::*};
use log::error;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Request {
    method: HttpRequestMethod,
    /// Percent-decoded path, without the query string.
    path: String,
    query: Option<String>,
    version: HttpVersion,
    headers: Vec<(String, String)>,
    accept_encoding: Vec<HttpEncoding>,
    body: Vec<u8>,
    path_vars: HashMap<String, String>,
}

impl Request {
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head, body) = match find_subsequence(buffer, b"\r\n\r\n") {
            Some(pos) => (&buffer[..pos], &buffer[pos + 4..]),
            None => (buffer, &buffer[buffer.len()..]),
        };
        let request_string = match std::str::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut request_lines = request_string.split(CRLF);
        let first_line = request_lines.next().unwrap_or("");
        let first_line_parts: Vec<&str> = first_line.split_whitespace().collect();
        if first_line_parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, first_line);
            return Err(Exception::MalformedRequest(first_line.to_string()));
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[2].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let target = first_line_parts[1];
        let (raw_path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (target, None),
        };
        let path = percent_decode(raw_path);

        let mut headers = Vec::new();
        for line in request_lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let mut request = Self {
            method,
            path,
            query,
            version,
            headers,
            accept_encoding: vec![],
            body: body.to_vec(),
            path_vars: HashMap::new(),
        };
        request.accept_encoding = parse_accept_encoding(request.header("Accept-Encoding"));
        Ok(request)
    }

    /// Builds a GET request for in-process dispatch.
    pub fn get(path: &str) -> Self {
        Self {
            method: HttpRequestMethod::Get,
            path: path.to_string(),
            query: None,
            version: HttpVersion::V1_1,
            headers: vec![],
            accept_encoding: vec![],
            body: vec![],
            path_vars: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replaces every header called `name` with a single value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        if name.eq_ignore_ascii_case("Accept-Encoding") {
            self.accept_encoding = parse_accept_encoding(Some(value));
        }
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn set_path_vars(&mut self, vars: HashMap<String, String>) {
        self.path_vars = vars;
    }
}

impl Request {
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn user_agent(&self) -> &str {
        self.header("User-Agent").unwrap_or("")
    }

    pub fn accept(&self) -> Option<&str> {
        self.header("Accept")
    }

    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn path_vars(&self) -> &HashMap<String, String> {
        &self.path_vars
    }
}

fn parse_accept_encoding(value: Option<&str>) -> Vec<HttpEncoding> {
    let mut out = vec![];
    if let Some(encoding) = value {
        for token in encoding.split(',') {
            let name = token.split(';').next().unwrap_or("").trim();
            match name {
                "gzip" => out.push(HttpEncoding::Gzip),
                "deflate" => out.push(HttpEncoding::Deflate),
                _ => {}
            }
        }
    }
    out
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &raw[i + 1..i + 3];
            if let Ok(b) = u8::from_str_radix(hex, 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
