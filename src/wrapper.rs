//! # 响应包装器
//!
//! `HttpResponseWrapper` 缓存处理函数决定发送的内容（状态码、媒体类型、响应体或错误），
//! 直到 `respond` / `respond_json` 把它转换为 `Response`。内容协商在同一步中
//! 从按媒体类型注册的渲染函数里选出一个并调用。

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    exception::Exception,
    negotiate::negotiate,
    param::*,
    request::Request,
    response::Response,
};

/// Renders the body for one media type.
pub type RenderFn<'a> = Box<dyn Fn() -> Result<Vec<u8>, Exception> + 'a>;

pub struct HttpResponseWrapper<'a> {
    accept: String,
    charset: String,
    debug: bool,

    status_code: u16,
    content_type: String,
    body_bytes: Vec<u8>,
    body_obj: Option<Value>,
    content_type_handlers: Vec<(String, RenderFn<'a>)>,
    error: Option<Exception>,
}

impl<'a> HttpResponseWrapper<'a> {
    /// The effective Accept value is the internal override when the
    /// pipeline set one, then the client's header, then the default.
    pub fn new(request: &Request) -> Self {
        let accept = request
            .header(INTERNAL_ACCEPT_HEADER)
            .or_else(|| request.accept())
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(DEFAULT_ACCEPT)
            .to_string();
        Self {
            accept,
            charset: request
                .header(CHARSET_DYNAMIC_HEADER)
                .unwrap_or(DEFAULT_CHARSET)
                .to_string(),
            debug: request.header(DEBUG_HEADER) == Some("true"),
            status_code: 200,
            content_type: "text/html".to_string(),
            body_bytes: vec![],
            body_obj: None,
            content_type_handlers: vec![],
            error: None,
        }
    }

    /// `text/*` types get the dynamic charset appended. Empty values are
    /// ignored.
    pub fn set_content_type(&mut self, content_type: &str) {
        if content_type.is_empty() {
            debug!("Ignoring empty content type");
            return;
        }
        self.content_type = with_charset(content_type, &self.charset);
    }

    pub fn set_body_bytes(&mut self, body: impl Into<Vec<u8>>) {
        self.body_bytes = body.into();
    }

    /// Stores `body` for `respond_json`. A value that can't be represented
    /// as JSON becomes the error state.
    pub fn set_body<T: Serialize>(&mut self, body: &T) {
        match serde_json::to_value(body) {
            Ok(value) => self.body_obj = Some(value),
            Err(e) => self.error = Some(Exception::Json(e)),
        }
    }

    pub fn set_status_code(&mut self, status_code: u16) {
        self.status_code = status_code;
    }

    pub fn set_error(&mut self, error: Exception) {
        self.error = Some(error);
    }

    /// Candidates are negotiated in registration order. Registering a media
    /// type twice replaces the earlier function in place.
    pub fn register_content_type_handler(&mut self, content_type: &str, render: RenderFn<'a>) {
        match self
            .content_type_handlers
            .iter_mut()
            .find(|(ct, _)| ct == content_type)
        {
            Some(slot) => slot.1 = render,
            None => self
                .content_type_handlers
                .push((content_type.to_string(), render)),
        }
    }

    pub fn negotiate_and_call_handler(&mut self) {
        let offers: Vec<&str> = self
            .content_type_handlers
            .iter()
            .map(|(ct, _)| ct.as_str())
            .collect();
        debug!("Negotiating {:?} against {:?}", self.accept, offers);

        let chosen = match negotiate(&self.accept, &offers) {
            Some(ct) => ct.to_string(),
            None => {
                self.error = Some(Exception::NotAcceptable);
                return;
            }
        };
        let rendered = self
            .content_type_handlers
            .iter()
            .find(|(ct, _)| *ct == chosen)
            .map(|(_, render)| render());
        match rendered {
            Some(Ok(body)) => {
                self.set_content_type(&chosen);
                self.body_bytes = body;
            }
            Some(Err(e)) => self.error = Some(e),
            None => self.error = Some(Exception::NotAcceptable),
        }
    }

    pub fn respond(mut self) -> Response {
        if let Some(error) = self.error.take() {
            return self.respond_error(error);
        }
        Response::with_body(self.status_code, &self.content_type, self.body_bytes)
    }

    pub fn respond_json(mut self) -> Response {
        if let Some(error) = self.error.take() {
            return self.respond_error(error);
        }
        let encoded = match &self.body_obj {
            Some(value) => serde_json::to_vec(value),
            None => return self.respond_error(Exception::BodyNotSet),
        };
        match encoded {
            Ok(body) => Response::with_body(self.status_code, "application/json", body),
            Err(e) => self.respond_error(Exception::Json(e)),
        }
    }

    fn respond_error(&self, error: Exception) -> Response {
        let code = match error {
            Exception::NotAcceptable => 406,
            _ => 500,
        };
        warn!("Responding {}: {}", code, error);
        let mut response = Response::from_status_code(code, &self.charset);
        if self.debug {
            let detail = error.to_string().replace(['\r', '\n'], " ");
            response.set_header(ERROR_HEADER, &detail);
        }
        response
    }
}

impl HttpResponseWrapper<'_> {
    pub fn accept(&self) -> &str {
        &self.accept
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
