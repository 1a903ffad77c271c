// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Simplate 请求处理模块
//!
//! 在进程内为已分类的 simplate 提供服务。构造时执行一次 init 页并检查每个模板页的渲染器；
//! 之后每个请求各自复制一份上下文，写入模式阶段捕获的路径变量，再执行一次 logic 页。

use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::{
    exception::Exception,
    pipeline::HandlerFunc,
    request::Request,
    response::Response,
    simplate::{Simplate, SimplateType},
    website::Website,
    wrapper::HttpResponseWrapper,
};

/// Variables visible to logic and template pages.
pub type Context = Map<String, Value>;

/// Evaluates the code of an init or logic page against a context.
///
/// Returns the body object the page set, if any; json simplates respond
/// with it.
#[cfg_attr(test, mockall::automock)]
pub trait LogicRunner: Send + Sync {
    fn run(&self, source: &str, ctx: &mut Context) -> Result<Option<Value>, Exception>;
}

/// Runs pages made of `name = <JSON literal>` lines. Blank lines and lines
/// starting with `#` or `//` are skipped; `body = ...` sets the body object.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssignmentLogic;

impl LogicRunner for AssignmentLogic {
    fn run(&self, source: &str, ctx: &mut Context) -> Result<Option<Value>, Exception> {
        let mut body = None;
        for (lineno, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            let (name, literal) = line.split_once('=').ok_or_else(|| {
                Exception::LogicError(format!("line {}: expected `name = value`", lineno + 1))
            })?;
            let name = name.trim();
            if !is_identifier(name) {
                return Err(Exception::LogicError(format!(
                    "line {}: {:?} is not a name",
                    lineno + 1,
                    name
                )));
            }
            let value: Value = serde_json::from_str(literal.trim()).map_err(|e| {
                Exception::LogicError(format!("line {}: {}", lineno + 1, e))
            })?;
            if name == "body" {
                body = Some(value);
            } else {
                ctx.insert(name.to_string(), value);
            }
        }
        Ok(body)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    /// `#!text/template`: `{{.name}}` and `{{.a.b}}` are replaced from the
    /// context, `{{.}}` by the whole context as JSON.
    Template,
    /// `#!raw`: the body as written.
    Raw,
}

impl Renderer {
    pub fn from_id(id: &str) -> Result<Self, Exception> {
        match id {
            "#!text/template" => Ok(Renderer::Template),
            "#!raw" => Ok(Renderer::Raw),
            other => Err(Exception::UnknownRenderer(other.to_string())),
        }
    }

    pub fn render(&self, body: &str, ctx: &Context) -> Result<Vec<u8>, Exception> {
        match self {
            Renderer::Raw => Ok(body.as_bytes().to_vec()),
            Renderer::Template => render_template(body, ctx).map(String::into_bytes),
        }
    }
}

fn render_template(body: &str, ctx: &Context) -> Result<String, Exception> {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| Exception::TemplateError("unclosed action".to_string()))?;
        let action = after[..end].trim();
        out.push_str(&lookup(action, ctx)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn lookup(action: &str, ctx: &Context) -> Result<String, Exception> {
    if action == "." {
        return Ok(serde_json::to_string(ctx)?);
    }
    let path = action
        .strip_prefix('.')
        .ok_or_else(|| Exception::TemplateError(format!("unsupported action {:?}", action)))?;

    let mut keys = path.split('.');
    let first = keys.next().unwrap_or("");
    let mut value = ctx
        .get(first)
        .ok_or_else(|| Exception::TemplateError(format!("no value for {:?}", action)))?;
    for key in keys {
        value = value
            .get(key)
            .ok_or_else(|| Exception::TemplateError(format!("no value for {:?}", action)))?;
    }
    Ok(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

struct CompiledPage {
    content_type: String,
    renderer: Renderer,
    body: String,
}

impl CompiledPage {
    fn render(&self, ctx: &Context) -> Result<Vec<u8>, Exception> {
        self.renderer.render(&self.body, ctx)
    }
}

pub struct SimplateHandler {
    request_path: String,
    simplate_type: SimplateType,
    content_type: String,
    base_context: Context,
    logic: String,
    pages: Vec<CompiledPage>,
    runner: Arc<dyn LogicRunner>,
}

impl SimplateHandler {
    pub fn new(simplate: &Simplate, runner: Arc<dyn LogicRunner>) -> Result<Self, Exception> {
        if simplate.simplate_type() == SimplateType::Static {
            return Err(Exception::InvalidConfig(format!(
                "{} is static and has no handler",
                simplate.filename()
            )));
        }

        let mut pages = Vec::with_capacity(simplate.template_pages().len());
        for page in simplate.template_pages() {
            if let Some(spec) = &page.spec {
                pages.push(CompiledPage {
                    content_type: spec.content_type.clone(),
                    renderer: Renderer::from_id(&spec.renderer)?,
                    body: page.body.clone(),
                });
            }
        }

        let mut base_context = Context::new();
        if let Some(init) = simplate.init_page() {
            runner.run(&init.body, &mut base_context)?;
        }
        debug!(
            "Built handler for {} with {} variables from its init page",
            simplate.request_path(),
            base_context.len()
        );

        Ok(Self {
            request_path: simplate.request_path(),
            simplate_type: simplate.simplate_type(),
            content_type: simplate.content_type().to_string(),
            base_context,
            logic: simplate
                .logic_page()
                .map(|p| p.body.clone())
                .unwrap_or_default(),
            pages,
            runner,
        })
    }

    pub fn handle(&self, request: &Request) -> Response {
        debug!("{} handling {}", self.request_path, request.path());
        let mut ctx = self.base_context.clone();
        Website::update_context_from_virtual_paths(&mut ctx, request);

        let body = self.runner.run(&self.logic, &mut ctx);
        let mut wrapper = HttpResponseWrapper::new(request);
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                wrapper.set_error(e);
                return wrapper.respond();
            }
        };

        match self.simplate_type {
            SimplateType::Json => {
                match body {
                    Some(body) => wrapper.set_body(&body),
                    None => wrapper.set_body(&ctx),
                }
                wrapper.respond_json()
            }
            SimplateType::Negotiated => {
                for page in &self.pages {
                    let ctx = &ctx;
                    wrapper.register_content_type_handler(
                        &page.content_type,
                        Box::new(move || page.render(ctx)),
                    );
                }
                wrapper.negotiate_and_call_handler();
                wrapper.respond()
            }
            _ => {
                match self.pages.first().map(|page| page.render(&ctx)) {
                    Some(Ok(bytes)) => {
                        wrapper.set_content_type(&self.content_type);
                        wrapper.set_body_bytes(bytes);
                    }
                    Some(Err(e)) => wrapper.set_error(e),
                    None => wrapper.set_error(Exception::TemplateError(format!(
                        "{} has no template page",
                        self.request_path
                    ))),
                }
                wrapper.respond()
            }
        }
    }

    pub fn into_handler_func(self) -> HandlerFunc {
        Arc::new(move |request: &Request| self.handle(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::*;
    use mockall::predicate::*;
    use std::{collections::HashMap, path::Path};

    fn classify(filename: &str, content: &str) -> Simplate {
        Simplate::from_string("pkg", Path::new("/srv"), Path::new(filename), content).unwrap()
    }

    fn body_of(response: &Response) -> String {
        String::from_utf8_lossy(response.body()).into_owned()
    }

    #[test]
    fn test_assignment_logic() {
        let mut ctx = Context::new();
        let body = AssignmentLogic
            .run("# comment\n\nname = \"Bob\"\n// more\nn = 3\nbody = [1, 2]", &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("name"), Some(&Value::from("Bob")));
        assert_eq!(ctx.get("n"), Some(&Value::from(3)));
        assert_eq!(body, Some(serde_json::json!([1, 2])));
    }

    #[test]
    fn test_assignment_logic_errors() {
        let mut ctx = Context::new();
        assert!(matches!(
            AssignmentLogic.run("just words", &mut ctx),
            Err(Exception::LogicError(_))
        ));
        assert!(matches!(
            AssignmentLogic.run("x = not json", &mut ctx),
            Err(Exception::LogicError(_))
        ));
        assert!(matches!(
            AssignmentLogic.run("1x = 1", &mut ctx),
            Err(Exception::LogicError(_))
        ));
    }

    #[test]
    fn test_template_rendering() {
        let mut ctx = Context::new();
        ctx.insert("D".to_string(), Value::from("Who"));
        ctx.insert("user".to_string(), serde_json::json!({"id": 7}));
        let out = render_template("{{.D}} Dance! {{ .user.id }}", &ctx).unwrap();
        assert_eq!(out, "Who Dance! 7");
        assert!(matches!(
            render_template("{{.missing}}", &ctx),
            Err(Exception::TemplateError(_))
        ));
        assert!(matches!(
            render_template("{{.D", &ctx),
            Err(Exception::TemplateError(_))
        ));
        assert!(matches!(
            render_template("{{ range }}", &ctx),
            Err(Exception::TemplateError(_))
        ));
    }

    #[test]
    fn test_unknown_renderer_rejected() {
        let s = classify("x.html", "\x0C\x0C#!jinja2\n<p/>");
        assert!(matches!(
            SimplateHandler::new(&s, Arc::new(AssignmentLogic)),
            Err(Exception::UnknownRenderer(_))
        ));
    }

    #[test]
    fn test_static_has_no_handler() {
        let s = classify("x.html", "<p/>");
        assert!(SimplateHandler::new(&s, Arc::new(AssignmentLogic)).is_err());
    }

    #[test]
    fn test_rendered_response() {
        let s = classify("hi.txt", "greeting = \"Hello\"\x0Cwho = \"world\"\x0C{{.greeting}}, {{.who}}!");
        let handler = SimplateHandler::new(&s, Arc::new(AssignmentLogic)).unwrap();
        let response = handler.handle(&Request::get("/hi.txt"));
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(body_of(&response), "Hello, world!");
    }

    #[test]
    fn test_path_vars_reach_template() {
        let s = classify("users/%id.txt", "\x0C\x0Cuser {{.id}}");
        let handler = SimplateHandler::new(&s, Arc::new(AssignmentLogic)).unwrap();
        let mut request = Request::get("/users/42.txt");
        request.set_path_vars(HashMap::from([("id".to_string(), "42".to_string())]));
        assert_eq!(body_of(&handler.handle(&request)), "user 42");
    }

    #[test]
    fn test_json_response_defaults_to_context() {
        let s = classify("d.json", "a = 1\x0Cb = \"two\"");
        let handler = SimplateHandler::new(&s, Arc::new(AssignmentLogic)).unwrap();
        let response = handler.handle(&Request::get("/d.json"));
        assert_eq!(response.content_type(), Some("application/json"));
        let value: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(value, serde_json::json!({"a": 1, "b": "two"}));

        let s = classify("e.json", "\x0Cbody = {\"ok\": true}");
        let handler = SimplateHandler::new(&s, Arc::new(AssignmentLogic)).unwrap();
        let value: Value =
            serde_json::from_slice(handler.handle(&Request::get("/e.json")).body()).unwrap();
        assert_eq!(value, serde_json::json!({"ok": true}));
    }

    #[test]
    fn test_negotiated_response() {
        let s = classify(
            "dance",
            "D = \"Who\"\x0C\x0Ctext/plain\n{{.D}} Dance!\x0Capplication/json\n{\"who\":\"{{.D}}\"}",
        );
        let handler = SimplateHandler::new(&s, Arc::new(AssignmentLogic)).unwrap();

        let json = handler.handle(&Request::get("/dance").with_header("Accept", "application/json"));
        assert_eq!(json.content_type(), Some("application/json"));
        assert_eq!(body_of(&json), "{\"who\":\"Who\"}");

        let plain = handler.handle(&Request::get("/dance.txt").with_header(INTERNAL_ACCEPT_HEADER, "text/plain"));
        assert_eq!(plain.content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(body_of(&plain), "Who Dance!");

        let none = handler.handle(&Request::get("/dance").with_header("Accept", "image/png"));
        assert_eq!(none.status_code(), 406);
    }

    #[test]
    fn test_logic_failure_is_500() {
        let mut runner = MockLogicRunner::new();
        runner.expect_run().with(eq(""), always()).times(1).returning(|_, _| Ok(None));
        runner
            .expect_run()
            .with(eq("explode"), always())
            .returning(|_, _| Err(Exception::LogicError("kaboom".to_string())));
        let s = classify("x.html", "\x0Cexplode\x0C<p/>");
        let handler = SimplateHandler::new(&s, Arc::new(runner)).unwrap();
        let response = handler.handle(&Request::get("/x.html").with_header(DEBUG_HEADER, "true"));
        assert_eq!(response.status_code(), 500);
        assert!(response.header(ERROR_HEADER).unwrap().contains("kaboom"));
    }

    #[test]
    fn test_init_runs_once() {
        let mut runner = MockLogicRunner::new();
        runner
            .expect_run()
            .with(eq("init"), always())
            .times(1)
            .returning(|_, ctx| {
                ctx.insert("x".to_string(), Value::from("set by init"));
                Ok(None)
            });
        runner
            .expect_run()
            .with(eq("logic"), always())
            .times(2)
            .returning(|_, _| Ok(None));
        let s = classify("x.txt", "init\x0Clogic\x0C{{.x}}");
        let handler = SimplateHandler::new(&s, Arc::new(runner)).unwrap();
        for _ in 0..2 {
            assert_eq!(body_of(&handler.handle(&Request::get("/x.txt"))), "set by init");
        }
    }
}
