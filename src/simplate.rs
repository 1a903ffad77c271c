//! # Simplate 模块
//!
//! 一个 simplate 就是站点根目录下的一个文件。内容按换页符拆分为若干页，
//! 分页符的数量与文件是否有扩展名共同决定资源类型：
//!
//! | 分页符数 | 扩展名   | 媒体类型           | 类型         |
//! |----------|----------|--------------------|--------------|
//! | 0        | 任意     | 任意               | `static`     |
//! | 1 或 2   | 必须有   | `application/json` | `json`       |
//! | 1 或 2   | 必须有   | 其他               | `rendered`   |
//! | 大于 2   | 不能有   | 任意               | `negotiated` |
//!
//! 有两个分页符的 rendered 和 json simplate 依次是 init、logic、模板页；
//! 只有一个分页符时，rendered 为 logic + 模板，json 为 init + logic。
//! negotiated simplate 的每个模板页都以 specline `[renderer] media/type` 开头。

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_derive::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use crate::{exception::Exception, param::*};

lazy_static! {
    static ref NON_ALNUM_DASH: Regex = Regex::new("[^-a-zA-Z0-9]").unwrap();
    static ref REPEATED_DASHES: Regex = Regex::new("-{2,}").unwrap();
}

/// Suffix of the generated source a non-static simplate maps to.
pub const GENERATED_SOURCE_SUFFIX: &str = ".rs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimplateType {
    Static,
    Rendered,
    Json,
    Negotiated,
}

impl SimplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimplateType::Static => "static",
            SimplateType::Rendered => "rendered",
            SimplateType::Json => "json",
            SimplateType::Negotiated => "negotiated",
        }
    }
}

impl fmt::Display for SimplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimplateType {
    type Err = Exception;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(SimplateType::Static),
            "rendered" => Ok(SimplateType::Rendered),
            "json" => Ok(SimplateType::Json),
            "negotiated" => Ok(SimplateType::Negotiated),
            other => Err(Exception::InvalidConfig(format!(
                "unknown simplate type {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpec {
    pub content_type: String,
    pub renderer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub body: String,
    /// Only template pages have one.
    pub spec: Option<PageSpec>,
}

impl Page {
    fn code(body: &str) -> Self {
        Self {
            body: body.to_string(),
            spec: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Simplate {
    package_name: String,
    site_root: PathBuf,
    filename: String,
    abs_filename: PathBuf,
    simplate_type: SimplateType,
    content_type: String,
    init_page: Option<Page>,
    logic_page: Option<Page>,
    template_pages: Vec<Page>,
}

impl Simplate {
    /// Classifies `content` read from `path`. A relative `path` is taken to
    /// be relative to `site_root`; an absolute one must lie below it.
    pub fn from_string(
        package_name: &str,
        site_root: &Path,
        path: &Path,
        content: &str,
    ) -> Result<Self, Exception> {
        let (filename, abs_filename) = relative_filename(site_root, path)?;
        let has_ext = Path::new(&filename).extension().is_some();

        let raw_pages: Vec<&str> = content.split(PAGE_BREAK).collect();
        let nbreaks = raw_pages.len() - 1;

        let mut simplate = Self {
            package_name: package_name.to_string(),
            site_root: site_root.to_path_buf(),
            content_type: mime_for_path(&filename).to_string(),
            filename,
            abs_filename,
            simplate_type: SimplateType::Static,
            init_page: None,
            logic_page: None,
            template_pages: vec![],
        };

        match nbreaks {
            0 => {}
            1 | 2 => {
                if !has_ext {
                    return Err(Exception::RenderedWithoutExtension(simplate.filename));
                }
                if simplate.content_type == "application/json" {
                    simplate.simplate_type = SimplateType::Json;
                    simplate.init_page = Some(Page::code(raw_pages[0]));
                    simplate.logic_page = Some(Page::code(raw_pages[1]));
                    if nbreaks == 2 {
                        debug!(
                            "Ignoring third page of json simplate {:?}",
                            simplate.filename
                        );
                    }
                } else {
                    simplate.simplate_type = SimplateType::Rendered;
                    let (init, logic, template) = match nbreaks {
                        1 => ("", raw_pages[0], raw_pages[1]),
                        _ => (raw_pages[0], raw_pages[1], raw_pages[2]),
                    };
                    simplate.init_page = Some(Page::code(init));
                    simplate.logic_page = Some(Page::code(logic));
                    let page = rendered_template_page(template, &simplate.content_type);
                    simplate.template_pages.push(page);
                }
            }
            _ => {
                if has_ext {
                    return Err(Exception::NegotiatedWithExtension(simplate.filename));
                }
                simplate.simplate_type = SimplateType::Negotiated;
                simplate.init_page = Some(Page::code(raw_pages[0]));
                simplate.logic_page = Some(Page::code(raw_pages[1]));
                for raw_page in &raw_pages[2..] {
                    let page = negotiated_template_page(raw_page)?;
                    if let Some(spec) = &page.spec {
                        let taken = simplate
                            .template_pages
                            .iter()
                            .filter_map(|p| p.spec.as_ref())
                            .any(|s| s.content_type == spec.content_type);
                        if taken {
                            return Err(Exception::DuplicateContentType(spec.content_type.clone()));
                        }
                    }
                    simplate.template_pages.push(page);
                }
            }
        }

        debug!(
            "Classified {:?} as {} ({} template pages)",
            simplate.filename,
            simplate.simplate_type,
            simplate.template_pages.len()
        );
        Ok(simplate)
    }

    /// Content that is not UTF-8 can't hold pages, so it is always static.
    pub fn from_bytes(
        package_name: &str,
        site_root: &Path,
        path: &Path,
        content: &[u8],
    ) -> Result<Self, Exception> {
        match std::str::from_utf8(content) {
            Ok(text) => Self::from_string(package_name, site_root, path, text),
            Err(_) => Self::from_string(package_name, site_root, path, ""),
        }
    }

    /// The filename with every character that can't appear in an
    /// identifier spelled out, e.g. `a/b.txt` -> `a-SLASH-b-DOT-txt`.
    pub fn escaped_filename(&self) -> String {
        escape_filename(&self.filename)
    }

    pub fn output_name(&self) -> String {
        if self.simplate_type == SimplateType::Static {
            return self.filename.clone();
        }
        format!("{}{}", self.escaped_filename(), GENERATED_SOURCE_SUFFIX)
    }

    /// `a-SLASH-b-DOT-txt` -> `ASlashBDotTxt`
    pub fn func_name(&self) -> String {
        self.escaped_filename()
            .split('-')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                    }
                    None => String::new(),
                }
            })
            .collect()
    }

    /// `a-SLASH-b-DOT-txt` -> `A_SLASH_B_DOT_TXT`
    pub fn const_name(&self) -> String {
        self.escaped_filename().to_ascii_uppercase().replace('-', "_")
    }

    /// Request path this simplate answers at.
    pub fn request_path(&self) -> String {
        format!("/{}", self.filename)
    }

    pub fn first_template_page(&self) -> Option<&Page> {
        self.template_pages.first()
    }
}

impl Simplate {
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn abs_filename(&self) -> &Path {
        &self.abs_filename
    }

    pub fn simplate_type(&self) -> SimplateType {
        self.simplate_type
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn init_page(&self) -> Option<&Page> {
        self.init_page.as_ref()
    }

    pub fn logic_page(&self) -> Option<&Page> {
        self.logic_page.as_ref()
    }

    pub fn template_pages(&self) -> &[Page] {
        &self.template_pages
    }
}

pub fn escape_filename(filename: &str) -> String {
    let cleaned = filename.trim_start_matches("./");
    let spelled = cleaned
        .replace('.', "-DOT-")
        .replace('/', "-SLASH-")
        .replace(' ', "-SPACE-")
        .replace('%', "-PCT-");
    let squeaky = NON_ALNUM_DASH.replace_all(&spelled, "-");
    REPEATED_DASHES.replace_all(&squeaky, "-").into_owned()
}

fn relative_filename(site_root: &Path, path: &Path) -> Result<(String, PathBuf), Exception> {
    let (relative, absolute) = if path.is_absolute() {
        match path.strip_prefix(site_root) {
            Ok(rel) => (rel.to_path_buf(), path.to_path_buf()),
            Err(_) => {
                return Err(Exception::InvalidPath(path.display().to_string()));
            }
        }
    } else {
        (path.to_path_buf(), site_root.join(path))
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(Exception::InvalidPath(path.display().to_string())),
        }
    }
    if parts.is_empty() {
        return Err(Exception::InvalidPath(path.display().to_string()));
    }
    Ok((parts.join("/"), absolute))
}

/// Splits off the first line of a template page. Without a newline the
/// whole page is the specline.
fn split_specline(raw_page: &str) -> (&str, &str) {
    match raw_page.split_once('\n') {
        Some((specline, body)) => (specline, body),
        None => (raw_page, ""),
    }
}

fn rendered_template_page(raw_page: &str, content_type: &str) -> Page {
    let (first_line, rest) = split_specline(raw_page);
    let trimmed = first_line.trim();
    let (renderer, body) = if trimmed.is_empty() && raw_page.contains('\n') {
        (DEFAULT_RENDERER, rest)
    } else if trimmed.starts_with("#!") {
        (trimmed, rest)
    } else {
        (DEFAULT_RENDERER, raw_page)
    };
    Page {
        body: body.to_string(),
        spec: Some(PageSpec {
            content_type: content_type.to_string(),
            renderer: renderer.to_string(),
        }),
    }
}

fn negotiated_template_page(raw_page: &str) -> Result<Page, Exception> {
    let (specline, body) = split_specline(raw_page);
    let spec = parse_specline(specline)?;
    Ok(Page {
        body: body.to_string(),
        spec: Some(spec),
    })
}

/// `media/type` or `renderer media/type`.
pub fn parse_specline(specline: &str) -> Result<PageSpec, Exception> {
    let parts: Vec<&str> = specline.split_whitespace().collect();
    let (renderer, content_type) = match parts.as_slice() {
        [content_type] => (DEFAULT_RENDERER, *content_type),
        [renderer, content_type] => (*renderer, *content_type),
        _ => return Err(Exception::MalformedSpecline(specline.trim().to_string())),
    };
    if !content_type.contains('/') {
        return Err(Exception::MalformedSpecline(specline.trim().to_string()));
    }
    Ok(PageSpec {
        content_type: content_type.to_string(),
        renderer: renderer.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RENDERED: &str = "import time\n\x0C\nctx = 1\n\x0C\n{{.D}} Dance!\n";
    const NEGOTIATED: &str =
        "init\n\x0C\nlogic\n\x0C text/plain\n{{.D}} Dance!\n\x0C application/json\n{\"who\":\"{{.D}}\"}\n";

    fn classify(filename: &str, content: &str) -> Result<Simplate, Exception> {
        Simplate::from_string("pkg", Path::new("/srv/www"), Path::new(filename), content)
    }

    #[test]
    fn test_knows_its_filename_and_content_type() {
        let s = classify("/srv/www/docs/basic-rendered.txt", RENDERED).unwrap();
        assert_eq!(s.filename(), "docs/basic-rendered.txt");
        assert_eq!(s.abs_filename(), Path::new("/srv/www/docs/basic-rendered.txt"));
        assert_eq!(s.content_type(), "text/plain");
        assert_eq!(s.request_path(), "/docs/basic-rendered.txt");
    }

    #[test]
    fn test_scenario_rendered() {
        let s = classify("page.txt", "a\x0Cb\x0C{{.X}}").unwrap();
        assert_eq!(s.simplate_type(), SimplateType::Rendered);
        assert_eq!(s.init_page().unwrap().body, "a");
        assert_eq!(s.logic_page().unwrap().body, "b");
        assert_eq!(s.template_pages().len(), 1);
        assert_eq!(s.template_pages()[0].body, "{{.X}}");
    }

    #[test]
    fn test_rendered_blank_specline_uses_default_renderer() {
        let s = classify("basic.txt", RENDERED).unwrap();
        let page = s.first_template_page().unwrap();
        assert_eq!(page.body, "{{.D}} Dance!\n");
        let spec = page.spec.as_ref().unwrap();
        assert_eq!(spec.renderer, DEFAULT_RENDERER);
        assert_eq!(spec.content_type, "text/plain");
    }

    #[test]
    fn test_rendered_explicit_renderer() {
        let s = classify("raw.html", "\x0C\x0C#!raw\n<p>{{.X}}</p>").unwrap();
        let spec = s.template_pages()[0].spec.clone().unwrap();
        assert_eq!(spec.renderer, "#!raw");
        assert_eq!(s.template_pages()[0].body, "<p>{{.X}}</p>");
    }

    #[test]
    fn test_rendered_single_break_is_logic_and_template() {
        let s = classify("one.html", "x = 1\x0C<b>{{.x}}</b>").unwrap();
        assert_eq!(s.simplate_type(), SimplateType::Rendered);
        assert_eq!(s.init_page().unwrap().body, "");
        assert_eq!(s.logic_page().unwrap().body, "x = 1");
        assert_eq!(s.template_pages()[0].body, "<b>{{.x}}</b>");
    }

    #[test]
    fn test_scenario_static() {
        let s = classify("hello.txt", "hello").unwrap();
        assert_eq!(s.simplate_type(), SimplateType::Static);
        assert_eq!(s.output_name(), "hello.txt");
        assert!(s.init_page().is_none());
        assert!(s.logic_page().is_none());
        assert!(s.template_pages().is_empty());
    }

    #[test]
    fn test_binary_content_is_static() {
        let s = Simplate::from_bytes(
            "pkg",
            Path::new("/srv/www"),
            Path::new("logo.png"),
            &[0x89, b'P', 0x0C, 0xFF, 0x0C],
        )
        .unwrap();
        assert_eq!(s.simplate_type(), SimplateType::Static);
        assert_eq!(s.content_type(), "image/png");
    }

    #[test]
    fn test_detects_json() {
        let s = classify("data.json", "init\x0Clogic").unwrap();
        assert_eq!(s.simplate_type(), SimplateType::Json);
        assert_eq!(s.init_page().unwrap().body, "init");
        assert_eq!(s.logic_page().unwrap().body, "logic");
        assert!(s.template_pages().is_empty());
    }

    #[test]
    fn test_detects_negotiated() {
        let s = classify("dance", NEGOTIATED).unwrap();
        assert_eq!(s.simplate_type(), SimplateType::Negotiated);
        assert_eq!(s.init_page().unwrap().body, "init\n");
        assert_eq!(s.logic_page().unwrap().body, "\nlogic\n");
        let types: Vec<_> = s
            .template_pages()
            .iter()
            .map(|p| p.spec.as_ref().unwrap().content_type.as_str())
            .collect();
        assert_eq!(types, vec!["text/plain", "application/json"]);
        assert_eq!(s.template_pages()[1].body, "{\"who\":\"{{.D}}\"}\n");
    }

    #[test]
    fn test_negotiated_two_token_specline() {
        let s = classify("thing", "\x0C\x0C#!raw text/html\n<p/>\x0Ctext/plain\nx").unwrap();
        let spec = s.template_pages()[0].spec.clone().unwrap();
        assert_eq!(spec.renderer, "#!raw");
        assert_eq!(spec.content_type, "text/html");
    }

    #[test]
    fn test_classification_errors() {
        assert!(matches!(
            classify("noext", "a\x0Cb"),
            Err(Exception::RenderedWithoutExtension(_))
        ));
        assert!(matches!(
            classify("neg.txt", "a\x0Cb\x0Ctext/plain\nx\x0Ctext/html\ny"),
            Err(Exception::NegotiatedWithExtension(_))
        ));
        assert!(matches!(
            classify("neg", "a\x0Cb\x0Ca b c\nx\x0Ctext/html\ny"),
            Err(Exception::MalformedSpecline(_))
        ));
        assert!(matches!(
            classify("neg", "a\x0Cb\x0Cplain\nx\x0Ctext/html\ny"),
            Err(Exception::MalformedSpecline(_))
        ));
        assert!(matches!(
            classify("neg", "a\x0Cb\x0Ctext/html\nx\x0Ctext/html\ny"),
            Err(Exception::DuplicateContentType(_))
        ));
    }

    #[test]
    fn test_path_outside_root_rejected() {
        assert!(matches!(
            classify("/etc/passwd", "x"),
            Err(Exception::InvalidPath(_))
        ));
        assert!(matches!(classify("../x", "x"), Err(Exception::InvalidPath(_))));
    }

    #[test]
    fn test_output_and_identifier_names() {
        let s = classify("sub dir/my%page.html", "a\x0Cb\x0Cc").unwrap();
        assert_eq!(s.escaped_filename(), "sub-SPACE-dir-SLASH-my-PCT-page-DOT-html");
        assert_eq!(s.output_name(), "sub-SPACE-dir-SLASH-my-PCT-page-DOT-html.rs");
        assert_eq!(s.func_name(), "SubSpaceDirSlashMyPctPageDotHtml");
        assert_eq!(s.const_name(), "SUB_SPACE_DIR_SLASH_MY_PCT_PAGE_DOT_HTML");
    }

    #[test]
    fn test_escape_collapses_dashes() {
        assert_eq!(escape_filename("a--b.txt"), "a-b-DOT-txt");
        assert_eq!(escape_filename("a+b.txt"), "a-b-DOT-txt");
    }

    #[test]
    fn test_type_round_trips_through_str() {
        for t in [
            SimplateType::Static,
            SimplateType::Rendered,
            SimplateType::Json,
            SimplateType::Negotiated,
        ] {
            assert_eq!(t.as_str().parse::<SimplateType>().unwrap(), t);
        }
    }

    proptest! {
        #[test]
        fn prop_no_breaks_is_static(name in "[a-z]{1,8}(\\.[a-z]{1,4})?", body in "[^\x0C]{0,64}") {
            let s = classify(&name, &body).unwrap();
            prop_assert_eq!(s.simplate_type(), SimplateType::Static);
            prop_assert_eq!(s.output_name(), name);
        }

        #[test]
        fn prop_one_or_two_breaks(
            stem in "[a-z]{1,8}",
            pages in proptest::collection::vec("[^\x0C]{0,16}", 2..=3),
        ) {
            let content = pages.join("\x0C");
            let json = classify(&format!("{}.json", stem), &content).unwrap();
            prop_assert_eq!(json.simplate_type(), SimplateType::Json);

            let rendered = classify(&format!("{}.html", stem), &content).unwrap();
            prop_assert_eq!(rendered.simplate_type(), SimplateType::Rendered);
            prop_assert_eq!(rendered.template_pages().len(), 1);

            let is_rendered_error = matches!(
                classify(&stem, &content),
                Err(Exception::RenderedWithoutExtension(_))
            );
            prop_assert!(is_rendered_error);
        }

        #[test]
        fn prop_many_breaks_negotiated(stem in "[a-z]{1,8}", n in 1usize..6) {
            let mut content = String::from("init\x0Clogic");
            for i in 0..n {
                content.push_str(&format!("\x0Ctext/x-kind{}\nbody {}", i, i));
            }
            if n == 1 {
                // a single template page is still only two breaks
                return Ok(());
            }
            let s = classify(&stem, &content).unwrap();
            prop_assert_eq!(s.simplate_type(), SimplateType::Negotiated);
            prop_assert_eq!(s.template_pages().len(), n);

            let is_negotiated_error = matches!(
                classify(&format!("{}.txt", stem), &content),
                Err(Exception::NegotiatedWithExtension(_))
            );
            prop_assert!(is_negotiated_error);
        }

        #[test]
        fn prop_escaping_is_idempotent(name in "[a-zA-Z0-9 ./%_+-]{1,32}") {
            let once = escape_filename(&name);
            prop_assert_eq!(escape_filename(&once), once.clone());
        }
    }
}
