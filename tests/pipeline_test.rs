//! End-to-end dispatch through a built site, in-process.

use simplate_server::{
    param::{DEBUG_HEADER, ERROR_HEADER, SITE_INDEX_FILENAME},
    Config, Request, Response, SiteBuilder, SiteIndex, SimplateType, Website,
};
use std::{fs, path::Path, sync::Arc};
use tempfile::TempDir;

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn build_site(files: &[(&str, &str)], tweak: impl Fn(&mut Config)) -> (TempDir, Arc<Website>) {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        write(dir.path(), name, content);
    }
    let mut config = Config::new();
    config.set_www_root(&dir.path().to_string_lossy());
    tweak(&mut config);

    let website = Arc::new(Website::new("testsite"));
    website.configure(&config);
    SiteBuilder::new("testsite", dir.path())
        .build_into(&website)
        .unwrap();
    website.expand_all_handler_func_registrations().unwrap();
    website.register_all_handler_funcs();
    (dir, website)
}

fn get(website: &Website, request: Request) -> Response {
    let mut request = request;
    website.serve(&mut request)
}

fn body_of(response: &Response) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

#[test]
fn rendered_page_is_served() {
    let (_dir, website) = build_site(&[("page.txt", "a = 1\x0Cb = 2\x0C{{.a}} and {{.b}}")], |_| {});
    let response = get(&website, Request::get("/page.txt"));
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.content_type(), Some("text/plain; charset=utf-8"));
    assert_eq!(body_of(&response), "1 and 2");
}

#[test]
fn static_file_is_served_verbatim() {
    let (_dir, website) = build_site(&[("hello.txt", "hello")], |_| {});
    let response = get(&website, Request::get("/hello.txt"));
    assert_eq!(response.status_code(), 200);
    assert_eq!(body_of(&response), "hello");
}

#[test]
fn virtual_path_binds_context_variable() {
    let (_dir, website) = build_site(&[("users/%id.txt", "\x0C\x0Cuser={{.id}}")], |_| {});
    let response = get(&website, Request::get("/users/42.txt"));
    assert_eq!(response.status_code(), 200);
    assert_eq!(body_of(&response), "user=42");
    assert_eq!(get(&website, Request::get("/users/4.2.txt")).status_code(), 404);
}

#[test]
fn dashed_virtual_name_reaches_template() {
    let (_dir, website) = build_site(&[("%user-id.txt", "\x0C\x0Cid={{.user-id}}")], |_| {});
    let response = get(&website, Request::get("/7.txt"));
    assert_eq!(response.status_code(), 200);
    assert_eq!(body_of(&response), "id=7");
}

#[test]
fn simplate_source_is_never_served() {
    let (_dir, website) = build_site(
        &[
            ("users/%id.txt", "secret = \"hunter2\"\x0C\x0Cuser={{.id}}"),
            ("users/readme.txt", "plain"),
        ],
        |config| {
            config.set_list_dirs(true);
        },
    );
    let response = get(&website, Request::get("/users/%id.txt"));
    assert_eq!(response.status_code(), 404);
    assert!(!body_of(&response).contains("hunter2"));

    let listing = body_of(&get(&website, Request::get("/users/")));
    assert!(listing.contains("readme.txt"));
    assert!(!listing.contains("%id.txt"));
}

#[test]
fn extensionless_virtual_path_binds_context_variable() {
    let (_dir, website) = build_site(
        &[("users/%id", "\x0C\x0Ctext/plain\nuser={{.id}}\x0Capplication/json\n{\"id\":\"{{.id}}\"}")],
        |_| {},
    );
    let response = get(&website, Request::get("/users/42").with_header("Accept", "text/plain"));
    assert_eq!(body_of(&response), "user=42");
    let response = get(&website, Request::get("/users/42.json"));
    assert_eq!(body_of(&response), "{\"id\":\"42\"}");
}

#[test]
fn negotiation_without_acceptable_type_is_406() {
    let (_dir, website) = build_site(
        &[("thing", "\x0C\x0Ctext/plain\nplain\x0Capplication/xml\n<xml/>")],
        |_| {},
    );
    let response = get(&website, Request::get("/thing").with_header("Accept", "application/json"));
    assert_eq!(response.status_code(), 406);
    assert!(body_of(&response).contains("406 Not Acceptable"));
}

#[test]
fn negotiation_by_extension_and_accept() {
    let (_dir, website) = build_site(
        &[("thing", "\x0C\x0Ctext/plain\nplain\x0Capplication/xml\n<xml/>")],
        |_| {},
    );
    let xml = get(&website, Request::get("/thing.xml"));
    assert_eq!(xml.content_type(), Some("application/xml"));
    assert_eq!(body_of(&xml), "<xml/>");

    let plain = get(&website, Request::get("/thing").with_header("Accept", "text/plain"));
    assert_eq!(body_of(&plain), "plain");

    // no Accept header: the default prefers xml over */*
    let default = get(&website, Request::get("/thing"));
    assert_eq!(body_of(&default), "<xml/>");

    assert_eq!(get(&website, Request::get("/thing.json")).status_code(), 406);
}

#[test]
fn directory_index_is_served() {
    let (_dir, website) = build_site(&[("docs/index.html", "<h1>Docs</h1>")], |_| {});
    let response = get(&website, Request::get("/docs/"));
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
    assert_eq!(body_of(&response), "<h1>Docs</h1>");
}

#[test]
fn rendered_index_claims_directory() {
    let (_dir, website) = build_site(&[("docs/index.html", "t = \"Hi\"\x0C\x0C<h1>{{.t}}</h1>")], |_| {});
    assert_eq!(body_of(&get(&website, Request::get("/docs/"))), "<h1>Hi</h1>");
    let redirect = get(&website, Request::get("/docs"));
    assert_eq!(redirect.status_code(), 301);
    assert_eq!(redirect.header("Location"), Some("/docs/"));
}

#[test]
fn json_simplate_responds_with_body() {
    let (_dir, website) = build_site(&[("api/status.json", "\x0Cbody = {\"ok\": true}")], |_| {});
    let response = get(&website, Request::get("/api/status.json"));
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(body_of(&response), "{\"ok\":true}");
}

#[test]
fn template_error_is_500_and_debug_adds_header_only() {
    let files = [("broken.html", "\x0C\x0C{{.nope}}")];
    let (_dir, website) = build_site(&files, |_| {});
    let response = get(&website, Request::get("/broken.html"));
    assert_eq!(response.status_code(), 500);
    assert!(response.header(ERROR_HEADER).is_none());

    let (_dir, website) = build_site(&files, |config| {
        config.set_debug(true);
    });
    let response = get(&website, Request::get("/broken.html").with_header(DEBUG_HEADER, "false"));
    assert_eq!(response.status_code(), 500);
    assert!(response.header(ERROR_HEADER).unwrap().contains("nope"));
    assert!(!body_of(&response).contains("nope"));
}

#[test]
fn unknown_paths_are_404() {
    let (_dir, website) = build_site(&[("a.txt", "a")], |_| {});
    assert_eq!(get(&website, Request::get("/missing")).status_code(), 404);
    assert_eq!(get(&website, Request::get("/../etc/passwd")).status_code(), 404);
    let index = format!("/{}", SITE_INDEX_FILENAME);
    assert_eq!(get(&website, Request::get(&index)).status_code(), 404);
}

#[test]
fn favicon_falls_back_to_embedded_icon() {
    let (_dir, website) = build_site(&[], |_| {});
    let response = get(&website, Request::get("/favicon.ico"));
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.content_type(), Some("image/x-icon"));
}

#[test]
fn listing_depends_on_config() {
    let files = [("files/a.bin", "a")];
    let (_dir, website) = build_site(&files, |_| {});
    assert_eq!(get(&website, Request::get("/files/")).status_code(), 404);

    let (_dir, website) = build_site(&files, |config| {
        config.set_list_dirs(true);
    });
    let response = get(&website, Request::get("/files/"));
    assert_eq!(response.status_code(), 200);
    assert!(body_of(&response).contains("a.bin"));
}

#[test]
fn site_index_written_and_reloaded() {
    let (dir, _website) = build_site(
        &[("a.txt", "a"), ("b.html", "\x0C\x0Cb"), ("c", "\x0C\x0Ctext/plain\nc\x0Ctext/html\nc")],
        |_| {},
    );
    let index = SiteIndex::load(dir.path()).unwrap();
    assert_eq!(index.root_dir, dir.path().to_string_lossy());
    let types: Vec<_> = index
        .simplates
        .iter()
        .map(|(path, entry)| (path.as_str(), entry.simplate_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("/a.txt", SimplateType::Static),
            ("/b.html", SimplateType::Rendered),
            ("/c", SimplateType::Negotiated),
        ]
    );
}
