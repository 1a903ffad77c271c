use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::warn;
use std::{
    collections::HashSet,
    fs, io,
    path::Path,
    sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use crate::param::STATUS_CODES;

/// Served for `/favicon.ico` when the site has none of its own.
pub static FAVICON_ICO: &[u8] = include_bytes!("../assets/favicon.ico");

const SITE_CSS: &str = r"
body { font-family: monospace; }
#server_signature { font-size: 9px; font-style: oblique; }
";

const SERVER_SIGNATURE: &str = r#"
    <hr />
    <p id="server_signature">
      Brought to you by <strong>simplate-server</strong>
    </p>
"#;

lazy_static! {
    static ref HTTP_404_PAGE: String = HtmlBuilder::canned("404 Not Found", "<h1>404 Not Found (Ｔ▽Ｔ)</h1>").build();
    static ref HTTP_406_PAGE: String = HtmlBuilder::canned("406 Not Acceptable", "<h1>406 Not Acceptable (Ｔ▽Ｔ)</h1>").build();
    static ref HTTP_500_PAGE: String = HtmlBuilder::canned(
        "500 Internal Server Error",
        "<h1>500 Internal Server Error</h1>\n    <p>Something go boom inside.</p>"
    )
    .build();
}

/// The fixed body for 404, 406 and 500. These never carry error details.
pub fn canned_page(code: u16) -> Option<&'static str> {
    match code {
        404 => Some(HTTP_404_PAGE.as_str()),
        406 => Some(HTTP_406_PAGE.as_str()),
        500 => Some(HTTP_500_PAGE.as_str()),
        _ => None,
    }
}

// 锁中毒时记录后继续使用内部数据
pub fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned lock (read)");
        poisoned.into_inner()
    })
}

pub fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned lock (write)");
        poisoned.into_inner()
    })
}

pub fn lock_mutex<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned mutex");
        poisoned.into_inner()
    })
}

/// One row of a directory listing.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub request_path: String,
    pub link_name: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    fn canned(title: &str, heading: &str) -> Self {
        Self {
            title: title.to_string(),
            css: SITE_CSS.to_string(),
            body: format!("    {}\n{}", heading, SERVER_SIGNATURE),
        }
    }

    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let reason = STATUS_CODES.get(&code).copied().unwrap_or("");
        let description = note.unwrap_or(reason);
        Self {
            title: format!("{} {}", code, reason),
            css: SITE_CSS.to_string(),
            body: format!(
                "    <h1>{} {}</h1>\n    <p>{}</p>\n{}",
                code,
                reason,
                escape_html(description),
                SERVER_SIGNATURE
            ),
        }
    }

    /// Lists `dir_path`, linking entries below `request_path`. Entries whose
    /// request path is in `hidden` are left out.
    pub fn from_dir(request_path: &str, dir_path: &Path, hidden: &HashSet<String>) -> io::Result<Self> {
        let mut entries = read_listing(request_path, dir_path)?;
        entries.retain(|entry| !hidden.contains(&entry.request_path));
        let mut body = String::new();
        body.push_str(&format!(
            "    <h1 id=\"request_path\">{}</h1>\n    <hr />\n",
            escape_html(request_path)
        ));
        body.push_str(
            r#"    <table id="directory_listing">
      <thead>
        <tr>
          <th class="entry name">Name</th>
          <th class="entry size">Size</th>
          <th class="entry mtime">Last Modified</th>
        </tr>
      </thead>
      <tbody>
"#,
        );
        body.push_str(&format!(
            "        <tr>\n          <td class=\"entry name\"><a href=\"{}\">../</a></td>\n          <td class=\"entry size\">-</td>\n          <td class=\"entry mtime\">-</td>\n        </tr>\n",
            web_parent_dir(request_path)
        ));
        for entry in &entries {
            let size = match entry.is_dir {
                true => "-".to_string(),
                false => format_file_size(entry.size),
            };
            let mtime = entry
                .modified
                .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string());
            body.push_str(&format!(
                "        <tr>\n          <td class=\"entry name\"><a href=\"{}\">{}</a></td>\n          <td class=\"entry size\">{}</td>\n          <td class=\"entry mtime\">{}</td>\n        </tr>\n",
                escape_html(&entry.request_path),
                escape_html(&entry.link_name),
                size,
                mtime
            ));
        }
        body.push_str("      </tbody>\n    </table>\n");
        body.push_str(SERVER_SIGNATURE);

        let css = [
            SITE_CSS,
            r"
#directory_listing { font-size: 12px; }
td, th { padding: 1px 5px; }
tr:hover { background: #eef; }
.entry { text-align: left; }
",
        ]
        .concat();
        Ok(Self {
            title: request_path.to_string(),
            css,
            body,
        })
    }

    pub fn build(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\">\n    <title>{}</title>\n    <style type=\"text/css\">{}</style>\n  </head>\n  <body>\n{}  </body>\n</html>\n",
            escape_html(&self.title),
            self.css,
            self.body
        )
    }
}

/// Entries of `dir_path`: directories first, then files, each sorted by name.
pub fn read_listing(request_path: &str, dir_path: &Path) -> io::Result<Vec<ListingEntry>> {
    let base = request_path.trim_end_matches('/');
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = metadata.is_dir();
        let (request_path, link_name) = match is_dir {
            true => (format!("{}/{}/", base, name), format!("{}/", name)),
            false => (format!("{}/{}", base, name), name),
        };
        entries.push(ListingEntry {
            request_path,
            link_name,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            is_dir,
        });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.link_name.cmp(&b.link_name)));
    Ok(entries)
}

pub fn web_parent_dir(request_path: &str) -> String {
    let trimmed = request_path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => format!("{}/", &trimmed[..pos]),
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
