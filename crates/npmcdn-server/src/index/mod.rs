//! HTML index pages for package directories

use std::cmp::Ordering;
use std::fmt::Write;

use npmcdn_cache::DirectoryEntry;
use npmcdn_core::utils::{format_time, get_content_type};
use npmcdn_core::Version;

const STYLE: &str = "\
body{font-family:-apple-system,BlinkMacSystemFont,\"Segoe UI\",Helvetica,Arial,sans-serif;font-size:14px;padding:0 20px}\
table{width:100%;border-collapse:collapse;font:0.85em Monaco,monospace}\
tr.even{background-color:#eee}\
th{text-align:left}\
th,td{padding:0.1em 0.25em}\
.version-wrapper{float:right}";

/// Swaps the `@version` part of the current URL when another version is picked
const SCRIPT: &str = "
var s = document.getElementById('version'), v = s.value
s.onchange = function () {
  window.location.href = window.location.href.replace('@' + v, '@' + s.value)
}
";

const SIZE_UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Everything shown on a directory index page
#[derive(Debug)]
pub struct IndexPage<'a> {
    pub package_name: &'a str,
    /// Version the directory belongs to; selected in the version picker
    pub version: &'a str,
    /// All published versions, in any order
    pub versions: Vec<&'a str>,
    /// Directory path inside the package, with leading and trailing `/`
    pub dir: &'a str,
    pub entries: &'a [DirectoryEntry],
}

impl IndexPage<'_> {
    pub fn render(&self) -> String {
        let dir = escape_html(self.dir);
        let mut html = String::with_capacity(4096);

        html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\"/>");
        let _ = write!(html, "<title>Index of {}</title>", dir);
        let _ = write!(html, "<style>{}</style></head><body>", STYLE);

        html.push_str("<div class=\"version-wrapper\"><select id=\"version\">");
        for version in self.sorted_versions() {
            let selected = if version == self.version { " selected=\"\"" } else { "" };
            let _ = write!(
                html,
                "<option value=\"{value}\"{selected}>{name}@{value}</option>",
                value = escape_html(version),
                selected = selected,
                name = escape_html(self.package_name),
            );
        }
        html.push_str("</select></div>");

        let _ = write!(html, "<h1>Index of {}</h1>", dir);
        let _ = write!(html, "<script>{}</script><hr/>", SCRIPT);
        self.render_listing(&mut html);
        let _ = write!(
            html,
            "<hr/><address>{}@{}</address></body></html>",
            escape_html(self.package_name),
            escape_html(self.version)
        );

        html
    }

    fn render_listing(&self, html: &mut String) {
        html.push_str(
            "<table><thead><tr><th>Name</th><th>Type</th><th>Size</th><th>Last Modified</th></tr></thead><tbody>",
        );

        if self.dir != "/" {
            html.push_str(
                "<tr class=\"odd\"><td><a title=\"Parent directory\" href=\"../\">..</a></td><td>-</td><td>-</td><td>-</td></tr>",
            );
        }

        for (index, entry) in self.entries.iter().enumerate() {
            let class = if index % 2 == 1 { "odd" } else { "even" };
            let name = escape_html(&entry.name);

            if entry.is_dir() {
                let _ = write!(
                    html,
                    "<tr class=\"{class}\"><td><a title=\"{name}\" href=\"{name}/\">{name}</a></td><td>-</td><td>-</td><td>-</td></tr>",
                    class = class,
                    name = name,
                );
            } else {
                let _ = write!(
                    html,
                    "<tr class=\"{class}\"><td><a title=\"{name}\" href=\"{name}\">{name}</a></td><td>{content_type}</td><td>{size}</td><td>{modified}</td></tr>",
                    class = class,
                    name = name,
                    content_type = get_content_type(&entry.name),
                    size = pretty_bytes(entry.size()),
                    modified = format_time(entry.modified()),
                );
            }
        }

        html.push_str("</tbody></table>");
    }

    /// Versions in semver order; anything unparsable goes last
    fn sorted_versions(&self) -> Vec<&str> {
        let mut versions: Vec<(&str, Option<Version>)> = self
            .versions
            .iter()
            .map(|v| (*v, v.parse::<Version>().ok()))
            .collect();

        versions.sort_by(|(a, parsed_a), (b, parsed_b)| match (parsed_a, parsed_b) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        });

        versions.into_iter().map(|(v, _)| v).collect()
    }
}

/// Human readable size with three significant digits, e.g. `1.34 kB`
pub fn pretty_bytes(size: u64) -> String {
    let mut exponent = 0;
    let mut scaled = size;
    while scaled >= 1000 && exponent < SIZE_UNITS.len() - 1 {
        scaled /= 1000;
        exponent += 1;
    }

    if exponent == 0 {
        return format!("{} B", size);
    }

    let value = size as f64 / 1000f64.powi(exponent as i32);
    let decimals = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    };

    let mut number = format!("{:.*}", decimals, value);
    if number.contains('.') {
        number.truncate(number.trim_end_matches('0').trim_end_matches('.').len());
    }

    format!("{} {}", number, SIZE_UNITS[exponent])
}

/// Escape text for use in HTML content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
