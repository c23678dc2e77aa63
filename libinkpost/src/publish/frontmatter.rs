//! Markdown post files with a frontmatter header
//!
//! ```text
//! ---
//! title: "Hello, world"
//! date: 2024-05-01
//! cover: /images/blog/hello/cover.png
//! ---
//! Body text...
//! ```
//!
//! The header is YAML. Titles are written as JSON strings, which YAML accepts
//! as double-quoted scalars. Entries with keys this module does not manage
//! are carried through an edit.

use chrono::NaiveDate;
use serde_yaml::{Mapping, Value};

use crate::error::PublishError;
use crate::publish::PublishResult;
use crate::types::{Cover, DraftPost, PostForm};

const FENCE: &str = "---";

/// Render the post file for `form`, with `cover_url` as the cover field
///
/// # Errors
///
/// Returns `PublishError::Io` if the carried-over entries cannot be
/// serialized.
pub fn render(form: &PostForm, date: NaiveDate, cover_url: Option<&str>) -> PublishResult<String> {
    let mut out = String::new();
    out.push_str(FENCE);
    out.push('\n');

    let title = serde_json::to_string(&form.title)
        .map_err(|e| PublishError::Io(format!("cannot encode title: {}", e)))?;
    out.push_str(&format!("title: {}\n", title));
    out.push_str(&format!("date: {}\n", date.format("%Y-%m-%d")));
    if let Some(url) = cover_url {
        out.push_str(&format!("cover: {}\n", url));
    }
    if !form.extra_frontmatter.is_empty() {
        let extra = serde_yaml::to_string(&form.extra_frontmatter)
            .map_err(|e| PublishError::Io(format!("cannot encode frontmatter: {}", e)))?;
        out.push_str(&extra);
        if !extra.ends_with('\n') {
            out.push('\n');
        }
    }

    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&form.body);
    if !form.body.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// Parse a post file stored under `slug` into an edit-mode draft
///
/// # Errors
///
/// Returns `PublishError::Remote` if the file has no frontmatter block or
/// the block is not a YAML mapping.
pub fn parse(slug: &str, text: &str) -> Result<DraftPost, PublishError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines();

    if lines.next().map(str::trim_end) != Some(FENCE) {
        return Err(PublishError::Remote(format!(
            "post '{}' has no frontmatter",
            slug
        )));
    }

    let mut header = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == FENCE {
            closed = true;
            break;
        }
        header.push(line);
    }
    if !closed {
        return Err(PublishError::Remote(format!(
            "post '{}' has an unterminated frontmatter block",
            slug
        )));
    }

    let entries = parse_header(&header.join("\n")).map_err(|e| {
        PublishError::Remote(format!("post '{}' has invalid frontmatter: {}", slug, e))
    })?;

    let mut form = PostForm {
        slug: slug.to_string(),
        ..Default::default()
    };
    let mut cover = None;

    for (key, value) in entries {
        match key.as_str() {
            Some("title") => form.title = scalar(&value).unwrap_or_default(),
            Some("date") => {
                form.date = scalar(&value)
                    .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            }
            Some("cover") => {
                cover = scalar(&value)
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| Cover::Url { url })
            }
            _ => {
                form.extra_frontmatter.insert(key, value);
            }
        }
    }

    form.body = lines.collect::<Vec<_>>().join("\n");
    if text.ends_with('\n') && !form.body.is_empty() {
        form.body.push('\n');
    }

    Ok(DraftPost {
        form,
        cover,
        ..Default::default()
    }
    .editing(slug))
}

fn parse_header(header: &str) -> Result<Mapping, serde_yaml::Error> {
    let blank = header.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    });
    if blank {
        return Ok(Mapping::new());
    }
    serde_yaml::from_str(header)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
