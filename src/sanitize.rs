/**
 * Sanitization
 * Normalizes every string in an inbound payload before validation sees it
 */
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("static regex"));

static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

const RICH_TEXT_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "u", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "a",
    "img", "blockquote", "code", "pre",
];

const RICH_TEXT_ATTRIBUTES: &[&str] = &["href", "src", "alt", "title", "class"];

/// Fields never reflowed or markup-filtered (credentials).
const SECRET_FIELDS: &[&str] = &["password", "currentPassword", "newPassword", "refreshToken"];

const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "pif", "scr", "vbs", "js", "jar", "php", "asp", "jsp",
];

/// How a string leaf is filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPolicy {
    /// All markup removed
    Plain,
    /// Allow-listed tags and attributes kept
    Rich,
    /// Control characters removed, otherwise untouched
    Secret,
}

pub fn remove_control_chars(s: &str) -> String {
    CONTROL_CHARS.replace_all(s, "").into_owned()
}

pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE_RUNS.replace_all(s, " ").trim().to_string()
}

/// Strip every tag; text content of `script`/`style` is dropped with them.
/// Ampersands come back literal; `<` and `>` stay escaped.
pub fn strip_markup(s: &str) -> String {
    ammonia::Builder::empty()
        .clean(s)
        .to_string()
        .replace("&amp;", "&")
}

pub fn clean_rich_text(s: &str) -> String {
    let tags: HashSet<&str> = RICH_TEXT_TAGS.iter().copied().collect();
    let attributes: HashSet<&str> = RICH_TEXT_ATTRIBUTES.iter().copied().collect();
    ammonia::Builder::default()
        .tags(tags)
        .tag_attributes(Default::default())
        .generic_attributes(attributes)
        .link_rel(None)
        .clean(s)
        .to_string()
}

pub fn clean_text(s: &str, policy: TextPolicy) -> String {
    let s = remove_control_chars(s);
    match policy {
        TextPolicy::Secret => s,
        TextPolicy::Plain => strip_markup(&normalize_whitespace(&s)),
        TextPolicy::Rich => clean_rich_text(&normalize_whitespace(&s)),
    }
}

/// Recursively sanitize a JSON payload. `rich_fields` names object keys whose
/// string values keep the rich-text allow-list; everything else is plain text.
/// Numbers, booleans and null pass through unchanged.
pub fn sanitize_value(value: Value, rich_fields: &[&str]) -> Value {
    sanitize_inner(value, rich_fields, TextPolicy::Plain)
}

fn sanitize_inner(value: Value, rich_fields: &[&str], policy: TextPolicy) -> Value {
    match value {
        Value::String(s) => Value::String(clean_text(&s, policy)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| sanitize_inner(v, rich_fields, policy))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    let policy = if SECRET_FIELDS.contains(&key.as_str()) {
                        TextPolicy::Secret
                    } else if rich_fields.contains(&key.as_str()) {
                        TextPolicy::Rich
                    } else {
                        TextPolicy::Plain
                    };
                    let v = sanitize_inner(v, rich_fields, policy);
                    (key, v)
                })
                .collect(),
        ),
        other => other,
    }
}

/// Reduce an uploaded file name to `[A-Za-z0-9._-]`, or reject it when the
/// extension is executable.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    let extension = cleaned
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if DANGEROUS_EXTENSIONS.contains(&extension.as_str()) || cleaned.is_empty() {
        return None;
    }
    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_chars_and_whitespace() {
        assert_eq!(clean_text("  a\u{0}b \t\n  c  ", TextPolicy::Plain), "ab c");
        assert_eq!(remove_control_chars("x\u{7f}y"), "xy");
    }

    #[test]
    fn test_plain_text_strips_markup() {
        assert_eq!(
            clean_text("<b>Hello</b> <script>alert(1)</script>there", TextPolicy::Plain),
            "Hello there"
        );
    }

    #[test]
    fn test_plain_text_keeps_ampersands_literal() {
        assert_eq!(clean_text("R&D and Q&amp;A", TextPolicy::Plain), "R&D and Q&A");
        assert_eq!(
            clean_text("a < b &lt;i&gt;", TextPolicy::Plain),
            "a &lt; b &lt;i&gt;"
        );
    }

    #[test]
    fn test_rich_text_keeps_allow_list() {
        let cleaned = clean_text(
            r#"<p class="lead" onclick="x()">Hi <a href="https://example.com" target="_blank">link</a></p><iframe src="x"></iframe>"#,
            TextPolicy::Rich,
        );
        assert!(cleaned.contains(r#"<p class="lead">"#));
        assert!(cleaned.contains(r#"<a href="https://example.com">link</a>"#));
        assert!(!cleaned.contains("onclick"));
        assert!(!cleaned.contains("iframe"));
        assert!(!cleaned.contains("target"));
    }

    #[test]
    fn test_secret_fields_are_not_reflowed() {
        let out = sanitize_value(json!({ "password": "a  <b>c", "name": "a  <b>c</b>" }), &[]);
        assert_eq!(out["password"], "a  <b>c");
        assert_eq!(out["name"], "a c");
    }

    #[test]
    fn test_recurses_and_preserves_non_strings() {
        let out = sanitize_value(
            json!({
                "title": " Title ",
                "count": 3,
                "featured": true,
                "missing": null,
                "technologies": ["  Rust ", "<i>Axum</i>"],
                "author": { "name": " Jane\u{0} " },
                "content": "<p>Body</p>"
            }),
            &["content"],
        );
        assert_eq!(
            out,
            json!({
                "title": "Title",
                "count": 3,
                "featured": true,
                "missing": null,
                "technologies": ["Rust", "Axum"],
                "author": { "name": "Jane" },
                "content": "<p>Body</p>"
            })
        );
    }

    #[test]
    fn test_non_object_passes_through() {
        assert_eq!(sanitize_value(json!(42), &[]), json!(42));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my photo (1).png").as_deref(), Some("my_photo__1_.png"));
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("payload.EXE"), None);
        assert_eq!(sanitize_filename("script.js"), None);
        assert_eq!(sanitize_filename("..."), None);
    }
}
