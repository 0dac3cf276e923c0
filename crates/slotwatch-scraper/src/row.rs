//! Row handles over a scraped results page.
//!
//! The extractor only sees the [`SlotRow`] trait. [`HtmlRow`] is the
//! regex-backed implementation used for pages fetched over HTTP; tests and
//! alternate drivers can provide their own.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractionError;

static TBODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tbody\b[^>]*>(.*?)</tbody>").expect("valid regex"));
static TR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid regex"));
static TD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("valid regex"));
static FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<form\b[^>]*>(.*?)</form>").expect("valid regex"));
static INPUT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid regex"));
static ANCHOR_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>").expect("valid regex"));
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static TYPE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("type"));
static NAME_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("name"));
static VALUE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("value"));
static HREF_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("href"));

/// One scraped row as seen by the extractor.
///
/// Every accessor may fail; the extractor decides which failures drop the
/// row and which only blank a field.
pub trait SlotRow {
    /// Cell texts in column order.
    fn cells(&self) -> Result<Vec<String>, ExtractionError>;

    /// Named hidden fields of a form nested in the row, or `None` when the
    /// row has no form. Inputs without a `value` map to an empty string.
    fn hidden_fields(&self) -> Result<Option<Vec<(String, String)>>, ExtractionError>;

    /// Visible text of the whole row.
    fn text(&self) -> Result<String, ExtractionError>;

    /// `href` of the first link in the row.
    fn link_href(&self) -> Result<Option<String>, ExtractionError>;
}

/// A `<tr>` element captured from a results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlRow {
    inner_html: String,
}

impl HtmlRow {
    #[must_use]
    pub fn new(inner_html: impl Into<String>) -> Self {
        Self {
            inner_html: inner_html.into(),
        }
    }
}

impl SlotRow for HtmlRow {
    fn cells(&self) -> Result<Vec<String>, ExtractionError> {
        Ok(TD_RE
            .captures_iter(&self.inner_html)
            .filter_map(|c| c.get(1))
            .map(|m| visible_text(m.as_str()))
            .collect())
    }

    fn hidden_fields(&self) -> Result<Option<Vec<(String, String)>>, ExtractionError> {
        let Some(form) = FORM_RE.captures(&self.inner_html).and_then(|c| c.get(1)) else {
            return Ok(None);
        };

        let fields = INPUT_TAG_RE
            .find_iter(form.as_str())
            .map(|m| m.as_str())
            .filter(|tag| {
                extract_attr(tag, &TYPE_ATTR_RE).is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
            })
            .filter_map(|tag| {
                let name = extract_attr(tag, &NAME_ATTR_RE).filter(|n| !n.is_empty())?;
                let value = extract_attr(tag, &VALUE_ATTR_RE).unwrap_or_default();
                Some((name, decode_entities(&value)))
            })
            .collect();

        Ok(Some(fields))
    }

    fn text(&self) -> Result<String, ExtractionError> {
        Ok(visible_text(&self.inner_html))
    }

    fn link_href(&self) -> Result<Option<String>, ExtractionError> {
        Ok(ANCHOR_TAG_RE
            .find_iter(&self.inner_html)
            .find_map(|m| extract_attr(m.as_str(), &HREF_ATTR_RE))
            .map(|href| decode_entities(&href)))
    }
}

/// Split a results page into row handles.
///
/// Rows are taken from `<tbody>` sections so header rows are skipped. Pages
/// without a `<tbody>` fall back to every `<tr>` in the document.
#[must_use]
pub fn parse_rows(html: &str) -> Vec<HtmlRow> {
    let bodies: Vec<&str> = TBODY_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let scopes = if bodies.is_empty() { vec![html] } else { bodies };

    scopes
        .into_iter()
        .flat_map(|scope| {
            TR_RE
                .captures_iter(scope)
                .filter_map(|c| c.get(1).map(|m| HtmlRow::new(m.as_str())))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Text content of an HTML fragment with tags stripped, entities decoded and
/// whitespace collapsed.
pub(crate) fn visible_text(fragment: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(fragment, " ");
    let without_tags = TAG_RE.replace_all(&without_scripts, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&aacute;", "á")
        .replace("&eacute;", "é")
        .replace("&iacute;", "í")
        .replace("&oacute;", "ó")
        .replace("&uacute;", "ú")
        .replace("&ntilde;", "ñ")
        .replace("&Ntilde;", "Ñ")
        .replace("&amp;", "&")
}

fn attr_regex(attr: &str) -> Regex {
    Regex::new(&format!(
        r#"(?is)[\s"']{attr}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#
    ))
    .expect("valid attr regex")
}

/// Value of the attribute matched by `attr_re` in a single start tag. Quoted
/// values may be empty; unquoted values run to the next whitespace or `>`.
fn extract_attr(tag: &str, attr_re: &Regex) -> Option<String> {
    let caps = attr_re.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
}
