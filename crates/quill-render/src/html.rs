//! Passes over rendered HTML: heading IDs and search sections.
//!
//! Content is read with a lenient [`quick_xml`] reader. End tag names are
//! not checked, unmatched end tags and bare `&` are accepted, and void
//! elements such as `<br>` need no closing tag. Markup the reader still
//! rejects ends the pass early and keeps what was found up to that point.

use std::borrow::Cow;
use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::RenderError;
use crate::markdown::slugify;
use crate::search::{DocCollector, SearchDoc};

/// Highest numeric suffix tried when making a heading ID unique.
pub const MAX_ID_SUFFIX: u32 = 100;

/// Elements carrying this attribute are left out of the search index,
/// together with everything inside them.
pub const NOSEARCH_ATTR: &str = "data-nosearch";

const VOID_ELEMENTS: &[&[u8]] = &[
    b"area", b"base", b"br", b"col", b"embed", b"hr", b"img", b"input", b"link", b"meta",
    b"source", b"track", b"wbr",
];

const UNSEARCHABLE_ELEMENTS: &[&[u8]] = &[b"script", b"style"];

/// Elements whose end separates words in search text.
const BLOCK_ELEMENTS: &[&[u8]] = &[
    b"p", b"li", b"pre", b"td", b"th", b"tr", b"dt", b"dd", b"blockquote", b"div", b"section",
    b"article",
];

fn reader(html: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;
    reader
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn is_heading(name: &[u8]) -> bool {
    matches!(name, [b'h' | b'H', b'1'..=b'6'])
}

fn is_one_of(name: &[u8], set: &[&[u8]]) -> bool {
    set.iter().any(|candidate| name.eq_ignore_ascii_case(candidate))
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.html_attributes()
        .flatten()
        .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(key.as_bytes()))
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn decode(reader: &Reader<&[u8]>, bytes: &[u8]) -> String {
    reader.decoder().decode(bytes).map_or_else(
        |_| String::from_utf8_lossy(bytes).into_owned(),
        Cow::into_owned,
    )
}

/// Text of an entity reference such as `amp` or `#x27`. Unknown names are
/// kept as written.
fn entity(name: &str) -> String {
    match name {
        "lt" => "<".to_owned(),
        "gt" => ">".to_owned(),
        "amp" => "&".to_owned(),
        "apos" => "'".to_owned(),
        "quot" => "\"".to_owned(),
        "nbsp" => "\u{a0}".to_owned(),
        _ => name
            .strip_prefix('#')
            .and_then(|code| match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse().ok(),
            })
            .and_then(char::from_u32)
            .map_or_else(|| format!("&{name};"), String::from),
    }
}

/// Give every heading without an `id` one derived from its text.
///
/// IDs already present anywhere in `html` are never reused. A taken ID gets
/// the first free numeric suffix up to [`MAX_ID_SUFFIX`]. Headings whose
/// text has no usable characters are left alone.
pub(crate) fn assign_heading_ids(html: &str) -> Result<String, RenderError> {
    let (used, headings) = scan_headings(html);
    let mut ids = HeadingIds { used };
    let mut out = String::with_capacity(html.len() + headings.len() * 16);
    let mut copied = 0;

    for heading in headings {
        let Some(at) = heading.insert_at else {
            continue;
        };
        let Some(id) = ids.assign(&heading.text)? else {
            continue;
        };
        let Some(before) = html.get(copied..at) else {
            continue;
        };
        out.push_str(before);
        out.push_str(" id=\"");
        out.push_str(&id);
        out.push('"');
        copied = at;
    }
    out.push_str(html.get(copied..).unwrap_or_default());
    Ok(out)
}

struct Heading {
    /// Byte offset just past the tag name, or `None` if the heading already
    /// has an `id`.
    insert_at: Option<usize>,
    text: String,
}

/// Every `id` in the document, and the headings in document order.
fn scan_headings(html: &str) -> (HashSet<String>, Vec<Heading>) {
    let mut reader = reader(html);
    let mut used = HashSet::new();
    let mut headings = Vec::new();
    let mut current: Option<Heading> = None;

    loop {
        let start = position(&reader);
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, position = start, "Unparseable HTML, heading scan stopped");
                break;
            }
        };
        match event {
            Event::Start(e) => {
                let id = attribute(&e, "id");
                if current.is_none() && is_heading(e.local_name().as_ref()) {
                    current = Some(Heading {
                        insert_at: id
                            .is_none()
                            .then(|| start.saturating_add(1 + e.name().as_ref().len())),
                        text: String::new(),
                    });
                }
                used.extend(id);
            }
            Event::Empty(e) => used.extend(attribute(&e, "id")),
            Event::End(e) if is_heading(e.local_name().as_ref()) => {
                headings.extend(current.take());
            }
            Event::Text(e) => {
                if let Some(heading) = &mut current {
                    heading.text.push_str(&decode(&reader, &e));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(heading) = &mut current {
                    heading.text.push_str(&entity(&decode(&reader, &e)));
                }
            }
            _ => {}
        }
    }
    (used, headings)
}

/// IDs already present on the page.
struct HeadingIds {
    used: HashSet<String>,
}

impl HeadingIds {
    /// A fresh ID for a heading with `text`, or `None` if the text has no
    /// usable characters.
    fn assign(&mut self, text: &str) -> Result<Option<String>, RenderError> {
        let base = slugify(text);
        if base.is_empty() {
            return Ok(None);
        }
        if self.used.insert(base.clone()) {
            return Ok(Some(base));
        }
        for n in 1..=MAX_ID_SUFFIX {
            let candidate = format!("{base}-{n}");
            if !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return Ok(Some(candidate));
            }
        }
        Err(RenderError::HeadingIdExhausted(base))
    }
}

struct Open {
    name: Vec<u8>,
    excluded: bool,
}

struct OpenHeading {
    id: Option<String>,
    title: String,
}

/// Search sections of a rendered content fragment, one per heading with an
/// `id`.
///
/// A section's body is the text after its heading up to the next one.
/// `script`, `style` and elements marked with [`NOSEARCH_ATTR`] are skipped
/// along with any headings inside them. Text after a heading without an
/// `id` stays in the preceding section.
pub(crate) fn extract_docs(html: &str, route: &str) -> Vec<SearchDoc> {
    let mut reader = reader(html);
    let mut docs = DocCollector::new(route);
    let mut open: Vec<Open> = Vec::new();
    let mut heading: Option<OpenHeading> = None;

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(route, error = %e, "Unparseable HTML, search extraction stopped");
                break;
            }
        };
        let excluded = open.last().is_some_and(|o| o.excluded);

        match event {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                let skip = excluded
                    || is_one_of(name, UNSEARCHABLE_ELEMENTS)
                    || attribute(&e, NOSEARCH_ATTR).is_some();
                if !skip && heading.is_none() && is_heading(name) {
                    heading = Some(OpenHeading {
                        id: attribute(&e, "id"),
                        title: String::new(),
                    });
                }
                if !is_one_of(name, VOID_ELEMENTS) {
                    open.push(Open {
                        name: name.to_ascii_lowercase(),
                        excluded: skip,
                    });
                }
            }
            Event::End(e) => {
                let name = e.local_name().as_ref().to_ascii_lowercase();
                if let Some(pos) = open.iter().rposition(|o| o.name == name) {
                    open.truncate(pos);
                }
                if is_heading(&name)
                    && let Some(done) = heading.take()
                {
                    if let Some(id) = done.id {
                        docs.start_section(&id, done.title.trim());
                    }
                } else if !excluded && is_one_of(&name, BLOCK_ELEMENTS) {
                    docs.end_block();
                }
            }
            Event::Text(e) if !excluded => {
                push_text(&mut heading, &mut docs, &decode(&reader, &e));
            }
            Event::GeneralRef(e) if !excluded => {
                push_text(&mut heading, &mut docs, &entity(&decode(&reader, &e)));
            }
            _ => {}
        }
    }
    docs.finish()
}

fn push_text(heading: &mut Option<OpenHeading>, docs: &mut DocCollector, text: &str) {
    match heading {
        Some(heading) => heading.title.push_str(text),
        None => docs.push_text(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::render_markdown;
    use pretty_assertions::assert_eq;

    fn ids(markdown: &str) -> String {
        assign_heading_ids(&render_markdown(markdown)).unwrap()
    }

    fn sections(html: &str) -> Vec<(String, String, String)> {
        extract_docs(html, "guide/intro.md")
            .into_iter()
            .map(|d| (d.id, d.title, d.body))
            .collect()
    }

    fn section(id: &str, title: &str, body: &str) -> (String, String, String) {
        (id.to_owned(), title.to_owned(), body.to_owned())
    }

    #[test]
    fn test_heading_ids() {
        let html = ids("# Getting Started\n\n## Install `quill`\n");
        assert!(html.contains("<h1 id=\"getting-started\">Getting Started</h1>"));
        assert!(html.contains("<h2 id=\"install-quill\">"));
    }

    #[test]
    fn test_duplicate_heading_ids() {
        let html = ids("## Notes\n\n## Notes\n\n## Notes\n");
        assert!(html.contains("id=\"notes\""));
        assert!(html.contains("id=\"notes-1\""));
        assert!(html.contains("id=\"notes-2\""));
    }

    #[test]
    fn test_generated_ids_skip_explicit_ones() {
        let html = ids("## Setup\n\n## Other {#setup-1}\n\n## Setup\n");
        assert!(html.contains("<h2 id=\"setup\">"));
        assert!(html.contains("<h2 id=\"setup-1\">Other</h2>"));
        assert!(html.contains("<h2 id=\"setup-2\">"));
    }

    #[test]
    fn test_generated_ids_skip_ids_on_other_elements() {
        let html = assign_heading_ids("<div id=\"faq\"></div><h2>FAQ</h2>").unwrap();
        assert_eq!(html, "<div id=\"faq\"></div><h2 id=\"faq-1\">FAQ</h2>");
    }

    #[test]
    fn test_heading_id_exhausted() {
        let markdown = "## Same\n\n".repeat(MAX_ID_SUFFIX as usize + 2);
        let err = assign_heading_ids(&render_markdown(&markdown)).unwrap_err();
        assert!(matches!(err, RenderError::HeadingIdExhausted(ref id) if id == "same"));
    }

    #[test]
    fn test_heading_id_limit_reached_exactly() {
        let html = ids(&"## Same\n\n".repeat(MAX_ID_SUFFIX as usize + 1));
        assert!(html.contains("id=\"same-100\""));
    }

    #[test]
    fn test_heading_without_slug_has_no_id() {
        let html = ids("## ???\n\ntext\n");
        assert!(html.contains("<h2>???</h2>"));
    }

    #[test]
    fn test_html_headings_get_ids() {
        let html = assign_heading_ids(
            "<section class=\"intro\"><H3 class=\"x\">Tips &amp; Tricks</H3><br><p>a</section>",
        )
        .unwrap();
        assert_eq!(
            html,
            "<section class=\"intro\"><H3 id=\"tips-tricks\" class=\"x\">Tips &amp; Tricks</H3><br><p>a</section>"
        );
    }

    #[test]
    fn test_search_sections() {
        let html = ids("Intro text.\n\n# Title\n\nFirst para.\n\nSecond `code`.\n\n## Next\n\n- item\n");
        assert_eq!(
            sections(&html),
            vec![
                section("guide/intro#title", "Title", "First para. Second code."),
                section("guide/intro#next", "Next", "item"),
            ]
        );
        assert_eq!(extract_docs(&html, "guide/intro.md")[0].url, "/p/guide/intro#title");
    }

    #[test]
    fn test_nosearch_subtree_is_skipped() {
        let html = "<h2 id=\"a\">A</h2><p>kept</p>\
                    <div data-nosearch><h2 id=\"hidden\">Hidden</h2><p>secret</p></div>\
                    <p>also kept</p>";
        assert_eq!(sections(html), vec![section("guide/intro#a", "A", "kept also kept")]);
    }

    #[test]
    fn test_script_and_style_are_skipped() {
        let html = "<h2 id=\"a\">A</h2><style>p { color: red }</style>\
                    <p>text</p><script>var x = 1;</script>";
        assert_eq!(sections(html), vec![section("guide/intro#a", "A", "text")]);
    }

    #[test]
    fn test_entities_are_decoded() {
        let html = "<h2 id=\"q\">Q&amp;A</h2><p>1 &lt; 2 &#x27;ok&#39;</p>";
        assert_eq!(sections(html), vec![section("guide/intro#q", "Q&A", "1 < 2 'ok'")]);
    }

    #[test]
    fn test_heading_without_id_continues_previous_section() {
        let html = "<h2 id=\"a\">A</h2><p>one</p><h2>???</h2><p>two</p>";
        assert_eq!(sections(html), vec![section("guide/intro#a", "A", "one two")]);
    }

    #[test]
    fn test_index_route() {
        let docs = extract_docs("<h1 id=\"welcome\">Welcome</h1>", "/");
        assert_eq!(docs[0].id, "/#welcome");
        assert_eq!(docs[0].url, "/#welcome");
    }
}
