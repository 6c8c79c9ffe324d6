use serde::{Deserialize, Serialize};

/// One searchable section: a heading and the text up to the next heading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDoc {
    /// Route and fragment, e.g. `guide/intro#setup`.
    pub id: String,
    /// Link to the section, e.g. `/p/guide/intro#setup`.
    pub url: String,
    pub title: String,
    pub body: String,
}

/// Accumulates [`SearchDoc`]s while rendered content is scanned.
pub(crate) struct DocCollector {
    route: String,
    docs: Vec<SearchDoc>,
}

impl DocCollector {
    /// `route` is the page's source path, or `/` for the index page.
    pub(crate) fn new(route: &str) -> Self {
        let route = route
            .strip_suffix(".md")
            .or_else(|| route.strip_suffix(".html"))
            .unwrap_or(route);
        Self {
            route: route.to_owned(),
            docs: Vec::new(),
        }
    }

    pub(crate) fn start_section(&mut self, id: &str, title: &str) {
        let base = if self.route == "/" {
            "/".to_owned()
        } else {
            format!("/p/{}", self.route)
        };
        tracing::trace!(route = %self.route, id, "Search section");
        self.docs.push(SearchDoc {
            id: format!("{}#{id}", self.route),
            url: format!("{base}#{id}"),
            title: title.to_owned(),
            body: String::new(),
        });
    }

    /// Append text to the current section. Text before the first heading is
    /// not indexed.
    pub(crate) fn push_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if let Some(doc) = self.docs.last_mut() {
            doc.body.push_str(text);
        }
    }

    /// Separate the text of consecutive blocks.
    pub(crate) fn end_block(&mut self) {
        if let Some(doc) = self.docs.last_mut()
            && !doc.body.is_empty()
            && !doc.body.ends_with(char::is_whitespace)
        {
            doc.body.push(' ');
        }
    }

    pub(crate) fn finish(self) -> Vec<SearchDoc> {
        self.docs
            .into_iter()
            .map(|mut doc| {
                doc.body.truncate(doc.body.trim_end().len());
                doc
            })
            .collect()
    }
}
