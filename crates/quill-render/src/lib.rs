//! Page rendering for Quill.
//!
//! A page is produced in three steps:
//!
//! 1. The source is converted to an HTML fragment. Markdown goes through
//!    pulldown-cmark with GFM extensions and hard line breaks; HTML sources
//!    are used as they are. Every heading without an `id` then gets a unique
//!    one.
//! 2. The fragment is evaluated as a template, so content can refer to
//!    `Layout`, `EditMode` and `Debug`. Text wrapped in
//!    `{{< raw >}} ... {{< /raw >}}` is protected from both steps.
//! 3. The fragment is placed into the page template as `Content`, and
//!    `/assets/...` references are rewritten to content-addressed names.
//!
//! Each page also yields [`SearchDoc`] records, one per heading, taken from
//! the rendered content. Elements marked with [`NOSEARCH_ATTR`] are left
//! out.

mod error;
mod html;
mod markdown;
mod raw;
mod renderer;
mod search;

pub use error::RenderError;
pub use html::{MAX_ID_SUFFIX, NOSEARCH_ATTR};
pub use markdown::slugify;
pub use renderer::{MarkdownRenderer, PageRenderer, PageRequest, RenderedPage};
pub use search::SearchDoc;
