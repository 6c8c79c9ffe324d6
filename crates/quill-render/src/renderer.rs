//! Page renderer boundary and the default Markdown + template implementation.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, Value, context, path_loader};
use quill_assets::{AssetMapping, rewrite_asset_links};
use quill_config::Mode;
use quill_nav::{FragmentRenderer, Layout};

use crate::RenderError;
use crate::html::{assign_heading_ids, extract_docs};
use crate::markdown::render_markdown;
use crate::raw::RawBlocks;
use crate::search::SearchDoc;

/// A page to render.
#[derive(Clone, Copy, Debug)]
pub struct PageRequest<'a> {
    /// Source file (`.md` or `.html`).
    pub source: &'a Path,
    /// Page template name.
    pub template: &'a str,
    /// Source path relative to the content directory, or `/` for the index.
    pub route: &'a str,
}

/// Output of rendering one page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    pub docs: Vec<SearchDoc>,
}

/// Turns sources into complete pages.
///
/// Implementations also render standalone fragments such as the footer.
pub trait PageRenderer: FragmentRenderer + Send + Sync {
    /// Render a page into its template.
    ///
    /// With `assets`, `/assets/...` references in the output are rewritten
    /// to their content-addressed names.
    fn render_page(
        &self,
        page: &PageRequest<'_>,
        layout: &Layout,
        assets: Option<&AssetMapping>,
    ) -> Result<RenderedPage, RenderError>;

    /// Render a template that has no page content, such as the sidebar
    /// editor.
    fn render_view(
        &self,
        template: &str,
        layout: &Layout,
        edit_page: bool,
    ) -> Result<String, RenderError>;
}

/// Renders Markdown and HTML sources through templates loaded from a
/// directory.
pub struct MarkdownRenderer {
    env: Environment<'static>,
    templates_dir: PathBuf,
    mode: Mode,
    debug: bool,
}

impl MarkdownRenderer {
    /// Templates are read from `templates_dir` on first use.
    pub fn new(templates_dir: impl Into<PathBuf>, mode: Mode) -> Self {
        let templates_dir = templates_dir.into();
        let mut env = Environment::new();
        env.set_loader(path_loader(templates_dir.clone()));
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_keep_trailing_newline(true);
        Self {
            env,
            templates_dir,
            mode,
            debug: false,
        }
    }

    /// Expose `Debug = true` to templates.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    fn edit_mode(&self) -> bool {
        self.mode == Mode::Edit
    }

    /// Source file to HTML fragment with heading IDs.
    fn render_content(&self, source: &Path, layout: &Layout) -> Result<String, RenderError> {
        let is_markdown = match source.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("md") => true,
            Some(ext) if ext.eq_ignore_ascii_case("html") => false,
            _ => return Err(RenderError::UnsupportedSource(source.to_path_buf())),
        };

        let text = std::fs::read_to_string(source).map_err(|e| RenderError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let (text, raws) = RawBlocks::extract(&text)
            .ok_or_else(|| RenderError::UnmatchedRaw(source.to_path_buf()))?;

        let html = if is_markdown {
            render_markdown(&text)
        } else {
            text
        };
        let html = assign_heading_ids(&html)?;

        let ctx = context! {
            Layout => layout_value(layout),
            EditMode => self.edit_mode(),
            Debug => self.debug,
        };
        let html = self
            .env
            .render_str(&html, ctx)
            .map_err(|e| RenderError::template(source.display().to_string(), e))?;

        if raws.is_empty() {
            return Ok(html);
        }
        Ok(raws.restore(&html))
    }

    fn render_template(&self, name: &str, ctx: Value) -> Result<String, RenderError> {
        self.env
            .get_template(name)
            .and_then(|tmpl| tmpl.render(ctx))
            .map_err(|e| RenderError::template(name, e))
    }
}

impl PageRenderer for MarkdownRenderer {
    fn render_page(
        &self,
        page: &PageRequest<'_>,
        layout: &Layout,
        assets: Option<&AssetMapping>,
    ) -> Result<RenderedPage, RenderError> {
        let content = self.render_content(page.source, layout)?;
        let docs = extract_docs(&content, page.route);
        let ctx = context! {
            Layout => layout_value(layout),
            Content => Value::from_safe_string(content),
            EditMode => self.edit_mode(),
            EditPage => false,
            Debug => self.debug,
        };
        let mut html = self.render_template(page.template, ctx)?;
        if let Some(mapping) = assets {
            html = rewrite_asset_links(&html, mapping);
        }
        tracing::debug!(source = %page.source.display(), template = page.template, bytes = html.len(), "Rendered page");
        Ok(RenderedPage { html, docs })
    }

    fn render_view(
        &self,
        template: &str,
        layout: &Layout,
        edit_page: bool,
    ) -> Result<String, RenderError> {
        let ctx = context! {
            Layout => layout_value(layout),
            EditMode => self.edit_mode(),
            EditPage => edit_page,
            Debug => self.debug,
        };
        self.render_template(template, ctx)
    }
}

impl FragmentRenderer for MarkdownRenderer {
    fn render_fragment(
        &self,
        source: &Path,
        layout: &Layout,
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        Ok(self.render_content(source, layout)?)
    }
}

/// Template view of the layout, including the runtime-only fields.
fn layout_value(layout: &Layout) -> Value {
    context! {
        Title => &layout.title,
        InlineIcon => Value::from_safe_string(layout.inline_icon.clone()),
        IndexTmpl => &layout.index_template,
        Sidebar => &layout.sidebar,
        Icon => &layout.icon,
        Footer => Value::from_safe_string(layout.footer.clone()),
    }
}
