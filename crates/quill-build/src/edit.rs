//! Edit mode: every request re-reads templates and layout and renders live.

use std::sync::{RwLock, RwLockReadGuard};

use quill_config::{Config, Mode};
use quill_nav::{Layout, NavError, NavPaths};
use quill_render::{MarkdownRenderer, PageRenderer, PageRequest};

use crate::generate::INDEX_SOURCE;
use crate::response::{Response, serve_static};

/// Template for the sidebar editor page.
pub const EDIT_TEMPLATE: &str = "edit.html";

/// Template rendered after a sidebar submission.
pub const SIDEBAR_TEMPLATE: &str = "sidebar.html";

type RendererFactory<P> = Box<dyn Fn() -> P + Send + Sync>;

struct Live<P> {
    renderer: P,
    layout: Layout,
}

/// Edit-mode site.
///
/// Holds the renderer and layout of the last refresh. A refresh takes the
/// write lock; a request renders under the read lock.
pub struct EditSite<P = MarkdownRenderer> {
    paths: NavPaths,
    factory: RendererFactory<P>,
    live: RwLock<Live<P>>,
}

impl EditSite {
    /// Edit site rendering with [`MarkdownRenderer`] from the configured
    /// templates directory.
    pub fn from_config(config: &Config) -> Self {
        let templates = config.paths_resolved.templates_dir.clone();
        let debug = config.debug;
        Self::new(
            config,
            Box::new(move || MarkdownRenderer::new(&templates, Mode::Edit).with_debug(debug)),
        )
    }
}

impl<P: PageRenderer> EditSite<P> {
    /// `factory` is called on every refresh so template edits are picked up.
    pub fn new(config: &Config, factory: RendererFactory<P>) -> Self {
        let paths = &config.paths_resolved;
        let renderer = factory();
        Self {
            paths: NavPaths {
                content_dir: paths.content_dir.clone(),
                assets_dir: paths.assets_dir.clone(),
                layout_file: paths.layout_file(),
            },
            factory,
            live: RwLock::new(Live {
                renderer,
                layout: Layout::default(),
            }),
        }
    }

    /// Reload templates, then reconcile and persist the layout.
    ///
    /// # Errors
    ///
    /// Returns the layout error; the previous state is kept.
    pub fn refresh(&self) -> Result<(), NavError> {
        let mut live = match self.live.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let renderer = (self.factory)();
        let layout = Layout::load(&self.paths, &renderer)?;
        *live = Live { renderer, layout };
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Live<P>> {
        match self.live.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn refreshed(&self) -> Result<RwLockReadGuard<'_, Live<P>>, Response> {
        if let Err(e) = self.refresh() {
            tracing::error!(error = %e, "Edit refresh failed");
            return Err(Response::internal("Edit refresh error"));
        }
        Ok(self.read())
    }

    /// `/`
    pub fn index(&self) -> Response {
        let live = match self.refreshed() {
            Ok(live) => live,
            Err(response) => return response,
        };
        let source = self.paths.content_dir.join(INDEX_SOURCE);
        let page = PageRequest {
            source: &source,
            template: &live.layout.index_template,
            route: "/",
        };
        match live.renderer.render_page(&page, &live.layout, None) {
            Ok(rendered) => Response::html(rendered.html.into_bytes()),
            Err(e) => {
                tracing::error!(error = %e, "Index page failed");
                Response::internal("Index file error")
            }
        }
    }

    /// `/p/<route>`
    pub fn page(&self, path: &str) -> Response {
        let live = match self.refreshed() {
            Ok(live) => live,
            Err(response) => return response,
        };
        let route = path.strip_prefix("/p/").unwrap_or(path);
        let Some(node) = live.layout.find_page(route) else {
            tracing::debug!(%route, "No page in layout");
            return Response::NotFound;
        };
        let source = self.paths.content_dir.join(&node.path);
        let page = PageRequest {
            source: &source,
            template: &node.template,
            route: &node.path,
        };
        match live.renderer.render_page(&page, &live.layout, None) {
            Ok(rendered) => Response::html(rendered.html.into_bytes()),
            Err(e) => {
                tracing::error!(path = %node.path, error = %e, "Page failed");
                Response::internal("Template render error")
            }
        }
    }

    /// `/edit`: the sidebar editor.
    pub fn edit_page(&self) -> Response {
        let live = match self.refreshed() {
            Ok(live) => live,
            Err(response) => return response,
        };
        view(&live, EDIT_TEMPLATE)
    }

    /// Replace the sidebar with a submitted layout, persist it and return the
    /// re-rendered sidebar.
    pub fn apply_sidebar(&self, body: &[u8]) -> Response {
        {
            let mut live = match self.live.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let renderer = (self.factory)();
            match Layout::from_json(body, &self.paths, &renderer) {
                Ok(layout) => *live = Live { renderer, layout },
                Err(e) => {
                    tracing::error!(error = %e, "Sidebar update rejected");
                    return Response::Error {
                        status: 400,
                        message: format!("Invalid JSON or update error: {e}"),
                    };
                }
            }
        }
        view(&self.read(), SIDEBAR_TEMPLATE)
    }

    /// `/assets/<path>`, straight from disk.
    pub fn static_asset(&self, path: &str) -> Response {
        serve_static(&self.paths.assets_dir, path)
    }

    /// Layout of the last refresh.
    pub fn layout(&self) -> Layout {
        self.read().layout.clone()
    }
}

fn view<P: PageRenderer>(live: &Live<P>, template: &str) -> Response {
    match live.renderer.render_view(template, &live.layout, true) {
        Ok(html) => Response::html(html.into_bytes()),
        Err(e) => {
            tracing::error!(%template, error = %e, "View failed");
            Response::internal("Template render error")
        }
    }
}

impl<P> std::fmt::Debug for EditSite<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSite")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
