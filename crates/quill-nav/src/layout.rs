//! Persisted site layout.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::NavError;
use crate::node::{NavNode, NodeKind, Nodes, null_as_empty};
use crate::reconcile;

/// Site title used when no layout exists yet.
pub const DEFAULT_TITLE: &str = "Quill";

/// Template for the index page when none is configured.
pub const DEFAULT_INDEX_TEMPLATE: &str = "page-nav.html";

const FOOTER_FILE: &str = ".footer.md";

/// Icon file names looked up in the assets directory, with their MIME types.
const ICON_CANDIDATES: &[(&str, &str)] = &[
    ("icon.ico", "image/x-icon"),
    ("icon.svg", "image/svg+xml"),
    ("icon.png", "image/png"),
    ("icon.jpg", "image/jpeg"),
    ("icon.jpeg", "image/jpeg"),
    ("icon.avif", "image/avif"),
];

/// Site icon discovered in the assets directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SiteIcon {
    pub href: String,
    pub mime: String,
}

/// Locations the layout is reconciled against.
#[derive(Clone, Debug)]
pub struct NavPaths {
    pub content_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub layout_file: PathBuf,
}

/// Renders a markdown file to an HTML fragment.
///
/// Used for the site footer, which lives next to the content.
pub trait FragmentRenderer {
    fn render_fragment(
        &self,
        source: &Path,
        layout: &Layout,
    ) -> Result<String, Box<dyn StdError + Send + Sync>>;
}

/// Site-wide layout: title, index template and sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Layout {
    pub title: String,
    /// Raw HTML placed next to the title.
    pub inline_icon: String,
    #[serde(rename = "IndexTmpl")]
    pub index_template: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub sidebar: Vec<NavNode>,

    #[serde(skip)]
    pub icon: Option<SiteIcon>,
    /// Rendered footer HTML.
    #[serde(skip)]
    pub footer: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_owned(),
            inline_icon: String::new(),
            index_template: DEFAULT_INDEX_TEMPLATE.to_owned(),
            sidebar: Vec::new(),
            icon: None,
            footer: String::new(),
        }
    }
}

impl Layout {
    /// Load `layout.json`, reconcile it and write it back.
    ///
    /// A missing file is seeded from defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, the content
    /// directory contains a path that is not URL safe, the footer fails to
    /// render, or the result cannot be saved.
    pub fn load(paths: &NavPaths, fragments: &dyn FragmentRenderer) -> Result<Self, NavError> {
        let mut layout = match fs::read(&paths.layout_file) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %paths.layout_file.display(), "No layout found, using defaults");
                Self::default()
            }
            Err(e) => return Err(NavError::io(&paths.layout_file, e)),
        };
        layout.reconcile(paths, fragments)?;
        Ok(layout)
    }

    /// Replace the layout with `data`, reconcile it and persist it.
    ///
    /// Used when the sidebar is edited through the UI.
    ///
    /// # Errors
    ///
    /// See [`Layout::load`].
    pub fn from_json(
        data: &[u8],
        paths: &NavPaths,
        fragments: &dyn FragmentRenderer,
    ) -> Result<Self, NavError> {
        let mut layout: Self = serde_json::from_slice(data)?;
        layout.reconcile(paths, fragments)?;
        Ok(layout)
    }

    /// Pretty-printed JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, NavError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Merge the sidebar with the content directory, resolve the icon and
    /// footer, and save the result to `paths.layout_file`.
    ///
    /// # Errors
    ///
    /// See [`Layout::load`].
    pub fn reconcile(
        &mut self,
        paths: &NavPaths,
        fragments: &dyn FragmentRenderer,
    ) -> Result<(), NavError> {
        if self.index_template.is_empty() {
            self.index_template = DEFAULT_INDEX_TEMPLATE.to_owned();
        }

        let entries = reconcile::scan_content(&paths.content_dir)?;
        self.sidebar = reconcile::merge(std::mem::take(&mut self.sidebar), &entries);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(tree = %self.debug_tree(), "Reconciled sidebar");
        }

        self.icon = find_icon(&paths.assets_dir);
        self.footer = render_footer(self, &paths.content_dir, fragments)?;

        self.save(&paths.layout_file)
    }

    /// Write the layout atomically to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Io`] if the file or its parent directory cannot be
    /// written.
    pub fn save(&self, path: &Path) -> Result<(), NavError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| NavError::io(parent, e))?;
        }
        let json = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| NavError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| NavError::io(path, e))
    }

    /// All sidebar nodes in pre-order.
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes::new(&self.sidebar)
    }

    /// The page whose route (path without extension) is `route`.
    pub fn find_page(&self, route: &str) -> Option<&NavNode> {
        let route = route.trim_matches('/');
        self.nodes()
            .find(|n| n.kind == NodeKind::File && n.route() == route)
    }

    /// Text rendering of the sidebar for logs.
    pub fn debug_tree(&self) -> SidebarTree<'_> {
        SidebarTree(&self.sidebar)
    }
}

/// Sidebar drawn as an indented tree, one node per line.
#[derive(Debug, Clone, Copy)]
pub struct SidebarTree<'a>(&'a [NavNode]);

impl fmt::Display for SidebarTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tree(f, self.0, "")
    }
}

fn write_tree(f: &mut fmt::Formatter<'_>, nodes: &[NavNode], prefix: &str) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        let connector = if last { "└── " } else { "├── " };
        writeln!(
            f,
            "{prefix}{connector}{} (Type: {:?}, Path: {}, Pos: {})",
            node.label, node.kind, node.path, node.position
        )?;
        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        write_tree(f, &node.children, &child_prefix)?;
    }
    Ok(())
}

fn find_icon(assets_dir: &Path) -> Option<SiteIcon> {
    ICON_CANDIDATES
        .iter()
        .find(|(name, _)| assets_dir.join(name).is_file())
        .map(|(name, mime)| SiteIcon {
            href: format!("/assets/{name}"),
            mime: (*mime).to_owned(),
        })
}

fn render_footer(
    layout: &Layout,
    content_dir: &Path,
    fragments: &dyn FragmentRenderer,
) -> Result<String, NavError> {
    let path = content_dir.join(FOOTER_FILE);
    if !path.is_file() {
        tracing::warn!(path = %path.display(), "No footer found");
        return Ok(String::new());
    }
    fragments
        .render_fragment(&path, layout)
        .map_err(|source| NavError::Footer { path, source })
}
