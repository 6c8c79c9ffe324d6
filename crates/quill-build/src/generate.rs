//! Rendering every page of a layout into an output tree.

use std::fs;
use std::path::{Path, PathBuf};

use quill_assets::AssetMapping;
use quill_cache::gzip;
use quill_nav::{Layout, NodeKind};
use quill_render::{PageRenderer, PageRequest, SearchDoc};

use crate::error::{BuildError, PageError, PageFailure};

/// Source of the index page, relative to the content directory.
pub(crate) const INDEX_SOURCE: &str = ".index.md";

/// Result of a successful generation pass.
pub(crate) struct Generated {
    /// Gzip-encoded index page.
    pub index_page: Vec<u8>,
    /// Search sections of the index page and every written page, in
    /// sidebar order.
    pub docs: Vec<SearchDoc>,
    pub pages: usize,
}

/// Render the index page and every `file` node of `layout` into `out_dir`.
///
/// `out_dir` is created fresh. A failing page does not stop the pass; all
/// failures are reported together at the end.
pub(crate) fn generate<R: PageRenderer + ?Sized>(
    renderer: &R,
    layout: &Layout,
    assets: &AssetMapping,
    content_dir: &Path,
    out_dir: &Path,
) -> Result<Generated, BuildError> {
    if out_dir.exists() {
        fs::remove_dir_all(out_dir).map_err(|e| BuildError::io(out_dir, e))?;
    }
    fs::create_dir_all(out_dir).map_err(|e| BuildError::io(out_dir, e))?;

    let index_source = content_dir.join(INDEX_SOURCE);
    let index = renderer
        .render_page(
            &PageRequest {
                source: &index_source,
                template: &layout.index_template,
                route: "/",
            },
            layout,
            Some(assets),
        )
        .map_err(BuildError::IndexPage)?;
    let index_page = gzip(index.html.as_bytes()).map_err(|e| BuildError::io(&index_source, e))?;
    tracing::debug!(
        raw = index.html.len(),
        gzipped = index_page.len(),
        "Generated index page"
    );

    let mut docs = index.docs;
    let mut failures = Vec::new();
    let mut visited = 0;
    let mut pages = 0;

    for node in layout.nodes() {
        visited += 1;
        if node.kind != NodeKind::File {
            continue;
        }
        let source = content_dir.join(&node.path);
        let page = PageRequest {
            source: &source,
            template: &node.template,
            route: &node.path,
        };
        let result = renderer
            .render_page(&page, layout, Some(assets))
            .map_err(PageError::from)
            .and_then(|rendered| {
                let target = out_dir.join(node.output_path());
                write_page(&target, rendered.html.as_bytes())?;
                tracing::debug!(path = %target.display(), bytes = rendered.html.len(), "Generated page");
                Ok(rendered.docs)
            });
        match result {
            Ok(page_docs) => {
                docs.extend(page_docs);
                pages += 1;
            }
            Err(error) => {
                tracing::error!(path = %node.path, %error, "Page generation failed");
                failures.push(PageFailure {
                    path: node.path.clone(),
                    error,
                });
            }
        }
    }

    if !failures.is_empty() {
        return Err(BuildError::Render { failures });
    }

    tracing::debug!(visited, pages, "Generated output");
    if visited == 0 {
        tracing::warn!("Sidebar is empty, check the layout and content directory");
    }
    if pages == 0 {
        tracing::warn!("No pages generated, check the layout and templates");
    }

    Ok(Generated {
        index_page,
        docs,
        pages,
    })
}

fn write_page(target: &Path, html: &[u8]) -> Result<(), PageError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, html)?;
    Ok(())
}

/// Sibling directory new output is generated into before the swap.
pub(crate) fn staging_dir(output: &Path) -> PathBuf {
    sibling(output, "staging")
}

fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let name = output
        .file_name()
        .map_or_else(|| "output".into(), |n| n.to_string_lossy());
    output.with_file_name(format!(".{name}.{suffix}"))
}

/// Replace `output` with `staging`.
///
/// The previous output is moved aside first and removed after the new tree
/// is in place, so `output` is only ever absent between two renames.
pub(crate) fn swap_into_place(staging: &Path, output: &Path) -> Result<(), BuildError> {
    let retired = sibling(output, "old");
    if retired.exists() {
        fs::remove_dir_all(&retired).map_err(|e| BuildError::io(&retired, e))?;
    }
    let had_output = output.exists();
    if had_output {
        fs::rename(output, &retired).map_err(|e| BuildError::io(output, e))?;
    }
    if let Err(e) = fs::rename(staging, output) {
        if had_output && let Err(restore) = fs::rename(&retired, output) {
            tracing::error!(path = %output.display(), error = %restore, "Failed to restore previous output");
        }
        return Err(BuildError::io(staging, e));
    }
    if had_output && let Err(e) = fs::remove_dir_all(&retired) {
        tracing::warn!(path = %retired.display(), error = %e, "Failed to remove previous output");
    }
    Ok(())
}
