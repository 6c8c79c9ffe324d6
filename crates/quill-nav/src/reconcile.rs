//! Merge of the persisted sidebar with the content directory.
//!
//! Reconciliation runs in three phases:
//!
//! 1. Flatten the persisted forest into filesystem nodes keyed by path and
//!    non-filesystem nodes grouped by their recorded parent path.
//! 2. Walk the content directory in file-name order and build the new tree
//!    in a flat arena, reusing persisted properties where paths match.
//! 3. Materialize the arena into a forest and normalize sibling order.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::NavError;
use crate::node::{DEFAULT_PAGE_TEMPLATE, NavNode, NodeKind, strip_extension};

/// A non-hidden entry under the content directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentEntry {
    /// Slash-separated path relative to the content directory.
    pub rel_path: String,
    pub is_dir: bool,
}

/// Walk `root` depth-first in file-name order, skipping dot-prefixed names.
pub(crate) fn scan_content(root: &Path) -> Result<Vec<ContentEntry>, NavError> {
    let mut entries = Vec::new();
    scan_directory(root, "", &mut entries)?;
    Ok(entries)
}

fn scan_directory(
    dir: &Path,
    prefix: &str,
    out: &mut Vec<ContentEntry>,
) -> Result<(), NavError> {
    let read = fs::read_dir(dir).map_err(|e| NavError::io(dir, e))?;
    let mut children = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| NavError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| NavError::io(entry.path(), e))?;
        children.push((entry.file_name(), entry.path(), file_type.is_dir()));
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path, is_dir) in children {
        if name.as_encoded_bytes().starts_with(b".") {
            continue;
        }
        let Some(name) = name.to_str() else {
            return Err(NavError::UnsafePath(format!(
                "{prefix}{}",
                name.to_string_lossy()
            )));
        };
        let rel_path = if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{prefix}/{name}")
        };
        if !is_url_safe(name) {
            return Err(NavError::UnsafePath(rel_path));
        }
        out.push(ContentEntry {
            rel_path: rel_path.clone(),
            is_dir,
        });
        if is_dir {
            scan_directory(&path, &rel_path, out)?;
        }
    }
    Ok(())
}

/// A path segment is URL safe if it has no control characters and survives
/// percent-encoding and decoding unchanged.
pub(crate) fn is_url_safe(segment: &str) -> bool {
    if segment.chars().any(char::is_control) {
        return false;
    }
    let encoded = utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string();
    percent_decode_str(&encoded)
        .decode_utf8()
        .is_ok_and(|decoded| decoded == segment)
}

struct Slot {
    node: NavNode,
    children: Vec<usize>,
}

/// Rebuild the sidebar forest from `persisted` and the content `entries`.
pub(crate) fn merge(persisted: Vec<NavNode>, entries: &[ContentEntry]) -> Vec<NavNode> {
    let (mut fs_nodes, mut extras) = flatten(persisted);

    let mut arena = vec![Slot {
        node: NavNode::default(),
        children: Vec::new(),
    }];
    let mut index: HashMap<String, usize> = HashMap::new();
    attach_extras(&mut arena, 0, extras.remove(""));

    for entry in entries {
        let mut parent = 0;
        let mut cur = String::new();
        let segments: Vec<&str> = entry.rel_path.split('/').collect();
        for (i, name) in segments.iter().enumerate() {
            if !cur.is_empty() {
                cur.push('/');
            }
            cur.push_str(name);

            if let Some(&existing) = index.get(&cur) {
                parent = existing;
                continue;
            }

            let is_leaf = i + 1 == segments.len();
            let kind = if entry.is_dir || !is_leaf {
                NodeKind::Folder
            } else {
                NodeKind::File
            };
            let node = new_node(kind, &cur, name, fs_nodes.remove(&cur));

            let idx = arena.len();
            arena.push(Slot {
                node,
                children: Vec::new(),
            });
            attach_extras(&mut arena, idx, extras.remove(&cur));
            arena[parent].children.push(idx);
            index.insert(cur.clone(), idx);
            parent = idx;
        }
    }

    if !extras.is_empty() {
        tracing::debug!(
            parents = ?extras.keys().collect::<Vec<_>>(),
            "Dropping sidebar entries whose folder no longer exists"
        );
    }

    let mut roots = materialize(&mut arena, 0).children;
    normalize(&mut roots);
    roots
}

/// Split the persisted forest into filesystem nodes by path and the rest
/// grouped by parent path, in pre-order.
fn flatten(persisted: Vec<NavNode>) -> (HashMap<String, NavNode>, HashMap<String, Vec<NavNode>>) {
    let mut fs_nodes = HashMap::new();
    let mut extras: HashMap<String, Vec<NavNode>> = HashMap::new();
    let mut stack: Vec<NavNode> = persisted.into_iter().rev().collect();

    while let Some(mut node) = stack.pop() {
        stack.extend(std::mem::take(&mut node.children).into_iter().rev());
        if node.kind.is_filesystem() {
            if !node.path.is_empty() {
                fs_nodes.insert(node.path.clone(), node);
            }
        } else {
            extras.entry(node.path.clone()).or_default().push(node);
        }
    }
    (fs_nodes, extras)
}

fn new_node(kind: NodeKind, path: &str, name: &str, persisted: Option<NavNode>) -> NavNode {
    let mut node = NavNode {
        kind,
        path: path.to_owned(),
        label: name.to_owned(),
        template: DEFAULT_PAGE_TEMPLATE.to_owned(),
        ..NavNode::default()
    };
    if let Some(old) = persisted {
        node.label = old.label;
        node.bold = old.bold;
        node.link = old.link;
        if !old.template.is_empty() {
            node.template = old.template;
        }
        node.icon = old.icon;
        node.position = old.position;
        node.collapsed = old.collapsed;
        node.disable_collapse = old.disable_collapse;
    }
    if kind == NodeKind::File {
        node.link = format!("/p/{}", strip_extension(path));
    }
    node
}

fn attach_extras(arena: &mut Vec<Slot>, parent: usize, extras: Option<Vec<NavNode>>) {
    for node in extras.into_iter().flatten() {
        let idx = arena.len();
        arena.push(Slot {
            node,
            children: Vec::new(),
        });
        arena[parent].children.push(idx);
    }
}

fn materialize(arena: &mut [Slot], idx: usize) -> NavNode {
    let children = std::mem::take(&mut arena[idx].children);
    let mut node = std::mem::take(&mut arena[idx].node);
    node.children = children
        .into_iter()
        .map(|child| materialize(arena, child))
        .collect();
    node
}

/// Sort siblings at every level and rewrite positions to `1..=n`.
///
/// Positioned nodes come first in position order, then unpositioned nodes
/// by label. Equal keys keep their relative order.
pub(crate) fn normalize(nodes: &mut [NavNode]) {
    nodes.sort_by(sibling_order);
    for (i, node) in nodes.iter_mut().enumerate() {
        node.position = i32::try_from(i + 1).unwrap_or(i32::MAX);
        normalize(&mut node.children);
    }
}

fn sibling_order(a: &NavNode, b: &NavNode) -> Ordering {
    match (a.position > 0, b.position > 0) {
        (true, true) => a
            .position
            .cmp(&b.position)
            .then_with(|| a.label.cmp(&b.label)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.label.cmp(&b.label),
    }
}
