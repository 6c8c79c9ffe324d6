//! Sidebar node model.

use serde::{Deserialize, Deserializer, Serialize};

/// Template given to newly discovered pages.
pub const DEFAULT_PAGE_TEMPLATE: &str = "page-nav-side-toc.html";

/// What a sidebar entry represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Directory, or an intermediate path segment.
    Folder,
    /// Content page.
    #[default]
    File,
    /// External or custom link.
    Link,
    /// Non-clickable heading.
    Label,
    /// Visual separator.
    Divider,
}

impl NodeKind {
    /// Whether nodes of this kind are derived from the content directory.
    pub fn is_filesystem(self) -> bool {
        matches!(self, Self::Folder | Self::File)
    }
}

/// One sidebar entry.
///
/// For `file` and `folder` nodes `path` is the slash-separated path relative
/// to the content directory. For `link`, `label` and `divider` nodes it is
/// the path of the folder they belong to (empty for top level).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NavNode {
    #[serde(rename = "Type")]
    pub kind: NodeKind,
    /// Raw HTML for an icon.
    pub icon: String,
    pub label: String,
    pub bold: bool,
    /// Template override (files only).
    pub template: String,
    /// Start collapsed (folders only).
    pub collapsed: bool,
    /// Never collapsible (folders only).
    pub disable_collapse: bool,
    pub link: String,
    pub path: String,
    /// 1-indexed rank among siblings; `0` or less means unpositioned.
    pub position: i32,
    #[serde(deserialize_with = "null_as_empty")]
    pub children: Vec<NavNode>,
}

impl NavNode {
    /// `path` with its final extension removed (`guide/intro.md` → `guide/intro`).
    pub fn route(&self) -> &str {
        strip_extension(&self.path)
    }

    /// Output file for a page: `.md` becomes `.html`, other extensions are kept.
    pub fn output_path(&self) -> String {
        match self.path.strip_suffix(".md") {
            Some(stem) => format!("{stem}.html"),
            None => self.path.clone(),
        }
    }
}

/// Pre-order traversal over a node forest.
///
/// Uses an explicit stack, so depth is bounded only by memory.
pub struct Nodes<'a> {
    stack: Vec<std::slice::Iter<'a, NavNode>>,
}

impl<'a> Nodes<'a> {
    pub(crate) fn new(roots: &'a [NavNode]) -> Self {
        Self {
            stack: vec![roots.iter()],
        }
    }
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a NavNode;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            if let Some(node) = top.next() {
                if !node.children.is_empty() {
                    self.stack.push(node.children.iter());
                }
                return Some(node);
            }
            self.stack.pop();
        }
    }
}

pub(crate) fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

/// Older layout files store empty child lists as `null`.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(label: &str, children: Vec<NavNode>) -> NavNode {
        NavNode {
            label: label.to_owned(),
            children,
            ..NavNode::default()
        }
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("guide/intro.md"), "guide/intro");
        assert_eq!(strip_extension("a.b/c"), "a.b/c");
        assert_eq!(strip_extension("notes.tar.gz"), "notes.tar");
        assert_eq!(strip_extension("folder"), "folder");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }

    #[test]
    fn test_output_path() {
        let page = NavNode {
            path: "guide/intro.md".to_owned(),
            ..NavNode::default()
        };
        assert_eq!(page.output_path(), "guide/intro.html");

        let raw = NavNode {
            path: "raw/page.html".to_owned(),
            ..NavNode::default()
        };
        assert_eq!(raw.output_path(), "raw/page.html");
    }

    #[test]
    fn test_nodes_pre_order() {
        let forest = vec![
            node("a", vec![node("a1", vec![node("a1x", vec![])]), node("a2", vec![])]),
            node("b", vec![]),
        ];
        let labels: Vec<&str> = Nodes::new(&forest).map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "a1", "a1x", "a2", "b"]);
    }

    #[test]
    fn test_nodes_empty_forest() {
        assert_eq!(Nodes::new(&[]).count(), 0);
    }

    #[test]
    fn test_json_field_names() {
        let n = NavNode {
            kind: NodeKind::Folder,
            label: "Guide".to_owned(),
            disable_collapse: true,
            path: "guide".to_owned(),
            position: 2,
            ..NavNode::default()
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["Type"], "folder");
        assert_eq!(json["Label"], "Guide");
        assert_eq!(json["DisableCollapse"], true);
        assert_eq!(json["Position"], 2);
        assert!(json["Children"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_null_children_accepted() {
        let json = r#"{"Type":"link","Label":"Home","Link":"https://example.com","Children":null}"#;
        let n: NavNode = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NodeKind::Link);
        assert!(n.children.is_empty());
        assert_eq!(n.position, 0);
    }
}
