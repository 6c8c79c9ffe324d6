//! Navigation tree for Quill sites.
//!
//! The sidebar is persisted as `layout.json` and reconciled against the
//! content directory on every load:
//!
//! - `file` and `folder` nodes mirror the filesystem. New files appear, deleted
//!   ones disappear, and hand-edited properties (label, icon, bold, template,
//!   position, collapse behaviour) survive.
//! - `link`, `label` and `divider` nodes exist only in the persisted file and
//!   are carried over verbatim under the parent they were recorded with.
//! - Siblings are ordered by explicit position, then by label, and positions
//!   are rewritten to `1..=n` so the persisted file stays canonical.
//!
//! Reconciling an already reconciled layout is a no-op.

mod error;
mod layout;
mod node;
mod reconcile;

pub use error::NavError;
pub use layout::{
    DEFAULT_INDEX_TEMPLATE, DEFAULT_TITLE, FragmentRenderer, Layout, NavPaths, SidebarTree,
    SiteIcon,
};
pub use node::{DEFAULT_PAGE_TEMPLATE, NavNode, NodeKind, Nodes};
