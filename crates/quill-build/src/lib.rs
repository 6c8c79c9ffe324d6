//! Build orchestration and serving for Quill sites.
//!
//! # Production
//!
//! [`Site`] pre-renders every page into the output directory and serves it
//! through bounded read caches. [`Site::update`] runs one rebuild cycle:
//!
//! 1. fetch the content branch, hard reset to it and pull LFS objects
//! 2. resolve the new HEAD commit
//! 3. register assets, skipping files unchanged since the previous commit
//! 4. reconcile the layout and render every page into a staging directory
//! 5. build the search index
//! 6. swap the staging directory into place, reset the caches and publish
//!    the new commit
//!
//! Every external command runs under its own deadline. The first failing
//! stage aborts the cycle and the previous generation keeps serving.
//!
//! # Edit
//!
//! [`EditSite`] renders on every request from the live content, templates
//! and layout, and accepts sidebar edits.
//!
//! Both facades return transport-neutral [`Response`] values.

mod edit;
mod error;
mod flag;
mod generate;
mod remote;
mod response;
mod search;
mod site;

pub use edit::{EDIT_TEMPLATE, EditSite, SIDEBAR_TEMPLATE};
pub use error::{BuildError, PageError, PageFailure, Stage, TriggerError};
pub use flag::{BuildFlag, BuildGuard};
pub use remote::Remote;
pub use response::{CachePolicy, MAINTENANCE_HTML, Response};
pub use search::{LunrIndexer, SearchError, SearchIndex, SearchIndexer};
pub use site::Site;
