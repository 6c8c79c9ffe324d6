//! Content-addressed asset registry.
//!
//! Every file under the asset directory gets a stable name derived from its
//! bytes: the hex SHA-256 digest followed by the original extension
//! (`3f7a…c1.png`). The name changes exactly when the content does, so
//! `/a/<name>` can be served with an immutable cache policy.
//!
//! [`AssetRegistry::register`] rebuilds the mapping with a bounded worker
//! pool. When the previous build's commit is known, a [`ChangeOracle`]
//! decides which files changed since then and unchanged files keep their
//! previous name without being re-read. A pass either succeeds completely
//! and publishes a new [`AssetMapping`] snapshot, or fails and leaves the
//! previous one live.
//!
//! [`rewrite_asset_links`] applies a mapping to rendered HTML.

mod links;
mod mapping;
mod registry;

pub use links::rewrite_asset_links;
pub use mapping::AssetMapping;
pub use registry::{
    AssetError, AssetRegistry, AssetSource, ChangeOracle, RegisterOptions, RegistrationError,
};
