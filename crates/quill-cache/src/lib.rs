//! Bounded in-memory read cache for served bytes.
//!
//! [`ReadCache`] maps a key to the bytes a [`Backing`] store returns for it,
//! keeping at most `capacity` bytes resident and evicting the least recently
//! used entries first. Compressible payloads are gzipped once on load and
//! served compressed thereafter.
//!
//! The cache knows nothing about pages or assets. Callers pick the backing
//! store ([`FsBacking`] for a directory tree) and the key format.
//!
//! # Concurrency
//!
//! A single mutex guards the LRU index. Backing I/O and compression run
//! without the lock held, so two readers can race to populate the same key.
//! The second one to finish keeps whichever copy has the newer modification
//! time.
//!
//! # Example
//!
//! ```no_run
//! use quill_cache::ReadCache;
//!
//! let cache = ReadCache::open("dist", 64 * 1024 * 1024, true);
//! let page = cache.read("guide/intro.html")?;
//! assert_eq!(&*page.mime, "text/html");
//! # Ok::<(), std::io::Error>(())
//! ```

mod backing;
mod compress;
mod mime;
mod read_cache;

pub use backing::{Backing, FsBacking, Loaded};
pub use compress::{gzip, should_compress};
pub use mime::detect_mime;
pub use read_cache::{CachedRead, DEFAULT_CAPACITY, ReadCache};
