//! Concurrent registration of the asset directory.

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinError;

use crate::AssetMapping;

/// Reports whether a file changed since a given commit.
///
/// The registry only asks about files that also existed in the previous
/// mapping, and only when a prior commit is known. Each call is bounded by
/// [`RegisterOptions::check_timeout`].
pub trait ChangeOracle: Send + Sync + 'static {
    type Error: StdError + Send + Sync + 'static;

    /// `Ok(true)` if `path` differs from its state at `commit`.
    fn changed_since(
        &self,
        path: &Path,
        commit: &str,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

/// Where assets live on disk and how they are addressed logically.
#[derive(Debug, Clone)]
pub struct AssetSource {
    pub dir: PathBuf,
    /// Logical prefix without a trailing slash, e.g. `/assets`.
    pub url_prefix: String,
}

impl AssetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: "/assets".to_owned(),
        }
    }

    /// Logical path of a file under [`AssetSource::dir`].
    fn logical_path(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.dir).ok()?;
        let mut logical = self.url_prefix.clone();
        for component in relative.components() {
            logical.push('/');
            logical.push_str(component.as_os_str().to_str()?);
        }
        Some(logical)
    }

    /// Path relative to [`AssetSource::dir`] for a logical path.
    pub fn relative_key<'a>(&self, logical_path: &'a str) -> Option<&'a str> {
        logical_path
            .strip_prefix(self.url_prefix.as_str())?
            .strip_prefix('/')
    }
}

/// Tuning for a registration pass.
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// Concurrent workers. The path queue holds `workers * 2` entries and the
    /// error queue `workers * 10`.
    pub workers: usize,
    /// Deadline for a single change check.
    pub check_timeout: Duration,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            workers: 8,
            check_timeout: Duration::from_secs(5),
        }
    }
}

/// Failure registering a single file.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read asset {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("asset path {} is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),
    #[error("change check for {} failed: {source}", path.display())]
    ChangeCheck {
        path: PathBuf,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("change check for {} timed out after {timeout:?}", path.display())]
    ChangeCheckTimeout { path: PathBuf, timeout: Duration },
    #[error("hashing task for {} failed: {source}", path.display())]
    Task {
        path: PathBuf,
        #[source]
        source: JoinError,
    },
}

impl AssetError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::NonUtf8Path(path)
            | Self::ChangeCheck { path, .. }
            | Self::ChangeCheckTimeout { path, .. }
            | Self::Task { path, .. } => path,
        }
    }
}

/// Failure of a whole registration pass. The live mapping is unchanged.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("failed to walk asset directory {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },
    #[error("{} errors registering assets", .0.len())]
    Files(Vec<AssetError>),
    #[error("asset walker task failed: {0}")]
    Task(#[from] JoinError),
}

/// Holds the live [`AssetMapping`] and rebuilds it on demand.
pub struct AssetRegistry {
    source: AssetSource,
    current: RwLock<Arc<AssetMapping>>,
}

impl AssetRegistry {
    pub fn new(source: AssetSource) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(AssetMapping::default())),
        }
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    /// Current mapping. Holding the returned `Arc` pins one complete
    /// generation regardless of later registrations.
    pub fn snapshot(&self) -> Arc<AssetMapping> {
        let guard = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }

    /// Rebuild the mapping from the asset directory and publish it.
    ///
    /// Equivalent to [`AssetRegistry::stage`] followed by
    /// [`AssetRegistry::publish`].
    ///
    /// # Errors
    ///
    /// See [`AssetRegistry::stage`].
    pub async fn register<O: ChangeOracle>(
        &self,
        prior_commit: Option<&str>,
        oracle: Arc<O>,
        options: &RegisterOptions,
    ) -> Result<Arc<AssetMapping>, RegistrationError> {
        let mapping = self.stage(prior_commit, oracle, options).await?;
        self.publish(Arc::clone(&mapping));
        Ok(mapping)
    }

    /// Make `mapping` the live generation.
    pub fn publish(&self, mapping: Arc<AssetMapping>) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = mapping;
    }

    /// Build the next mapping from the asset directory without publishing it.
    ///
    /// Names from the live mapping are reused for files `oracle` reports as
    /// unchanged.
    ///
    /// # Arguments
    ///
    /// * `prior_commit` - Commit the previous mapping was built from. `None`
    ///   or empty treats every file as changed without asking `oracle`.
    /// * `oracle` - Change detector for incremental skips
    /// * `options` - Worker count and change-check deadline
    ///
    /// A missing asset directory yields an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Files`] with every per-file failure, or
    /// [`RegistrationError::Walk`] if the directory could not be traversed.
    /// The live mapping is never modified.
    pub async fn stage<O: ChangeOracle>(
        &self,
        prior_commit: Option<&str>,
        oracle: Arc<O>,
        options: &RegisterOptions,
    ) -> Result<Arc<AssetMapping>, RegistrationError> {
        let start = Instant::now();
        let previous = self.snapshot();
        let workers = options.workers.max(1);
        let prior_commit: Option<Arc<str>> = prior_commit
            .filter(|c| !c.is_empty())
            .map(Arc::from);

        let (path_tx, path_rx) = mpsc::channel::<PathBuf>(workers * 2);
        let (err_tx, mut err_rx) = mpsc::channel::<AssetError>(workers * 10);
        let path_rx = Arc::new(Mutex::new(path_rx));

        let dir = self.source.dir.clone();
        let walker = tokio::task::spawn_blocking(move || walk(&dir, &path_tx));

        let errors = tokio::spawn(async move {
            let mut collected = Vec::new();
            while let Some(err) = err_rx.recv().await {
                collected.push(err);
            }
            collected
        });

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let ctx = WorkerContext {
                source: self.source.clone(),
                previous: Arc::clone(&previous),
                prior_commit: prior_commit.clone(),
                oracle: Arc::clone(&oracle),
                check_timeout: options.check_timeout,
            };
            let path_rx = Arc::clone(&path_rx);
            let err_tx = err_tx.clone();
            handles.push(tokio::spawn(async move {
                let mut found = Vec::new();
                loop {
                    let next = path_rx.lock().await.recv().await;
                    let Some(path) = next else { break };
                    match ctx.register_one(path).await {
                        Ok(pair) => found.push(pair),
                        Err(err) => {
                            tracing::error!(path = %err.path().display(), error = %err, "Asset registration failed");
                            if err_tx.send(err).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                found
            }));
        }
        drop(err_tx);

        let walked = walker.await?;

        let mut mapping = AssetMapping::with_generation(previous.generation() + 1);
        for handle in handles {
            for (logical, name) in handle.await? {
                mapping.insert(logical, name);
            }
        }
        let failures = errors.await?;

        let file_count = walked.map_err(|source| RegistrationError::Walk {
            path: self.source.dir.clone(),
            source,
        })?;
        if !failures.is_empty() {
            return Err(RegistrationError::Files(failures));
        }

        let mapping = Arc::new(mapping);
        tracing::info!(
            files = file_count,
            generation = mapping.generation(),
            elapsed_ms = start.elapsed().as_millis(),
            "Registered assets"
        );
        Ok(mapping)
    }
}

struct WorkerContext<O> {
    source: AssetSource,
    previous: Arc<AssetMapping>,
    prior_commit: Option<Arc<str>>,
    oracle: Arc<O>,
    check_timeout: Duration,
}

impl<O: ChangeOracle> WorkerContext<O> {
    async fn register_one(&self, path: PathBuf) -> Result<(String, String), AssetError> {
        let Some(logical) = self.source.logical_path(&path) else {
            return Err(AssetError::NonUtf8Path(path));
        };

        if let Some(commit) = &self.prior_commit
            && let Some(previous_name) = self.previous.name_for(&logical)
        {
            let check = self.oracle.changed_since(&path, commit);
            let changed = match tokio::time::timeout(self.check_timeout, check).await {
                Ok(Ok(changed)) => changed,
                Ok(Err(source)) => {
                    return Err(AssetError::ChangeCheck {
                        path,
                        source: Box::new(source),
                    });
                }
                Err(_) => {
                    return Err(AssetError::ChangeCheckTimeout {
                        path,
                        timeout: self.check_timeout,
                    });
                }
            };
            if !changed {
                tracing::debug!(%logical, name = previous_name, "Asset unchanged, reusing name");
                return Ok((logical, previous_name.to_owned()));
            }
        }

        let hash_path = path.clone();
        let name = tokio::task::spawn_blocking(move || content_name(&hash_path))
            .await
            .map_err(|source| AssetError::Task {
                path: path.clone(),
                source,
            })?
            .map_err(|source| AssetError::Read { path, source })?;

        tracing::debug!(%logical, %name, "Hashed asset");
        Ok((logical, name))
    }
}

/// `<hex sha256><.ext>` for the file at `path`.
fn content_name(path: &Path) -> io::Result<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    let mut name = hex::encode(hasher.finalize());
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    Ok(name)
}

/// Send every regular file under `dir` to `tx`. Returns the number sent.
fn walk(dir: &Path, tx: &mpsc::Sender<PathBuf>) -> Result<usize, ignore::Error> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "Asset directory missing, registering no assets");
        return Ok(0);
    }

    let mut sent = 0;
    let walker = ignore::WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .build();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        if tx.blocking_send(entry.into_path()).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
