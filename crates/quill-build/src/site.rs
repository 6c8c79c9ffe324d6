//! Production site: pre-built output served from memory, refreshed from the
//! content remote.
//!
//! # Generations
//!
//! A successful [`Site::load_all`] publishes one generation: the asset
//! mapping, the output directory, the in-memory index page and search index,
//! and the commit it was built from. Nothing is published until every stage
//! succeeded, so a failed rebuild leaves the previous generation serving.
//!
//! # Gating
//!
//! Builds enter through [`BuildFlag::try_acquire`]. While the flag is held,
//! every content request gets [`Response::Maintenance`] and further builds
//! fail with [`BuildError::InProgress`].

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use quill_assets::{AssetRegistry, AssetSource, ChangeOracle, RegisterOptions};
use quill_cache::ReadCache;
use quill_config::{Config, Mode};
use quill_nav::{Layout, NavPaths};
use quill_render::{MarkdownRenderer, PageRenderer};
use quill_tools::{Git, ToolError};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{BuildError, Stage, TriggerError};
use crate::flag::BuildFlag;
use crate::generate::{generate, staging_dir, swap_into_place};
use crate::remote::Remote;
use crate::response::{CachePolicy, Response, serve_static};
use crate::search::{LunrIndexer, SearchIndex, SearchIndexer};

/// Everything one successful build produced that is kept in memory.
struct Generation {
    commit: Option<String>,
    layout: Layout,
    index_page: Arc<[u8]>,
    search: SearchIndex,
}

/// Production-mode site.
///
/// `G` is the content checkout (fetch, reset and per-file change checks),
/// `I` builds the search index and `P` renders pages.
pub struct Site<G = Git, I = LunrIndexer, P = MarkdownRenderer> {
    config: Config,
    repo: Arc<G>,
    indexer: I,
    renderer: Arc<P>,
    registry: AssetRegistry,
    flag: BuildFlag,
    pages: ReadCache,
    assets: ReadCache,
    current: RwLock<Option<Arc<Generation>>>,
}

impl Site {
    /// Site over the git checkout at `paths.repo_dir`, indexing with the
    /// configured Node.js script and rendering with [`MarkdownRenderer`].
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotARepository`] if the checkout is missing.
    pub fn from_config(config: &Config) -> Result<Self, ToolError> {
        let mut git = Git::open(&config.paths_resolved.repo_dir, &config.update.remote)?
            .with_check_timeout(config.timeouts.asset_check_timeout());
        if let Some(key) = &config.update.ssh_key {
            git = git.with_ssh_key(key);
        }
        let renderer = MarkdownRenderer::new(&config.paths_resolved.templates_dir, Mode::Production)
            .with_debug(config.debug);
        Ok(Self::new(config.clone(), git, LunrIndexer::new(config), renderer))
    }
}

impl<G, I, P> Site<G, I, P>
where
    G: Remote + ChangeOracle,
    I: SearchIndexer,
    P: PageRenderer + 'static,
{
    pub fn new(config: Config, repo: G, indexer: I, renderer: P) -> Self {
        let paths = &config.paths_resolved;
        let compress = config.cache.compress;
        let pages = ReadCache::open(&paths.output_dir, config.cache.page_cache_bytes(), compress);
        let assets = ReadCache::open(&paths.assets_dir, config.cache.asset_cache_bytes(), compress);
        let registry = AssetRegistry::new(AssetSource::new(&paths.assets_dir));
        Self {
            config,
            repo: Arc::new(repo),
            indexer,
            renderer: Arc::new(renderer),
            registry,
            flag: BuildFlag::new(),
            pages,
            assets,
            current: RwLock::new(None),
        }
    }

    /// Whether a build is running.
    pub fn is_updating(&self) -> bool {
        self.flag.is_set()
    }

    /// Commit the live generation was built from. `None` before the first
    /// update.
    pub fn commit(&self) -> Option<String> {
        self.generation().and_then(|g| g.commit.clone())
    }

    /// Layout of the live generation.
    pub fn layout(&self) -> Option<Layout> {
        self.generation().map(|g| g.layout.clone())
    }

    /// Build from the current checkout without touching the remote.
    ///
    /// This is the startup path: the published generation has no commit,
    /// so the next update rehashes every asset.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InProgress`] if another build holds the flag,
    /// or the first stage error.
    pub async fn load_all(&self) -> Result<(), BuildError> {
        let _guard = self.flag.try_acquire().ok_or(BuildError::InProgress)?;
        self.rebuild(None).await
    }

    /// Bring the checkout up to date with the remote branch and rebuild.
    ///
    /// Returns the commit that is now live.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InProgress`] if another build holds the flag.
    /// Otherwise the first failing stage aborts the update and its error is
    /// returned; [`BuildError::is_timeout`] tells deadline overruns apart.
    pub async fn update(&self) -> Result<String, BuildError> {
        let _guard = self.flag.try_acquire().ok_or(BuildError::InProgress)?;
        let branch = &self.config.update.branch;
        let timeouts = &self.config.timeouts;
        tracing::info!(%branch, "Updating content");

        self.repo
            .fetch(branch, timeouts.fetch_timeout())
            .await
            .map_err(BuildError::stage(Stage::Fetch))?;
        self.repo
            .reset(branch, timeouts.reset_timeout())
            .await
            .map_err(BuildError::stage(Stage::Reset))?;
        self.repo
            .lfs_pull(timeouts.lfs_timeout())
            .await
            .map_err(BuildError::stage(Stage::LfsPull))?;
        let commit = self
            .repo
            .head(timeouts.head_timeout())
            .await
            .map_err(BuildError::stage(Stage::Head))?;

        self.rebuild(Some(commit.clone())).await?;
        Ok(commit)
    }

    /// Run [`Site::update`] on behalf of an external caller holding the
    /// shared secret.
    ///
    /// The secret is checked before the flag is touched.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::NotConfigured`] when no secret is set,
    /// [`TriggerError::Unauthorized`] when `secret` does not match, or the
    /// update's error.
    pub async fn trigger_update(&self, secret: &[u8]) -> Result<String, TriggerError> {
        let expected = self.config.update.secret.as_bytes();
        if expected.is_empty() {
            return Err(TriggerError::NotConfigured);
        }
        let given = Sha256::digest(secret);
        let wanted = Sha256::digest(expected);
        let matches: bool = given.as_slice().ct_eq(wanted.as_slice()).into();
        if !matches {
            tracing::warn!("Rejected update trigger with invalid secret");
            return Err(TriggerError::Unauthorized);
        }
        match self.update().await {
            Ok(commit) => Ok(commit),
            Err(e) => {
                tracing::error!(error = %e, timeout = e.is_timeout(), "Update failed");
                Err(e.into())
            }
        }
    }

    /// Register assets, reconcile the layout, render into a staging
    /// directory, build the search index, then publish. The caller holds the
    /// flag.
    async fn rebuild(&self, commit: Option<String>) -> Result<(), BuildError> {
        let started = Instant::now();
        let prior = self.commit();
        let options = RegisterOptions {
            workers: self.config.update.workers,
            check_timeout: self.config.timeouts.asset_check_timeout(),
        };
        let mapping = self
            .registry
            .stage(prior.as_deref(), Arc::clone(&self.repo), &options)
            .await?;

        let paths = &self.config.paths_resolved;
        let nav = NavPaths {
            content_dir: paths.content_dir.clone(),
            assets_dir: paths.assets_dir.clone(),
            layout_file: paths.layout_file(),
        };
        let output: PathBuf = paths.output_dir.clone();
        let staging = staging_dir(&output);

        let renderer = Arc::clone(&self.renderer);
        let staged = Arc::clone(&mapping);
        let out_dir = staging.clone();
        let (layout, generated) = tokio::task::spawn_blocking(move || {
            let layout = Layout::load(&nav, &*renderer)?;
            let generated = generate(&*renderer, &layout, &staged, &nav.content_dir, &out_dir)?;
            Ok::<_, BuildError>((layout, generated))
        })
        .await??;

        let search = self.indexer.build(&generated.docs).await?;

        tokio::task::spawn_blocking(move || swap_into_place(&staging, &output)).await??;

        self.registry.publish(mapping);
        self.pages.reset();
        self.assets.reset();
        let next = Arc::new(Generation {
            commit,
            layout,
            index_page: generated.index_page.into(),
            search,
        });
        {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Some(next);
        }

        tracing::info!(
            pages = generated.pages,
            docs = generated.docs.len(),
            commit = ?self.commit(),
            elapsed_ms = started.elapsed().as_millis(),
            "Site loaded"
        );
        Ok(())
    }

    fn generation(&self) -> Option<Arc<Generation>> {
        let guard = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    /// Live generation, or the response to send instead.
    fn serving(&self) -> Result<Arc<Generation>, Response> {
        if self.flag.is_set() {
            return Err(Response::Maintenance);
        }
        self.generation().ok_or(Response::NotFound)
    }

    /// `/`
    pub fn index(&self) -> Response {
        match self.serving() {
            Ok(generation) => Response::Html {
                body: Arc::clone(&generation.index_page),
                gzipped: true,
            },
            Err(response) => response,
        }
    }

    /// `/p/<route>`: a generated page, through the page cache.
    pub fn page(&self, path: &str) -> Response {
        if let Err(response) = self.serving() {
            return response;
        }
        let route = path.strip_prefix("/p/").unwrap_or(path).trim_matches('/');
        if route.is_empty() {
            return Response::NotFound;
        }
        let key = if route.ends_with(".html") {
            route.to_owned()
        } else {
            format!("{route}.html")
        };
        match self.pages.read(&key) {
            Ok(read) => Response::Html {
                body: read.data,
                gzipped: read.compressed,
            },
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    tracing::debug!(%key, "Page not found");
                } else {
                    tracing::error!(%key, error = %e, "Failed to read page");
                }
                Response::NotFound
            }
        }
    }

    /// `/a/<name>`: a content-addressed asset, through the asset cache.
    pub fn asset(&self, name: &str) -> Response {
        if let Err(response) = self.serving() {
            return response;
        }
        let mapping = self.registry.snapshot();
        let Some(key) = mapping
            .path_for(name)
            .and_then(|logical| self.registry.source().relative_key(logical))
        else {
            tracing::debug!(%name, "Asset not found");
            return Response::NotFound;
        };
        match self.assets.read(key) {
            Ok(read) => Response::Asset {
                body: read.data,
                mime: read.mime,
                gzipped: read.compressed,
                cache: CachePolicy::Immutable,
            },
            Err(e) => {
                tracing::error!(%name, %key, error = %e, "Failed to read asset");
                Response::NotFound
            }
        }
    }

    /// `/assets/<path>`: the uncached fallback for references that were not
    /// rewritten.
    pub fn static_asset(&self, path: &str) -> Response {
        if self.flag.is_set() {
            return Response::Maintenance;
        }
        tracing::warn!(%path, "Serving asset without fingerprinting");
        serve_static(&self.config.paths_resolved.assets_dir, path)
    }

    /// `/search.json`, honoring `If-None-Match`.
    pub fn search(&self, if_none_match: Option<&str>) -> Response {
        let generation = match self.serving() {
            Ok(generation) => generation,
            Err(response) => return response,
        };
        let index = &generation.search;
        if if_none_match == Some(index.hash.as_str()) {
            tracing::debug!("Search index not modified");
            return Response::NotModified {
                etag: index.hash.clone(),
            };
        }
        Response::Search {
            body: Arc::clone(&index.blob),
            etag: index.hash.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_render::SearchDoc;
    use std::fs;
    use std::io::Read;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeRepo {
        head: Mutex<String>,
        fail: Option<Stage>,
        timeout: bool,
        checks: AtomicUsize,
        /// Notified when fetch starts; fetch then waits for `release`.
        entered: Option<Arc<Notify>>,
        release: Option<Arc<Notify>>,
    }

    impl FakeRepo {
        fn at(commit: &str) -> Self {
            Self {
                head: Mutex::new(commit.to_owned()),
                ..Self::default()
            }
        }

        fn result(&self, stage: Stage, timeout: Duration) -> Result<(), ToolError> {
            if self.fail != Some(stage) {
                return Ok(());
            }
            if self.timeout {
                return Err(ToolError::Timeout {
                    command: stage.to_string(),
                    timeout,
                });
            }
            Err(ToolError::Failed {
                command: stage.to_string(),
                code: Some(128),
                output: "fatal".to_owned(),
            })
        }
    }

    impl Remote for FakeRepo {
        async fn fetch(&self, _branch: &str, timeout: Duration) -> Result<(), ToolError> {
            if let (Some(entered), Some(release)) = (&self.entered, &self.release) {
                entered.notify_one();
                release.notified().await;
            }
            self.result(Stage::Fetch, timeout)
        }

        async fn reset(&self, _branch: &str, timeout: Duration) -> Result<(), ToolError> {
            self.result(Stage::Reset, timeout)
        }

        async fn lfs_pull(&self, timeout: Duration) -> Result<(), ToolError> {
            self.result(Stage::LfsPull, timeout)
        }

        async fn head(&self, timeout: Duration) -> Result<String, ToolError> {
            self.result(Stage::Head, timeout)?;
            Ok(self.head.lock().unwrap().clone())
        }
    }

    impl ChangeOracle for FakeRepo {
        type Error = std::io::Error;

        async fn changed_since(&self, _path: &Path, _commit: &str) -> Result<bool, Self::Error> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    struct FakeIndexer;

    impl SearchIndexer for FakeIndexer {
        async fn build(&self, docs: &[SearchDoc]) -> Result<SearchIndex, crate::SearchError> {
            let raw = serde_json::to_vec(docs)?;
            Ok(SearchIndex::from_raw(&raw).unwrap())
        }
    }

    struct Fixture {
        dir: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();
            fs::create_dir_all(root.join("public/guide")).unwrap();
            fs::create_dir_all(root.join("assets")).unwrap();
            fs::create_dir_all(root.join("templates")).unwrap();
            fs::write(root.join("public/.index.md"), "# Home\n\nWelcome.\n").unwrap();
            fs::write(
                root.join("public/guide/intro.md"),
                "# Intro\n\n![logo](/assets/logo.png)\n",
            )
            .unwrap();
            fs::write(root.join("assets/logo.png"), "png-bytes").unwrap();
            fs::write(
                root.join("templates/page-nav.html"),
                "<main class=\"index\">{{ Content }}</main>",
            )
            .unwrap();
            fs::write(
                root.join("templates/page-nav-side-toc.html"),
                "<main>{{ Content }}</main>",
            )
            .unwrap();
            let config = Config::from_toml("[update]\nsecret = \"s3cret\"\n", root).unwrap();
            Self { dir, config }
        }

        fn site(&self, repo: FakeRepo) -> Site<FakeRepo, FakeIndexer, MarkdownRenderer> {
            let renderer =
                MarkdownRenderer::new(self.dir.path().join("templates"), Mode::Production);
            Site::new(self.config.clone(), repo, FakeIndexer, renderer)
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }
    }

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        flate2::read::GzDecoder::new(data)
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    fn logo_name() -> String {
        format!("{}.png", hex::encode(Sha256::digest(b"png-bytes")))
    }

    fn html_body(response: &Response) -> String {
        match response {
            Response::Html { body, gzipped: true } => gunzip(body),
            Response::Html { body, .. } => String::from_utf8(body.to_vec()).unwrap(),
            other => panic!("expected html, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_all_publishes_generation() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo::at("c1"));

        site.load_all().await.unwrap();

        assert!(!site.is_updating());
        assert_eq!(site.commit(), None);
        assert!(html_body(&site.index()).contains("<main class=\"index\">"));

        let page = html_body(&site.page("/p/guide/intro"));
        assert!(page.contains(&format!("/a/{}", logo_name())), "{page}");
        assert!(fixture.path("dist/guide/intro.html").exists());
        assert!(fixture.path("public/.meta/layout.json").exists());

        let layout = site.layout().unwrap();
        assert!(layout.find_page("guide/intro").is_some());
    }

    #[tokio::test]
    async fn test_asset_served_by_content_name() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo::at("c1"));
        site.load_all().await.unwrap();

        let response = site.asset(&logo_name());

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), b"png-bytes");
        assert!(
            response
                .headers()
                .contains(&("Cache-Control", "public, max-age=31536000, immutable".to_owned()))
        );
        assert_eq!(site.asset("unknown.png"), Response::NotFound);
    }

    #[tokio::test]
    async fn test_search_etag() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo::at("c1"));
        site.load_all().await.unwrap();

        let Response::Search { body, etag } = site.search(None) else {
            panic!("expected search index");
        };
        let docs: Vec<SearchDoc> = serde_json::from_str(&gunzip(&body)).unwrap();
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Home", "Intro"]);

        assert_eq!(
            site.search(Some(&etag)),
            Response::NotModified { etag: etag.clone() }
        );
        assert!(matches!(site.search(Some("stale")), Response::Search { .. }));
    }

    #[tokio::test]
    async fn test_nothing_served_before_first_build() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo::at("c1"));

        assert_eq!(site.index(), Response::NotFound);
        assert_eq!(site.page("/p/guide/intro"), Response::NotFound);
        assert_eq!(site.search(None), Response::NotFound);
    }

    #[tokio::test]
    async fn test_update_publishes_commit_and_skips_unchanged_assets() {
        let fixture = Fixture::new();
        let repo = FakeRepo::at("c1");
        let site = fixture.site(repo);
        site.load_all().await.unwrap();
        assert_eq!(site.repo.checks.load(Ordering::SeqCst), 0);

        assert_eq!(site.update().await.unwrap(), "c1");
        assert_eq!(site.commit().as_deref(), Some("c1"));
        // Prior generation had no commit, so nothing was asked.
        assert_eq!(site.repo.checks.load(Ordering::SeqCst), 0);

        *site.repo.head.lock().unwrap() = "c2".to_owned();
        assert_eq!(site.update().await.unwrap(), "c2");
        assert_eq!(site.repo.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stage_failure_keeps_previous_generation() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo {
            fail: Some(Stage::LfsPull),
            ..FakeRepo::at("c1")
        });
        site.load_all().await.unwrap();
        let before = html_body(&site.page("/p/guide/intro"));

        let err = site.update().await.unwrap_err();

        assert!(matches!(
            err,
            BuildError::Stage {
                stage: Stage::LfsPull,
                ..
            }
        ));
        assert!(!err.is_timeout());
        assert!(!site.is_updating());
        assert_eq!(site.commit(), None);
        assert_eq!(html_body(&site.page("/p/guide/intro")), before);
    }

    #[tokio::test]
    async fn test_stage_timeout_is_distinguishable() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo {
            fail: Some(Stage::Fetch),
            timeout: true,
            ..FakeRepo::at("c1")
        });

        let err = site.update().await.unwrap_err();

        assert!(err.is_timeout());
        assert!(!site.is_updating());
    }

    #[tokio::test]
    async fn test_render_failure_keeps_previous_output() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo::at("c1"));
        site.load_all().await.unwrap();

        fs::write(fixture.path("public/broken.md"), "{{< raw >}} never closed").unwrap();
        let err = site.load_all().await.unwrap_err();

        let BuildError::Render { failures } = err else {
            panic!("expected render failures, got {err}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "broken.md");
        assert!(fixture.path("dist/guide/intro.html").exists());
        assert!(!fixture.path("dist/broken.html").exists());
        assert_eq!(site.page("/p/guide/intro").status(), 200);
    }

    #[tokio::test]
    async fn test_maintenance_while_updating_and_second_trigger_rejected() {
        let fixture = Fixture::new();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let site = Arc::new(fixture.site(FakeRepo {
            entered: Some(Arc::clone(&entered)),
            release: Some(Arc::clone(&release)),
            ..FakeRepo::at("c1")
        }));
        site.load_all().await.unwrap();

        let running = tokio::spawn({
            let site = Arc::clone(&site);
            async move { site.update().await }
        });
        entered.notified().await;

        assert!(site.is_updating());
        assert_eq!(site.index(), Response::Maintenance);
        assert_eq!(site.page("/p/guide/intro"), Response::Maintenance);
        assert_eq!(site.asset(&logo_name()), Response::Maintenance);
        assert_eq!(site.search(None), Response::Maintenance);
        assert_eq!(site.static_asset("/assets/logo.png"), Response::Maintenance);
        assert!(matches!(
            site.trigger_update(b"s3cret").await,
            Err(TriggerError::Build(BuildError::InProgress))
        ));
        assert!(matches!(site.load_all().await, Err(BuildError::InProgress)));

        release.notify_one();
        assert_eq!(running.await.unwrap().unwrap(), "c1");
        assert!(!site.is_updating());
        assert_eq!(site.index().status(), 200);
    }

    #[tokio::test]
    async fn test_trigger_checks_secret_before_flag() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo::at("c1"));

        assert!(matches!(
            site.trigger_update(b"wrong").await,
            Err(TriggerError::Unauthorized)
        ));
        assert!(!site.is_updating());
        assert_eq!(site.commit(), None);

        assert_eq!(site.trigger_update(b"s3cret").await.unwrap(), "c1");
        assert_eq!(site.commit().as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_trigger_without_secret_is_disabled() {
        let fixture = Fixture::new();
        let mut config = fixture.config.clone();
        config.update(|c| c.update.secret.clear()).unwrap();
        let renderer = MarkdownRenderer::new(fixture.path("templates"), Mode::Production);
        let site = Site::new(config, FakeRepo::at("c1"), FakeIndexer, renderer);

        assert!(matches!(
            site.trigger_update(b"").await,
            Err(TriggerError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_static_asset_fallback() {
        let fixture = Fixture::new();
        let site = fixture.site(FakeRepo::at("c1"));

        let response = site.static_asset("/assets/logo.png");

        assert_eq!(response.body(), b"png-bytes");
        assert!(response.headers().iter().any(|(name, value)| {
            *name == "Cache-Control" && value.starts_with("no-store")
        }));
    }
}
