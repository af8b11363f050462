use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use asset_cache::{AssetFile, AssetFileMap, CacheDB, CacheDBError};
use resolver::{ManagedFile, Resolver, ResolverError};
use tuid::{format_tuid, Tuid, NULL_TUID};
use virtual_fs::FS;

#[derive(Debug)]
pub enum IndexError {
    // A referenced identifier has no record in the registry. The
    // referencing asset's path is included so a human can locate the
    // breakage.
    MissingFile {
        id: Tuid,
        referencing_path: Option<String>,
    },
    ResolverError {
        source: ResolverError,
    },
    CacheDBError {
        source: CacheDBError,
    },
    SourceError {
        source: io::Error,
    },
    Cancelled,
}
pub type Result<T> = std::result::Result<T, IndexError>;

/// Loads the asset description behind a managed file: its metadata and the
/// identifiers of the files it depends on. This is where the surrounding
/// asset/reflection tooling plugs in; the indexer itself never parses
/// asset files.
pub trait AssetSource: Send + Sync {
    fn load(&self, file: &ManagedFile) -> io::Result<AssetFile>;
}

struct IndexerState {
    progress: AtomicUsize,
    total: AtomicUsize,
    running: AtomicBool,
    failed: AtomicBool,
    cancel: AtomicBool,
}

/// Runs a full re-index pass over every live file on a dedicated worker
/// thread, so interactive callers stay responsive.
///
/// Progress is a monotonically increasing counter against a known total;
/// completion and failure are plain booleans. Cancellation is cooperative:
/// `cancel()` sets a flag the worker observes before every unit of work,
/// leaving the cache in the state of the last committed statement.
pub struct Indexer {
    state: Arc<IndexerState>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Indexer {
    pub fn spawn<F: FS + 'static>(
        cache: Arc<CacheDB<F>>,
        resolver: Arc<Resolver>,
        source: Arc<dyn AssetSource>,
    ) -> Indexer {
        let state = Arc::new(IndexerState {
            progress: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        });

        let worker_state = state.clone();
        let handle = thread::spawn(move || {
            run_pass(&cache, &resolver, source.as_ref(), &worker_state);
            worker_state.running.store(false, Ordering::SeqCst);
        });

        Indexer {
            state,
            handle: Some(handle),
        }
    }

    pub fn progress(&self) -> usize {
        self.state.progress.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.state.total.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn did_fail(&self) -> bool {
        self.state.failed.load(Ordering::SeqCst)
    }

    /// Requests cooperative cancellation; the worker unwinds at its next
    /// cancellation check.
    pub fn cancel(&self) {
        self.state.cancel.store(true, Ordering::SeqCst);
    }

    /// Blocks until the worker thread has finished.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            // A panicking worker already is a bug, surface it.
            handle.join().expect("indexer worker panicked");
        }
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.cancel();
        self.wait();
    }
}

fn run_pass<F: FS>(
    cache: &CacheDB<F>,
    resolver: &Resolver,
    source: &dyn AssetSource,
    state: &IndexerState,
) {
    let files = match resolver.all_files() {
        Ok(files) => files,
        Err(error) => {
            error!("Could not enumerate files for indexing: {}", error);
            state.failed.store(true, Ordering::SeqCst);
            return;
        }
    };
    state.total.store(files.len(), Ordering::SeqCst);

    let mut visited = BTreeSet::new();
    for file in &files {
        if state.cancel.load(Ordering::Relaxed) {
            info!("Index pass cancelled after {} files", state.progress.load(Ordering::SeqCst));
            return;
        }

        // A failure inside one asset's sub-tree aborts only that asset,
        // siblings still get their pass.
        if let Err(error) = index_one(cache, resolver, source, file, &mut visited, &state.cancel) {
            match error {
                IndexError::Cancelled => return,
                error => {
                    warn!("Skipping '{}': {}", file.path, error);
                    state.failed.store(true, Ordering::SeqCst);
                }
            }
        }

        state.progress.fetch_add(1, Ordering::SeqCst);
    }
}

fn index_one<F: FS>(
    cache: &CacheDB<F>,
    resolver: &Resolver,
    source: &dyn AssetSource,
    file: &ManagedFile,
    visited: &mut BTreeSet<Tuid>,
    cancel: &AtomicBool,
) -> Result<()> {
    if !cache.has_changed(file)? {
        return Ok(());
    }

    let mut files = AssetFileMap::new();
    build_known_assets(resolver, source, file, &mut files)?;
    cache.insert_asset(file.file_id(), &mut files, visited, cancel)?;

    Ok(())
}

/// Resolves the dependency closure of `root` into an arena, loading every
/// referenced asset through the source. A dependency id without a registry
/// record is reported together with the path of the asset referencing it.
fn build_known_assets(
    resolver: &Resolver,
    source: &dyn AssetSource,
    root: &ManagedFile,
    files: &mut AssetFileMap,
) -> Result<()> {
    let mut pending: Vec<(Tuid, Option<String>)> = vec![(root.file_id(), None)];

    while let Some((id, referencing_path)) = pending.pop() {
        if id == NULL_TUID || files.contains_key(&id) {
            continue;
        }

        let managed = match resolver.find_by_id(id, false)? {
            Some(managed) => managed,
            None => {
                return Err(IndexError::MissingFile {
                    id,
                    referencing_path,
                });
            }
        };

        let asset = source.load(&managed)?;
        for dependency_id in &asset.dependency_ids {
            pending.push((*dependency_id, Some(asset.path.clone())));
        }
        files.insert(id, asset);
    }

    Ok(())
}

// Error Boilerplate (Error display, conversion and source)
impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFile {
                id,
                referencing_path,
            } => write!(
                f,
                "No record for referenced file {} (referenced by {:?})",
                format_tuid(*id),
                referencing_path
            ),
            other => write!(f, "Error During Index Pass({:?})", other),
        }
    }
}
impl From<ResolverError> for IndexError {
    fn from(error: ResolverError) -> Self {
        Self::ResolverError { source: error }
    }
}
impl From<CacheDBError> for IndexError {
    fn from(error: CacheDBError) -> Self {
        match error {
            CacheDBError::Cancelled => Self::Cancelled,
            error => Self::CacheDBError { source: error },
        }
    }
}
impl From<io::Error> for IndexError {
    fn from(error: io::Error) -> Self {
        Self::SourceError { source: error }
    }
}
impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingFile { .. } => None,
            Self::ResolverError { ref source } => Some(source),
            Self::CacheDBError { ref source } => Some(source),
            Self::SourceError { ref source } => Some(source),
            Self::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcs::StaticRevisionControl;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use store::Store;
    use virtual_fs::InMemoryFS;

    struct MapSource {
        assets: Mutex<HashMap<Tuid, AssetFile>>,
    }

    impl MapSource {
        fn new() -> Self {
            Self {
                assets: Mutex::new(HashMap::new()),
            }
        }

        fn add(&self, asset: AssetFile) {
            self.assets.lock().unwrap().insert(asset.id, asset);
        }
    }

    impl AssetSource for MapSource {
        fn load(&self, file: &ManagedFile) -> io::Result<AssetFile> {
            match self.assets.lock().unwrap().get(&file.file_id()) {
                Some(asset) => Ok(asset.clone()),
                None => Err(io::Error::from(io::ErrorKind::NotFound)),
            }
        }
    }

    fn time(seconds: i64) -> chrono::NaiveDateTime {
        chrono::NaiveDateTime::from_timestamp(seconds, 0)
    }

    struct TestWorld {
        cache: Arc<CacheDB<InMemoryFS>>,
        resolver: Arc<Resolver>,
        source: Arc<MapSource>,
        fs: InMemoryFS,
    }

    fn open_world() -> TestWorld {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let fs = InMemoryFS::new();
        let rcs = Arc::new(StaticRevisionControl::new());
        TestWorld {
            cache: Arc::new(CacheDB::new(store.clone(), fs.clone(), rcs)),
            resolver: Arc::new(Resolver::new(store)),
            source: Arc::new(MapSource::new()),
            fs,
        }
    }

    fn register(world: &TestWorld, id: Tuid, path: &str, dependency_ids: &[Tuid]) {
        world.resolver.insert(id, path, time(0), time(0), 1).unwrap();
        world.fs.create_file(path).unwrap();
        world
            .fs
            .set_mod_time(path, filetime::FileTime::from_unix_time(1000, 0))
            .unwrap();

        let mut asset = AssetFile::new(id, path);
        asset.dependency_ids = dependency_ids.iter().cloned().collect();
        asset.rcs_user = "alice".to_string();
        asset.engine_type = "environment".to_string();
        world.source.add(asset);
    }

    #[test]
    fn indexes_every_live_file() {
        let world = open_world();
        register(&world, 1, "levels/jungle.level", &[2]);
        register(&world, 2, "art/rock.entity", &[3]);
        register(&world, 3, "fx/moss.shader", &[]);

        let mut indexer = Indexer::spawn(
            world.cache.clone(),
            world.resolver.clone(),
            world.source.clone(),
        );
        indexer.wait();

        assert!(!indexer.is_running());
        assert!(!indexer.did_fail());
        assert_eq!(indexer.total(), 3);
        assert_eq!(indexer.progress(), 3);

        for id in 1..=3 {
            assert!(world.cache.asset_row_id(id).unwrap().is_some());
        }
    }

    #[test]
    fn unchanged_files_are_skipped_on_the_second_pass() {
        let world = open_world();
        register(&world, 1, "art/rock.entity", &[]);

        let mut indexer = Indexer::spawn(
            world.cache.clone(),
            world.resolver.clone(),
            world.source.clone(),
        );
        indexer.wait();
        let first_row = world.cache.asset_row_id(1).unwrap();

        // No disk change in between: the second pass must not fail and must
        // keep the same row.
        let mut indexer = Indexer::spawn(
            world.cache.clone(),
            world.resolver.clone(),
            world.source.clone(),
        );
        indexer.wait();

        assert!(!indexer.did_fail());
        assert_eq!(world.cache.asset_row_id(1).unwrap(), first_row);
    }

    #[test]
    fn missing_dependency_records_fail_only_their_subtree() {
        let world = open_world();
        register(&world, 1, "art/rock.entity", &[42]); // 42 has no record
        register(&world, 2, "art/tree.entity", &[]);

        let mut indexer = Indexer::spawn(
            world.cache.clone(),
            world.resolver.clone(),
            world.source.clone(),
        );
        indexer.wait();

        assert!(indexer.did_fail());
        assert_eq!(indexer.progress(), 2);
        // The sibling still made it in.
        assert!(world.cache.asset_row_id(2).unwrap().is_some());
        assert!(world.cache.asset_row_id(1).unwrap().is_none());
    }

    #[test]
    fn cancellation_stops_the_pass() {
        let world = open_world();
        register(&world, 1, "art/rock.entity", &[]);

        let mut indexer = Indexer::spawn(
            world.cache.clone(),
            world.resolver.clone(),
            world.source.clone(),
        );
        indexer.cancel();
        indexer.wait();

        assert!(!indexer.is_running());
    }
}
