use fsinterpose::backing::{Backing, DirHandle, Whence};
use fsinterpose::engine::Policy;
use fsinterpose::error::Error;
use fsinterpose::provider::{FileProvider, MetadataChange, NativeProvider};
use fsinterpose::proxy::ProxyProvider;
use fsinterpose::registry::Registry;
use fsinterpose::request::{OpenRequest, StreamContext, STREAM_URL_STAT_QUIET};
use fsinterpose::stat::FileStat;
use fsinterpose::transform::{CallMap, CallMapProvider, StaticCallMaps, Transforms};
use fsinterpose::wrapper::{DirWrapper, StreamWrapper};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// Native provider that counts the real calls it serves
#[derive(Default)]
struct CountingProvider {
    inner: NativeProvider,
    opens: AtomicUsize,
    reads: AtomicUsize,
    other: AtomicUsize,
}

impl CountingProvider {
    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn other(&self) -> usize {
        self.other.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.other.fetch_add(1, Ordering::SeqCst);
    }
}

impl FileProvider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn open(&self, request: &OpenRequest) -> fsinterpose::Result<Backing> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(request)
    }

    fn read_all(&self, path: &Path, use_path: bool, context: Option<&StreamContext>) -> io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_all(path, use_path, context)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.bump();
        self.inner.canonicalize(path)
    }

    fn open_dir(&self, path: &Path, context: Option<&StreamContext>) -> io::Result<DirHandle> {
        self.bump();
        self.inner.open_dir(path, context)
    }

    fn mkdir(&self, path: &Path, mode: u32, recursive: bool) -> io::Result<()> {
        self.bump();
        self.inner.mkdir(path, mode, recursive)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        self.bump();
        self.inner.rmdir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.bump();
        self.inner.rename(from, to)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        self.bump();
        self.inner.unlink(path)
    }

    fn set_metadata(&self, path: &Path, change: &MetadataChange) -> io::Result<()> {
        self.bump();
        self.inner.set_metadata(path, change)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.bump();
        self.inner.stat(path)
    }

    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        self.bump();
        self.inner.lstat(path)
    }
}

/// Call-map source that loads a sidecar file through whatever provider is active
struct SidecarCallMaps {
    registry: Arc<Registry>,
    served_by: parking_lot::Mutex<Vec<&'static str>>,
}

impl CallMapProvider for SidecarCallMaps {
    fn call_map_for(&self, path: &Path) -> CallMap {
        let provider = self.registry.active();
        self.served_by.lock().push(provider.name());

        let sidecar = path.with_extension("calls");
        let mut calls = CallMap::new();
        if let Ok(content) = provider.read_all(&sidecar, false, None) {
            for line in String::from_utf8_lossy(&content).lines() {
                if let Some((from, to)) = line.split_once('=') {
                    calls.insert(from.trim().to_string(), to.trim().to_string());
                }
            }
        }
        calls
    }
}

struct Setup {
    dir: TempDir,
    native: Arc<CountingProvider>,
    registry: Arc<Registry>,
    maps: Arc<StaticCallMaps>,
    proxy: Arc<ProxyProvider>,
}

impl Setup {
    fn new() -> Self {
        let native = Arc::new(CountingProvider::default());
        let registry = Registry::new(native.clone());
        let maps = Arc::new(StaticCallMaps::new());
        let proxy = ProxyProvider::install(
            registry.clone(),
            Transforms::with_call_maps(maps.clone()),
            Policy::default(),
        );
        registry.enable();
        Setup {
            dir: tempdir().unwrap(),
            native,
            registry,
            maps,
            proxy,
        }
    }

    fn file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn open(&self, request: &OpenRequest) -> StreamWrapper {
        let mut stream = StreamWrapper::new(self.registry.clone());
        stream.stream_open(request).unwrap();
        stream
    }
}

fn read_all(stream: &mut StreamWrapper) -> Vec<u8> {
    let mut data = Vec::new();
    while !stream.eof() {
        data.extend(stream.read(8192));
    }
    data
}

#[test]
fn include_of_target_serves_replacement() {
    let setup = Setup::new();
    let target = setup.file("a.inc", b"<?php echo 0;");
    let replacement = setup.file("b.inc", b"<?php echo 1;");
    setup.registry.intercept(&target, &replacement).unwrap();

    let mut stream = setup.open(&OpenRequest::include(&target).unwrap());
    assert_eq!(read_all(&mut stream), b"<?php echo 1;");
    assert!(matches!(stream.cast(), Some(Backing::Memory(_))));
    assert!(setup.registry.is_enabled());
}

#[test]
fn call_map_rewrites_raw_open() {
    let setup = Setup::new();
    let path = setup.file("c.src", b"old_fn();");
    let mut calls = CallMap::new();
    calls.insert("old_fn".to_string(), "new_fn".to_string());
    setup.maps.insert(&path, calls);

    let mut stream = setup.open(&OpenRequest::read(&path).unwrap());
    assert_eq!(read_all(&mut stream), b"new_fn();");
}

#[test]
fn passthrough_matches_direct_read() {
    let setup = Setup::new();
    let content: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
    let path = setup.file("plain.txt", &content);

    let mut stream = setup.open(&OpenRequest::read(&path).unwrap());
    assert!(matches!(stream.cast(), Some(Backing::Real(_))));
    assert_eq!(read_all(&mut stream), fs::read(&path).unwrap());
}

#[test]
fn url_stat_quiet_and_loud() {
    let setup = Setup::new();
    let missing = setup.dir.path().join("missing");

    assert!(setup
        .proxy
        .url_stat(&missing, STREAM_URL_STAT_QUIET)
        .unwrap()
        .is_none());
    let err = setup.proxy.url_stat(&missing, 0).unwrap_err();
    assert!(matches!(err, Error::Stat { .. }));
    assert_eq!(err.io_error().unwrap().kind(), io::ErrorKind::NotFound);
}

#[test]
fn php_without_modifiers_is_byte_identical() {
    let setup = Setup::new();
    let content = b"<?php\n// final thoughts\nclass A { public function f() { return 'final'; } }\n";
    let path = setup.file("plain.php", content);

    let mut stream = setup.open(&OpenRequest::read(&path).unwrap());
    assert_eq!(read_all(&mut stream), content);
}

#[test]
fn passthrough_handles_seek_independently() {
    let setup = Setup::new();
    let path = setup.file("data.txt", b"abcdefghij");

    let mut first = setup.open(&OpenRequest::read(&path).unwrap());
    let mut second = setup.open(&OpenRequest::read(&path).unwrap());

    assert!(first.seek(6, Whence::Set));
    assert_eq!(second.tell(), Some(0));
    assert_eq!(second.read(3), b"abc");
    assert_eq!(first.read(3), b"ghi");
    assert_eq!(first.tell(), Some(9));
    assert_eq!(second.tell(), Some(3));
}

#[test]
fn transformed_handles_seek_independently() {
    let setup = Setup::new();
    let path = setup.file("f.php", b"<?php final class F {}");

    let mut first = setup.open(&OpenRequest::read(&path).unwrap());
    let mut second = setup.open(&OpenRequest::read(&path).unwrap());

    assert!(first.seek(6, Whence::Set));
    assert_eq!(second.read(5), b"<?php");
    assert_eq!(first.read(5), b"class");
}

#[test]
fn each_open_issues_exactly_its_real_calls() {
    let setup = Setup::new();

    // passthrough: one real open
    let plain = setup.file("plain.txt", b"text");
    let mut stream = setup.open(&OpenRequest::read(&plain).unwrap());
    assert_eq!(read_all(&mut stream), b"text");
    assert_eq!((setup.native.opens(), setup.native.reads()), (1, 0));

    // strip branch: one whole-file load, no open
    let php = setup.file("f.php", b"<?php final class F {}");
    let mut stream = setup.open(&OpenRequest::read(&php).unwrap());
    assert_eq!(read_all(&mut stream), b"<?php class F {}");
    assert_eq!((setup.native.opens(), setup.native.reads()), (1, 1));

    // strip branch with nothing to strip: one load, then one open
    let clean = setup.file("g.php", b"<?php class G {}");
    setup.open(&OpenRequest::read(&clean).unwrap());
    assert_eq!((setup.native.opens(), setup.native.reads()), (2, 2));

    // substitution: one load of the replacement
    let target = setup.file("t.inc", b"target");
    let replacement = setup.file("r.inc", b"replacement");
    setup.registry.intercept(&target, &replacement).unwrap();
    let mut stream = setup.open(&OpenRequest::include(&target).unwrap());
    assert_eq!(read_all(&mut stream), b"replacement");
    assert_eq!((setup.native.opens(), setup.native.reads()), (2, 3));

    assert!(setup.registry.is_enabled());
}

#[test]
fn collaborator_io_reaches_native_provider() {
    let native = Arc::new(CountingProvider::default());
    let registry = Registry::new(native.clone());
    let maps = Arc::new(SidecarCallMaps {
        registry: registry.clone(),
        served_by: parking_lot::Mutex::new(Vec::new()),
    });
    let _proxy = ProxyProvider::install(
        registry.clone(),
        Transforms::with_call_maps(maps.clone()),
        Policy::default(),
    );
    registry.enable();

    let dir = tempdir().unwrap();
    let source = dir.path().join("clock.src");
    fs::write(&source, b"$t = time();").unwrap();
    fs::write(dir.path().join("clock.calls"), b"time = fake_time").unwrap();

    let mut stream = StreamWrapper::new(registry.clone());
    stream.stream_open(&OpenRequest::read(&source).unwrap()).unwrap();
    assert_eq!(read_all(&mut stream), b"$t = fake_time();");

    // one sidecar load by the collaborator, one source load by the engine
    assert_eq!(native.reads(), 2);
    assert_eq!(native.opens(), 0);
    assert_eq!(*maps.served_by.lock(), vec!["counting"]);
    assert!(registry.is_enabled());
}

#[test]
fn path_operations_pass_through_once() {
    let setup = Setup::new();
    let provider = setup.registry.active();
    assert_eq!(provider.name(), "proxy");

    let nested = setup.dir.path().join("x");
    provider.mkdir(&nested, 0o755, false).unwrap();
    assert_eq!(setup.native.other(), 1);

    let file = setup.file("x/f", b"");
    provider
        .set_metadata(&file, &MetadataChange::Touch { times: None })
        .unwrap();
    provider.unlink(&file).unwrap();
    provider.rmdir(&nested).unwrap();
    assert_eq!(setup.native.other(), 4);

    let mut dir = DirWrapper::new(setup.registry.clone());
    assert!(dir.open(setup.dir.path(), 0, None));
    assert_eq!(setup.native.other(), 5);
    assert!(dir.close());
    assert!(setup.registry.is_enabled());
}

#[test]
fn unreadable_replacement_fails_the_open() {
    let setup = Setup::new();
    let target = setup.file("a.inc", b"");
    let replacement = setup.file("b.inc", b"");
    setup.registry.intercept(&target, &replacement).unwrap();
    fs::remove_file(&replacement).unwrap();

    let mut stream = StreamWrapper::new(setup.registry.clone());
    let err = stream
        .stream_open(&OpenRequest::include(&target).unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::ReplacementUnreadable { .. }));
    assert!(!stream.is_open());
    assert!(stream.read(10).is_empty());
    assert!(setup.registry.is_enabled());
}

#[test]
fn include_path_from_context_is_searched() {
    let setup = Setup::new();
    let lib = setup.dir.path().join("lib");
    fs::create_dir(&lib).unwrap();
    fs::write(lib.join("zz_context_only.php"), b"<?php final class Z {}").unwrap();

    let request = OpenRequest::new("zz_context_only.php", "rb", fsinterpose::request::STREAM_USE_PATH)
        .unwrap()
        .with_context(StreamContext::with_include_path(vec![lib]));
    let mut stream = setup.open(&request);
    assert_eq!(read_all(&mut stream), b"<?php class Z {}");

    // without the flag the relative path is taken as is
    let mut stream = StreamWrapper::new(setup.registry.clone());
    let plain = OpenRequest::read("zz_context_only.php")
        .unwrap()
        .with_context(StreamContext::with_include_path(vec![setup.dir.path().join("lib")]));
    assert!(stream.stream_open(&plain).is_err());
}

/// Call maps whose lookup for one path stalls
struct StallingCallMaps {
    stall_on: PathBuf,
    entered: parking_lot::Mutex<Option<std::sync::mpsc::Sender<()>>>,
}

impl CallMapProvider for StallingCallMaps {
    fn call_map_for(&self, path: &Path) -> CallMap {
        if path == self.stall_on {
            if let Some(tx) = self.entered.lock().take() {
                let _ = tx.send(());
            }
            std::thread::sleep(std::time::Duration::from_millis(300));
        }
        CallMap::new()
    }
}

#[test]
fn concurrent_open_waits_for_other_threads_open() {
    let dir = tempdir().unwrap();
    let slow = dir.path().join("slow.txt");
    let php = dir.path().join("f.php");
    fs::write(&slow, b"slow").unwrap();
    fs::write(&php, b"<?php final class F {}").unwrap();

    let (entered_tx, entered_rx) = std::sync::mpsc::channel();
    let registry = Registry::new(Arc::new(NativeProvider::new()));
    let _proxy = ProxyProvider::install(
        registry.clone(),
        Transforms::with_call_maps(Arc::new(StallingCallMaps {
            stall_on: slow.clone(),
            entered: parking_lot::Mutex::new(Some(entered_tx)),
        })),
        Policy::default(),
    );
    registry.enable();

    let first = {
        let registry = registry.clone();
        std::thread::spawn(move || {
            let mut stream = StreamWrapper::new(registry);
            stream.stream_open(&OpenRequest::read(&slow).unwrap()).unwrap();
            read_all(&mut stream)
        })
    };

    // the first open is now inside its suspension window
    entered_rx.recv().unwrap();
    let mut stream = StreamWrapper::new(registry.clone());
    stream.stream_open(&OpenRequest::read(&php).unwrap()).unwrap();
    assert_eq!(read_all(&mut stream), b"<?php class F {}");

    assert_eq!(first.join().unwrap(), b"slow");
    assert!(registry.is_enabled());
}
