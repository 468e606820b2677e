//! Shared image cache.
//!
//! An [`ImageCache`] keeps decoded files resident so repeated metadata and
//! pixel queries skip the open/decode cost. One process-wide shared
//! instance can be aliased by any number of handles; private instances
//! belong to their creator. Queries come in two forms: name-based (the
//! file is re-looked-up each call) and handle-based (an [`CacheFile`]
//! entry resolved once and reused), optionally accelerated by per-thread
//! [`Perthread`] scratch that memoizes the last lookup without touching
//! the cache-wide lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::ThreadId;

use image::DynamicImage;
use log::debug;

use crate::error::{PixioError, Result};
use crate::format;
use crate::pixels::{self, Region};
use crate::spec::{AttrValue, ImageSpec};
use crate::typedesc::{Aggregate, TypeDesc};
use crate::DEFAULT_CACHE_MEMORY_MB;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-calling-thread scratch state.
///
/// Holds a one-slot memo of the last file lookup so hot loops skip the
/// cache-wide lock. Create one per thread and pass it to every
/// handle-based query from that thread; passing `None` degrades to an
/// internal get-or-create with the associated lock cost.
#[derive(Default)]
pub struct Perthread {
    memo: Option<(String, Arc<CacheFile>)>,
    lookups: u64,
    memo_hits: u64,
}

impl Perthread {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One resident file entry. Obtained once via
/// [`ImageCache::get_image_handle`] and reused across queries; owned by
/// the cache, which keeps every handed-out entry alive (even after
/// invalidation, when queries through it fail cleanly).
pub struct CacheFile {
    name: String,
    resolved: Option<PathBuf>,
    data: Option<(DynamicImage, ImageSpec)>,
    error: Option<String>,
    invalidated: AtomicBool,
}

impl CacheFile {
    fn open(name: &str, searchpath: &str) -> Self {
        let resolved = resolve_in_searchpath(name, searchpath);
        let Some(path) = resolved.clone() else {
            return Self {
                name: name.to_string(),
                resolved: None,
                data: None,
                error: Some(format!("could not find \"{name}\"")),
                invalidated: AtomicBool::new(false),
            };
        };
        match image::open(&path) {
            Ok(img) => {
                let spec = format::spec_from_image(&img);
                Self {
                    name: name.to_string(),
                    resolved,
                    data: Some((img, spec)),
                    error: None,
                    invalidated: AtomicBool::new(false),
                }
            }
            Err(e) => Self {
                name: name.to_string(),
                resolved,
                data: None,
                error: Some(format!("could not open \"{name}\": {e}")),
                invalidated: AtomicBool::new(false),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the name resolved to, when resolution succeeded.
    pub fn resolved_path(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }

    fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    fn usable(&self) -> Result<&(DynamicImage, ImageSpec)> {
        if self.is_invalidated() {
            return Err(PixioError::Invalidated(self.name.clone()));
        }
        match (&self.data, &self.error) {
            (Some(d), _) => Ok(d),
            (None, Some(msg)) => Err(PixioError::OpenFailed(msg.clone())),
            (None, None) => Err(PixioError::OpenFailed(self.name.clone())),
        }
    }
}

fn resolve_in_searchpath(name: &str, searchpath: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.exists() {
        return Some(direct.to_path_buf());
    }
    searchpath
        .split(':')
        .filter(|d| !d.is_empty())
        .map(|d| Path::new(d).join(name))
        .find(|p| p.exists())
}

struct CacheConfig {
    max_memory_mb: f32,
    max_open_files: i32,
    autotile: i32,
    autoscanline: i32,
    searchpath: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: DEFAULT_CACHE_MEMORY_MB,
            max_open_files: 100,
            autotile: 0,
            autoscanline: 0,
            searchpath: String::new(),
        }
    }
}

#[derive(Default)]
struct CacheStats {
    files_opened: AtomicU64,
    files_broken: AtomicU64,
    lookups: AtomicU64,
    memo_hits: AtomicU64,
    pixel_queries: AtomicU64,
}

struct CacheInner {
    shared: bool,
    files: Mutex<HashMap<String, Arc<CacheFile>>>,
    /// Evicted entries with possibly outstanding handles; kept alive so
    /// stale handles fail instead of dangling.
    retired: Mutex<Vec<Arc<CacheFile>>>,
    auto_threads: Mutex<Vec<(ThreadId, Box<Perthread>)>>,
    config: Mutex<CacheConfig>,
    stats: CacheStats,
    last_error: Mutex<Option<String>>,
}

/// Handle to a cache instance. Cloning is cheap and aliases the same
/// underlying cache; the shared instance is aliased process-wide.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<CacheInner>,
}

fn shared_registry() -> &'static Mutex<Option<ImageCache>> {
    static REGISTRY: OnceLock<Mutex<Option<ImageCache>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(None))
}

impl ImageCache {
    fn new_instance(shared: bool) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                shared,
                files: Mutex::new(HashMap::new()),
                retired: Mutex::new(Vec::new()),
                auto_threads: Mutex::new(Vec::new()),
                config: Mutex::new(CacheConfig::default()),
                stats: CacheStats::default(),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Returns the process-wide shared cache (`shared = true`; every such
    /// call aliases one object) or a fresh private instance.
    pub fn create(shared: bool) -> Self {
        if shared {
            let mut reg = lock(shared_registry());
            reg.get_or_insert_with(|| Self::new_instance(true)).clone()
        } else {
            Self::new_instance(false)
        }
    }

    /// Releases one handle. `teardown = true` on the shared instance also
    /// drops the process-wide registration and evicts residents now
    /// rather than at process exit.
    pub fn destroy(cache: Self, teardown: bool) {
        if cache.inner.shared && teardown {
            let mut reg = lock(shared_registry());
            if reg
                .as_ref()
                .is_some_and(|c| Arc::ptr_eq(&c.inner, &cache.inner))
            {
                *reg = None;
            }
            cache.invalidate_all(true);
        }
        drop(cache);
    }

    /// Whether two handles alias the same cache.
    pub fn same_cache(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_error(&self, msg: impl Into<String>) {
        *lock(&self.inner.last_error) = Some(msg.into());
    }

    /// Drains the pending error message; empty if none. Last-write-wins:
    /// check after every failing call, before the next one.
    pub fn geterror(&self) -> String {
        lock(&self.inner.last_error).take().unwrap_or_default()
    }

    /// Caller-owned per-thread scratch. Prefer this plus
    /// [`ImageCache::destroy_perthread_info`] over passing `None` on hot
    /// paths.
    pub fn create_perthread_info(&self) -> Box<Perthread> {
        Box::new(Perthread::new())
    }

    /// Destroys scratch obtained from
    /// [`ImageCache::create_perthread_info`].
    pub fn destroy_perthread_info(&self, info: Box<Perthread>) {
        debug!(
            "cache: per-thread state retired after {} lookups ({} memo hits)",
            info.lookups, info.memo_hits
        );
        drop(info);
    }

    /// Get-or-create default scratch for the calling thread; the degraded
    /// path behind a `None` perthread argument. Costs the cache-wide lock
    /// on every call.
    #[cfg(feature = "ffi")]
    pub(crate) fn auto_perthread(&self) -> *mut Perthread {
        let tid = std::thread::current().id();
        let mut threads = lock(&self.inner.auto_threads);
        if let Some((_, info)) = threads.iter_mut().find(|(t, _)| *t == tid) {
            return std::ptr::addr_of_mut!(**info);
        }
        debug!("cache: creating default per-thread state for {tid:?}");
        let idx = threads.len();
        threads.push((tid, Box::new(Perthread::new())));
        &mut *threads[idx].1 as *mut Perthread
    }

    fn lookup(&self, name: &str, mut perthread: Option<&mut Perthread>) -> Arc<CacheFile> {
        self.inner.stats.lookups.fetch_add(1, Ordering::Relaxed);
        if let Some(pt) = perthread.as_deref_mut() {
            pt.lookups += 1;
            if let Some((memo_name, entry)) = &pt.memo {
                if memo_name == name && !entry.is_invalidated() {
                    pt.memo_hits += 1;
                    self.inner.stats.memo_hits.fetch_add(1, Ordering::Relaxed);
                    return Arc::clone(entry);
                }
            }
        }
        let mut files = lock(&self.inner.files);
        let entry = files.entry(name.to_string()).or_insert_with(|| {
            let searchpath = lock(&self.inner.config).searchpath.clone();
            let file = CacheFile::open(name, &searchpath);
            self.inner.stats.files_opened.fetch_add(1, Ordering::Relaxed);
            if file.error.is_some() {
                self.inner.stats.files_broken.fetch_add(1, Ordering::Relaxed);
            } else {
                debug!("cache: resident {}", file.name);
            }
            Arc::new(file)
        });
        let entry = Arc::clone(entry);
        drop(files);
        if let Some(pt) = perthread {
            pt.memo = Some((name.to_string(), Arc::clone(&entry)));
        }
        entry
    }

    /// One-time name resolution to a reusable entry handle.
    pub fn get_image_handle(
        &self,
        name: &str,
        perthread: Option<&mut Perthread>,
    ) -> Arc<CacheFile> {
        self.lookup(name, perthread)
    }

    /// Validity check on a handle; a flag read, no I/O.
    pub fn good(&self, file: &CacheFile) -> bool {
        file.error.is_none() && !file.is_invalidated()
    }

    fn check_subimage(subimage: i32, miplevel: i32) -> Result<()> {
        if subimage == 0 && miplevel == 0 {
            Ok(())
        } else {
            Err(PixioError::SubimageNotFound { subimage, miplevel })
        }
    }

    /// Spec of a resident file, by handle.
    pub fn get_imagespec(
        &self,
        file: &CacheFile,
        subimage: i32,
        miplevel: i32,
        _native: bool,
    ) -> Result<ImageSpec> {
        Self::check_subimage(subimage, miplevel)?;
        let (_, spec) = file.usable()?;
        Ok(spec.clone())
    }

    /// Spec of a resident file, by name.
    pub fn get_imagespec_named(
        &self,
        name: &str,
        perthread: Option<&mut Perthread>,
        subimage: i32,
        miplevel: i32,
        native: bool,
    ) -> Result<ImageSpec> {
        let file = self.lookup(name, perthread);
        self.get_imagespec(&file, subimage, miplevel, native)
    }

    /// Metadata query by handle. Known datanames: `exists`, `subimages`,
    /// `miplevels`, `channels`, `resolution`, `format`.
    pub fn get_image_info(
        &self,
        file: &CacheFile,
        subimage: i32,
        miplevel: i32,
        dataname: &str,
    ) -> Result<AttrValue> {
        if dataname == "exists" {
            return Ok(AttrValue::Int(i32::from(self.good(file))));
        }
        Self::check_subimage(subimage, miplevel)?;
        let (_, spec) = file.usable()?;
        match dataname {
            "subimages" | "miplevels" => Ok(AttrValue::Int(1)),
            "channels" => Ok(AttrValue::Int(spec.nchannels)),
            "resolution" => Ok(AttrValue::IntVec(vec![spec.width, spec.height])),
            "format" => Ok(AttrValue::Str(spec.format.basetype.name().to_string())),
            other => Err(PixioError::UnknownAttribute(other.to_string())),
        }
    }

    /// Metadata query by name.
    pub fn get_image_info_named(
        &self,
        name: &str,
        perthread: Option<&mut Perthread>,
        subimage: i32,
        miplevel: i32,
        dataname: &str,
    ) -> Result<AttrValue> {
        let file = self.lookup(name, perthread);
        self.get_image_info(&file, subimage, miplevel, dataname)
    }

    /// Strided pixel query by handle; the fast path for tight loops.
    #[allow(clippy::too_many_arguments)]
    pub fn get_pixels(
        &self,
        file: &CacheFile,
        subimage: i32,
        miplevel: i32,
        region: Region,
        chbegin: i32,
        chend: i32,
        format: TypeDesc,
        data: &mut [u8],
        xstride: isize,
        ystride: isize,
        zstride: isize,
    ) -> Result<()> {
        self.inner.stats.pixel_queries.fetch_add(1, Ordering::Relaxed);
        Self::check_subimage(subimage, miplevel)?;
        let (img, spec) = file.usable()?;
        if format.aggregate != Aggregate::Scalar || format.is_array() {
            return Err(PixioError::UnsupportedFormat(format.to_string()));
        }
        if chbegin < 0 || chend > spec.nchannels || chbegin >= chend {
            return Err(PixioError::ChannelOutOfRange(chend));
        }
        region.validate(spec.x, spec.y, spec.z, spec.width, spec.height, spec.depth)?;
        let base = format.basetype;
        let nch = (chend - chbegin) as usize;
        let strides = pixels::resolve_strides(
            base.bytes(),
            nch,
            region.width() as usize,
            region.height() as usize,
            xstride,
            ystride,
            zstride,
        )?;
        let span = pixels::span_bytes(
            strides,
            region.width() as usize,
            region.height() as usize,
            region.depth() as usize,
            base.bytes() * nch,
        )?;
        if data.len() < span {
            return Err(PixioError::ReadFailed(format!(
                "buffer holds {} bytes, region needs {span}",
                data.len()
            )));
        }
        pixels::copy_image_region(
            img,
            (spec.x, spec.y),
            &region,
            chbegin as usize,
            chend as usize,
            base,
            data,
            strides,
            None,
        )
    }

    /// Strided pixel query by name.
    #[allow(clippy::too_many_arguments)]
    pub fn get_pixels_named(
        &self,
        name: &str,
        perthread: Option<&mut Perthread>,
        subimage: i32,
        miplevel: i32,
        region: Region,
        chbegin: i32,
        chend: i32,
        format: TypeDesc,
        data: &mut [u8],
        xstride: isize,
        ystride: isize,
        zstride: isize,
    ) -> Result<()> {
        let file = self.lookup(name, perthread);
        self.get_pixels(
            &file, subimage, miplevel, region, chbegin, chend, format, data, xstride, ystride,
            zstride,
        )
    }

    /// Evicts one entry. Outstanding handles to it stay dereferenceable
    /// but every query through them fails from then on.
    pub fn invalidate(&self, name: &str) {
        let removed = lock(&self.inner.files).remove(name);
        if let Some(entry) = removed {
            entry.invalidated.store(true, Ordering::Release);
            debug!("cache: invalidated {name}");
            lock(&self.inner.retired).push(entry);
        }
    }

    /// Evicts everything. Without `force`, entries with outstanding
    /// handles stay resident; with `force` they are evicted and their
    /// handles poisoned too.
    pub fn invalidate_all(&self, force: bool) {
        let mut files = lock(&self.inner.files);
        let mut retired = lock(&self.inner.retired);
        let kept: HashMap<String, Arc<CacheFile>> = files
            .drain()
            .filter_map(|(name, entry)| {
                if !force && Arc::strong_count(&entry) > 1 {
                    Some((name, entry))
                } else {
                    entry.invalidated.store(true, Ordering::Release);
                    retired.push(entry);
                    None
                }
            })
            .collect();
        *files = kept;
        debug!("cache: invalidate_all(force={force}), {} entries kept", files.len());
    }

    /// Evicts everything, poisoning outstanding handles.
    pub fn clear(&self) {
        self.invalidate_all(true);
    }

    /// Resolves a filename the way lookups do (as-is, then through the
    /// `searchpath` setting); returns the input unchanged when nothing
    /// matches.
    pub fn resolve_filename(&self, name: &str) -> String {
        let searchpath = lock(&self.inner.config).searchpath.clone();
        resolve_in_searchpath(name, &searchpath)
            .map_or_else(|| name.to_string(), |p| p.display().to_string())
    }

    /// Sets one cache-wide setting; false when the name is unrecognized
    /// or the value type does not match.
    pub fn attribute(&self, name: &str, value: &AttrValue) -> bool {
        let mut config = lock(&self.inner.config);
        match (name, value) {
            ("max_memory_MB", AttrValue::Float(v)) => config.max_memory_mb = *v,
            ("max_memory_MB", AttrValue::Double(v)) => config.max_memory_mb = *v as f32,
            ("max_open_files", AttrValue::Int(v)) => config.max_open_files = *v,
            ("autotile", AttrValue::Int(v)) => config.autotile = *v,
            ("autoscanline", AttrValue::Int(v)) => config.autoscanline = *v,
            ("searchpath", AttrValue::Str(v)) => config.searchpath = v.clone(),
            _ => return false,
        }
        true
    }

    /// Reads one cache-wide setting; `None` for unrecognized names.
    pub fn getattribute(&self, name: &str) -> Option<AttrValue> {
        let config = lock(&self.inner.config);
        Some(match name {
            "max_memory_MB" => AttrValue::Float(config.max_memory_mb),
            "max_open_files" => AttrValue::Int(config.max_open_files),
            "autotile" => AttrValue::Int(config.autotile),
            "autoscanline" => AttrValue::Int(config.autoscanline),
            "searchpath" => AttrValue::Str(config.searchpath.clone()),
            _ => return None,
        })
    }

    /// Human-readable statistics; higher levels add per-file detail.
    pub fn getstats(&self, level: i32) -> String {
        if level <= 0 {
            return String::new();
        }
        let stats = &self.inner.stats;
        let files = lock(&self.inner.files);
        let mut out = format!(
            "pixio ImageCache statistics\n  files: {} resident, {} opened, {} broken\n  lookups: {} ({} per-thread memo hits)\n  pixel queries: {}\n",
            files.len(),
            stats.files_opened.load(Ordering::Relaxed),
            stats.files_broken.load(Ordering::Relaxed),
            stats.lookups.load(Ordering::Relaxed),
            stats.memo_hits.load(Ordering::Relaxed),
            stats.pixel_queries.load(Ordering::Relaxed),
        );
        if level >= 2 {
            for (name, entry) in files.iter() {
                match (&entry.data, &entry.error) {
                    (Some((_, spec)), _) => out.push_str(&format!(
                        "    {name}: {}x{} ch={} {}\n",
                        spec.width, spec.height, spec.nchannels, spec.format
                    )),
                    (None, Some(msg)) => out.push_str(&format!("    {name}: broken ({msg})\n")),
                    (None, None) => out.push_str(&format!("    {name}: unresolved\n")),
                }
            }
        }
        out
    }

    /// Zeroes the statistics counters.
    pub fn reset_stats(&self) {
        let stats = &self.inner.stats;
        stats.files_opened.store(0, Ordering::Relaxed);
        stats.files_broken.store(0, Ordering::Relaxed);
        stats.lookups.store(0, Ordering::Relaxed);
        stats.memo_hits.store(0, Ordering::Relaxed);
        stats.pixel_queries.store(0, Ordering::Relaxed);
    }
}
