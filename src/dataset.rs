use std::cell::{RefCell, RefMut};
use std::path::Path;

use crate::config::CacheConfig;
use crate::diagnostics::Diagnostics;
use crate::driver::{Driver, DriverManager};
use crate::errors::*;
use crate::options::{Access, DatasetOptions, OpenFlags};
use crate::raster::cache::{BlockCache, CacheStats};
use crate::raster::codec::{BandDescriptor, BlockCodec, CodecSession};
use crate::raster::RasterBand;

/// A raster dataset: one or more bands sharing a raster extent, backed by a
/// single storage handle owned by the dataset's block codec.
///
/// A dataset is used from one thread at a time. It is [`Send`] but not
/// [`Sync`]; share it across threads behind a `Mutex`.
///
/// Dirty blocks are written back when evicted from the block cache, on
/// [`flush_cache`](Dataset::flush_cache), and when the dataset is closed or
/// dropped.
pub struct Dataset {
    raster_size: (usize, usize),
    access: Access,
    driver_name: &'static str,
    state: RefCell<DatasetState>,
    closed: bool,
}

/// Everything block I/O mutates.
pub(crate) struct DatasetState {
    codec: Box<dyn BlockCodec>,
    pub(crate) bands: Vec<BandDescriptor>,
    pub(crate) cache: BlockCache,
    pub(crate) diagnostics: Diagnostics,
}

impl DatasetState {
    /// Borrows the cache and a codec session over the rest of the state.
    pub(crate) fn split(
        &mut self,
        raster_size: (usize, usize),
    ) -> (&mut BlockCache, CodecSession<'_>) {
        let DatasetState {
            codec,
            bands,
            cache,
            diagnostics,
        } = self;
        (
            cache,
            CodecSession {
                codec: &mut **codec,
                bands,
                raster_size,
                diagnostics,
            },
        )
    }

    pub(crate) fn codec_mut(&mut self) -> &mut dyn BlockCodec {
        &mut *self.codec
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("driver", &self.driver_name)
            .field("raster_size", &self.raster_size)
            .field("raster_count", &self.raster_count())
            .field("access", &self.access)
            .finish()
    }
}

impl Dataset {
    /// Builds a dataset around `codec`. Drivers call this once they have
    /// read (or written) the format's header.
    pub fn from_codec(
        codec: Box<dyn BlockCodec>,
        raster_size: (usize, usize),
        bands: Vec<BandDescriptor>,
        options: &DatasetOptions,
    ) -> Result<Dataset> {
        if raster_size.0 == 0 || raster_size.1 == 0 {
            return Err(RasterError::illegal(
                "from_codec",
                format!("empty raster size {raster_size:?}"),
            ));
        }
        if bands.is_empty() {
            return Err(RasterError::illegal("from_codec", "a dataset needs at least one band"));
        }
        if let Some(i) = bands
            .iter()
            .position(|b| b.block_size.0 == 0 || b.block_size.1 == 0)
        {
            return Err(RasterError::illegal(
                "from_codec",
                format!("band {} has an empty block size", i + 1),
            ));
        }

        let cache = CacheConfig::resolve(options.cache_max_blocks);
        let driver_name = codec.driver_name();
        log::debug!(
            "{driver_name} dataset {}x{} with {} band(s), cache of {} blocks",
            raster_size.0,
            raster_size.1,
            bands.len(),
            cache.max_blocks
        );
        Ok(Dataset {
            raster_size,
            access: options.open_flags.access(),
            driver_name,
            state: RefCell::new(DatasetState {
                codec,
                bands,
                cache: BlockCache::new(cache.max_blocks),
                diagnostics: Diagnostics::new(),
            }),
            closed: false,
        })
    }

    /// Open a dataset read-only, detecting its format.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Dataset> {
        Self::open_ex(path, DatasetOptions::default())
    }

    /// Open a dataset with extended options. See [`DatasetOptions`].
    ///
    /// With `allowed_drivers`, only those drivers are probed, in order.
    pub fn open_ex<P: AsRef<Path>>(path: P, options: DatasetOptions) -> Result<Dataset> {
        let path = path.as_ref();
        let result = Self::probe(path, &options).and_then(|driver| driver.open(path, &options));
        if let Err(e) = &result {
            if options.open_flags.contains(OpenFlags::OF_VERBOSE_ERROR) {
                log::error!("failed to open {}: {e}", path.display());
            }
        }
        result
    }

    fn probe(path: &Path, options: &DatasetOptions) -> Result<Driver> {
        let Some(allowed) = options.allowed_drivers else {
            return DriverManager::identify(path);
        };
        for name in allowed {
            let driver = DriverManager::get_driver_by_name(name)?;
            if driver.identify(path)? {
                return Ok(driver);
            }
        }
        Err(RasterError::OpenFailed {
            path: path.to_path_buf(),
            msg: format!("not recognised by any of {allowed:?}"),
        })
    }

    /// Fetch a band object for a dataset.
    ///
    /// Applies to raster datasets, and fetches the
    /// rasterband at the given _1-based_ index.
    pub fn rasterband(&self, band_index: usize) -> Result<RasterBand> {
        if band_index == 0 || band_index > self.raster_count() {
            return Err(RasterError::illegal(
                "rasterband",
                format!(
                    "band {band_index} out of range 1..={}",
                    self.raster_count()
                ),
            ));
        }
        Ok(RasterBand::new(self, band_index))
    }

    pub fn raster_count(&self) -> usize {
        self.state.borrow().bands.len()
    }

    /// `(width, height)` in pixels, shared by every band.
    pub fn raster_size(&self) -> (usize, usize) {
        self.raster_size
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver_name
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.borrow().cache.stats()
    }

    pub fn cache_max_blocks(&self) -> usize {
        self.state.borrow().cache.capacity()
    }

    /// Number of blocks currently held by the cache.
    pub fn cached_blocks(&self) -> usize {
        self.state.borrow().cache.len()
    }

    /// Resize the block cache. Shrinking evicts, writing back dirty blocks.
    pub fn set_cache_max_blocks(&self, max_blocks: usize) -> Result<()> {
        let mut state = self.state_mut();
        let (cache, mut session) = state.split(self.raster_size);
        cache.set_capacity(&mut session, max_blocks)
    }

    /// Warnings emitted by this dataset's codec so far.
    pub fn diagnostics(&self) -> Vec<String> {
        self.state.borrow().diagnostics.warnings().to_vec()
    }

    /// Write every dirty block back and flush the storage.
    ///
    /// Every dirty block is attempted even if some fail; the failures are
    /// returned together as [`RasterError::FlushFailed`]. Calling this again
    /// with nothing dirty encodes nothing.
    pub fn flush_cache(&self) -> Result<()> {
        let mut state = self.state_mut();
        let (cache, mut session) = state.split(self.raster_size);
        let flushed = cache.flush_all(&mut session);
        let synced = state.codec_mut().flush();
        flushed.and(synced)
    }

    /// Flush and release the storage.
    ///
    /// The storage is released even if the flush fails; the flush error is
    /// still returned.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush_cache();
        self.closed = true;
        result
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, DatasetState> {
        self.state.borrow_mut()
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush_cache() {
            log::error!("flushing {} dataset on drop: {e}", self.driver_name);
        }
    }
}
