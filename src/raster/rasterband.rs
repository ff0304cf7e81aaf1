use bytemuck::Zeroable;

#[cfg(feature = "ndarray")]
use ndarray::Array2;

use crate::dataset::Dataset;
use crate::errors::*;
use crate::options::Access;
use crate::raster::cache::BlockCache;
use crate::raster::codec::{BandDescriptor, CodecSession};
use crate::raster::resample::{read_window, write_window, BufferLayout, ResampleAlg, Window};
use crate::raster::types::{convert_slice, fill_pixels};
use crate::raster::{Buffer, PixelType, PixelValue};

/// Direction of a [`RasterBand::raster_io`] transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RWFlag {
    Read,
    Write,
}

/// Represents a single band of a dataset.
///
/// This object carries the lifetime of the dataset that
/// contains it. This is necessary to prevent the dataset
/// from being dropped before the band.
#[derive(Debug)]
pub struct RasterBand<'a> {
    dataset: &'a Dataset,
    band: usize,
}

impl<'a> RasterBand<'a> {
    pub(crate) fn new(dataset: &'a Dataset, band: usize) -> Self {
        RasterBand { dataset, band }
    }

    fn descriptor(&self) -> BandDescriptor {
        self.dataset.state_mut().bands[self.band - 1]
    }

    fn with_cache<R>(
        &self,
        f: impl FnOnce(&mut BlockCache, &mut CodecSession<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.dataset.state_mut();
        let (cache, mut session) = state.split(self.dataset.raster_size());
        f(cache, &mut session)
    }

    fn check_writable(&self, method_name: &'static str) -> Result<()> {
        if self.dataset.access() == Access::ReadOnly {
            return Err(RasterError::NoWriteAccess { method_name });
        }
        Ok(())
    }

    /// Checks a block index against the raster (not the block grid), the
    /// same way for reads and writes.
    fn check_block(&self, method_name: &'static str, block: (usize, usize)) -> Result<()> {
        let (block_w, block_h) = self.block_size();
        let (raster_w, raster_h) = self.size();
        if block.0.checked_mul(block_w).map_or(true, |x| x >= raster_w) {
            return Err(RasterError::illegal(
                method_name,
                format!("block x index {} out of range", block.0),
            ));
        }
        if block.1.checked_mul(block_h).map_or(true, |y| y >= raster_h) {
            return Err(RasterError::illegal(
                method_name,
                format!("block y index {} out of range", block.1),
            ));
        }
        Ok(())
    }

    /// The _1-based_ index of this band in its dataset.
    pub fn band_index(&self) -> usize {
        self.band
    }

    pub fn access(&self) -> Access {
        self.dataset.access()
    }

    /// Get block size from a 'Dataset'.
    pub fn block_size(&self) -> (usize, usize) {
        self.descriptor().block_size
    }

    /// Get x-size of the band
    pub fn x_size(&self) -> usize {
        self.dataset.raster_size().0
    }

    /// Get y-size of the band
    pub fn y_size(&self) -> usize {
        self.dataset.raster_size().1
    }

    /// Get dimensions of the band.
    pub fn size(&self) -> (usize, usize) {
        self.dataset.raster_size()
    }

    /// Get actual block size (at the edges) when block size
    /// does not divide band size.
    pub fn actual_block_size(&self, block: (usize, usize)) -> Result<(usize, usize)> {
        self.check_block("actual_block_size", block)?;
        Ok(self.descriptor().actual_block_size(self.size(), block))
    }

    pub fn band_type(&self) -> PixelType {
        self.descriptor().pixel_type
    }

    pub fn no_data_value(&self) -> Option<f64> {
        self.descriptor().no_data
    }

    /// Set (or clear, with `None`) the no-data value.
    ///
    /// The codec records the value first; the cache is untouched if it
    /// refuses. Cached blocks are then written back and dropped, so blocks
    /// decoded afterwards are padded with the new value.
    pub fn set_no_data_value(&mut self, no_data: Option<f64>) -> Result<()> {
        self.check_writable("set_no_data_value")?;
        let band = self.band;
        {
            let mut state = self.dataset.state_mut();
            state.codec_mut().set_no_data_value(band, no_data)?;
            state.bands[band - 1].no_data = no_data;
        }
        self.with_cache(|cache, session| {
            cache.flush_band(session, band)?;
            cache.invalidate_band(band);
            Ok(())
        })
    }

    /// Transfer pixels between a window of the band and `buffer`.
    ///
    /// # Arguments
    /// * rw_flag - read from or write to the band
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are resampled if window_size != buffer_size)
    /// * buffer - raw pixel memory laid out as described by the remaining arguments
    /// * buffer_size - `(cols, rows)` of `buffer`
    /// * buffer_type - pixel type of `buffer`; values are converted to and from the band type
    /// * pixel_space - bytes between two pixels of a row, 0 for packed
    /// * line_space - bytes between two rows, 0 for packed
    /// * resample_alg - defaults to nearest neighbour; writes only support nearest neighbour
    #[allow(clippy::too_many_arguments)]
    pub fn raster_io(
        &mut self,
        rw_flag: RWFlag,
        window: (isize, isize),
        window_size: (usize, usize),
        buffer: &mut [u8],
        buffer_size: (usize, usize),
        buffer_type: PixelType,
        pixel_space: usize,
        line_space: usize,
        resample_alg: Option<ResampleAlg>,
    ) -> Result<()> {
        match rw_flag {
            RWFlag::Read => self.read_raw(
                window,
                window_size,
                buffer,
                buffer_size,
                buffer_type,
                pixel_space,
                line_space,
                resample_alg,
            ),
            RWFlag::Write => {
                self.check_writable("raster_io")?;
                if resample_alg.is_some_and(|alg| alg != ResampleAlg::NearestNeighbour) {
                    return Err(RasterError::NotSupported {
                        method_name: "raster_io",
                    });
                }
                self.write_raw(
                    window,
                    window_size,
                    buffer,
                    buffer_size,
                    buffer_type,
                    pixel_space,
                    line_space,
                )
            }
        }
    }

    /// Read-only half of [`raster_io`](RasterBand::raster_io).
    #[allow(clippy::too_many_arguments)]
    pub fn read_raw(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        buffer: &mut [u8],
        buffer_size: (usize, usize),
        buffer_type: PixelType,
        pixel_space: usize,
        line_space: usize,
        resample_alg: Option<ResampleAlg>,
    ) -> Result<()> {
        let window = Window::checked("raster_io", window, window_size, self.size())?;
        let layout = BufferLayout::checked(
            "raster_io",
            buffer_size,
            buffer_type,
            pixel_space,
            line_space,
            buffer.len(),
        )?;
        let band = self.band;
        self.with_cache(|cache, session| {
            read_window(
                cache,
                session,
                band,
                window,
                buffer,
                layout,
                resample_alg.unwrap_or_default(),
            )
        })
    }

    /// Write half of [`raster_io`](RasterBand::raster_io), nearest neighbour only.
    #[allow(clippy::too_many_arguments)]
    pub fn write_raw(
        &mut self,
        window: (isize, isize),
        window_size: (usize, usize),
        buffer: &[u8],
        buffer_size: (usize, usize),
        buffer_type: PixelType,
        pixel_space: usize,
        line_space: usize,
    ) -> Result<()> {
        self.check_writable("raster_io")?;
        let window = Window::checked("raster_io", window, window_size, self.size())?;
        let layout = BufferLayout::checked(
            "raster_io",
            buffer_size,
            buffer_type,
            pixel_space,
            line_space,
            buffer.len(),
        )?;
        let band = self.band;
        self.with_cache(|cache, session| write_window(cache, session, band, window, buffer, layout))
    }

    /// Read data from this band into a slice. T implements 'PixelValue'
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are resampled if window_size != buffer_size)
    /// * size - the desired size to read
    /// * buffer - a slice to hold the data (length must equal product of size parameter)
    /// * e_resample_alg - the resample algorithm used for the interpolation. Default: NearestNeighbor.
    pub fn read_into_slice<T: PixelValue>(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        size: (usize, usize),
        buffer: &mut [T],
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<()> {
        if buffer.len() != size.0 * size.1 {
            return Err(RasterError::illegal(
                "read_into_slice",
                format!(
                    "buffer of {} pixels does not match size {size:?}",
                    buffer.len()
                ),
            ));
        }
        self.read_raw(
            window,
            window_size,
            bytemuck::cast_slice_mut(buffer),
            size,
            T::pixel_type(),
            0,
            0,
            e_resample_alg,
        )
    }

    /// Read a 'Buffer<T>' from this band. T implements 'PixelValue'
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are resampled if window_size != buffer_size)
    /// * buffer_size - the desired size of the 'Buffer'
    /// * e_resample_alg - the resample algorithm used for the interpolation. Default: NearestNeighbor.
    pub fn read_as<T: PixelValue>(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        size: (usize, usize),
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<Buffer<T>> {
        let mut data = vec![T::zeroed(); size.0 * size.1];
        self.read_into_slice(window, window_size, size, &mut data, e_resample_alg)?;
        Ok(Buffer { size, data })
    }

    #[cfg(feature = "ndarray")]
    /// Read a 'Array2<T>' from this band. T implements 'PixelValue'.
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are resampled if window_size != array_size)
    /// * array_size - the desired size of the 'Array'
    /// * e_resample_alg - the resample algorithm used for the interpolation. Default: NearestNeighbor.
    /// # Docs
    /// The Matrix shape is (rows, cols) and raster shape is (cols in x-axis, rows in y-axis).
    pub fn read_as_array<T: PixelValue>(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        array_size: (usize, usize),
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<Array2<T>> {
        let data = self.read_as::<T>(window, window_size, array_size, e_resample_alg)?;

        // Matrix shape is (rows, cols) and raster shape is (cols in x-axis, rows in y-axis)
        Ok(Array2::from_shape_vec(
            (array_size.1, array_size.0),
            data.data,
        )?)
    }

    /// Read the full band as a 'Buffer<T>'.
    pub fn read_band_as<T: PixelValue>(&self) -> Result<Buffer<T>> {
        let size = self.size();
        self.read_as::<T>((0, 0), size, size, None)
    }

    /// Write a 'Buffer<T>' into a 'Dataset'.
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (the buffer is replicated if window_size != Buffer.size)
    pub fn write<T: PixelValue>(
        &mut self,
        window: (isize, isize),
        window_size: (usize, usize),
        buffer: &Buffer<T>,
    ) -> Result<()> {
        self.check_writable("write")?;
        if buffer.data.len() != buffer.size.0 * buffer.size.1 {
            return Err(RasterError::illegal(
                "write",
                format!(
                    "buffer of {} pixels does not match size {:?}",
                    buffer.data.len(),
                    buffer.size
                ),
            ));
        }
        self.write_raw(
            window,
            window_size,
            bytemuck::cast_slice(&buffer.data),
            buffer.size,
            T::pixel_type(),
            0,
            0,
        )
    }

    /// Copy block `(x, y)` into `out`, in the band's own pixel type.
    ///
    /// `out` must hold exactly one block; pixels beyond the raster edge carry
    /// the padding value.
    pub fn read_block(&self, block: (usize, usize), out: &mut [u8]) -> Result<()> {
        self.check_block("read_block", block)?;
        let desc = self.descriptor();
        if out.len() != desc.block_bytes() {
            return Err(RasterError::illegal(
                "read_block",
                format!(
                    "buffer of {} bytes, block is {}",
                    out.len(),
                    desc.block_bytes()
                ),
            ));
        }
        let key = BlockRef {
            band: self.band,
            block_x: block.0,
            block_y: block.1,
        };
        self.with_cache(|cache, session| {
            let cached = cache.get_block(session, key, false)?;
            out.copy_from_slice(cached.data());
            Ok(())
        })
    }

    /// Read block `(x, y)` as a 'Buffer<T>' the size of a full block,
    /// converting from the band type.
    pub fn read_block_as<T: PixelValue>(&self, block: (usize, usize)) -> Result<Buffer<T>> {
        let desc = self.descriptor();
        let mut raw = vec![0u8; desc.block_bytes()];
        self.read_block(block, &mut raw)?;
        let mut data = vec![T::zeroed(); desc.block_pixels()];
        convert_slice(
            desc.pixel_type,
            &raw,
            T::pixel_type(),
            bytemuck::cast_slice_mut(&mut data),
            desc.block_pixels(),
        );
        Ok(Buffer {
            size: desc.block_size,
            data,
        })
    }

    /// Replace block `(x, y)` with `data`, in the band's own pixel type.
    ///
    /// The block is only marked dirty; it reaches storage on eviction or flush.
    pub fn write_block(&mut self, block: (usize, usize), data: &[u8]) -> Result<()> {
        self.check_writable("write_block")?;
        self.check_block("write_block", block)?;
        let desc = self.descriptor();
        if data.len() != desc.block_bytes() {
            return Err(RasterError::illegal(
                "write_block",
                format!(
                    "buffer of {} bytes, block is {}",
                    data.len(),
                    desc.block_bytes()
                ),
            ));
        }
        let key = BlockRef {
            band: self.band,
            block_x: block.0,
            block_y: block.1,
        };
        self.with_cache(|cache, session| {
            let cached = cache.get_block_for_overwrite(session, key)?;
            cached.data_mut().copy_from_slice(data);
            Ok(())
        })
    }

    /// Set every pixel of the band to `value`.
    pub fn fill(&mut self, value: f64) -> Result<()> {
        self.check_writable("fill")?;
        let desc = self.descriptor();
        let (blocks_x, blocks_y) = desc.block_count(self.size());
        let band = self.band;
        self.with_cache(|cache, session| {
            for block_y in 0..blocks_y {
                for block_x in 0..blocks_x {
                    let key = BlockRef {
                        band,
                        block_x,
                        block_y,
                    };
                    let cached = cache.get_block_for_overwrite(session, key)?;
                    fill_pixels(desc.pixel_type, value, cached.data_mut());
                }
            }
            Ok(())
        })
    }

    /// Write back the dirty blocks of this band.
    pub fn flush_cache(&self) -> Result<()> {
        let band = self.band;
        self.with_cache(|cache, session| cache.flush_band(session, band))
    }

    /// Drop block `(x, y)` from the cache without writing it back, so the
    /// next access decodes it again. Read-only bands only.
    ///
    /// Returns whether the block was cached.
    pub fn invalidate_block(&self, block: (usize, usize)) -> Result<bool> {
        if self.access() == Access::Update {
            return Err(RasterError::NoWriteAccess {
                method_name: "invalidate_block",
            });
        }
        self.check_block("invalidate_block", block)?;
        let key = BlockRef {
            band: self.band,
            block_x: block.0,
            block_y: block.1,
        };
        Ok(self.dataset.state_mut().cache.invalidate(&key))
    }
}
