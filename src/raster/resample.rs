//! Window transfers between a band's blocks and caller buffers.
//!
//! Source pixel selection for a buffer of `buf_w × buf_h` over a window of
//! `w × h` at `(x, y)` is integer nearest neighbour:
//! `src_x = x + floor(bx * w / buf_w)`, `src_y = y + floor(by * h / buf_h)`.

use crate::errors::{BlockRef, RasterError, Result};
use crate::raster::cache::BlockCache;
use crate::raster::codec::{BandDescriptor, CodecSession};
use crate::raster::types::{convert, read_pixel, write_pixel, PixelType};

/// Resampling used when the buffer size differs from the window size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResampleAlg {
    /// Nearest neighbour (select on one input pixel)
    #[default]
    NearestNeighbour,
    /// Average of all non no-data contributing pixels. Reads only.
    Average,
}

/// A validated pixel window inside the raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Window {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    /// Checks `window`/`window_size` against the raster extent.
    pub fn checked(
        method_name: &'static str,
        window: (isize, isize),
        window_size: (usize, usize),
        raster_size: (usize, usize),
    ) -> Result<Self> {
        if window.0 < 0 || window.1 < 0 {
            return Err(RasterError::illegal(
                method_name,
                format!("negative window offset {window:?}"),
            ));
        }
        if window_size.0 == 0 || window_size.1 == 0 {
            return Err(RasterError::illegal(
                method_name,
                format!("empty window size {window_size:?}"),
            ));
        }
        let (x, y) = (window.0 as usize, window.1 as usize);
        let fits_x = x
            .checked_add(window_size.0)
            .is_some_and(|end| end <= raster_size.0);
        let fits_y = y
            .checked_add(window_size.1)
            .is_some_and(|end| end <= raster_size.1);
        if !fits_x || !fits_y {
            return Err(RasterError::illegal(
                method_name,
                format!(
                    "access window {window:?} of size {window_size:?} is outside the raster of size {raster_size:?}"
                ),
            ));
        }
        Ok(Window {
            x,
            y,
            width: window_size.0,
            height: window_size.1,
        })
    }
}

/// In-memory layout of a caller buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BufferLayout {
    pub width: usize,
    pub height: usize,
    pub pixel_type: PixelType,
    pub pixel_space: usize,
    pub line_space: usize,
}

impl BufferLayout {
    /// Resolves zero strides to a packed layout and checks that `len` bytes
    /// are enough to hold it.
    pub fn checked(
        method_name: &'static str,
        size: (usize, usize),
        pixel_type: PixelType,
        pixel_space: usize,
        line_space: usize,
        len: usize,
    ) -> Result<Self> {
        if size.0 == 0 || size.1 == 0 {
            return Err(RasterError::illegal(
                method_name,
                format!("empty buffer size {size:?}"),
            ));
        }
        let pixel_space = if pixel_space == 0 {
            pixel_type.bytes()
        } else {
            pixel_space
        };
        if pixel_space < pixel_type.bytes() {
            return Err(RasterError::illegal(
                method_name,
                format!("pixel space {pixel_space} smaller than a {pixel_type} pixel"),
            ));
        }
        let overflow = || {
            RasterError::illegal(
                method_name,
                format!(
                    "buffer of size {size:?} with pixel space {pixel_space} and line space {line_space} overflows"
                ),
            )
        };
        let line_space = if line_space == 0 {
            pixel_space.checked_mul(size.0).ok_or_else(overflow)?
        } else {
            line_space
        };
        let needed = (size.1 - 1)
            .checked_mul(line_space)
            .zip((size.0 - 1).checked_mul(pixel_space))
            .and_then(|(rows, cols)| rows.checked_add(cols))
            .and_then(|n| n.checked_add(pixel_type.bytes()))
            .ok_or_else(overflow)?;
        if len < needed {
            return Err(RasterError::illegal(
                method_name,
                format!("buffer of {len} bytes too small, {needed} needed"),
            ));
        }
        Ok(BufferLayout {
            width: size.0,
            height: size.1,
            pixel_type,
            pixel_space,
            line_space,
        })
    }

    #[inline]
    fn offset(&self, bx: usize, by: usize) -> usize {
        by * self.line_space + bx * self.pixel_space
    }
}

/// `offset + floor(i * extent / count)`, without intermediate overflow.
#[inline]
fn scale(offset: usize, i: usize, extent: usize, count: usize) -> usize {
    offset + ((i as u128 * extent as u128) / count as u128) as usize
}

/// NaN no-data matches NaN pixels.
#[inline]
fn is_no_data(value: f64, no_data: f64) -> bool {
    value == no_data || (value.is_nan() && no_data.is_nan())
}

/// Source columns (or rows) picked by nearest neighbour for each buffer index.
pub(crate) fn nearest_indices(offset: usize, extent: usize, count: usize) -> Vec<usize> {
    (0..count).map(|i| scale(offset, i, extent, count)).collect()
}

fn block_key(band: usize, desc: &BandDescriptor, sx: usize, sy: usize) -> BlockRef {
    BlockRef {
        band,
        block_x: sx / desc.block_size.0,
        block_y: sy / desc.block_size.1,
    }
}

/// Copies the window into `buf`, resampling and converting pixel types.
///
/// Stops at the first failing block; rows already copied stay in `buf`.
pub(crate) fn read_window(
    cache: &mut BlockCache,
    session: &mut CodecSession<'_>,
    band: usize,
    window: Window,
    buf: &mut [u8],
    layout: BufferLayout,
    alg: ResampleAlg,
) -> Result<()> {
    match alg {
        ResampleAlg::NearestNeighbour => read_nearest(cache, session, band, window, buf, layout),
        ResampleAlg::Average => read_average(cache, session, band, window, buf, layout),
    }
}

fn read_nearest(
    cache: &mut BlockCache,
    session: &mut CodecSession<'_>,
    band: usize,
    window: Window,
    buf: &mut [u8],
    layout: BufferLayout,
) -> Result<()> {
    let desc = *session.descriptor(band);
    let (block_w, block_h) = desc.block_size;
    let band_type = desc.pixel_type;
    let band_px = band_type.bytes();
    let cols = nearest_indices(window.x, window.width, layout.width);

    for by in 0..layout.height {
        let sy = scale(window.y, by, window.height, layout.height);
        let line = sy % block_h;
        let mut bx = 0;
        while bx < layout.width {
            let key = block_key(band, &desc, cols[bx], sy);
            let block = cache.get_block(session, key, false)?;
            let data = block.data();
            // every buffer column served by this block
            while bx < layout.width && cols[bx] / block_w == key.block_x {
                let src = (line * block_w + cols[bx] % block_w) * band_px;
                let dst = layout.offset(bx, by);
                convert(band_type, &data[src..], layout.pixel_type, &mut buf[dst..]);
                bx += 1;
            }
        }
    }
    Ok(())
}

fn read_average(
    cache: &mut BlockCache,
    session: &mut CodecSession<'_>,
    band: usize,
    window: Window,
    buf: &mut [u8],
    layout: BufferLayout,
) -> Result<()> {
    let desc = *session.descriptor(band);
    let (block_w, block_h) = desc.block_size;
    let band_type = desc.pixel_type;
    let band_px = band_type.bytes();
    let span = |offset: usize, i: usize, extent: usize, count: usize| {
        let start = scale(offset, i, extent, count);
        let end = scale(offset, i + 1, extent, count).max(start + 1);
        start..end
    };

    for by in 0..layout.height {
        let rows = span(window.y, by, window.height, layout.height);
        for bx in 0..layout.width {
            let cols = span(window.x, bx, window.width, layout.width);
            let (mut re, mut im, mut n) = (0.0f64, 0.0f64, 0usize);
            for sy in rows.clone() {
                for sx in cols.clone() {
                    let key = block_key(band, &desc, sx, sy);
                    let block = cache.get_block(session, key, false)?;
                    let src = ((sy % block_h) * block_w + sx % block_w) * band_px;
                    let value = read_pixel(band_type, &block.data()[src..]);
                    if desc.no_data.is_some_and(|nd| is_no_data(value.0, nd)) {
                        continue;
                    }
                    re += value.0;
                    im += value.1;
                    n += 1;
                }
            }
            let value = if n == 0 {
                (desc.no_data.unwrap_or(0.0), 0.0)
            } else {
                (re / n as f64, im / n as f64)
            };
            let dst = layout.offset(bx, by);
            write_pixel(layout.pixel_type, value, &mut buf[dst..]);
        }
    }
    Ok(())
}

/// Stores `buf` into the window, converting to the band type.
///
/// Every window pixel takes the buffer pixel that maps onto it by nearest
/// neighbour, so a small buffer is replicated over a larger window. Blocks
/// entirely covered by the window are not decoded first.
pub(crate) fn write_window(
    cache: &mut BlockCache,
    session: &mut CodecSession<'_>,
    band: usize,
    window: Window,
    buf: &[u8],
    layout: BufferLayout,
) -> Result<()> {
    let desc = *session.descriptor(band);
    let (block_w, block_h) = desc.block_size;
    let band_type = desc.pixel_type;
    let band_px = band_type.bytes();
    let raster_size = session.raster_size;

    let buf_cols = nearest_indices(0, layout.width, window.width);
    let buf_rows = nearest_indices(0, layout.height, window.height);

    let first_block = (window.x / block_w, window.y / block_h);
    let last_block = (
        (window.x + window.width - 1) / block_w,
        (window.y + window.height - 1) / block_h,
    );

    for block_y in first_block.1..=last_block.1 {
        for block_x in first_block.0..=last_block.0 {
            let (valid_w, valid_h) = desc.actual_block_size(raster_size, (block_x, block_y));
            let x0 = block_x * block_w;
            let y0 = block_y * block_h;
            let covered = window.x <= x0
                && window.y <= y0
                && x0 + valid_w <= window.x + window.width
                && y0 + valid_h <= window.y + window.height;

            let key = BlockRef {
                band,
                block_x,
                block_y,
            };
            let block = if covered {
                cache.get_block_for_overwrite(session, key)?
            } else {
                cache.get_block(session, key, true)?
            };
            let data = block.data_mut();

            let sx_range = x0.max(window.x)..(x0 + valid_w).min(window.x + window.width);
            let sy_range = y0.max(window.y)..(y0 + valid_h).min(window.y + window.height);
            for sy in sy_range {
                let by = buf_rows[sy - window.y];
                for sx in sx_range.clone() {
                    let bx = buf_cols[sx - window.x];
                    let src = layout.offset(bx, by);
                    let dst = ((sy - y0) * block_w + (sx - x0)) * band_px;
                    convert(layout.pixel_type, &buf[src..], band_type, &mut data[dst..]);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_downsample_indices() {
        assert_eq!(nearest_indices(0, 10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(nearest_indices(3, 4, 2), vec![3, 5]);
        // 3 source pixels onto 2: floor(0*3/2)=0, floor(1*3/2)=1
        assert_eq!(nearest_indices(0, 3, 2), vec![0, 1]);
    }

    #[test]
    fn nearest_upsample_indices() {
        assert_eq!(nearest_indices(0, 2, 20), [vec![0; 10], vec![1; 10]].concat());
    }

    #[test]
    fn window_validation() {
        assert!(Window::checked("t", (0, 0), (100, 100), (100, 100)).is_ok());
        assert!(Window::checked("t", (1, 0), (100, 100), (100, 100)).is_err());
        assert!(Window::checked("t", (-1, 0), (10, 10), (100, 100)).is_err());
        assert!(Window::checked("t", (0, 0), (0, 10), (100, 100)).is_err());
        assert!(Window::checked("t", (0, 99), (1, 2), (100, 100)).is_err());
    }

    #[test]
    fn buffer_layout_defaults() {
        let layout = BufferLayout::checked("t", (5, 3), PixelType::Int16, 0, 0, 30).unwrap();
        assert_eq!(layout.pixel_space, 2);
        assert_eq!(layout.line_space, 10);
        assert!(BufferLayout::checked("t", (5, 3), PixelType::Int16, 0, 0, 29).is_err());
        // interleaved: 4 bytes per pixel, 2 used
        let layout = BufferLayout::checked("t", (2, 2), PixelType::Int16, 4, 0, 14).unwrap();
        assert_eq!(layout.line_space, 8);
        assert!(BufferLayout::checked("t", (2, 2), PixelType::Int16, 1, 0, 64).is_err());
    }

    #[test]
    fn buffer_layout_overflow() {
        let err = BufferLayout::checked("t", (1, 2), PixelType::Byte, 0, usize::MAX, 16);
        assert!(matches!(err, Err(RasterError::IllegalArgument { .. })));
        let err = BufferLayout::checked("t", (2, 1), PixelType::Int16, usize::MAX, 0, 16);
        assert!(matches!(err, Err(RasterError::IllegalArgument { .. })));
        let err = BufferLayout::checked("t", (usize::MAX, 1), PixelType::Float64, 0, 0, 16);
        assert!(matches!(err, Err(RasterError::IllegalArgument { .. })));
    }

    #[test]
    fn nan_no_data_matches_nan() {
        assert!(is_no_data(f64::NAN, f64::NAN));
        assert!(is_no_data(-9999.0, -9999.0));
        assert!(!is_no_data(1.0, f64::NAN));
        assert!(!is_no_data(f64::NAN, 0.0));
    }
}
