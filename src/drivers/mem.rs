//! In-memory rasters.
//!
//! Each band is a contiguous plane of `raster_w * raster_h` native-endian
//! pixels. Blocks are cut from and pasted back into the planes, so the block
//! size only changes how the cache sees the data. The default block is one
//! full-width row.

use crate::cpl::NameValueList;
use crate::dataset::Dataset;
use crate::drivers::{block_size_option, BLOCKXSIZE, BLOCKYSIZE};
use crate::errors::*;
use crate::options::{DatasetOptions, OpenFlags};
use crate::raster::codec::{BandDescriptor, BlockCodec, BlockContext};
use crate::raster::PixelType;

pub const SHORT_NAME: &str = "MEM";
pub const LONG_NAME: &str = "In Memory raster";

pub struct MemCodec {
    raster_size: (usize, usize),
    planes: Vec<Vec<u8>>,
}

impl MemCodec {
    /// Zero-filled planes for `bands`.
    pub fn new(raster_size: (usize, usize), bands: &[BandDescriptor]) -> Self {
        let pixels = raster_size.0 * raster_size.1;
        MemCodec {
            raster_size,
            planes: bands
                .iter()
                .map(|b| vec![0u8; pixels * b.pixel_type.bytes()])
                .collect(),
        }
    }

    /// The plane of `band` (1-based) as last encoded.
    pub fn plane(&self, band: usize) -> Option<&[u8]> {
        self.planes.get(band.wrapping_sub(1)).map(Vec::as_slice)
    }
}

impl BlockCodec for MemCodec {
    fn driver_name(&self) -> &'static str {
        SHORT_NAME
    }

    fn decode_block(&mut self, ctx: &mut BlockContext<'_>) -> Result<Vec<u8>> {
        let desc = ctx.descriptor;
        let px = desc.pixel_type.bytes();
        let (block_w, block_h) = desc.block_size;
        let (valid_w, valid_h) = ctx.valid_size();
        let (x0, y0) = (ctx.block_x * block_w, ctx.block_y * block_h);
        let plane = &self.planes[ctx.band - 1];

        let mut block = desc.padding_block();
        for row in 0..valid_h {
            let src = ((y0 + row) * self.raster_size.0 + x0) * px;
            let dst = row * block_w * px;
            block[dst..dst + valid_w * px].copy_from_slice(&plane[src..src + valid_w * px]);
        }
        Ok(block)
    }

    fn encode_block(&mut self, ctx: &mut BlockContext<'_>, data: &[u8]) -> Result<()> {
        let desc = ctx.descriptor;
        let px = desc.pixel_type.bytes();
        let (block_w, block_h) = desc.block_size;
        let (valid_w, valid_h) = ctx.valid_size();
        let (x0, y0) = (ctx.block_x * block_w, ctx.block_y * block_h);
        let plane = &mut self.planes[ctx.band - 1];

        for row in 0..valid_h {
            let dst = ((y0 + row) * self.raster_size.0 + x0) * px;
            let src = row * block_w * px;
            plane[dst..dst + valid_w * px].copy_from_slice(&data[src..src + valid_w * px]);
        }
        Ok(())
    }

    fn set_no_data_value(&mut self, _band: usize, _no_data: Option<f64>) -> Result<()> {
        Ok(())
    }
}

/// Creates an in-memory dataset, open for update.
///
/// Honours the `BLOCKXSIZE` and `BLOCKYSIZE` creation options.
pub fn create(
    raster_size: (usize, usize),
    band_count: usize,
    pixel_type: PixelType,
    options: &NameValueList,
) -> Result<Dataset> {
    options.check_known(&[BLOCKXSIZE, BLOCKYSIZE])?;
    let block_size = block_size_option(options, (raster_size.0, 1))?;
    let bands = vec![BandDescriptor::new(pixel_type, block_size); band_count];
    let codec = MemCodec::new(raster_size, &bands);
    Dataset::from_codec(
        Box::new(codec),
        raster_size,
        bands,
        &DatasetOptions {
            open_flags: OpenFlags::OF_UPDATE,
            ..Default::default()
        },
    )
}
