//! Raster bands, blocks and the block cache

mod buffer;
pub mod cache;
pub mod codec;
mod rasterband;
mod resample;
mod types;

pub use buffer::{Buffer, ByteBuffer};
pub use cache::{Block, BlockCache, CacheStats};
pub use codec::{BandDescriptor, BlockCodec, BlockContext, CodecSession};
pub use rasterband::{RWFlag, RasterBand};
pub use resample::ResampleAlg;
pub use types::{
    convert, convert_slice, fill_pixels, pixel_bytes, read_pixel, write_pixel, PixelType,
    PixelValue,
};

#[derive(Debug)]
pub struct RasterCreationOption<'a> {
    pub key: &'a str,
    pub value: &'a str,
}
