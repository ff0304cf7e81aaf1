//! The block codec contract drivers implement.
//!
//! A codec moves whole blocks between the dataset's storage and decoded,
//! native-endian pixel buffers. Block coordinates handed to a codec have
//! already been validated against the band's block grid.

use crate::diagnostics::Diagnostics;
use crate::errors::{BlockRef, RasterError, Result};
use crate::raster::types::{fill_pixels, PixelType};

/// Fixed geometry and pixel type of one band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandDescriptor {
    pub pixel_type: PixelType,
    /// `(width, height)` of a block in pixels.
    pub block_size: (usize, usize),
    pub no_data: Option<f64>,
}

impl BandDescriptor {
    pub fn new(pixel_type: PixelType, block_size: (usize, usize)) -> Self {
        BandDescriptor {
            pixel_type,
            block_size,
            no_data: None,
        }
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn block_pixels(&self) -> usize {
        self.block_size.0 * self.block_size.1
    }

    /// [`block_pixels`](Self::block_pixels), or `None` on overflow.
    pub fn block_pixels_checked(&self) -> Option<usize> {
        self.block_size.0.checked_mul(self.block_size.1)
    }

    /// Size in bytes of one decoded block.
    pub fn block_bytes(&self) -> usize {
        self.block_pixels() * self.pixel_type.bytes()
    }

    /// `(blocks per row, blocks per column)` for a raster of `raster_size`.
    pub fn block_count(&self, raster_size: (usize, usize)) -> (usize, usize) {
        (
            raster_size.0.div_ceil(self.block_size.0),
            raster_size.1.div_ceil(self.block_size.1),
        )
    }

    /// Part of block `(block_x, block_y)` that lies inside the raster.
    pub fn actual_block_size(
        &self,
        raster_size: (usize, usize),
        block: (usize, usize),
    ) -> (usize, usize) {
        let x0 = block.0 * self.block_size.0;
        let y0 = block.1 * self.block_size.1;
        (
            self.block_size.0.min(raster_size.0.saturating_sub(x0)),
            self.block_size.1.min(raster_size.1.saturating_sub(y0)),
        )
    }

    /// A block filled with the no-data value, or zero.
    pub fn padding_block(&self) -> Vec<u8> {
        let mut block = vec![0u8; self.block_bytes()];
        if let Some(no_data) = self.no_data {
            fill_pixels(self.pixel_type, no_data, &mut block);
        }
        block
    }
}

/// Everything a codec may need to know about the block it is asked for.
pub struct BlockContext<'a> {
    /// 1-based band index.
    pub band: usize,
    pub block_x: usize,
    pub block_y: usize,
    pub descriptor: &'a BandDescriptor,
    pub raster_size: (usize, usize),
    pub diagnostics: &'a mut Diagnostics,
}

impl BlockContext<'_> {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            band: self.band,
            block_x: self.block_x,
            block_y: self.block_y,
        }
    }

    /// See [`BandDescriptor::actual_block_size`].
    pub fn valid_size(&self) -> (usize, usize) {
        self.descriptor
            .actual_block_size(self.raster_size, (self.block_x, self.block_y))
    }
}

/// Format specific encoding and decoding of single blocks.
///
/// One codec instance serves every band of a dataset and owns the dataset's
/// storage handle.
pub trait BlockCodec: Send {
    /// Short driver name, e.g. `"MEM"`.
    fn driver_name(&self) -> &'static str;

    /// Decode one block. The returned buffer must hold exactly
    /// `descriptor.block_bytes()` bytes; pixels outside the raster are padded
    /// with the no-data value or zero.
    fn decode_block(&mut self, ctx: &mut BlockContext<'_>) -> Result<Vec<u8>>;

    /// Encode one block. Data must be handed to the storage layer before this
    /// returns.
    fn encode_block(&mut self, ctx: &mut BlockContext<'_>, data: &[u8]) -> Result<()> {
        let _ = (ctx, data);
        Err(RasterError::NotSupported {
            method_name: "encode_block",
        })
    }

    /// Persist a changed no-data value for `band`.
    fn set_no_data_value(&mut self, band: usize, no_data: Option<f64>) -> Result<()> {
        let _ = (band, no_data);
        Err(RasterError::NotSupported {
            method_name: "set_no_data_value",
        })
    }

    /// Flush the underlying storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A codec bound to the dataset state it needs to build [`BlockContext`]s.
pub struct CodecSession<'a> {
    pub codec: &'a mut (dyn BlockCodec + 'static),
    pub bands: &'a [BandDescriptor],
    pub raster_size: (usize, usize),
    pub diagnostics: &'a mut Diagnostics,
}

impl CodecSession<'_> {
    pub fn descriptor(&self, band: usize) -> &BandDescriptor {
        &self.bands[band - 1]
    }

    pub fn decode(&mut self, at: BlockRef) -> Result<Vec<u8>> {
        let descriptor = &self.bands[at.band - 1];
        let mut ctx = BlockContext {
            band: at.band,
            block_x: at.block_x,
            block_y: at.block_y,
            descriptor,
            raster_size: self.raster_size,
            diagnostics: &mut *self.diagnostics,
        };
        let data = self
            .codec
            .decode_block(&mut ctx)
            .map_err(|e| e.at_block(at))?;
        if data.len() != descriptor.block_bytes() {
            return Err(RasterError::FormatError {
                block: Some(at),
                msg: format!(
                    "codec returned {} bytes, expected {}",
                    data.len(),
                    descriptor.block_bytes()
                ),
            });
        }
        Ok(data)
    }

    pub fn encode(&mut self, at: BlockRef, data: &[u8]) -> Result<()> {
        let descriptor = &self.bands[at.band - 1];
        let mut ctx = BlockContext {
            band: at.band,
            block_x: at.block_x,
            block_y: at.block_y,
            descriptor,
            raster_size: self.raster_size,
            diagnostics: &mut *self.diagnostics,
        };
        self.codec
            .encode_block(&mut ctx, data)
            .map_err(|e| e.at_block(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_geometry() {
        let desc = BandDescriptor::new(PixelType::Int16, (64, 64));
        assert_eq!(desc.block_bytes(), 64 * 64 * 2);
        assert_eq!(desc.block_count((100, 100)), (2, 2));
        assert_eq!(desc.block_count((128, 64)), (2, 1));
        assert_eq!(desc.actual_block_size((100, 100), (1, 1)), (36, 36));
        assert_eq!(desc.actual_block_size((100, 100), (0, 1)), (64, 36));
    }

    #[test]
    fn padding_uses_no_data() {
        let desc = BandDescriptor::new(PixelType::Byte, (2, 2)).with_no_data(Some(7.0));
        assert_eq!(desc.padding_block(), vec![7u8; 4]);
        let desc = BandDescriptor::new(PixelType::Byte, (2, 2));
        assert_eq!(desc.padding_block(), vec![0u8; 4]);
    }

    struct ShortCodec;

    impl BlockCodec for ShortCodec {
        fn driver_name(&self) -> &'static str {
            "SHORT"
        }

        fn decode_block(&mut self, _ctx: &mut BlockContext<'_>) -> Result<Vec<u8>> {
            Ok(vec![0u8; 3])
        }
    }

    #[test]
    fn session_rejects_wrong_block_length() {
        let mut codec: Box<dyn BlockCodec> = Box::new(ShortCodec);
        let bands = [BandDescriptor::new(PixelType::Byte, (2, 2))];
        let mut diagnostics = Diagnostics::new();
        let mut session = CodecSession {
            codec: &mut *codec,
            bands: &bands,
            raster_size: (4, 4),
            diagnostics: &mut diagnostics,
        };
        let at = BlockRef {
            band: 1,
            block_x: 1,
            block_y: 0,
        };
        assert!(matches!(
            session.decode(at),
            Err(RasterError::FormatError { block: Some(b), .. }) if b == at
        ));
        assert!(matches!(
            session.encode(at, &[0; 4]),
            Err(RasterError::NotSupported { .. })
        ));
    }
}
