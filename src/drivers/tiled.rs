//! Single-file tiled rasters.
//!
//! ```text
//! header       magic "BRTILED1", raster width u32, raster height u32,
//!              band count u32, reserved u32
//! band header  per band: pixel type code u8, flags u8 (bit 0: has no-data),
//!              reserved u16, block width u32, block height u32,
//!              reserved u32, no-data f64
//! block index  per band, row-major over the block grid:
//!              payload offset u64, payload size u32
//! payloads     uncompressed tiles, appended on first write
//! ```
//!
//! All integers and pixel components are little-endian. An index entry with
//! offset 0 belongs to a block that was never written; it reads back as the
//! band's no-data value (or zero).

use std::path::Path;

use crate::cpl::NameValueList;
use crate::dataset::Dataset;
use crate::drivers::{block_size_option, swap_to_little_endian, BLOCKXSIZE, BLOCKYSIZE};
use crate::errors::*;
use crate::options::{DatasetOptions, OpenFlags};
use crate::raster::codec::{BandDescriptor, BlockCodec, BlockContext};
use crate::raster::PixelType;
use crate::vsi::{FileStorage, Storage};

pub const SHORT_NAME: &str = "GTiled";
pub const LONG_NAME: &str = "Generic tiled raster";

pub const MAGIC: &[u8; 8] = b"BRTILED1";
const HEADER_SIZE: u64 = 24;
const BAND_HEADER_SIZE: u64 = 24;
const INDEX_ENTRY_SIZE: u64 = 12;
const HAS_NO_DATA: u8 = 0x01;

pub const DEFAULT_BLOCK_SIZE: (usize, usize) = (256, 256);

#[inline]
fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
fn le_u64(b: &[u8], at: usize) -> u64 {
    let mut v = [0u8; 8];
    v.copy_from_slice(&b[at..at + 8]);
    u64::from_le_bytes(v)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

impl IndexEntry {
    fn is_written(&self) -> bool {
        self.offset != 0
    }

    fn to_bytes(self) -> [u8; INDEX_ENTRY_SIZE as usize] {
        let mut out = [0u8; INDEX_ENTRY_SIZE as usize];
        out[..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..].copy_from_slice(&self.size.to_le_bytes());
        out
    }
}

fn band_header_offset(band: usize) -> u64 {
    HEADER_SIZE + (band as u64 - 1) * BAND_HEADER_SIZE
}

fn encode_band_header(desc: &BandDescriptor) -> Result<[u8; BAND_HEADER_SIZE as usize]> {
    let mut out = [0u8; BAND_HEADER_SIZE as usize];
    out[0] = desc.pixel_type.code();
    if desc.no_data.is_some() {
        out[1] = HAS_NO_DATA;
    }
    out[4..8].copy_from_slice(&dimension(desc.block_size.0)?.to_le_bytes());
    out[8..12].copy_from_slice(&dimension(desc.block_size.1)?.to_le_bytes());
    out[16..24].copy_from_slice(&desc.no_data.unwrap_or(0.0).to_le_bytes());
    Ok(out)
}

fn decode_band_header(raw: &[u8]) -> Result<BandDescriptor> {
    let pixel_type = PixelType::from_code(raw[0]).map_err(|e| RasterError::format(e.to_string()))?;
    let block_size = (le_u32(raw, 4) as usize, le_u32(raw, 8) as usize);
    if block_size.0 == 0 || block_size.1 == 0 {
        return Err(RasterError::format(format!(
            "empty block size {block_size:?}"
        )));
    }
    let no_data = (raw[1] & HAS_NO_DATA != 0).then(|| f64::from_le_bytes(raw_f64(raw)));
    Ok(BandDescriptor::new(pixel_type, block_size).with_no_data(no_data))
}

fn raw_f64(raw: &[u8]) -> [u8; 8] {
    let mut v = [0u8; 8];
    v.copy_from_slice(&raw[16..24]);
    v
}

fn dimension(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| RasterError::BadArgument(format!("dimension {n} too large")))
}

/// Codec over a tiled file (or any other [`Storage`]).
pub struct TiledCodec {
    storage: Box<dyn Storage>,
    /// Per band: file offset of its block index, blocks per row, entries.
    tables: Vec<BlockTable>,
}

struct BlockTable {
    offset: u64,
    blocks_per_row: usize,
    entries: Vec<IndexEntry>,
}

impl TiledCodec {
    fn entry_position(&self, band: usize, block_x: usize, block_y: usize) -> (usize, u64) {
        let table = &self.tables[band - 1];
        let i = block_y * table.blocks_per_row + block_x;
        (i, table.offset + i as u64 * INDEX_ENTRY_SIZE)
    }

    /// Writes the header and an empty block index to `storage`.
    pub fn initialize(
        mut storage: Box<dyn Storage>,
        raster_size: (usize, usize),
        bands: &[BandDescriptor],
    ) -> Result<Self> {
        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&dimension(raster_size.0)?.to_le_bytes());
        header.extend_from_slice(&dimension(raster_size.1)?.to_le_bytes());
        header.extend_from_slice(&dimension(bands.len())?.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        for desc in bands {
            header.extend_from_slice(&encode_band_header(desc)?);
        }

        let mut tables = Vec::with_capacity(bands.len());
        let mut offset = header.len() as u64;
        for desc in bands {
            let (blocks_x, blocks_y) = desc.block_count(raster_size);
            tables.push(BlockTable {
                offset,
                blocks_per_row: blocks_x,
                entries: vec![IndexEntry::default(); blocks_x * blocks_y],
            });
            offset += (blocks_x * blocks_y) as u64 * INDEX_ENTRY_SIZE;
        }

        storage.set_len(0)?;
        storage.write_all_at(0, &header)?;
        storage.set_len(offset)?;
        Ok(TiledCodec { storage, tables })
    }

    /// Reads the header and block index from `storage`.
    pub fn load(
        mut storage: Box<dyn Storage>,
    ) -> Result<(Self, (usize, usize), Vec<BandDescriptor>)> {
        let mut header = [0u8; HEADER_SIZE as usize];
        storage.read_exact_at(0, &mut header)?;
        if &header[..8] != MAGIC {
            return Err(RasterError::format("not a tiled raster, bad magic"));
        }
        let raster_size = (le_u32(&header, 8) as usize, le_u32(&header, 12) as usize);
        let band_count = le_u32(&header, 16) as usize;
        if raster_size.0 == 0 || raster_size.1 == 0 || band_count == 0 {
            return Err(RasterError::format(format!(
                "empty raster: {raster_size:?} with {band_count} band(s)"
            )));
        }

        // header sizes come from the file; nothing is allocated before they
        // are known to fit in it
        let file_len = storage.len()?;
        let mut offset = HEADER_SIZE + band_count as u64 * BAND_HEADER_SIZE;
        if offset > file_len {
            return Err(RasterError::format(format!(
                "{band_count} band headers do not fit in {file_len} bytes"
            )));
        }
        let mut raw = vec![0u8; band_count * BAND_HEADER_SIZE as usize];
        storage.read_exact_at(HEADER_SIZE, &mut raw)?;
        let bands = raw
            .chunks_exact(BAND_HEADER_SIZE as usize)
            .map(decode_band_header)
            .collect::<Result<Vec<_>>>()?;

        let mut tables = Vec::with_capacity(band_count);
        for (i, desc) in bands.iter().enumerate() {
            let (blocks_x, blocks_y) = desc.block_count(raster_size);
            let table_end = desc
                .block_pixels_checked()
                .and_then(|px| px.checked_mul(desc.pixel_type.bytes()))
                .filter(|bytes| *bytes <= u32::MAX as usize)
                .and(blocks_x.checked_mul(blocks_y))
                .and_then(|count| (count as u64).checked_mul(INDEX_ENTRY_SIZE))
                .and_then(|table| table.checked_add(offset))
                .filter(|end| *end <= file_len)
                .ok_or_else(|| {
                    RasterError::format(format!(
                        "band {} with blocks of {:?} over {raster_size:?} does not fit in {file_len} bytes",
                        i + 1,
                        desc.block_size
                    ))
                })?;
            let mut raw = vec![0u8; (table_end - offset) as usize];
            storage.read_exact_at(offset, &mut raw)?;
            let entries = raw
                .chunks_exact(INDEX_ENTRY_SIZE as usize)
                .map(|e| IndexEntry {
                    offset: le_u64(e, 0),
                    size: le_u32(e, 8),
                })
                .collect();
            tables.push(BlockTable {
                offset,
                blocks_per_row: blocks_x,
                entries,
            });
            offset = table_end;
        }
        log::debug!(
            "tiled raster {}x{}, {band_count} band(s), data starts at {offset}",
            raster_size.0,
            raster_size.1
        );
        Ok((TiledCodec { storage, tables }, raster_size, bands))
    }
}

impl BlockCodec for TiledCodec {
    fn driver_name(&self) -> &'static str {
        SHORT_NAME
    }

    fn decode_block(&mut self, ctx: &mut BlockContext<'_>) -> Result<Vec<u8>> {
        let (i, _) = self.entry_position(ctx.band, ctx.block_x, ctx.block_y);
        let entry = self.tables[ctx.band - 1].entries[i];
        let desc = ctx.descriptor;
        if !entry.is_written() {
            return Ok(desc.padding_block());
        }
        if entry.size as usize != desc.block_bytes() {
            return Err(RasterError::format(format!(
                "stored tile of {} bytes, expected {}",
                entry.size,
                desc.block_bytes()
            )));
        }
        let mut data = vec![0u8; desc.block_bytes()];
        self.storage.read_exact_at(entry.offset, &mut data)?;
        swap_to_little_endian(desc.pixel_type, &mut data);
        Ok(data)
    }

    fn encode_block(&mut self, ctx: &mut BlockContext<'_>, data: &[u8]) -> Result<()> {
        let (i, entry_offset) = self.entry_position(ctx.band, ctx.block_x, ctx.block_y);
        let desc = ctx.descriptor;
        let mut payload = data.to_vec();
        swap_to_little_endian(desc.pixel_type, &mut payload);

        let entry = self.tables[ctx.band - 1].entries[i];
        if entry.is_written() {
            if entry.size as usize != payload.len() {
                return Err(RasterError::format(format!(
                    "stored tile of {} bytes, cannot overwrite with {}",
                    entry.size,
                    payload.len()
                )));
            }
            return self.storage.write_all_at(entry.offset, &payload);
        }

        let entry = IndexEntry {
            offset: self.storage.len()?,
            size: dimension(payload.len())?,
        };
        self.storage.write_all_at(entry.offset, &payload)?;
        self.storage.write_all_at(entry_offset, &entry.to_bytes())?;
        self.tables[ctx.band - 1].entries[i] = entry;
        Ok(())
    }

    fn set_no_data_value(&mut self, band: usize, no_data: Option<f64>) -> Result<()> {
        let at = band_header_offset(band);
        let mut raw = [0u8; BAND_HEADER_SIZE as usize];
        self.storage.read_exact_at(at, &mut raw)?;
        let desc = decode_band_header(&raw)?.with_no_data(no_data);
        self.storage.write_all_at(at, &encode_band_header(&desc)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.storage.flush()
    }
}

/// Whether `header` starts like a tiled raster.
pub fn identify(header: &[u8]) -> bool {
    header.starts_with(MAGIC)
}

pub fn open(path: &Path, options: &DatasetOptions) -> Result<Dataset> {
    let update = options.open_flags.contains(OpenFlags::OF_UPDATE);
    let storage = FileStorage::open(path, update)?;
    let (codec, raster_size, bands) = TiledCodec::load(Box::new(storage))?;
    Dataset::from_codec(Box::new(codec), raster_size, bands, options)
}

/// Creates (or truncates) a tiled raster at `path`, open for update.
///
/// Honours the `BLOCKXSIZE` and `BLOCKYSIZE` creation options.
pub fn create(
    path: &Path,
    raster_size: (usize, usize),
    band_count: usize,
    pixel_type: PixelType,
    options: &NameValueList,
) -> Result<Dataset> {
    options.check_known(&[BLOCKXSIZE, BLOCKYSIZE])?;
    let block_size = block_size_option(options, DEFAULT_BLOCK_SIZE)?;
    let bands = vec![BandDescriptor::new(pixel_type, block_size); band_count];
    let storage = FileStorage::create(path)?;
    let codec = TiledCodec::initialize(Box::new(storage), raster_size, &bands)?;
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
