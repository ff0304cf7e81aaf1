//! DTED elevation matrices.
//!
//! A DTED file is a User Header Label (UHL), a Data Set Identification (DSI)
//! and an Accuracy Description (ACC) record, followed by one data record per
//! column. Optional `VOL`/`HDR` records before the UHL are skipped.
//!
//! A data record is a `0xAA` sentinel, block and column counts, the column's
//! samples from south to north as big-endian signed-magnitude 16-bit values
//! and a 4-byte checksum. Each column is one block, read north up.

use std::path::Path;

use crate::cpl::NameValueList;
use crate::dataset::Dataset;
use crate::errors::*;
use crate::options::{DatasetOptions, OpenFlags};
use crate::raster::codec::{BandDescriptor, BlockCodec, BlockContext};
use crate::raster::PixelType;
use crate::vsi::{FileStorage, Storage};

pub const SHORT_NAME: &str = "DTED";
pub const LONG_NAME: &str = "DTED Elevation Raster";

pub const UHL_SIZE: usize = 80;
pub const DSI_SIZE: usize = 648;
pub const ACC_SIZE: usize = 2700;
pub const NO_DATA: i16 = -32767;

const RECORD_SENTINEL: u8 = 0xAA;
/// Values below this (other than [`NO_DATA`]) are taken to be two's
/// complement encoded.
const TWOS_COMPLEMENT_THRESHOLD: i32 = -16000;
const MAX_COUNT: usize = 9999;

/// Reads a right-aligned ASCII integer field. `start` is 1-based, as in the
/// record layouts of the format description.
fn field(record: &[u8], start: usize, size: usize) -> Result<usize> {
    let raw = &record[start - 1..start - 1 + size];
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            RasterError::format(format!(
                "bad numeric field at {start}: {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

fn record_size(rows: usize) -> usize {
    12 + rows * 2
}

/// Decodes one sample. Returns the value and whether it had to be read as
/// two's complement.
fn decode_sample(hi: u8, lo: u8) -> (i16, bool) {
    let magnitude = (hi & 0x7f) as i32 * 256 + lo as i32;
    if hi & 0x80 == 0 {
        return (magnitude as i16, false);
    }
    let value = -magnitude;
    if value < TWOS_COMPLEMENT_THRESHOLD && value != NO_DATA as i32 {
        (i16::from_be_bytes([hi, lo]), true)
    } else {
        (value as i16, false)
    }
}

/// Signed magnitude has no -32768; it is stored as -32767, the no-data value.
fn encode_sample(value: i16) -> [u8; 2] {
    let value = value.max(-i16::MAX);
    let magnitude = (value as i32).unsigned_abs();
    let mut out = [((magnitude >> 8) & 0x7f) as u8, (magnitude & 0xff) as u8];
    if value < 0 {
        out[0] |= 0x80;
    }
    out
}

fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |sum, b| sum.wrapping_add(*b as u32))
}

pub struct DtedCodec {
    storage: Box<dyn Storage>,
    data_offset: u64,
    raster_size: (usize, usize),
}

impl DtedCodec {
    /// Parses the header records of an existing file.
    pub fn load(mut storage: Box<dyn Storage>) -> Result<Self> {
        let mut offset = 0u64;
        let mut uhl = [0u8; UHL_SIZE];
        loop {
            storage.read_exact_at(offset, &mut uhl)?;
            offset += UHL_SIZE as u64;
            if !(uhl.starts_with(b"VOL") || uhl.starts_with(b"HDR")) {
                break;
            }
        }
        if !uhl.starts_with(b"UHL") {
            return Err(RasterError::format("no UHL record, not a DTED file"));
        }

        let mut dsi = [0u8; 3];
        storage.read_exact_at(offset, &mut dsi)?;
        let mut acc = [0u8; 3];
        storage.read_exact_at(offset + DSI_SIZE as u64, &mut acc)?;
        if &dsi != b"DSI" || &acc != b"ACC" {
            return Err(RasterError::format("DSI or ACC record missing"));
        }

        let raster_size = (field(&uhl, 48, 4)?, field(&uhl, 52, 4)?);
        if raster_size.0 == 0 || raster_size.1 == 0 {
            return Err(RasterError::format(format!(
                "empty elevation matrix {raster_size:?}"
            )));
        }
        Ok(DtedCodec {
            storage,
            data_offset: offset + (DSI_SIZE + ACC_SIZE) as u64,
            raster_size,
        })
    }

    /// Writes header records and `columns` profiles of zero elevation.
    pub fn initialize(mut storage: Box<dyn Storage>, raster_size: (usize, usize)) -> Result<Self> {
        let (columns, rows) = raster_size;
        if columns == 0 || rows == 0 || columns > MAX_COUNT || rows > MAX_COUNT {
            return Err(RasterError::BadArgument(format!(
                "DTED matrices are 1 to {MAX_COUNT} samples on a side, got {raster_size:?}"
            )));
        }

        let mut headers = vec![b' '; UHL_SIZE + DSI_SIZE + ACC_SIZE];
        let uhl = format!(
            "UHL10000000E0000000N03000300NA  U  {:12}{columns:04}{rows:04}0",
            ""
        );
        headers[..uhl.len()].copy_from_slice(uhl.as_bytes());
        headers[UHL_SIZE..UHL_SIZE + 4].copy_from_slice(b"DSIU");
        headers[UHL_SIZE + DSI_SIZE..UHL_SIZE + DSI_SIZE + 3].copy_from_slice(b"ACC");

        storage.set_len(0)?;
        storage.write_all_at(0, &headers)?;
        let mut codec = DtedCodec {
            storage,
            data_offset: headers.len() as u64,
            raster_size,
        };
        let zeros = vec![0i16; rows];
        for column in 0..columns {
            codec.write_profile(column, &zeros)?;
        }
        Ok(codec)
    }

    fn profile_offset(&self, column: usize) -> u64 {
        self.data_offset + (column * record_size(self.raster_size.1)) as u64
    }

    /// Writes `values` (north to south) as the data record of `column`.
    fn write_profile(&mut self, column: usize, values: &[i16]) -> Result<()> {
        let rows = self.raster_size.1;
        let mut record = vec![0u8; record_size(rows)];
        record[0] = RECORD_SENTINEL;
        let count = [(column / 256) as u8, (column % 256) as u8];
        record[2..4].copy_from_slice(&count);
        record[4..6].copy_from_slice(&count);
        for (i, value) in values.iter().rev().enumerate() {
            record[8 + i * 2..10 + i * 2].copy_from_slice(&encode_sample(*value));
        }
        let sum = checksum(&record[..8 + rows * 2]);
        record[8 + rows * 2..].copy_from_slice(&sum.to_be_bytes());
        self.storage
            .write_all_at(self.profile_offset(column), &record)
    }
}

impl BlockCodec for DtedCodec {
    fn driver_name(&self) -> &'static str {
        SHORT_NAME
    }

    fn decode_block(&mut self, ctx: &mut BlockContext<'_>) -> Result<Vec<u8>> {
        let rows = self.raster_size.1;
        let mut record = vec![0u8; record_size(rows)];
        self.storage
            .read_exact_at(self.profile_offset(ctx.block_x), &mut record)?;
        if record[0] != RECORD_SENTINEL {
            return Err(RasterError::format(format!(
                "data record sentinel is {:#04x}",
                record[0]
            )));
        }
        let stored = u32::from_be_bytes([
            record[8 + rows * 2],
            record[9 + rows * 2],
            record[10 + rows * 2],
            record[11 + rows * 2],
        ]);
        if stored != checksum(&record[..8 + rows * 2]) {
            ctx.diagnostics.warn_once(
                "dted-checksum",
                &format!("DTED checksum mismatch in column {}", ctx.block_x),
            );
        }

        let mut block = vec![0u8; rows * 2];
        for i in 0..rows {
            let (value, twos_complement) = decode_sample(record[8 + i * 2], record[9 + i * 2]);
            if twos_complement {
                ctx.diagnostics.warn_once(
                    "dted-twos-complement",
                    "found DTED values less than -16000 and adjusted them, assuming they are \
                     improperly two's complemented",
                );
            }
            // south to north on disk
            let row = rows - 1 - i;
            block[row * 2..row * 2 + 2].copy_from_slice(&value.to_ne_bytes());
        }
        Ok(block)
    }

    fn encode_block(&mut self, ctx: &mut BlockContext<'_>, data: &[u8]) -> Result<()> {
        let values: Vec<i16> = data
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect();
        self.write_profile(ctx.block_x, &values)
    }

    fn flush(&mut self) -> Result<()> {
        self.storage.flush()
    }
}

fn band(rows: usize) -> BandDescriptor {
    BandDescriptor::new(PixelType::Int16, (1, rows)).with_no_data(Some(NO_DATA as f64))
}

/// Whether `header` starts like a DTED file.
pub fn identify(header: &[u8]) -> bool {
    [b"UHL", b"VOL", b"HDR"].iter().any(|tag| header.starts_with(*tag))
}

pub fn open(path: &Path, options: &DatasetOptions) -> Result<Dataset> {
    let update = options.open_flags.contains(OpenFlags::OF_UPDATE);
    let storage = FileStorage::open(path, update)?;
    let codec = DtedCodec::load(Box::new(storage))?;
    let raster_size = codec.raster_size;
    Dataset::from_codec(Box::new(codec), raster_size, vec![band(raster_size.1)], options)
}

/// Creates a DTED file of zero elevation at `path`, open for update.
///
/// DTED holds exactly one `Int16` band and takes no creation options.
pub fn create(
    path: &Path,
    raster_size: (usize, usize),
    band_count: usize,
    pixel_type: PixelType,
    options: &NameValueList,
) -> Result<Dataset> {
    options.check_known(&[])?;
    if band_count != 1 || pixel_type != PixelType::Int16 {
        return Err(RasterError::BadArgument(format!(
            "DTED holds one Int16 band, not {band_count} {pixel_type} band(s)"
        )));
    }
    let storage = FileStorage::create(path)?;
    let codec = DtedCodec::initialize(Box::new(storage), raster_size)?;
    Dataset::from_codec(
        Box::new(codec),
        raster_size,
        vec![band(raster_size.1)],
        &DatasetOptions {
            open_flags: OpenFlags::OF_UPDATE,
            ..Default::default()
        },
    )
}
