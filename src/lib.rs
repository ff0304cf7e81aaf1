//! Tiled raster block I/O for Rust.
//!
//! A raster [`Dataset`] holds one or more bands of equal size. Each band is
//! stored as a grid of fixed-size blocks that a format specific
//! [`BlockCodec`](raster::BlockCodec) decodes and encodes. Decoded blocks are
//! kept in a bounded, per-dataset LRU cache; writes mark cached blocks dirty
//! and reach storage when a block is evicted, on
//! [`Dataset::flush_cache`], or when the dataset is closed.
//!
//! [`RasterBand::raster_io`](raster::RasterBand::raster_io) reads or writes
//! any window of a band, resampling with nearest neighbour when the buffer
//! size differs from the window size and converting between pixel types.
//!
//! ## Use
//!
//! ```
//! use blockraster::raster::Buffer;
//! use blockraster::DriverManager;
//!
//! # fn main() -> blockraster::errors::Result<()> {
//! let driver = DriverManager::get_driver_by_name("MEM")?;
//! let dataset = driver.create_with_band_type::<u16, _>("", 100, 50, 1)?;
//! let mut band = dataset.rasterband(1)?;
//! band.write((10, 10), (4, 4), &Buffer::new((2, 2), vec![1u16, 2, 3, 4]))?;
//!
//! let window = band.read_as::<u8>((10, 10), (4, 4), (4, 4), None)?;
//! assert_eq!(window.data[..4], [1, 1, 2, 2]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Drivers
//!
//! | Short name | Format                                             |
//! |------------|----------------------------------------------------|
//! | `MEM`      | in-memory planes                                   |
//! | `GTiled`   | single file, block index and little-endian tiles   |
//! | `DTED`     | DTED elevation matrices, one column per block      |
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: cache misses and evictions at
//! `debug`/`trace`, recovered format anomalies at `warn` and failed flushes at
//! `error`. Install any `log` implementation to see them.

#![crate_name = "blockraster"]
#![crate_type = "lib"]

pub mod config;
pub mod cpl;
mod dataset;
pub mod diagnostics;
mod driver;
pub mod drivers;
pub mod errors;
mod options;
pub mod raster;
#[cfg(test)]
mod test_utils;
pub mod vsi;

pub use dataset::Dataset;
pub use driver::{Driver, DriverManager};
pub use options::{Access, DatasetOptions, OpenFlags};
