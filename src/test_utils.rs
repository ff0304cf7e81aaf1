use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::{Dataset, DatasetOptions, DriverManager, OpenFlags};

/// A struct that contains a temporary directory and a path to a file in that directory.
pub struct TempFixture {
    _temp_dir: tempfile::TempDir,
    temp_path: PathBuf,
}

impl TempFixture {
    /// Creates a temporary directory and path to a non-existent file with given `name`.
    /// Useful for writing results to during testing
    ///
    /// Returns the struct `TempFixture` that contains the temp dir (for clean-up on `drop`)
    /// as well as the empty file path.
    pub fn empty(name: &str) -> Self {
        let _temp_dir = tempfile::tempdir().unwrap();
        let temp_path = _temp_dir.path().join(name);
        Self {
            _temp_dir,
            temp_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.temp_path
    }
}

impl AsRef<Path> for TempFixture {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

/// Creates an in-memory dataset with `bands` bands of type `T`, blocks of
/// `block_size` and every pixel set to `x * 10 + y`.
pub fn gradient_mem_dataset<T: crate::raster::PixelValue>(
    size: (usize, usize),
    block_size: (usize, usize),
    bands: usize,
) -> Result<Dataset> {
    let bx = block_size.0.to_string();
    let by = block_size.1.to_string();
    let options = [
        crate::raster::RasterCreationOption {
            key: "BLOCKXSIZE",
            value: &bx,
        },
        crate::raster::RasterCreationOption {
            key: "BLOCKYSIZE",
            value: &by,
        },
    ];
    let ds = DriverManager::get_driver_by_name("MEM")?
        .create_with_band_type_with_options::<T, _>("", size.0, size.1, bands, &options)?;
    let values: Vec<f64> = (0..size.1)
        .flat_map(|y| (0..size.0).map(move |x| (x * 10 + y) as f64))
        .collect();
    for band in 1..=bands {
        ds.rasterband(band)?.write(
            (0, 0),
            size,
            &crate::raster::Buffer::new(size, values.clone()),
        )?;
    }
    Ok(ds)
}

/// Opens `path` for update with the given cache capacity.
pub fn open_for_update(path: &Path, cache_max_blocks: Option<usize>) -> Result<Dataset> {
    Dataset::open_ex(
        path,
        DatasetOptions {
            open_flags: OpenFlags::OF_UPDATE,
            cache_max_blocks,
            ..Default::default()
        },
    )
}
