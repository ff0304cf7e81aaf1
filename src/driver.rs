use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::cpl::NameValueList;
use crate::dataset::Dataset;
use crate::drivers::{dted, mem, tiled};
use crate::errors::*;
use crate::options::DatasetOptions;
use crate::raster::{PixelType, PixelValue, RasterCreationOption};

/// Bytes read from the start of a file to recognise its format.
const PROBE_SIZE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum DriverKind {
    Mem,
    Tiled,
    Dted,
}

const DRIVERS: [DriverKind; 3] = [DriverKind::Mem, DriverKind::Tiled, DriverKind::Dted];

/// A raster format: creates and opens datasets of that format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Driver {
    kind: DriverKind,
}

impl Driver {
    /// Returns the driver with the given short name (case-insensitive).
    pub fn get_driver_by_name(name: &str) -> Result<Driver> {
        DriverManager::get_driver_by_name(name)
    }

    pub fn short_name(&self) -> String {
        match self.kind {
            DriverKind::Mem => mem::SHORT_NAME,
            DriverKind::Tiled => tiled::SHORT_NAME,
            DriverKind::Dted => dted::SHORT_NAME,
        }
        .to_string()
    }

    pub fn long_name(&self) -> String {
        match self.kind {
            DriverKind::Mem => mem::LONG_NAME,
            DriverKind::Tiled => tiled::LONG_NAME,
            DriverKind::Dted => dted::LONG_NAME,
        }
        .to_string()
    }

    /// Create a new dataset of size (`size_x`, `size_y`) and `bands` band count,
    /// and [`u8`] as the cell data type.
    ///
    /// To specify an alternative data type (e.g. [`f32`]), use [`Driver::create_with_band_type`].
    ///
    /// See also: [`create_with_band_type_with_options`](Self::create_with_band_type_with_options).
    pub fn create<P: AsRef<Path>>(
        &self,
        filename: P,
        size_x: usize,
        size_y: usize,
        bands: usize,
    ) -> Result<Dataset> {
        self.create_with_band_type::<u8, _>(filename, size_x, size_y, bands)
    }

    /// Create a new dataset of size (`size_x`, `size_y`) and `bands` band count,
    /// with cell data type specified by `T`.
    pub fn create_with_band_type<T: PixelValue, P: AsRef<Path>>(
        &self,
        filename: P,
        size_x: usize,
        size_y: usize,
        bands: usize,
    ) -> Result<Dataset> {
        let options = [];
        self.create_with_band_type_with_options::<T, _>(filename, size_x, size_y, bands, &options)
    }

    /// Create a new dataset of size (`size_x`, `size_y`) and `bands` band count,
    /// with cell data type specified by `T` and extended options specified via `options`.
    ///
    /// # Example
    ///
    /// ```rust, no_run
    /// # fn main() -> blockraster::errors::Result<()> {
    /// use blockraster::DriverManager;
    /// use blockraster::raster::RasterCreationOption;
    ///
    /// let d = DriverManager::get_driver_by_name("GTiled")?;
    /// let options = [
    ///     RasterCreationOption { key: "BLOCKXSIZE", value: "128" },
    ///     RasterCreationOption { key: "BLOCKYSIZE", value: "128" },
    /// ];
    /// let ds = d.create_with_band_type_with_options::<u16, _>("/tmp/foo.brt", 1024, 1024, 1, &options)?;
    /// assert_eq!(ds.raster_count(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_with_band_type_with_options<T: PixelValue, P: AsRef<Path>>(
        &self,
        filename: P,
        size_x: usize,
        size_y: usize,
        bands: usize,
        options: &[RasterCreationOption],
    ) -> Result<Dataset> {
        self.create_with_pixel_type(filename, size_x, size_y, bands, T::pixel_type(), options)
    }

    /// Like [`create_with_band_type_with_options`](Self::create_with_band_type_with_options)
    /// for pixel types without a Rust counterpart, such as [`PixelType::CInt16`].
    pub fn create_with_pixel_type<P: AsRef<Path>>(
        &self,
        filename: P,
        size_x: usize,
        size_y: usize,
        bands: usize,
        pixel_type: PixelType,
        options: &[RasterCreationOption],
    ) -> Result<Dataset> {
        let options = NameValueList::try_from(options)?;
        let path = filename.as_ref();
        let size = (size_x, size_y);
        log::debug!(
            "creating {} {size_x}x{size_y}x{bands} {pixel_type} dataset",
            self.short_name()
        );
        match self.kind {
            DriverKind::Mem => mem::create(size, bands, pixel_type, &options),
            DriverKind::Tiled => tiled::create(path, size, bands, pixel_type, &options),
            DriverKind::Dted => dted::create(path, size, bands, pixel_type, &options),
        }
    }

    /// Whether the file at `path` looks like this driver's format.
    pub fn identify<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        let header = probe(path.as_ref())?;
        Ok(self.identify_header(&header))
    }

    fn identify_header(&self, header: &[u8]) -> bool {
        match self.kind {
            DriverKind::Mem => false,
            DriverKind::Tiled => tiled::identify(header),
            DriverKind::Dted => dted::identify(header),
        }
    }

    /// Open `path` with this driver.
    pub fn open<P: AsRef<Path>>(&self, path: P, options: &DatasetOptions) -> Result<Dataset> {
        let path = path.as_ref();
        match self.kind {
            DriverKind::Mem => Err(RasterError::NotSupported {
                method_name: "Driver::open",
            }),
            DriverKind::Tiled => tiled::open(path, options),
            DriverKind::Dted => dted::open(path, options),
        }
    }
}

/// Reads the first bytes of `path`. Shorter files yield a shorter header.
fn probe(path: &Path) -> Result<Vec<u8>> {
    let open_failed = |e: std::io::Error| RasterError::OpenFailed {
        path: path.to_path_buf(),
        msg: e.to_string(),
    };
    let mut header = Vec::with_capacity(PROBE_SIZE);
    File::open(path)
        .map_err(open_failed)?
        .take(PROBE_SIZE as u64)
        .read_to_end(&mut header)
        .map_err(open_failed)?;
    Ok(header)
}

/// The built-in drivers.
///
/// ```
/// use blockraster::DriverManager;
///
/// assert_eq!(DriverManager::count(), 3);
/// let mem = DriverManager::get_driver_by_name("mem").unwrap();
/// assert_eq!(mem.short_name(), "MEM");
/// ```
pub struct DriverManager;

impl DriverManager {
    /// Number of registered drivers.
    pub fn count() -> usize {
        DRIVERS.len()
    }

    /// Driver at `index`, `0..count()`.
    pub fn get_driver(index: usize) -> Result<Driver> {
        DRIVERS
            .get(index)
            .map(|&kind| Driver { kind })
            .ok_or_else(|| RasterError::UnknownDriver(format!("#{index}")))
    }

    pub fn get_driver_by_name(name: &str) -> Result<Driver> {
        Self::all()
            .find(|d| d.short_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| RasterError::UnknownDriver(name.to_string()))
    }

    pub fn all() -> impl Iterator<Item = Driver> {
        DRIVERS.into_iter().map(|kind| Driver { kind })
    }

    /// The first driver recognising the file at `path`.
    pub fn identify<P: AsRef<Path>>(path: P) -> Result<Driver> {
        let path = path.as_ref();
        let header = probe(path)?;
        Self::all()
            .find(|d| d.identify_header(&header))
            .ok_or_else(|| RasterError::OpenFailed {
                path: path.to_path_buf(),
                msg: "format not recognised".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TempFixture;

    #[test]
    fn driver_lookup() -> Result<()> {
        assert_eq!(DriverManager::count(), 3);
        for i in 0..DriverManager::count() {
            let driver = DriverManager::get_driver(i)?;
            assert_eq!(
                DriverManager::get_driver_by_name(&driver.short_name())?,
                driver
            );
        }
        assert!(DriverManager::get_driver(3).is_err());
        assert!(matches!(
            Driver::get_driver_by_name("GTiff"),
            Err(RasterError::UnknownDriver(_))
        ));
        assert_eq!(
            DriverManager::get_driver_by_name("dted")?.long_name(),
            "DTED Elevation Raster"
        );
        Ok(())
    }

    #[test]
    fn identify_by_content() -> Result<()> {
        let fixture = TempFixture::empty("probe.brt");
        DriverManager::get_driver_by_name("GTiled")?
            .create(fixture.path(), 4, 4, 1)?
            .close()?;
        assert_eq!(DriverManager::identify(fixture.path())?.short_name(), "GTiled");

        let other = TempFixture::empty("probe.txt");
        std::fs::write(other.path(), b"hello").unwrap();
        assert!(matches!(
            DriverManager::identify(other.path()),
            Err(RasterError::OpenFailed { .. })
        ));
        assert!(DriverManager::identify(TempFixture::empty("missing").path()).is_err());
        Ok(())
    }

    #[test]
    fn mem_cannot_be_opened() -> Result<()> {
        let mem = DriverManager::get_driver_by_name("MEM")?;
        assert!(matches!(
            mem.open("anything", &DatasetOptions::default()),
            Err(RasterError::NotSupported { .. })
        ));
        Ok(())
    }
}
