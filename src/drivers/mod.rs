//! Block codecs for the built-in formats.
//!
//! * [`mem`]: pixels kept in memory, one plane per band.
//! * [`tiled`]: a single file of little-endian tiles behind a block index.
//! * [`dted`]: DTED elevation matrices, one column profile per block.

pub mod dted;
pub mod mem;
pub mod tiled;

use crate::cpl::NameValueList;
use crate::errors::Result;
use crate::raster::PixelType;

pub(crate) const BLOCKXSIZE: &str = "BLOCKXSIZE";
pub(crate) const BLOCKYSIZE: &str = "BLOCKYSIZE";

/// Block size from `BLOCKXSIZE`/`BLOCKYSIZE`, falling back to `default`
/// for each missing key.
pub(crate) fn block_size_option(
    options: &NameValueList,
    default: (usize, usize),
) -> Result<(usize, usize)> {
    Ok((
        options.fetch_positive(BLOCKXSIZE)?.unwrap_or(default.0),
        options.fetch_positive(BLOCKYSIZE)?.unwrap_or(default.1),
    ))
}

/// Reverses the byte order of every component of a packed pixel buffer on
/// big-endian hosts, turning native order into little-endian and back.
pub(crate) fn swap_to_little_endian(pixel_type: PixelType, data: &mut [u8]) {
    let width = pixel_type.component_bytes();
    if cfg!(target_endian = "little") || width == 1 {
        return;
    }
    for component in data.chunks_exact_mut(width) {
        component.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_defaults() -> Result<()> {
        let mut options = NameValueList::new();
        assert_eq!(block_size_option(&options, (100, 1))?, (100, 1));
        options.set_name_value("blockysize", "16")?;
        assert_eq!(block_size_option(&options, (100, 1))?, (100, 16));
        options.set_name_value("BLOCKXSIZE", "-3")?;
        assert!(block_size_option(&options, (100, 1)).is_err());
        Ok(())
    }

    #[test]
    fn little_endian_swap_is_an_involution() {
        let original: Vec<u8> = (0..16).collect();
        let mut data = original.clone();
        swap_to_little_endian(PixelType::CInt32, &mut data);
        swap_to_little_endian(PixelType::CInt32, &mut data);
        assert_eq!(data, original);
    }
}
