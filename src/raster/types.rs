use crate::errors::{RasterError, Result};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Pixel storage types a band or a caller buffer can hold.
///
/// Conversion between any two types is total, see [`convert`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PixelType {
    /// Eight bit unsigned integer
    Byte,
    /// Sixteen bit unsigned integer
    UInt16,
    /// Sixteen bit signed integer
    Int16,
    /// Thirty two bit unsigned integer
    UInt32,
    /// Thirty two bit signed integer
    Int32,
    /// Thirty two bit floating point
    Float32,
    /// Sixty four bit floating point
    Float64,
    /// Complex Int16
    CInt16,
    /// Complex Int32
    CInt32,
    /// Complex Float32
    CFloat32,
    /// Complex Float64
    CFloat64,
}

impl PixelType {
    /// Every supported type, in on-disk code order.
    pub fn available_types() -> &'static [PixelType] {
        use PixelType::*;
        &[
            Byte, UInt16, Int16, UInt32, Int32, Float32, Float64, CInt16, CInt32, CFloat32,
            CFloat64,
        ]
    }

    /// Size of one pixel in **bytes**, both components for complex types.
    pub fn bytes(&self) -> usize {
        match self {
            PixelType::Byte => 1,
            PixelType::UInt16 | PixelType::Int16 => 2,
            PixelType::UInt32 | PixelType::Int32 | PixelType::Float32 | PixelType::CInt16 => 4,
            PixelType::Float64 | PixelType::CInt32 | PixelType::CFloat32 => 8,
            PixelType::CFloat64 => 16,
        }
    }

    /// Size of one pixel in **bits**.
    pub fn bits(&self) -> usize {
        self.bytes() * 8
    }

    /// Size of a single component; equal to [`PixelType::bytes`] for real types.
    pub fn component_bytes(&self) -> usize {
        if self.is_complex() {
            self.bytes() / 2
        } else {
            self.bytes()
        }
    }

    /// Returns `true` if data type is integral (non-floating point)
    pub fn is_integer(&self) -> bool {
        !self.is_floating()
    }

    /// Returns `true` if data type is floating point (non-integral)
    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            PixelType::Float32 | PixelType::Float64 | PixelType::CFloat32 | PixelType::CFloat64
        )
    }

    /// Returns `true` if data type supports negative values.
    pub fn is_signed(&self) -> bool {
        !matches!(
            self,
            PixelType::Byte | PixelType::UInt16 | PixelType::UInt32
        )
    }

    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            PixelType::CInt16 | PixelType::CInt32 | PixelType::CFloat32 | PixelType::CFloat64
        )
    }

    /// The real type of each component of a complex type.
    pub fn component_type(&self) -> PixelType {
        match self {
            PixelType::CInt16 => PixelType::Int16,
            PixelType::CInt32 => PixelType::Int32,
            PixelType::CFloat32 => PixelType::Float32,
            PixelType::CFloat64 => PixelType::Float64,
            other => *other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelType::Byte => "Byte",
            PixelType::UInt16 => "UInt16",
            PixelType::Int16 => "Int16",
            PixelType::UInt32 => "UInt32",
            PixelType::Int32 => "Int32",
            PixelType::Float32 => "Float32",
            PixelType::Float64 => "Float64",
            PixelType::CInt16 => "CInt16",
            PixelType::CInt32 => "CInt32",
            PixelType::CFloat32 => "CFloat32",
            PixelType::CFloat64 => "CFloat64",
        }
    }

    /// Stable numeric tag used by on-disk headers.
    pub fn code(&self) -> u8 {
        match self {
            PixelType::Byte => 1,
            PixelType::UInt16 => 2,
            PixelType::Int16 => 3,
            PixelType::UInt32 => 4,
            PixelType::Int32 => 5,
            PixelType::Float32 => 6,
            PixelType::Float64 => 7,
            PixelType::CInt16 => 8,
            PixelType::CInt32 => 9,
            PixelType::CFloat32 => 10,
            PixelType::CFloat64 => 11,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        PixelType::available_types()
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or_else(|| RasterError::BadArgument(format!("unknown pixel type code {code}")))
    }
}

impl Display for PixelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelType {
    type Err = RasterError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PixelType::available_types()
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RasterError::BadArgument(format!("unknown pixel type '{s}'")))
    }
}

/// Type-level constraint for limiting which primitive numeric values can be passed
/// to functions needing a target pixel type.
pub trait PixelValue: bytemuck::Pod {
    fn pixel_type() -> PixelType;
}

impl PixelValue for u8 {
    fn pixel_type() -> PixelType {
        PixelType::Byte
    }
}

impl PixelValue for u16 {
    fn pixel_type() -> PixelType {
        PixelType::UInt16
    }
}

impl PixelValue for i16 {
    fn pixel_type() -> PixelType {
        PixelType::Int16
    }
}

impl PixelValue for u32 {
    fn pixel_type() -> PixelType {
        PixelType::UInt32
    }
}

impl PixelValue for i32 {
    fn pixel_type() -> PixelType {
        PixelType::Int32
    }
}

impl PixelValue for f32 {
    fn pixel_type() -> PixelType {
        PixelType::Float32
    }
}

impl PixelValue for f64 {
    fn pixel_type() -> PixelType {
        PixelType::Float64
    }
}

/// Truncating float to integer cast with C `(int)` semantics for in-range values:
/// truncate toward zero, then wrap to the destination width. NaN maps to 0.
#[inline]
fn trunc_to_i64(v: f64) -> i64 {
    // `as` saturates out of range values and maps NaN to zero
    v as i64
}

/// Decodes one native-endian pixel into `(real, imaginary)`.
///
/// Every integral type up to 32 bits is exactly representable in `f64`, so
/// integer to integer conversion through this pair is lossless before the
/// final truncation.
#[inline]
pub(crate) fn read_component(ty: PixelType, bytes: &[u8]) -> f64 {
    match ty {
        PixelType::Byte => bytes[0] as f64,
        PixelType::UInt16 => u16::from_ne_bytes([bytes[0], bytes[1]]) as f64,
        PixelType::Int16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f64,
        PixelType::UInt32 => u32::from_ne_bytes(four(bytes)) as f64,
        PixelType::Int32 => i32::from_ne_bytes(four(bytes)) as f64,
        PixelType::Float32 => f32::from_ne_bytes(four(bytes)) as f64,
        PixelType::Float64 => f64::from_ne_bytes(eight(bytes)),
        complex => read_component(complex.component_type(), bytes),
    }
}

#[inline]
pub(crate) fn write_component(ty: PixelType, value: f64, out: &mut [u8]) {
    match ty {
        PixelType::Byte => out[0] = trunc_to_i64(value) as u8,
        PixelType::UInt16 => out[..2].copy_from_slice(&(trunc_to_i64(value) as u16).to_ne_bytes()),
        PixelType::Int16 => out[..2].copy_from_slice(&(trunc_to_i64(value) as i16).to_ne_bytes()),
        PixelType::UInt32 => out[..4].copy_from_slice(&(trunc_to_i64(value) as u32).to_ne_bytes()),
        PixelType::Int32 => out[..4].copy_from_slice(&(trunc_to_i64(value) as i32).to_ne_bytes()),
        PixelType::Float32 => out[..4].copy_from_slice(&(value as f32).to_ne_bytes()),
        PixelType::Float64 => out[..8].copy_from_slice(&value.to_ne_bytes()),
        complex => write_component(complex.component_type(), value, out),
    }
}

#[inline]
fn four(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

#[inline]
fn eight(b: &[u8]) -> [u8; 8] {
    [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

/// Reads one pixel as a `(real, imaginary)` pair. Real types have a zero
/// imaginary part.
#[inline]
pub fn read_pixel(ty: PixelType, bytes: &[u8]) -> (f64, f64) {
    let re = read_component(ty, bytes);
    let im = if ty.is_complex() {
        read_component(ty, &bytes[ty.component_bytes()..])
    } else {
        0.0
    };
    (re, im)
}

/// Writes one pixel from a `(real, imaginary)` pair. The imaginary part is
/// dropped for real types.
#[inline]
pub fn write_pixel(ty: PixelType, value: (f64, f64), out: &mut [u8]) {
    write_component(ty, value.0, out);
    if ty.is_complex() {
        let off = ty.component_bytes();
        write_component(ty, value.1, &mut out[off..]);
    }
}

/// Converts a single native-endian pixel from `src_type` to `dst_type`.
///
/// Integral narrowing wraps, floating to integral truncates toward zero and
/// then wraps, complex to real keeps the real part. Never fails.
#[inline]
pub fn convert(src_type: PixelType, src: &[u8], dst_type: PixelType, dst: &mut [u8]) {
    if src_type == dst_type {
        let n = src_type.bytes();
        dst[..n].copy_from_slice(&src[..n]);
        return;
    }
    write_pixel(dst_type, read_pixel(src_type, src), dst);
}

/// Converts `count` packed pixels.
pub fn convert_slice(
    src_type: PixelType,
    src: &[u8],
    dst_type: PixelType,
    dst: &mut [u8],
    count: usize,
) {
    if src_type == dst_type {
        let n = count * src_type.bytes();
        dst[..n].copy_from_slice(&src[..n]);
        return;
    }
    let (ss, ds) = (src_type.bytes(), dst_type.bytes());
    for i in 0..count {
        convert(src_type, &src[i * ss..], dst_type, &mut dst[i * ds..]);
    }
}

/// Encodes `value` as one pixel of type `ty`, e.g. to fill padding with a
/// no-data value.
pub fn pixel_bytes(ty: PixelType, value: f64) -> Vec<u8> {
    let mut out = vec![0u8; ty.bytes()];
    write_pixel(ty, (value, 0.0), &mut out);
    out
}

/// Fills a packed buffer with `value` encoded as `ty`.
pub fn fill_pixels(ty: PixelType, value: f64, buf: &mut [u8]) {
    let pixel = pixel_bytes(ty, value);
    for chunk in buf.chunks_exact_mut(pixel.len()) {
        chunk.copy_from_slice(&pixel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(src_type: PixelType, value: (f64, f64), dst_type: PixelType) -> (f64, f64) {
        let mut src = vec![0u8; src_type.bytes()];
        write_pixel(src_type, value, &mut src);
        let mut dst = vec![0u8; dst_type.bytes()];
        convert(src_type, &src, dst_type, &mut dst);
        read_pixel(dst_type, &dst)
    }

    #[test]
    fn test_sizes() {
        assert_eq!(PixelType::Byte.bytes(), 1);
        assert_eq!(PixelType::Int16.bits(), 16);
        assert_eq!(PixelType::CInt16.bytes(), 4);
        assert_eq!(PixelType::CInt16.component_bytes(), 2);
        assert_eq!(PixelType::CFloat64.bytes(), 16);
        assert!(PixelType::CFloat32.is_floating());
        assert!(PixelType::CInt32.is_signed());
        assert!(!PixelType::UInt32.is_signed());
        assert!(PixelType::UInt16.is_integer());
    }

    #[test]
    fn test_name_and_code_round_trip() {
        for ty in PixelType::available_types() {
            assert_eq!(ty.name().parse::<PixelType>().unwrap(), *ty);
            assert_eq!(PixelType::from_code(ty.code()).unwrap(), *ty);
        }
        assert!("Float16".parse::<PixelType>().is_err());
        assert!(PixelType::from_code(0).is_err());
    }

    #[test]
    fn test_float_to_byte_truncates_and_wraps() {
        assert_eq!(conv(PixelType::Float32, (257.9, 0.0), PixelType::Byte).0, 1.0);
        assert_eq!(conv(PixelType::Float64, (-1.0, 0.0), PixelType::Byte).0, 255.0);
        assert_eq!(conv(PixelType::Float32, (12.99, 0.0), PixelType::Byte).0, 12.0);
        assert_eq!(conv(PixelType::Float64, (-2.7, 0.0), PixelType::Int16).0, -2.0);
        assert_eq!(conv(PixelType::Float64, (f64::NAN, 0.0), PixelType::Int32).0, 0.0);
    }

    #[test]
    fn test_integer_narrowing_wraps() {
        assert_eq!(conv(PixelType::UInt16, (300.0, 0.0), PixelType::Byte).0, 44.0);
        assert_eq!(conv(PixelType::Int16, (-2.0, 0.0), PixelType::UInt16).0, 65534.0);
        assert_eq!(conv(PixelType::Int32, (70000.0, 0.0), PixelType::Int16).0, 4464.0);
        assert_eq!(
            conv(PixelType::UInt32, (4_294_967_295.0, 0.0), PixelType::Int32).0,
            -1.0
        );
    }

    #[test]
    fn test_complex_conversions() {
        assert_eq!(
            conv(PixelType::CFloat32, (3.5, -2.25), PixelType::Float64),
            (3.5, 0.0)
        );
        assert_eq!(
            conv(PixelType::Int16, (-7.0, 0.0), PixelType::CFloat64),
            (-7.0, 0.0)
        );
        assert_eq!(
            conv(PixelType::CFloat64, (1.9, -1.9), PixelType::CInt16),
            (1.0, -1.0)
        );
    }

    #[test]
    fn test_every_pair_is_total() {
        // 100 is representable in every type; it survives any conversion.
        for src in PixelType::available_types() {
            for dst in PixelType::available_types() {
                let (re, im) = conv(*src, (100.0, 0.0), *dst);
                assert_eq!(re, 100.0, "{src} -> {dst}");
                assert_eq!(im, 0.0, "{src} -> {dst}");
            }
        }
    }

    #[test]
    fn test_every_pair_truncates_fraction() {
        let floats = PixelType::available_types()
            .iter()
            .filter(|t| t.is_floating());
        for src in floats {
            for dst in PixelType::available_types() {
                let expected = if dst.is_floating() { 42.5 } else { 42.0 };
                assert_eq!(conv(*src, (42.5, 0.0), *dst).0, expected, "{src} -> {dst}");
            }
        }
    }

    #[test]
    fn test_convert_slice() {
        let src: Vec<u8> = [1.5f32, 2.5, 300.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let mut dst = [0u8; 3];
        convert_slice(PixelType::Float32, &src, PixelType::Byte, &mut dst, 3);
        assert_eq!(dst, [1, 2, 44]);
    }

    #[test]
    fn test_fill_pixels() {
        let mut buf = [0u8; 6];
        fill_pixels(PixelType::Int16, -32767.0, &mut buf);
        let values: Vec<i16> = buf
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values, vec![-32767; 3]);
    }
}
