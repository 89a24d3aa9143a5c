//! Wire form of image-valued attributes.
//!
//! Strings (data URLs, URLs, relative paths, icon names) are sent as they
//! are. Files and encoded bytes become base64 data URLs, SVG files a
//! percent-encoded `utf8` data URL, and RGB/RGBA pixel arrays are encoded
//! as PNG first.

use std::fs;
use std::path::Path;

use ::image::codecs::png::PngEncoder;
use ::image::{ExtendedColorType, ImageEncoder};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::ImageError;
use crate::value::{DType, NdArray, Value};

pub fn to_data_url(value: &Value) -> Result<String, ImageError> {
    match value {
        Value::Str(text) => Ok(text.clone()),
        Value::Path(path) => from_file(path),
        Value::Bytes(bytes) => from_encoded(bytes),
        Value::Array(array) => from_pixels(array),
        other => Err(ImageError::Unsupported(format!(
            "{} of type {}",
            other.repr(),
            other.type_name()
        ))),
    }
}

/// `true` for `uint8` arrays shaped `(height, width, 3)` or `(height, width, 4)`.
pub fn is_rgb_array(array: &NdArray) -> bool {
    array.dtype() == DType::Uint8 && matches!(array.shape(), [_, _, 3 | 4])
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn from_file(path: &Path) -> Result<String, ImageError> {
    let bytes = fs::read(path).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_svg = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
    if is_svg {
        let text = String::from_utf8_lossy(&bytes);
        return Ok(format!("data:image/svg+xml;utf8,{}", percent_encode(&text)));
    }
    from_encoded(&bytes)
}

fn from_encoded(bytes: &[u8]) -> Result<String, ImageError> {
    let format = ::image::guess_format(bytes).map_err(|_| ImageError::UnknownFormat)?;
    Ok(data_url(format.to_mime_type(), bytes))
}

fn from_pixels(array: &NdArray) -> Result<String, ImageError> {
    let bad = || ImageError::BadArray {
        dtype: array.dtype().name(),
        shape: array.shape().to_vec(),
    };
    if !is_rgb_array(array) {
        return Err(bad());
    }
    let (height, width, channels) = (array.shape()[0], array.shape()[1], array.shape()[2]);
    let height = u32::try_from(height).map_err(|_| bad())?;
    let width = u32::try_from(width).map_err(|_| bad())?;
    let color = if channels == 3 {
        ExtendedColorType::Rgb8
    } else {
        ExtendedColorType::Rgba8
    };
    let pixels: Vec<u8> = array.data().iter().map(|&x| x as u8).collect();
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&pixels, width, height, color)?;
    Ok(data_url("image/png", &png))
}

/// Everything but unreserved characters and `/` is escaped.
const SVG_ESCAPED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

fn percent_encode(text: &str) -> String {
    utf8_percent_encode(text, SVG_ESCAPED).to_string()
}
