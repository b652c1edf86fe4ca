use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use ndarray::Array4;
use std::path::Path;

use crate::error::PipelineError;

pub const IMAGE_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Rejects uploads whose file name does not carry a jpg/jpeg/png extension.
pub fn check_extension(filename: &str) -> Result<(), PipelineError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(PipelineError::UnsupportedType(filename.to_string()))
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    Ok(image::load_from_memory(bytes)?)
}

/// MIME type for formats a browser can preview inline.
pub fn preview_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        _ => None,
    }
}

/// Turns a decoded image into the `(1, 224, 224, 3)` model input.
///
/// Alpha is dropped, the image is stretched to 224x224 and every channel is
/// scaled into `[0, 1]`.
pub fn to_tensor(img: &DynamicImage) -> Result<Array4<f32>, PipelineError> {
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom);

    let side = IMAGE_SIZE as usize;
    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    Array4::from_shape_vec((1, side, side, CHANNELS), data)
        .map_err(|e| PipelineError::Preprocess(e.to_string()))
}
