use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::{Result, SteadyError};

use super::binary::to_u16;

/// Save an image in raw intensity units as 16-bit grayscale TIFF.
pub fn save_tiff(image: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = image.dim();
    let pixels: Vec<u16> = image.iter().map(|&v| to_u16(v)).collect();

    let img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or(SteadyError::InvalidDimensions { width: w, height: h })?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save an image as 8-bit grayscale PNG, stretched between its min and max.
pub fn save_png(image: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = image.dim();
    let lo = image.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = image.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = if hi > lo { hi - lo } else { 1.0 };

    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &v) in image.indexed_iter() {
        let val = (((v - lo) / range).clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save an image, choosing format from file extension.
pub fn save_image(image: &Array2<f32>, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_png(image, path),
        _ => save_tiff(image, path),
    }
}

/// Load a grayscale image in raw 16-bit intensity units.
pub fn load_image(path: &Path) -> Result<Array2<f32>> {
    let gray = image::open(path)?.to_luma16();
    let (w, h) = gray.dimensions();
    let mut data = Array2::<f32>::zeros((h as usize, w as usize));
    for (col, row, pixel) in gray.enumerate_pixels() {
        data[[row as usize, col as usize]] = pixel.0[0] as f32;
    }
    Ok(data)
}
