//! JPEG thumbnails for image entries.

use image::{DynamicImage, ImageFormat, ImageResult, Rgb, RgbImage};
use std::io::Cursor;

/// Edge lengths a caller may ask for
pub const ALLOWED_SIZES: [u32; 5] = [80, 100, 150, 200, 250];

/// Used whenever the requested size is not allowed
pub const DEFAULT_SIZE: u32 = 100;

/// `requested` if it is one of [`ALLOWED_SIZES`], else [`DEFAULT_SIZE`].
pub fn normalize_size(requested: u32) -> u32 {
    if ALLOWED_SIZES.contains(&requested) {
        requested
    } else {
        DEFAULT_SIZE
    }
}

/// Decode `data`, shrink it to fit a `size`×`size` square (never
/// enlarging), flatten any transparency onto white, and encode as JPEG.
pub fn render_thumbnail(data: &[u8], size: u32) -> ImageResult<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let img = if img.width() > size || img.height() > size {
        img.thumbnail(size, size)
    } else {
        img
    };

    let flattened = flatten_onto_white(&img);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(flattened).write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (dst, src) in rgb.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        *dst = Rgb([blend(r), blend(g), blend(b)]);
    }

    rgb
}
