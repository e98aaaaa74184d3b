use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{imageops, RgbaImage};

use crate::processing::layout::{center_offset, resize_to_cover};

/// Resizes an RGBA image to exactly `target_w` x `target_h`.
pub fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGBA image"))
}

/// Scales `source` to cover `target_w` x `target_h` and crops the centered
/// window, so the result fills the box without letterboxing.
pub fn fill_crop(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    let (cover_w, cover_h) = resize_to_cover(target_w, target_h, source.width(), source.height());
    let covered = resize_rgba(source, cover_w, cover_h)?;
    if cover_w == target_w && cover_h == target_h {
        return Ok(covered);
    }
    let (crop_x, crop_y) = center_offset(target_w, target_h, cover_w, cover_h);
    Ok(imageops::crop_imm(&covered, crop_x, crop_y, target_w, target_h).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn fill_crop_hits_exact_size() {
        let src = RgbaImage::from_pixel(400, 300, Rgba([10, 20, 30, 255]));
        let out = fill_crop(&src, 540, 740).unwrap();
        assert_eq!(out.dimensions(), (540, 740));
        let px = out.get_pixel(270, 370);
        for (got, want) in px.0.iter().zip([10u8, 20, 30, 255]) {
            assert!(got.abs_diff(want) <= 1, "{px:?}");
        }
    }

    #[test]
    fn fill_crop_keeps_the_center() {
        // left half red, right half blue; a tall crop must keep the seam centered
        let mut src = RgbaImage::from_pixel(200, 100, Rgba([255, 0, 0, 255]));
        for y in 0..100 {
            for x in 100..200 {
                src.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let out = fill_crop(&src, 50, 100).unwrap();
        assert_eq!(out.dimensions(), (50, 100));
        assert_eq!(out.get_pixel(2, 50)[0], 255);
        assert_eq!(out.get_pixel(47, 50)[2], 255);
    }

    #[test]
    fn rejects_zero_sized_targets() {
        let src = RgbaImage::new(4, 4);
        assert!(resize_rgba(&src, 0, 4).is_err());
    }
}
