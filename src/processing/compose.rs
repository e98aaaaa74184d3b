use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};
use tracing::debug;

use crate::processing::resize::{fill_crop, resize_rgba};
use crate::processing::slots::{slots_for, LayoutKind, SlotDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeStyle {
    pub background: [u8; 3],
}

impl Default for CompositeStyle {
    fn default() -> Self {
        Self {
            background: [255, 255, 255],
        }
    }
}

/// Incremental print canvas.
///
/// Photos are placed one at a time so callers can decode, place and drop each
/// source before touching the next one. The overlay is applied by
/// [`Compositor::finish`], after every photo.
#[derive(Debug)]
pub struct Compositor {
    kind: LayoutKind,
    canvas: RgbaImage,
}

impl Compositor {
    pub fn new(kind: LayoutKind, style: &CompositeStyle) -> Self {
        let (w, h) = kind.canvas_size();
        let [r, g, b] = style.background;
        Self {
            kind,
            canvas: RgbaImage::from_pixel(w, h, Rgba([r, g, b, 255])),
        }
    }

    pub fn slot_count(&self) -> usize {
        slots_for(self.kind).len()
    }

    /// Slot rectangles that photo `index` is drawn into (two for strips).
    pub fn targets(&self, index: usize) -> Vec<SlotDefinition> {
        self.kind
            .placements()
            .into_iter()
            .filter(|(photo, _)| *photo == index)
            .map(|(_, rect)| rect)
            .collect()
    }

    /// Draws `photo` into every rectangle that belongs to slot `index`.
    /// Photos beyond the last slot are ignored.
    pub fn place(&mut self, index: usize, photo: &RgbaImage) -> Result<()> {
        let targets = self.targets(index);
        if targets.is_empty() {
            debug!(index, kind = %self.kind, "no slot for photo; skipping");
            return Ok(());
        }
        // every rectangle of one slot shares a size, so crop once
        let first = targets[0];
        let cropped = fill_crop(photo, first.width, first.height)
            .with_context(|| format!("failed to fit photo {index} into its slot"))?;
        for rect in targets {
            imageops::replace(&mut self.canvas, &cropped, rect.x as i64, rect.y as i64);
        }
        Ok(())
    }

    /// Draws the frame overlay (stretched to the canvas) and returns the print.
    pub fn finish(mut self, overlay: Option<&RgbaImage>) -> Result<RgbaImage> {
        if let Some(frame) = overlay {
            let (w, h) = self.canvas.dimensions();
            let scaled;
            let frame = if frame.dimensions() == (w, h) {
                frame
            } else {
                scaled = resize_rgba(frame, w, h).context("failed to scale frame overlay")?;
                &scaled
            };
            imageops::overlay(&mut self.canvas, frame, 0, 0);
        }
        Ok(self.canvas)
    }
}

/// Composes `photos` (in slot order) and an optional overlay into a print.
///
/// Unfilled slots stay background-colored. The output depends only on the
/// inputs.
pub fn compose(
    photos: &[RgbaImage],
    kind: LayoutKind,
    overlay: Option<&RgbaImage>,
    style: &CompositeStyle,
) -> Result<RgbaImage> {
    let mut compositor = Compositor::new(kind, style);
    for (index, photo) in photos.iter().enumerate().take(compositor.slot_count()) {
        compositor.place(index, photo)?;
    }
    compositor.finish(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    fn center(rect: &SlotDefinition) -> (u32, u32) {
        (rect.x + rect.width / 2, rect.y + rect.height / 2)
    }

    #[test]
    fn overlay_is_drawn_last_and_respects_alpha() {
        let photos = vec![solid(64, 48, [200, 0, 0]); 4];
        let mut frame = RgbaImage::from_pixel(1200, 1800, Rgba([0, 0, 0, 0]));
        // opaque band over the top edge of the first slot
        for y in 0..60 {
            for x in 0..1200 {
                frame.put_pixel(x, y, Rgba([0, 255, 0, 255]));
            }
        }
        let style = CompositeStyle::default();
        let print = compose(&photos, LayoutKind::Grid, Some(&frame), &style).unwrap();

        assert_eq!(print.get_pixel(300, 50), &Rgba([0, 255, 0, 255]));
        let slot = slots_for(LayoutKind::Grid)[0];
        let (cx, cy) = center(&slot);
        assert!(print.get_pixel(cx, cy)[0].abs_diff(200) <= 1);
    }

    #[test]
    fn small_overlay_is_stretched_to_canvas() {
        let frame = RgbaImage::from_pixel(12, 18, Rgba([0, 0, 255, 255]));
        let print = compose(&[], LayoutKind::Strip, Some(&frame), &CompositeStyle::default())
            .unwrap();
        assert_eq!(print.dimensions(), (1200, 1800));
        assert_eq!(print.get_pixel(1199, 1799), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn extra_photos_are_ignored() {
        let photos = vec![solid(10, 10, [1, 2, 3]); 9];
        let print = compose(&photos, LayoutKind::Grid, None, &CompositeStyle::default()).unwrap();
        assert_eq!(print.dimensions(), LayoutKind::Grid.canvas_size());
    }
}
