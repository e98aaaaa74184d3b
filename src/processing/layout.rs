/// Size that covers a `canvas_w` x `canvas_h` box while keeping the source
/// aspect ratio. One of the two dimensions matches the box exactly.
pub fn resize_to_cover(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    let cw = canvas_w.max(1) as f64;
    let ch = canvas_h.max(1) as f64;
    let scale = (cw / iw).max(ch / ih);
    let w = (iw * scale).round().max(cw);
    let h = (ih * scale).round().max(ch);
    (w as u32, h as u32)
}

/// Size with exactly `target_w` columns and the source aspect ratio.
pub fn resize_to_width(target_w: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let target_w = target_w.max(1);
    let scale = target_w as f64 / src_w.max(1) as f64;
    let h = (src_h.max(1) as f64 * scale).round().max(1.0);
    (target_w, h as u32)
}

/// Smallest integer factor that brings `src_w` down to at most `target_w`.
pub fn downscale_factor(src_w: u32, target_w: u32) -> u32 {
    src_w.max(1).div_ceil(target_w.max(1)).max(1)
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}
