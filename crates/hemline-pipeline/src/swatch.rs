//! Marked-image rendering.
//!
//! A marked image is the segmented garment with a filled square of the
//! dominant color in its top-left corner, for eyeballing results.

use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::types::{Rgb, RgbImage};

/// Copy `image` and fill a `size` × `size` square at the origin with
/// `color`, clipped to the image bounds.
#[must_use]
pub fn mark(image: &RgbImage, color: Rgb, size: u32) -> RgbImage {
    let mut marked = image.clone();
    let width = size.min(marked.width());
    let height = size.min(marked.height());
    if width == 0 || height == 0 {
        return marked;
    }
    draw_filled_rect_mut(&mut marked, Rect::at(0, 0).of_size(width, height), color.into());
    marked
}
