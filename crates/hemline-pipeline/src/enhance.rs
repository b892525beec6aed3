//! Local contrast normalization of the luminance channel.
//!
//! Each pixel is converted to L\*a\*b\*, the lightness channel is
//! quantized to 8 bits and run through contrast-limited adaptive
//! histogram equalization (CLAHE), and the equalized lightness is
//! recombined with the pixel's original a\*/b\* before converting back
//! to sRGB. Chrominance is never modified.

use crate::color::{self, LabD65};
use crate::types::{PipelineError, Rgb, RgbImage, ensure_non_empty};

const HIST_BINS: usize = 256;

/// CLAHE parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Clip limit relative to a flat histogram (`tile_area / 256`).
    pub clip_limit: f64,
    /// Tiles along the horizontal axis.
    pub tile_columns: u32,
    /// Tiles along the vertical axis.
    pub tile_rows: u32,
}

/// Enhance local contrast of `image` without touching its chrominance.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] if `image` has a zero-length
/// axis.
pub fn enhance(image: &RgbImage, params: ClaheParams) -> Result<RgbImage, PipelineError> {
    ensure_non_empty(image, "enhance")?;

    let (w, h) = image.dimensions();
    let labs: Vec<LabD65> = image
        .pixels()
        .map(|p| color::rgb_to_lab(Rgb::from(p.0)))
        .collect();
    let lightness: Vec<u8> = labs.iter().map(|lab| quantize_lightness(lab.l)).collect();

    let equalized = clahe(&lightness, w, h, params);

    let mut out = RgbImage::new(w, h);
    for ((pixel, lab), l8) in out.pixels_mut().zip(&labs).zip(&equalized) {
        let relit = LabD65::new(f64::from(*l8) * 100.0 / 255.0, lab.a, lab.b);
        *pixel = color::lab_to_rgb(relit).into();
    }

    tracing::trace!(width = w, height = h, "enhanced luminance");
    Ok(out)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize_lightness(l: f64) -> u8 {
    (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8
}

/// Map an out-of-range coordinate back into `0..len` by reflecting about
/// the edge pixels (`dcb|abcd|cba`).
const fn reflect_101(coord: u32, len: u32) -> u32 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = coord % period;
    if m < len { m } else { period - m }
}

/// Run CLAHE over a single 8-bit channel laid out row-major.
///
/// The image is virtually padded by reflection so it divides evenly
/// into tiles; every tile then has the same area and a uniform input
/// produces a uniform output.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn clahe(channel: &[u8], width: u32, height: u32, params: ClaheParams) -> Vec<u8> {
    let cols = params.tile_columns.max(1);
    let rows = params.tile_rows.max(1);
    let tile_w = width.div_ceil(cols);
    let tile_h = height.div_ceil(rows);
    let tile_area = tile_w as usize * tile_h as usize;

    let clip = ((params.clip_limit * tile_area as f64 / HIST_BINS as f64) as usize).max(1);
    let lut_scale = (HIST_BINS - 1) as f64 / tile_area as f64;

    let mut luts = vec![[0u8; HIST_BINS]; cols as usize * rows as usize];
    for ty in 0..rows {
        for tx in 0..cols {
            let mut hist = [0usize; HIST_BINS];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_101(y, height) as usize;
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(x, width) as usize;
                    hist[usize::from(channel[sy * width as usize + sx])] += 1;
                }
            }
            clip_histogram(&mut hist, clip);

            let lut = &mut luts[(ty * cols + tx) as usize];
            let mut cumulative = 0usize;
            for (bin, count) in hist.iter().enumerate() {
                cumulative += count;
                lut[bin] = (cumulative as f64 * lut_scale).round().min(255.0) as u8;
            }
        }
    }

    let mut out = Vec::with_capacity(channel.len());
    for y in 0..height {
        let (ty1, ty2, ya) = tile_neighbours(y, tile_h, rows);
        for x in 0..width {
            let (tx1, tx2, xa) = tile_neighbours(x, tile_w, cols);
            let v = usize::from(channel[(y * width + x) as usize]);
            let lut_at = |tx: u32, ty: u32| f64::from(luts[(ty * cols + tx) as usize][v]);
            let top = lut_at(tx1, ty1).mul_add(1.0 - xa, lut_at(tx2, ty1) * xa);
            let bottom = lut_at(tx1, ty2).mul_add(1.0 - xa, lut_at(tx2, ty2) * xa);
            let value = top.mul_add(1.0 - ya, bottom * ya);
            out.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }
    out
}

/// Clip every bin at `clip` and spread the excess back evenly, handing
/// the integer residual out one count at a time at a fixed stride.
fn clip_histogram(hist: &mut [usize; HIST_BINS], clip: usize) {
    let mut excess = 0usize;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    let batch = excess / HIST_BINS;
    let mut residual = excess - batch * HIST_BINS;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (HIST_BINS / residual).max(1);
        let mut bin = 0;
        while bin < HIST_BINS && residual > 0 {
            hist[bin] += 1;
            residual -= 1;
            bin += step;
        }
    }
}

/// The two tiles whose centers bracket `coord` along one axis, and the
/// interpolation weight of the second.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tile_neighbours(coord: u32, tile_len: u32, tiles: u32) -> (u32, u32, f64) {
    let pos = f64::from(coord) / f64::from(tile_len) - 0.5;
    let first = pos.floor();
    let weight = pos - first;
    let last_tile = i64::from(tiles) - 1;
    let t1 = (first as i64).clamp(0, last_tile) as u32;
    let t2 = (first as i64 + 1).clamp(0, last_tile) as u32;
    (t1, t2, weight)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PARAMS: ClaheParams = ClaheParams {
        clip_limit: 0.07,
        tile_columns: 8,
        tile_rows: 8,
    };

    #[test]
    fn reflect_101_mirrors_about_edge_pixels() {
        assert_eq!(reflect_101(0, 4), 0);
        assert_eq!(reflect_101(3, 4), 3);
        assert_eq!(reflect_101(4, 4), 2);
        assert_eq!(reflect_101(5, 4), 1);
        assert_eq!(reflect_101(6, 4), 0);
        assert_eq!(reflect_101(9, 1), 0);
    }

    #[test]
    fn clipping_preserves_total_count() {
        let mut hist = [0usize; HIST_BINS];
        hist[10] = 500;
        hist[200] = 20;
        clip_histogram(&mut hist, 3);
        assert_eq!(hist.iter().sum::<usize>(), 520);
        assert!(hist[10] < 500);
    }

    #[test]
    fn uniform_channel_stays_uniform() {
        let channel = vec![136u8; 37 * 53];
        let out = clahe(&channel, 37, 53, PARAMS);
        let first = out[0];
        assert!(out.iter().all(|&v| v == first));
    }

    #[test]
    fn output_is_monotonic_in_input_within_a_tile() {
        // A horizontal ramp inside a single tile: equalization must not
        // reorder intensities.
        let width = 64;
        let channel: Vec<u8> = (0..width * 4).map(|i| ((i % width) * 4) as u8).collect();
        let params = ClaheParams {
            clip_limit: 40.0,
            tile_columns: 1,
            tile_rows: 1,
        };
        let out = clahe(&channel, width, 4, params);
        for pair in out[..width as usize].windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn high_clip_limit_stretches_low_contrast() {
        // Two close gray levels become far apart with a generous clip.
        let channel: Vec<u8> = (0..32 * 32).map(|i| if i % 2 == 0 { 100 } else { 110 }).collect();
        let params = ClaheParams {
            clip_limit: 1000.0,
            tile_columns: 1,
            tile_rows: 1,
        };
        let out = clahe(&channel, 32, 32, params);
        let low = out[0];
        let high = out[1];
        assert!(high - low > 100, "low={low} high={high}");
    }

    #[test]
    fn enhance_keeps_dimensions() {
        let img =
            RgbImage::from_fn(23, 11, |x, y| image::Rgb([(x * 10) as u8, (y * 20) as u8, 90]));
        let out = enhance(&img, PARAMS).unwrap();
        assert_eq!(out.dimensions(), (23, 11));
    }

    #[test]
    fn enhance_preserves_neutral_gray_chroma() {
        // a* = b* = 0 in, so the output must still be neutral.
        let img = RgbImage::from_fn(16, 16, |x, _| {
            let v = (x * 16) as u8;
            image::Rgb([v, v, v])
        });
        let out = enhance(&img, PARAMS).unwrap();
        for p in out.pixels() {
            let [r, g, b] = p.0;
            assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1, "{:?}", p.0);
        }
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn enhance_preserves_saturated_chroma() {
        // Warm reds whose lightness CLAHE moves noticeably; a*/b* must
        // survive up to 8-bit requantization.
        let img = RgbImage::from_fn(32, 32, |x, y| {
            image::Rgb([160 + x as u8, 50 + (y / 2) as u8, 35 + (x / 2) as u8])
        });
        let out = enhance(&img, PARAMS).unwrap();

        let mut largest_shift: f64 = 0.0;
        for (before, after) in img.pixels().zip(out.pixels()) {
            let lab_in = color::rgb_to_lab(Rgb::from(before.0));
            let lab_out = color::rgb_to_lab(Rgb::from(after.0));
            largest_shift = largest_shift.max((lab_out.l - lab_in.l).abs());

            assert!((lab_out.a - lab_in.a).abs() < 1.5, "a*: {lab_in:?} -> {lab_out:?}");
            assert!((lab_out.b - lab_in.b).abs() < 1.5, "b*: {lab_in:?} -> {lab_out:?}");
            let hue_in = lab_in.b.atan2(lab_in.a).to_degrees();
            let hue_out = lab_out.b.atan2(lab_out.a).to_degrees();
            assert!((hue_out - hue_in).abs() < 1.0, "hue {hue_in} -> {hue_out}");
        }
        assert!(largest_shift > 5.0, "lightness barely changed: {largest_shift}");
    }

    #[test]
    fn enhance_rejects_zero_sized_image() {
        let result = enhance(&RgbImage::new(4, 0), PARAMS);
        assert!(matches!(result, Err(PipelineError::InvalidImage(_))));
    }

    #[test]
    fn enhance_is_deterministic() {
        let img =
            RgbImage::from_fn(20, 20, |x, y| image::Rgb([(x * 12) as u8, 40, (y * 12) as u8]));
        assert_eq!(enhance(&img, PARAMS).unwrap(), enhance(&img, PARAMS).unwrap());
    }
}
