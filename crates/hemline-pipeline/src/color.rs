//! Color-space conversions and the CIEDE2000 color difference.
//!
//! Lab conversions go through `palette` with a D65 white point. HSV is
//! expressed on the common 8-bit scale used for image processing: hue in
//! `[0, 180)` (degrees halved), saturation and value in `[0, 255]`.

use palette::white_point::D65;
use palette::{FromColor, Hsv, Lab, Srgb};

use crate::types::Rgb;

/// CIE L\*a\*b\* under D65 with `f64` components.
pub type LabD65 = Lab<D65, f64>;

/// Largest representable 8-bit hue (exclusive upper bound is 180).
pub const HUE_SCALE_MAX: f64 = 180.0;

/// Largest 8-bit saturation / value.
pub const CHANNEL_MAX: f64 = 255.0;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unit_to_u8(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * CHANNEL_MAX).round() as u8
}

fn to_unit(color: Rgb) -> Srgb<f64> {
    Srgb::new(
        f64::from(color.r) / CHANNEL_MAX,
        f64::from(color.g) / CHANNEL_MAX,
        f64::from(color.b) / CHANNEL_MAX,
    )
}

fn from_unit(color: Srgb<f64>) -> Rgb {
    Rgb::new(
        unit_to_u8(color.red),
        unit_to_u8(color.green),
        unit_to_u8(color.blue),
    )
}

/// Convert an 8-bit sRGB color to Lab.
#[must_use]
pub fn rgb_to_lab(color: Rgb) -> LabD65 {
    LabD65::from_color(to_unit(color))
}

/// Convert Lab back to 8-bit sRGB, clamping out-of-gamut values.
#[must_use]
pub fn lab_to_rgb(lab: LabD65) -> Rgb {
    from_unit(Srgb::from_color(lab))
}

/// Convert an 8-bit sRGB color to 8-bit-scale HSV `[h, s, v]`.
///
/// Hue is rounded onto `0..180`, wrapping 180 back to 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgb_to_hsv8(color: Rgb) -> [u8; 3] {
    let hsv: Hsv<palette::encoding::Srgb, f64> = Hsv::from_color(to_unit(color));
    let hue = (hsv.hue.into_positive_degrees() / 2.0).round();
    let hue = if hue >= HUE_SCALE_MAX { 0.0 } else { hue };
    [hue as u8, unit_to_u8(hsv.saturation), unit_to_u8(hsv.value)]
}

/// Convert an 8-bit-scale HSV triple (components may be fractional) back
/// to 8-bit sRGB.
#[must_use]
pub fn hsv8_to_rgb([h, s, v]: [f64; 3]) -> Rgb {
    let hue_degrees = (h * 2.0).rem_euclid(360.0);
    let hsv = Hsv::<palette::encoding::Srgb, f64>::new(
        hue_degrees,
        (s / CHANNEL_MAX).clamp(0.0, 1.0),
        (v / CHANNEL_MAX).clamp(0.0, 1.0),
    );
    from_unit(Srgb::from_color(hsv))
}

/// CIEDE2000 color difference with unit weighting factors
/// (`kL = kC = kH = 1`).
///
/// Follows Sharma, Wu and Dalal, "The CIEDE2000 Color-Difference
/// Formula: Implementation Notes, Supplementary Test Data, and
/// Mathematical Observations" (2005).
#[must_use]
pub fn ciede2000(lab1: LabD65, lab2: LabD65) -> f64 {
    const POW25_7: f64 = 6_103_515_625.0; // 25^7

    let (l1, a1, b1) = (lab1.l, lab1.a, lab1.b);
    let (l2, a2, b2) = (lab2.l, lab2.a, lab2.b);

    let c1 = a1.hypot(b1);
    let c2 = a2.hypot(b2);
    let c_bar7 = ((c1 + c2) / 2.0).powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + POW25_7)).sqrt());

    let a1p = (1.0 + g) * a1;
    let a2p = (1.0 + g) * a2;
    let c1p = a1p.hypot(b1);
    let c2p = a2p.hypot(b2);

    let hue = |a: f64, b: f64| {
        if a == 0.0 && b == 0.0 {
            0.0
        } else {
            b.atan2(a).to_degrees().rem_euclid(360.0)
        }
    };
    let h1p = hue(a1p, b1);
    let h2p = hue(a2p, b2);

    let chroma_product = c1p * c2p;
    let delta_lp = l2 - l1;
    let delta_cp = c2p - c1p;

    let delta_hp = if chroma_product == 0.0 {
        0.0
    } else {
        let diff = h2p - h1p;
        if diff.abs() <= 180.0 {
            diff
        } else if diff > 180.0 {
            diff - 360.0
        } else {
            diff + 360.0
        }
    };
    let delta_big_hp = 2.0 * chroma_product.sqrt() * (delta_hp.to_radians() / 2.0).sin();

    let l_bar_p = (l1 + l2) / 2.0;
    let c_bar_p = (c1p + c2p) / 2.0;
    let h_bar_p = if chroma_product == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 0.32f64.mul_add(
        (3.0f64.mul_add(h_bar_p, 6.0)).to_radians().cos(),
        0.24f64.mul_add(
            (2.0 * h_bar_p).to_radians().cos(),
            0.17f64.mul_add(-(h_bar_p - 30.0).to_radians().cos(), 1.0),
        ),
    ) - 0.20 * (4.0f64.mul_add(h_bar_p, -63.0)).to_radians().cos();

    let delta_theta = 30.0 * (-((h_bar_p - 275.0) / 25.0).powi(2)).exp();
    let c_bar_p7 = c_bar_p.powi(7);
    let r_c = 2.0 * (c_bar_p7 / (c_bar_p7 + POW25_7)).sqrt();
    let l_offset2 = (l_bar_p - 50.0).powi(2);
    let s_l = 1.0 + 0.015 * l_offset2 / (20.0 + l_offset2).sqrt();
    let s_c = 0.045f64.mul_add(c_bar_p, 1.0);
    let s_h = (0.015 * c_bar_p).mul_add(t, 1.0);
    let r_t = -(2.0 * delta_theta).to_radians().sin() * r_c;

    let dl = delta_lp / s_l;
    let dc = delta_cp / s_c;
    let dh = delta_big_hp / s_h;
    (r_t * dc).mul_add(dh, dl.mul_add(dl, dc.mul_add(dc, dh * dh))).sqrt()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lab(l: f64, a: f64, b: f64) -> LabD65 {
        LabD65::new(l, a, b)
    }

    /// Pairs from Sharma, Wu and Dalal's supplementary test data.
    const SHARMA_PAIRS: &[([f64; 3], [f64; 3], f64)] = &[
        ([50.0, 2.6772, -79.7751], [50.0, 0.0, -82.7485], 2.0425),
        ([50.0, 3.1571, -77.2803], [50.0, 0.0, -82.7485], 2.8615),
        ([50.0, 2.8361, -74.0200], [50.0, 0.0, -82.7485], 3.4412),
        ([50.0, -1.3802, -84.2814], [50.0, 0.0, -82.7485], 1.0000),
        ([50.0, 0.0, 0.0], [50.0, -1.0, 2.0], 2.3669),
        ([50.0, 2.4900, -0.0010], [50.0, -2.4900, 0.0009], 7.1792),
        ([50.0, 2.4900, -0.0010], [50.0, -2.4900, 0.0010], 7.1792),
        ([50.0, 2.4900, -0.0010], [50.0, -2.4900, 0.0011], 7.2195),
        ([50.0, 2.4900, -0.0010], [50.0, -2.4900, 0.0012], 7.2195),
        ([50.0, -0.0010, 2.4900], [50.0, 0.0009, -2.4900], 4.8045),
        ([50.0, 2.5000, 0.0], [73.0, 25.0, -18.0], 27.1492),
        ([50.0, 2.5000, 0.0], [61.0, -5.0, 29.0], 22.8977),
        ([50.0, 2.5000, 0.0], [56.0, -27.0, -3.0], 31.9030),
        ([50.0, 2.5000, 0.0], [58.0, 24.0, 15.0], 19.4535),
        ([60.2574, -34.0099, 36.2677], [60.4626, -34.1751, 39.4387], 1.2644),
        ([63.0109, -31.0961, -5.8663], [62.8187, -29.7946, -4.0864], 1.2630),
        ([61.2901, 3.7196, -5.3901], [61.4292, 2.2480, -4.9620], 1.8731),
        ([35.0831, -44.1164, 3.7933], [35.0232, -40.0716, 1.5901], 1.8645),
        ([22.7233, 20.0904, -46.6940], [23.0331, 14.9730, -42.5619], 2.0373),
        ([90.8027, -2.0831, 1.4410], [91.1528, -1.6435, 0.0447], 1.4441),
        ([6.7747, -0.2908, -2.4247], [5.8714, -0.0985, -2.2286], 0.6377),
        ([2.0776, 0.0795, -1.1350], [0.9033, -0.0636, -0.5514], 0.9082),
    ];

    #[test]
    fn matches_published_reference_pairs() {
        for (i, (p1, p2, expected)) in SHARMA_PAIRS.iter().enumerate() {
            let de = ciede2000(lab(p1[0], p1[1], p1[2]), lab(p2[0], p2[1], p2[2]));
            assert!(
                (de - expected).abs() < 1e-4,
                "pair {i}: expected {expected}, got {de}"
            );
        }
    }

    #[test]
    fn is_symmetric() {
        for (p1, p2, _) in SHARMA_PAIRS {
            let a = lab(p1[0], p1[1], p1[2]);
            let b = lab(p2[0], p2[1], p2[2]);
            assert!((ciede2000(a, b) - ciede2000(b, a)).abs() < 1e-9);
        }
    }

    #[test]
    fn identical_colors_have_zero_difference() {
        let red = rgb_to_lab(Rgb::new(255, 0, 0));
        assert!(ciede2000(red, red).abs() < 1e-12);
    }

    #[test]
    fn red_lab_matches_known_coordinates() {
        let red = rgb_to_lab(Rgb::new(255, 0, 0));
        assert!((red.l - 53.24).abs() < 0.05, "L = {}", red.l);
        assert!((red.a - 80.09).abs() < 0.1, "a = {}", red.a);
        assert!((red.b - 67.20).abs() < 0.1, "b = {}", red.b);
    }

    #[test]
    fn lab_round_trip_is_lossless_for_8bit_colors() {
        for color in [
            Rgb::new(0, 0, 0),
            Rgb::new(255, 255, 255),
            Rgb::new(176, 23, 31),
            Rgb::new(12, 200, 99),
        ] {
            assert_eq!(lab_to_rgb(rgb_to_lab(color)), color);
        }
    }

    #[test]
    fn hsv8_uses_half_degree_hue_scale() {
        assert_eq!(rgb_to_hsv8(Rgb::new(255, 0, 0)), [0, 255, 255]);
        assert_eq!(rgb_to_hsv8(Rgb::new(0, 255, 0)), [60, 255, 255]);
        assert_eq!(rgb_to_hsv8(Rgb::new(0, 0, 255)), [120, 255, 255]);
        assert_eq!(rgb_to_hsv8(Rgb::new(0, 0, 0)), [0, 0, 0]);
    }

    #[test]
    fn hsv8_round_trip_of_primaries() {
        for color in [
            Rgb::new(255, 0, 0),
            Rgb::new(0, 255, 0),
            Rgb::new(0, 0, 255),
            Rgb::new(255, 255, 255),
        ] {
            let [h, s, v] = rgb_to_hsv8(color);
            let back = hsv8_to_rgb([f64::from(h), f64::from(s), f64::from(v)]);
            assert_eq!(back, color);
        }
    }
}
