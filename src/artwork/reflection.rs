//! Mirrored, fading reflection drawn below a cover.
//!
//! The output is `width + 4` by `height * 2 + 4`: the cover sits at (2, 2),
//! its mirror image follows directly below. Opacity of the mirror rises by
//! `1 / height` per source row starting from -0.3 and is clamped to [0, 0.7],
//! so the rows nearest the cover are the most visible.

use image::{Rgba, RgbaImage};

use super::store::Artwork;

const MARGIN: u32 = 2;
const START_ALPHA: f64 = -0.3;
const MAX_ALPHA: f64 = 0.7;

pub fn with_reflection(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    let mut out = RgbaImage::new(width + 2 * MARGIN, height * 2 + 2 * MARGIN);
    image::imageops::replace(&mut out, source, MARGIN as i64, MARGIN as i64);

    let bottom = out.height() - MARGIN - 1;
    let step = 1.0 / height.max(1) as f64;
    for row in 0..height {
        let alpha = (START_ALPHA + step * (row + 1) as f64).clamp(0.0, MAX_ALPHA);
        let y = bottom - row;
        for x in 0..width {
            let Rgba([r, g, b, a]) = *source.get_pixel(x, row);
            let faded = (a as f64 * alpha).round() as u8;
            out.put_pixel(x + MARGIN, y, Rgba([r, g, b, faded]));
        }
    }
    out
}

/// Applies [`with_reflection`] to decoded artwork.
pub fn reflect(artwork: &Artwork) -> Option<Artwork> {
    let image = artwork.to_image()?;
    Some(Artwork::from_rgba(with_reflection(&image)))
}
