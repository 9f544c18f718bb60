//! Item detection via template matching.
//!
//! Both the screenshot and the item icon are smoothed with a small Gaussian
//! blur, then scored with the normalized correlation coefficient (zero-mean
//! cross-correlation). The raw cross term comes from `imageproc`'s parallel
//! `match_template`; window means and variances come from integral images.
//!
//! The session matcher only searches the icon column of the shop list and
//! works on a downscaled copy of it. Correlation cost grows with the area of
//! both images, so halving the scale makes a search about 16 times cheaper.

use image::imageops::FilterType;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{MatchTemplateMethod, match_template_parallel};

use crate::automation::config::{RelativeRect, SessionSettings, ShopLayout};
use crate::automation::items::TrackedItem;

/// Variance (per pixel) below which an image window is treated as flat.
const FLAT_VARIANCE: f64 = 1e-3;

/// Downscaling never shrinks the shorter template side below this.
const MIN_SCALED_TEMPLATE: u32 = 12;

/// Correlation scores, one per template placement.
pub type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Top-left corner of a template placement and its correlation score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchHit {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Finds where an item is on a captured shop screenshot.
pub trait ItemMatcher: Send {
    /// Returns the buy-button point for `item` relative to the screenshot
    /// origin, or `None` if the item is not visible.
    fn find(&self, screenshot: &GrayImage, item: &TrackedItem) -> Option<(u32, u32)>;
}

/// Template matcher configured for one shop layout.
#[derive(Clone, Debug)]
pub struct TemplateMatcher {
    min_confidence: f32,
    smoothing_sigma: f32,
    /// Resize factor applied to both images before correlating
    match_scale: f32,
    layout: ShopLayout,
}

impl TemplateMatcher {
    pub fn new(min_confidence: f32, smoothing_sigma: f32, match_scale: f32, layout: ShopLayout) -> Self {
        Self {
            min_confidence,
            smoothing_sigma,
            match_scale,
            layout,
        }
    }

    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(
            settings.min_confidence,
            settings.smoothing_sigma,
            settings.match_scale,
            settings.layout.clone(),
        )
    }

    /// Locates `template` inside the search area of `screenshot` and maps the
    /// hit onto the buy button column.
    ///
    /// The returned point is always inside the screenshot bounds.
    pub fn find_template(&self, screenshot: &GrayImage, template: &GrayImage) -> Option<(u32, u32)> {
        let hit = self.search(screenshot, template).ok()?;
        log::debug!("Template hit at ({}, {}) score {:.3}", hit.x, hit.y, hit.score);
        Some(buy_point(&self.layout, screenshot.dimensions(), hit.y))
    }

    /// Matches inside the search region at the configured scale.
    ///
    /// Returns the hit in screenshot coordinates, or the best score of the
    /// surface when nothing clears the threshold.
    fn search(&self, screenshot: &GrayImage, template: &GrayImage) -> Result<MatchHit, Option<f32>> {
        let (offset_x, offset_y, region) =
            crop_relative(screenshot, &self.layout.item_search_region);
        let scale = effective_scale(self.match_scale, template.dimensions());
        let region = downscale(region, scale);
        let template = downscale(template.clone(), scale);

        let scores = score_map(&region, &template, self.smoothing_sigma).ok_or(None)?;
        match first_match(&scores, self.min_confidence, template.dimensions()) {
            Some(hit) => Ok(MatchHit {
                x: offset_x + (hit.x as f32 / scale).round() as u32,
                y: offset_y + (hit.y as f32 / scale).round() as u32,
                score: hit.score,
            }),
            None => Err(best_score(&scores)),
        }
    }
}

impl ItemMatcher for TemplateMatcher {
    fn find(&self, screenshot: &GrayImage, item: &TrackedItem) -> Option<(u32, u32)> {
        match self.search(screenshot, &item.template) {
            Ok(hit) => {
                log::debug!(
                    "{} matched at ({}, {}) score {:.3}",
                    item.name,
                    hit.x,
                    hit.y,
                    hit.score
                );
                Some(buy_point(&self.layout, screenshot.dimensions(), hit.y))
            }
            Err(best) => {
                log::debug!(
                    "{} not found (best score {:?}, threshold {:.2})",
                    item.name,
                    best,
                    self.min_confidence
                );
                None
            }
        }
    }
}

/// Finds the first template placement, in row order, scoring at least
/// `min_confidence`.
///
/// Rows are scanned top to bottom, so with several visible copies the
/// topmost one wins. The hit is refined to the local score peak so the
/// position is not biased towards the upper-left flank of the match.
pub fn find(
    screenshot: &GrayImage,
    template: &GrayImage,
    min_confidence: f32,
    smoothing_sigma: f32,
) -> Option<MatchHit> {
    let scores = score_map(screenshot, template, smoothing_sigma)?;
    first_match(&scores, min_confidence, template.dimensions())
}

/// Computes the correlation coefficient of `template` at every placement.
///
/// Returns `None` if the template does not fit in the screenshot or has no
/// contrast at all.
pub fn score_map(screenshot: &GrayImage, template: &GrayImage, smoothing_sigma: f32) -> Option<ScoreMap> {
    let (sw, sh) = screenshot.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let image = smooth(screenshot, smoothing_sigma);
    let template = smooth(template, smoothing_sigma);

    let n = (tw * th) as f64;
    let (t_sum, t_sq_sum) = template.pixels().fold((0f64, 0f64), |(s, sq), p| {
        let v = p[0] as f64;
        (s + v, sq + v * v)
    });
    let t_var = t_sq_sum - t_sum * t_sum / n;
    if t_var <= FLAT_VARIANCE * n {
        return None;
    }

    let cross = match_template_parallel(&image, &template, MatchTemplateMethod::CrossCorrelation);
    let sums = integral_image::<_, u64>(&image);
    let sq_sums = integral_squared_image::<_, u64>(&image);

    let window_sum = |table: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32| -> f64 {
        let a = table.get_pixel(x + tw, y + th)[0] + table.get_pixel(x, y)[0];
        let b = table.get_pixel(x, y + th)[0] + table.get_pixel(x + tw, y)[0];
        (a - b) as f64
    };

    Some(ScoreMap::from_fn(cross.width(), cross.height(), |x, y| {
        let i_sum = window_sum(&sums, x, y);
        let i_var = window_sum(&sq_sums, x, y) - i_sum * i_sum / n;
        if i_var <= FLAT_VARIANCE * n {
            return Luma([0.0]);
        }
        let numerator = cross.get_pixel(x, y)[0] as f64 - i_sum * t_sum / n;
        let score = numerator / (i_var * t_var).sqrt();
        Luma([score.clamp(-1.0, 1.0) as f32])
    }))
}

/// Scans the score map row by row for the first placement clearing the threshold.
pub fn first_match(scores: &ScoreMap, min_confidence: f32, template_size: (u32, u32)) -> Option<MatchHit> {
    let (width, height) = scores.dimensions();
    let (x0, y0) = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .find(|&(x, y)| scores.get_pixel(x, y)[0] >= min_confidence)?;

    // Refine inside half a template below and around the first hit
    let (tw, th) = template_size;
    let x_range = x0.saturating_sub(tw / 2)..(x0 + tw / 2 + 1).min(width);
    let y_range = y0..(y0 + th / 2 + 1).min(height);

    let mut best = MatchHit {
        x: x0,
        y: y0,
        score: scores.get_pixel(x0, y0)[0],
    };
    for y in y_range {
        for x in x_range.clone() {
            let score = scores.get_pixel(x, y)[0];
            if score > best.score {
                best = MatchHit { x, y, score };
            }
        }
    }
    Some(best)
}

/// Highest score of the map, for diagnostics.
pub fn best_score(scores: &ScoreMap) -> Option<f32> {
    scores.pixels().map(|p| p[0]).reduce(f32::max)
}

/// Maps a matched icon row onto the buy button of that row.
///
/// x is the fixed buy column; y is the match row plus the layout's vertical
/// correction. Both are clamped into the screenshot.
pub fn buy_point(layout: &ShopLayout, screenshot_size: (u32, u32), match_y: u32) -> (u32, u32) {
    let (width, height) = screenshot_size;
    let x = (width as f32 * layout.buy_button_x).round() as u32;
    let y = match_y + (height as f32 * layout.buy_offset_y).round() as u32;
    (
        x.min(width.saturating_sub(1)),
        y.min(height.saturating_sub(1)),
    )
}

/// Crops a sub-region from an image using relative coordinates.
///
/// Converts the relative rect (0.0–1.0) to absolute pixel coordinates,
/// clamps to image bounds, and returns the offset with the cropped image.
pub fn crop_relative(img: &GrayImage, region: &RelativeRect) -> (u32, u32, GrayImage) {
    let (w, h) = img.dimensions();

    let x0 = ((region.x.max(0.0) * w as f32) as u32).min(w);
    let y0 = ((region.y.max(0.0) * h as f32) as u32).min(h);
    let rw = ((region.width.max(0.0) * w as f32) as u32).min(w - x0);
    let rh = ((region.height.max(0.0) * h as f32) as u32).min(h - y0);

    (
        x0,
        y0,
        image::imageops::crop_imm(img, x0, y0, rw, rh).to_image(),
    )
}

/// Clamps the configured scale so the template keeps enough detail.
///
/// Values outside (0, 1) disable downscaling.
pub fn effective_scale(scale: f32, template_size: (u32, u32)) -> f32 {
    if !(scale > 0.0 && scale < 1.0) {
        return 1.0;
    }
    let shortest = template_size.0.min(template_size.1).max(1) as f32;
    scale.max(MIN_SCALED_TEMPLATE as f32 / shortest).min(1.0)
}

fn downscale(img: GrayImage, scale: f32) -> GrayImage {
    if scale >= 1.0 {
        return img;
    }
    let (w, h) = img.dimensions();
    let width = ((w as f32 * scale).round() as u32).max(1);
    let height = ((h as f32 * scale).round() as u32).max(1);
    image::imageops::resize(&img, width, height, FilterType::Triangle)
}

fn smooth(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        gaussian_blur_f32(img, sigma)
    } else {
        img.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::{Duration, Instant};

    /// Layout searching the whole window.
    fn full_window_layout() -> ShopLayout {
        ShopLayout {
            item_search_region: RelativeRect::default(),
            ..Default::default()
        }
    }

    fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        GrayImage::from_fn(width, height, |_, _| Luma([rng.random::<u8>()]))
    }

    fn paste(target: &mut GrayImage, patch: &GrayImage, x: u32, y: u32) {
        image::imageops::replace(target, patch, x as i64, y as i64);
    }

    #[test]
    fn test_finds_pasted_icon() {
        let icon = noise(32, 32, 1);
        let mut screen = noise(160, 120, 2);
        paste(&mut screen, &icon, 70, 40);

        let hit = find(&screen, &icon, 0.8, 1.0).expect("icon should be found");
        assert_eq!((hit.x, hit.y), (70, 40));
        assert!(hit.score > 0.9);
    }

    #[test]
    fn test_absent_icon_returns_none() {
        let icon = noise(32, 32, 3);
        let screen = noise(160, 120, 4);

        assert!(find(&screen, &icon, 0.8, 1.0).is_none());
    }

    #[test]
    fn test_topmost_copy_wins() {
        let icon = noise(32, 32, 5);
        let mut screen = noise(160, 160, 6);
        paste(&mut screen, &icon, 100, 110);
        paste(&mut screen, &icon, 10, 20);

        let hit = find(&screen, &icon, 0.8, 1.0).unwrap();
        assert_eq!((hit.x, hit.y), (10, 20));
    }

    #[test]
    fn test_flat_images_never_match() {
        let flat = GrayImage::from_pixel(100, 100, Luma([128]));
        let icon = noise(16, 16, 7);
        assert!(find(&flat, &icon, 0.5, 1.0).is_none());

        let flat_icon = GrayImage::from_pixel(16, 16, Luma([128]));
        assert!(find(&noise(100, 100, 8), &flat_icon, 0.5, 1.0).is_none());
    }

    #[test]
    fn test_template_larger_than_screenshot() {
        let icon = noise(64, 64, 9);
        let screen = noise(32, 32, 10);
        assert!(find(&screen, &icon, 0.1, 1.0).is_none());
    }

    #[test]
    fn test_brightness_shift_still_matches() {
        let icon = noise(32, 32, 11);
        let mut screen = noise(120, 120, 12);
        let dimmed = GrayImage::from_fn(32, 32, |x, y| {
            Luma([(icon.get_pixel(x, y)[0] as f32 * 0.7) as u8 + 20])
        });
        paste(&mut screen, &dimmed, 50, 60);

        let hit = find(&screen, &icon, 0.8, 1.0).unwrap();
        assert_eq!((hit.x, hit.y), (50, 60));
    }

    #[test]
    fn test_buy_point_stays_in_bounds() {
        let layout = ShopLayout::default();
        assert_eq!(buy_point(&layout, (1000, 800), 100), (900, 168));
        // Correction below the last row clamps to the bottom edge
        assert_eq!(buy_point(&layout, (1000, 800), 790), (900, 799));
    }

    #[test]
    fn test_matcher_point_inside_screenshot() {
        let icon = noise(32, 32, 13);
        let mut screen = noise(200, 150, 14);
        paste(&mut screen, &icon, 20, 100);

        let matcher = TemplateMatcher::new(0.8, 1.0, 1.0, full_window_layout());
        let (x, y) = matcher.find_template(&screen, &icon).unwrap();
        assert!(x < 200 && y < 150);
        assert_eq!(x, 180);
        // 100 + round(150 * 0.085) = 113
        assert_eq!(y, 113);
    }

    #[test]
    fn test_search_region_offsets_hit() {
        let icon = noise(24, 24, 15);
        let mut screen = noise(200, 200, 16);
        paste(&mut screen, &icon, 30, 120);

        let layout = ShopLayout {
            item_search_region: RelativeRect {
                x: 0.0,
                y: 0.5,
                width: 0.5,
                height: 0.5,
            },
            buy_offset_y: 0.0,
            ..Default::default()
        };
        let matcher = TemplateMatcher::new(0.8, 1.0, 1.0, layout);
        assert_eq!(matcher.find_template(&screen, &icon), Some((180, 120)));
    }

    #[test]
    fn test_crop_relative_clamps() {
        let img = GrayImage::new(100, 100);
        let rect = RelativeRect {
            x: 0.9,
            y: 0.9,
            width: 0.5,
            height: 0.5,
        };
        let (x, y, cropped) = crop_relative(&img, &rect);
        assert_eq!((x, y), (90, 90));
        assert_eq!(cropped.dimensions(), (10, 10));
    }

    #[test]
    fn test_effective_scale_keeps_template_detail() {
        assert_eq!(effective_scale(0.5, (80, 80)), 0.5);
        // 24 * 0.5 would be below the minimum side
        assert_eq!(effective_scale(0.5, (24, 30)), 0.5);
        assert_eq!(effective_scale(0.25, (24, 30)), 0.5);
        assert_eq!(effective_scale(0.5, (10, 10)), 1.0);
        assert_eq!(effective_scale(1.5, (80, 80)), 1.0);
        assert_eq!(effective_scale(f32::NAN, (80, 80)), 1.0);
    }

    #[test]
    fn test_downscaled_search_maps_back_to_full_size() {
        let icon = noise(64, 64, 19);
        let mut screen = noise(320, 240, 20);
        paste(&mut screen, &icon, 120, 80);

        let layout = ShopLayout {
            buy_offset_y: 0.0,
            ..full_window_layout()
        };
        let matcher = TemplateMatcher::new(0.8, 1.0, 0.5, layout);
        let (x, y) = matcher.find_template(&screen, &icon).unwrap();
        assert_eq!(x, 288);
        assert!(y.abs_diff(80) <= 2, "row was {}", y);
    }

    #[test]
    fn test_window_sized_search_is_fast() {
        let icon = noise(80, 80, 17);
        let mut screen = noise(1280, 720, 18);
        // Inside the default icon column
        paste(&mut screen, &icon, 512, 300);

        let settings_like = TemplateMatcher::new(0.8, 1.0, 0.5, ShopLayout::default());
        let started = Instant::now();
        let point = settings_like.find_template(&screen, &icon);
        let elapsed = started.elapsed();

        let (x, y) = point.expect("icon should be found");
        assert_eq!(x, 1152);
        // 300 + round(720 * 0.085)
        assert!(y.abs_diff(361) <= 2, "row was {}", y);
        assert!(
            elapsed < Duration::from_millis(500),
            "one search took {:?}",
            elapsed
        );
    }
}
