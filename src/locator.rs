use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};
use tempfile::NamedTempFile;

/// Axis-aligned rectangle in screen coordinates. Recomputed on every capture
/// because the client window may move between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn contains(&self, bbox: &BBox) -> bool {
        bbox.left >= self.left
            && bbox.top >= self.top
            && bbox.left + bbox.width as i32 <= self.left + self.width as i32
            && bbox.top + bbox.height as i32 <= self.top + self.height as i32
    }
}

/// A captured still of the client area plus where it sits on screen.
#[derive(Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub region: Region,
}

/// Bounding box of a located template occurrence, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// A successful locate: where the template matched, at which resize factor,
/// and how strongly. Produced and consumed within a single loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchHit {
    pub bbox: BBox,
    pub scale: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    /// min → max: the smallest acceptable size wins.
    Ascending,
    /// max → min: the largest acceptable size wins.
    Descending,
}

/// Bounds and granularity of the resize sweep, plus the acceptance threshold.
/// The first scale in traversal order whose best correlation meets
/// `confidence` terminates the search; scales are not globally ranked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePolicy {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub confidence: f32,
    pub direction: ScaleDirection,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 1.5,
            step: 0.1,
            confidence: 0.625,
            direction: ScaleDirection::Ascending,
        }
    }
}

impl ScalePolicy {
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Scale factors over `[min, max)` at `step` increments, in traversal
    /// order. Empty when the range is empty or the step is degenerate.
    pub fn scales(&self) -> Vec<f32> {
        let mut scales = Vec::new();
        if self.step <= 0.0 {
            return scales;
        }
        let mut k = 0u32;
        loop {
            let scale = self.min + self.step * k as f32;
            if scale >= self.max - 1e-6 {
                break;
            }
            scales.push(scale);
            k += 1;
        }
        if self.direction == ScaleDirection::Descending {
            scales.reverse();
        }
        scales
    }
}

/// Scoped staging file for the most recently resized template candidate.
/// One per process; overwritten on every scale attempt. Deleted on drop, so
/// cleanup happens on every exit path without shutdown bookkeeping.
pub struct Scratch {
    file: NamedTempFile,
}

impl Scratch {
    pub fn new() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("wizfarmer-resized-")
            .suffix(".png")
            .tempfile()
            .context("failed to create scratch file for resized templates")?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn stage(&self, candidate: &GrayImage) -> Result<()> {
        candidate
            .save(self.path())
            .context("failed to stage resized template candidate")?;
        Ok(())
    }
}

/// Multi-scale template locator. Templates are resolved as
/// `<assets_dir>/<category>/<name>.png` and loaded per search, never cached.
pub struct Locator {
    assets_dir: PathBuf,
    scratch: Scratch,
}

impl Locator {
    pub fn new(assets_dir: impl Into<PathBuf>, scratch: Scratch) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            scratch,
        }
    }

    pub fn template_path(&self, category: &str, name: &str) -> PathBuf {
        self.assets_dir.join(category).join(format!("{name}.png"))
    }

    /// Search `frame` for the named template across the policy's scale range.
    /// Returns the first scale (in traversal order) whose best normalized
    /// cross-correlation meets the policy confidence, or `None` when the
    /// range is exhausted. Transient problems (unreadable template, a scale
    /// that does not fit the frame, a failed staging write) are logged and
    /// degrade to `None` rather than erroring.
    pub fn locate(
        &self,
        frame: &Frame,
        category: &str,
        name: &str,
        policy: &ScalePolicy,
    ) -> Result<Option<MatchHit>> {
        let path = self.template_path(category, name);
        let template = match image::open(&path) {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                tracing::warn!("failed to load template {}: {e}", path.display());
                return Ok(None);
            }
        };

        let haystack = frame.image.to_luma8();

        for scale in policy.scales() {
            let width = (template.width() as f32 * scale).round() as u32;
            let height = (template.height() as f32 * scale).round() as u32;

            if width == 0 || height == 0 || width >= haystack.width() || height >= haystack.height()
            {
                tracing::debug!(
                    "'{category}/{name}': scale {scale:.2} ({width}x{height}) does not fit frame {}x{}, skipping",
                    haystack.width(),
                    haystack.height()
                );
                continue;
            }

            let candidate = imageops::resize(&template, width, height, FilterType::Triangle);

            if let Err(e) = self.scratch.stage(&candidate) {
                tracing::warn!("'{category}/{name}': scale {scale:.2} skipped: {e:#}");
                continue;
            }

            let scores = match_template(
                &haystack,
                &candidate,
                MatchTemplateMethod::CrossCorrelationNormalized,
            );
            let extremes = find_extremes(&scores);

            if extremes.max_value >= policy.confidence {
                let (x, y) = extremes.max_value_location;
                let hit = MatchHit {
                    bbox: BBox {
                        left: frame.region.left + x as i32,
                        top: frame.region.top + y as i32,
                        width,
                        height,
                    },
                    scale,
                    confidence: extremes.max_value,
                };
                tracing::info!(
                    "found '{category}/{name}' at scale {scale:.2} confidence {:.3} ({}x{} at {}, {})",
                    extremes.max_value,
                    width,
                    height,
                    hit.bbox.left,
                    hit.bbox.top,
                );
                return Ok(Some(hit));
            }
        }

        tracing::info!(
            "could not find '{category}/{name}' at any scale in [{:.2}, {:.2}) with confidence {:.3}",
            policy.min,
            policy.max,
            policy.confidence,
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    // Deterministic sparse block pattern: high self-correlation at the right
    // scale, low correlation against flat background and other seeds.
    fn pattern(seed: u32, width: u32, height: u32, block: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([0]));
        let mut state = seed;
        for by in 0..height.div_ceil(block) {
            for bx in 0..width.div_ceil(block) {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                if state % 6 == 0 {
                    for y in by * block..((by + 1) * block).min(height) {
                        for x in bx * block..((bx + 1) * block).min(width) {
                            img.put_pixel(x, y, Luma([255]));
                        }
                    }
                }
            }
        }
        img
    }

    fn save_template(assets_dir: &Path, category: &str, name: &str, img: &GrayImage) {
        let dir = assets_dir.join(category);
        std::fs::create_dir_all(&dir).unwrap();
        img.save(dir.join(format!("{name}.png"))).unwrap();
    }

    // Plant a template occurrence into the frame image, resized with the
    // same resampling the locator uses. Returns the planted dimensions.
    fn plant(frame: &mut GrayImage, template: &GrayImage, scale: f32, left: u32, top: u32) -> (u32, u32) {
        let width = (template.width() as f32 * scale).round() as u32;
        let height = (template.height() as f32 * scale).round() as u32;
        let resized = imageops::resize(template, width, height, FilterType::Triangle);
        for (x, y, pixel) in resized.enumerate_pixels() {
            frame.put_pixel(left + x, top + y, *pixel);
        }
        (width, height)
    }

    fn frame_of(img: GrayImage, left: i32, top: i32) -> Frame {
        let region = Region {
            left,
            top,
            width: img.width(),
            height: img.height(),
        };
        Frame {
            image: DynamicImage::ImageLuma8(img),
            region,
        }
    }

    fn test_locator(assets_dir: &Path) -> Locator {
        Locator::new(assets_dir, Scratch::new().unwrap())
    }

    fn strict() -> ScalePolicy {
        ScalePolicy::default().with_confidence(0.9)
    }

    #[test]
    fn test_scales_ascending() {
        let policy = ScalePolicy::default();
        let scales = policy.scales();
        assert_eq!(scales.len(), 10);
        assert!((scales[0] - 0.5).abs() < 1e-5);
        assert!((scales[9] - 1.4).abs() < 1e-4);
        assert!(scales.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_scales_descending_is_reversed() {
        let asc = ScalePolicy::default();
        let desc = ScalePolicy {
            direction: ScaleDirection::Descending,
            ..asc
        };
        let mut reversed = asc.scales();
        reversed.reverse();
        assert_eq!(desc.scales(), reversed);
    }

    #[test]
    fn test_scales_empty_range() {
        let policy = ScalePolicy {
            min: 1.0,
            max: 1.0,
            ..ScalePolicy::default()
        };
        assert!(policy.scales().is_empty());
    }

    #[test]
    fn test_locate_planted_template_reports_scale_and_bbox() {
        let assets = tempfile::tempdir().unwrap();
        let template = pattern(1, 32, 32, 4);
        save_template(assets.path(), "fire", "fire_cat", &template);

        let mut img = GrayImage::from_pixel(160, 120, Luma([60]));
        let (pw, ph) = plant(&mut img, &template, 1.2, 40, 30);
        // Region offset exercises the screen-coordinate translation.
        let frame = frame_of(img, 100, 50);

        let locator = test_locator(assets.path());
        let hit = locator
            .locate(&frame, "fire", "fire_cat", &strict())
            .unwrap()
            .expect("planted template should be found");

        assert!(
            (hit.scale - 1.2).abs() <= 0.1 + 1e-4,
            "reported scale {} not within one step of 1.2",
            hit.scale
        );
        assert!(hit.confidence >= 0.9);
        assert!(frame.region.contains(&hit.bbox), "bbox must lie inside the search region");

        // Center must land on the planted occurrence even if the accepted
        // scale is one step off.
        let center_x = hit.bbox.left + hit.bbox.width as i32 / 2;
        let center_y = hit.bbox.top + hit.bbox.height as i32 / 2;
        let planted_cx = 100 + 40 + pw as i32 / 2;
        let planted_cy = 50 + 30 + ph as i32 / 2;
        assert!((center_x - planted_cx).abs() <= 5, "center x {center_x} vs planted {planted_cx}");
        assert!((center_y - planted_cy).abs() <= 5, "center y {center_y} vs planted {planted_cy}");
    }

    #[test]
    fn test_direction_selects_which_scale_wins() {
        let assets = tempfile::tempdir().unwrap();
        let template = pattern(2, 32, 32, 4);
        save_template(assets.path(), "fire", "fire_cat", &template);

        // Two occurrences of the same template at grid scales 0.8 and 1.3.
        let mut img = GrayImage::from_pixel(220, 120, Luma([60]));
        plant(&mut img, &template, 0.8, 20, 40);
        plant(&mut img, &template, 1.3, 140, 40);
        let frame = frame_of(img, 0, 0);

        let locator = test_locator(assets.path());

        let asc = locator
            .locate(&frame, "fire", "fire_cat", &strict())
            .unwrap()
            .expect("ascending search should find the small occurrence");
        let desc_policy = ScalePolicy {
            direction: ScaleDirection::Descending,
            ..strict()
        };
        let desc = locator
            .locate(&frame, "fire", "fire_cat", &desc_policy)
            .unwrap()
            .expect("descending search should find the large occurrence");

        assert!((asc.scale - 0.8).abs() <= 0.1 + 1e-4, "ascending scale {}", asc.scale);
        assert!((desc.scale - 1.3).abs() <= 0.1 + 1e-4, "descending scale {}", desc.scale);
        assert!(asc.scale < desc.scale);
    }

    #[test]
    fn test_locate_on_background_returns_not_found() {
        let assets = tempfile::tempdir().unwrap();
        let template = pattern(3, 32, 32, 4);
        save_template(assets.path(), "ui", "pass", &template);

        let img = GrayImage::from_pixel(160, 120, Luma([60]));
        let frame = frame_of(img, 0, 0);

        let locator = test_locator(assets.path());
        let hit = locator.locate(&frame, "ui", "pass", &strict()).unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn test_locate_is_idempotent_for_identical_inputs() {
        let assets = tempfile::tempdir().unwrap();
        let template = pattern(4, 32, 32, 4);
        save_template(assets.path(), "ui", "pass", &template);

        let mut img = GrayImage::from_pixel(160, 120, Luma([60]));
        plant(&mut img, &template, 1.0, 60, 40);
        let frame = frame_of(img, 0, 0);

        let locator = test_locator(assets.path());
        let first = locator.locate(&frame, "ui", "pass", &strict()).unwrap();
        let second = locator.locate(&frame, "ui", "pass", &strict()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_template_degrades_to_not_found() {
        let assets = tempfile::tempdir().unwrap();
        let img = GrayImage::from_pixel(80, 60, Luma([60]));
        let frame = frame_of(img, 0, 0);

        let locator = test_locator(assets.path());
        let hit = locator
            .locate(&frame, "ui", "does_not_exist", &strict())
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn test_oversized_scales_are_skipped_not_fatal() {
        let assets = tempfile::tempdir().unwrap();
        let template = pattern(5, 48, 48, 4);
        save_template(assets.path(), "ui", "pass", &template);

        // Frame barely fits the template at 1.0; larger scales must be
        // skipped without error.
        let mut img = GrayImage::from_pixel(60, 60, Luma([60]));
        plant(&mut img, &template, 1.0, 4, 4);
        let frame = frame_of(img, 0, 0);

        let locator = test_locator(assets.path());
        // Descending, so every oversized scale is visited before the fit.
        let policy = ScalePolicy {
            min: 0.9,
            max: 3.0,
            direction: ScaleDirection::Descending,
            ..strict()
        };
        let hit = locator.locate(&frame, "ui", "pass", &policy).unwrap();
        let hit = hit.expect("fitting scale should still match");
        assert!((hit.scale - 1.0).abs() <= 0.1 + 1e-4);
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let scratch = Scratch::new().unwrap();
        let path = scratch.path().to_path_buf();
        scratch.stage(&pattern(6, 16, 16, 4)).unwrap();
        assert!(path.exists());
        drop(scratch);
        assert!(!path.exists());
    }
}
