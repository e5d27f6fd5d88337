//! Data Augmentation Module for Plant-Health Classification
//!
//! Random geometric augmentation applied to training images only:
//! rotation, width/height shift, shear, zoom and horizontal flip.
//!
//! All geometric parameters are folded into one 3x3 affine matrix that is
//! applied around the image centre. Output pixels are sampled bilinearly
//! from the source; coordinates falling outside the image are clamped to
//! the border (`nearest` fill mode). The horizontal flip is applied after
//! the affine warp.
//!
//! # Augmentation Strategy
//!
//! - **Training**: random parameters drawn per image, per epoch
//! - **Validation/Test**: no augmentation

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{PlantHealthError, Result};

type Matrix3 = [[f64; 3]; 3];

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Maximum rotation in degrees (applies ±rotation_range)
    pub rotation_range: f64,
    /// Maximum horizontal shift as a fraction of the width
    pub width_shift_range: f64,
    /// Maximum vertical shift as a fraction of the height
    pub height_shift_range: f64,
    /// Maximum shear angle in degrees
    pub shear_range: f64,
    /// Zoom factors are drawn from `[1 - zoom_range, 1 + zoom_range]`
    pub zoom_range: f64,
    /// Randomly mirror images left-to-right
    pub horizontal_flip: bool,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_range: 30.0,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
        }
    }

    /// Whether any augmentation is enabled
    pub fn is_enabled(&self) -> bool {
        self.rotation_range > 0.0
            || self.width_shift_range > 0.0
            || self.height_shift_range > 0.0
            || self.shear_range > 0.0
            || self.zoom_range > 0.0
            || self.horizontal_flip
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("rotation_range", self.rotation_range),
            ("width_shift_range", self.width_shift_range),
            ("height_shift_range", self.height_shift_range),
            ("shear_range", self.shear_range),
            ("zoom_range", self.zoom_range),
        ];

        for (name, value) in ranges {
            if !value.is_finite() || value < 0.0 {
                return Err(PlantHealthError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.zoom_range >= 1.0 {
            return Err(PlantHealthError::Config(
                "zoom_range must be below 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Concrete parameters of one random transform
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformParams {
    /// Rotation in degrees
    pub theta: f64,
    /// Shift along rows, in pixels
    pub tx: f64,
    /// Shift along columns, in pixels
    pub ty: f64,
    /// Shear angle in degrees
    pub shear: f64,
    /// Zoom along rows
    pub zx: f64,
    /// Zoom along columns
    pub zy: f64,
    /// Mirror left-to-right after the affine warp
    pub flip_horizontal: bool,
}

impl TransformParams {
    /// Parameters that leave an image untouched
    pub fn identity() -> Self {
        Self {
            theta: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
            flip_horizontal: false,
        }
    }

    fn is_affine_identity(&self) -> bool {
        self.theta == 0.0
            && self.tx == 0.0
            && self.ty == 0.0
            && self.shear == 0.0
            && self.zx == 1.0
            && self.zy == 1.0
    }
}

/// Image augmenter that applies random transformations
///
/// Works on CHW `f32` buffers, the layout produced by the loader.
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    /// Create a new augmenter with the given configuration
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Draw random transform parameters for an image of `rows x cols`
    pub fn random_params(&self, rows: usize, cols: usize, rng: &mut ChaCha8Rng) -> TransformParams {
        let cfg = &self.config;
        let mut params = TransformParams::identity();

        if cfg.rotation_range > 0.0 {
            params.theta = rng.gen_range(-cfg.rotation_range..=cfg.rotation_range);
        }

        if cfg.height_shift_range > 0.0 {
            let shift = rng.gen_range(-cfg.height_shift_range..=cfg.height_shift_range);
            params.tx = shift * rows as f64;
        }

        if cfg.width_shift_range > 0.0 {
            let shift = rng.gen_range(-cfg.width_shift_range..=cfg.width_shift_range);
            params.ty = shift * cols as f64;
        }

        if cfg.shear_range > 0.0 {
            params.shear = rng.gen_range(-cfg.shear_range..=cfg.shear_range);
        }

        if cfg.zoom_range > 0.0 {
            let (low, high) = (1.0 - cfg.zoom_range, 1.0 + cfg.zoom_range);
            params.zx = rng.gen_range(low..=high);
            params.zy = rng.gen_range(low..=high);
        }

        if cfg.horizontal_flip {
            params.flip_horizontal = rng.gen_bool(0.5);
        }

        params
    }

    /// Draw random parameters and apply them
    pub fn augment(
        &self,
        image: &[f32],
        rows: usize,
        cols: usize,
        rng: &mut ChaCha8Rng,
    ) -> Vec<f32> {
        let params = self.random_params(rows, cols, rng);
        self.apply(image, rows, cols, &params)
    }

    /// Apply the given transform to a CHW image
    pub fn apply(&self, image: &[f32], rows: usize, cols: usize, params: &TransformParams) -> Vec<f32> {
        let plane = rows * cols;
        let channels = if plane == 0 { 0 } else { image.len() / plane };

        let mut output = if params.is_affine_identity() {
            image.to_vec()
        } else {
            let matrix = transform_matrix(params, rows, cols);
            let mut warped = vec![0.0f32; image.len()];

            for r in 0..rows {
                for c in 0..cols {
                    let (src_r, src_c) = map_point(&matrix, r as f64, c as f64);
                    for ch in 0..channels {
                        let src = &image[ch * plane..(ch + 1) * plane];
                        warped[ch * plane + r * cols + c] =
                            bilinear_sample(src, rows, cols, src_r, src_c);
                    }
                }
            }

            warped
        };

        if params.flip_horizontal {
            flip_horizontal(&mut output, channels, rows, cols);
        }

        output
    }
}

/// Affine matrix mapping output `(row, col, 1)` to input coordinates
///
/// Composed as `rotation * shift * shear * zoom`, then recentred on the
/// image centre `(rows/2 - 0.5, cols/2 - 0.5)`.
pub fn transform_matrix(params: &TransformParams, rows: usize, cols: usize) -> Matrix3 {
    let theta = params.theta.to_radians();
    let rotation = [
        [theta.cos(), -theta.sin(), 0.0],
        [theta.sin(), theta.cos(), 0.0],
        [0.0, 0.0, 1.0],
    ];

    let shift = [[1.0, 0.0, params.tx], [0.0, 1.0, params.ty], [0.0, 0.0, 1.0]];

    let shear = params.shear.to_radians();
    let shear = [
        [1.0, -shear.sin(), 0.0],
        [0.0, shear.cos(), 0.0],
        [0.0, 0.0, 1.0],
    ];

    let zoom = [[params.zx, 0.0, 0.0], [0.0, params.zy, 0.0], [0.0, 0.0, 1.0]];

    let matrix = mat_mul(&mat_mul(&mat_mul(&rotation, &shift), &shear), &zoom);

    let o_r = rows as f64 / 2.0 - 0.5;
    let o_c = cols as f64 / 2.0 - 0.5;
    let offset = [[1.0, 0.0, o_r], [0.0, 1.0, o_c], [0.0, 0.0, 1.0]];
    let reset = [[1.0, 0.0, -o_r], [0.0, 1.0, -o_c], [0.0, 0.0, 1.0]];

    mat_mul(&mat_mul(&offset, &matrix), &reset)
}

fn mat_mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn map_point(matrix: &Matrix3, r: f64, c: f64) -> (f64, f64) {
    (
        matrix[0][0] * r + matrix[0][1] * c + matrix[0][2],
        matrix[1][0] * r + matrix[1][1] * c + matrix[1][2],
    )
}

/// Bilinear sample of a single plane; out-of-range coordinates are clamped
fn bilinear_sample(plane: &[f32], rows: usize, cols: usize, r: f64, c: f64) -> f32 {
    let r = r.clamp(0.0, (rows - 1) as f64);
    let c = c.clamp(0.0, (cols - 1) as f64);

    let r0 = r.floor() as usize;
    let c0 = c.floor() as usize;
    let r1 = (r0 + 1).min(rows - 1);
    let c1 = (c0 + 1).min(cols - 1);

    let fr = (r - r0 as f64) as f32;
    let fc = (c - c0 as f64) as f32;

    let v00 = plane[r0 * cols + c0];
    let v01 = plane[r0 * cols + c1];
    let v10 = plane[r1 * cols + c0];
    let v11 = plane[r1 * cols + c1];

    v00 * (1.0 - fr) * (1.0 - fc) + v01 * (1.0 - fr) * fc + v10 * fr * (1.0 - fc) + v11 * fr * fc
}

fn flip_horizontal(image: &mut [f32], channels: usize, rows: usize, cols: usize) {
    for ch in 0..channels {
        for r in 0..rows {
            let start = ch * rows * cols + r * cols;
            image[start..start + cols].reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient_image(rows: usize, cols: usize) -> Vec<f32> {
        let mut image = vec![0.0f32; 3 * rows * cols];
        for ch in 0..3 {
            for r in 0..rows {
                for c in 0..cols {
                    image[ch * rows * cols + r * cols + c] =
                        (r * cols + c) as f32 / (rows * cols) as f32 + ch as f32 * 0.1;
                }
            }
        }
        image
    }

    #[test]
    fn test_identity_is_exact() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let image = gradient_image(8, 8);

        let output = augmenter.apply(&image, 8, 8, &TransformParams::identity());
        assert_eq!(output, image);
    }

    #[test]
    fn test_identity_matrix() {
        let matrix = transform_matrix(&TransformParams::identity(), 16, 16);
        for (i, row) in matrix.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((value - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_horizontal_flip() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let image = gradient_image(4, 5);
        let params = TransformParams {
            flip_horizontal: true,
            ..TransformParams::identity()
        };

        let output = augmenter.apply(&image, 4, 5, &params);
        for ch in 0..3 {
            for r in 0..4 {
                for c in 0..5 {
                    assert_eq!(
                        output[ch * 20 + r * 5 + c],
                        image[ch * 20 + r * 5 + (4 - c)]
                    );
                }
            }
        }
    }

    #[test]
    fn test_integer_shift_with_nearest_fill() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let image = gradient_image(6, 6);
        let params = TransformParams {
            ty: 2.0,
            ..TransformParams::identity()
        };

        // Output column c reads input column c + 2, clamped to the last column
        let output = augmenter.apply(&image, 6, 6, &params);
        for r in 0..6 {
            for c in 0..6 {
                let src_c = (c + 2).min(5);
                assert!((output[r * 6 + c] - image[r * 6 + src_c]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_rotation_keeps_centre_and_range() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let image = gradient_image(9, 9);
        let params = TransformParams {
            theta: 90.0,
            ..TransformParams::identity()
        };

        let output = augmenter.apply(&image, 9, 9, &params);
        assert_eq!(output.len(), image.len());
        assert!((output[4 * 9 + 4] - image[4 * 9 + 4]).abs() < 1e-5);

        let (min, max) = image
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        assert!(output.iter().all(|&v| v >= min - 1e-5 && v <= max + 1e-5));
    }

    #[test]
    fn test_random_params_within_ranges() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mut flips = 0;
        for _ in 0..200 {
            let p = augmenter.random_params(224, 224, &mut rng);
            assert!(p.theta.abs() <= 30.0);
            assert!(p.tx.abs() <= 0.2 * 224.0 + 1e-9);
            assert!(p.ty.abs() <= 0.2 * 224.0 + 1e-9);
            assert!(p.shear.abs() <= 0.2);
            assert!((0.8..=1.2).contains(&p.zx));
            assert!((0.8..=1.2).contains(&p.zy));
            if p.flip_horizontal {
                flips += 1;
            }
        }

        assert!(flips > 50 && flips < 150);
    }

    #[test]
    fn test_disabled_config_gives_identity() {
        let augmenter = Augmenter::new(AugmentationConfig::none());
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(augmenter.random_params(32, 32, &mut rng), TransformParams::identity());
        assert!(!AugmentationConfig::none().is_enabled());
    }

    #[test]
    fn test_validate() {
        assert!(AugmentationConfig::default().validate().is_ok());

        let mut config = AugmentationConfig::default();
        config.zoom_range = 1.5;
        assert!(config.validate().is_err());

        let mut config = AugmentationConfig::default();
        config.rotation_range = -1.0;
        assert!(config.validate().is_err());
    }
}
