//! Image preprocessing and shared classifier utilities.

use super::config::{ModelInputSpec, TensorLayout};
use super::decision::DecisionError;
use super::engine::EngineError;
use super::labels::LabelError;
use crate::assets::AssetError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use ndarray::{Array4, ArrayView4};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default ImageNet normalization mean (RGB order).
pub const IMAGE_NET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Default ImageNet normalization standard deviation (RGB order).
pub const IMAGE_NET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized image tensor with a batch dimension of one.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
    layout: TensorLayout,
}

impl ImageTensor {
    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Shape in the tensor's own layout.
    pub fn shape(&self) -> [usize; 4] {
        let dims = self.data.shape();
        [dims[0], dims[1], dims[2], dims[3]]
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Value of channel `c` at pixel `(x, y)` regardless of layout.
    pub fn get(&self, c: usize, y: usize, x: usize) -> Option<f32> {
        match self.layout {
            TensorLayout::Nchw => self.data.get([0, c, y, x]).copied(),
            TensorLayout::Nhwc => self.data.get([0, y, x, c]).copied(),
        }
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

/// Resizes decoded images and turns them into normalized tensors.
#[derive(Clone, Debug, Default)]
pub struct Preprocessor {
    spec: ModelInputSpec,
}

impl Preprocessor {
    pub fn new(spec: ModelInputSpec) -> Result<Self, PreprocessError> {
        if spec.width == 0 || spec.height == 0 {
            return Err(PreprocessError::InvalidSpec(format!(
                "target size must be nonzero, got {}x{}",
                spec.width, spec.height
            )));
        }
        if spec.std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(PreprocessError::InvalidSpec(format!(
                "std must be finite and nonzero, got {:?}",
                spec.std
            )));
        }
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &ModelInputSpec {
        &self.spec
    }

    /// Resize `image` to the target size, ignoring its aspect ratio, and
    /// normalize each channel as `(p / 255 - mean[c]) / std[c]`.
    pub fn to_tensor(&self, image: &DynamicImage) -> Result<ImageTensor, PreprocessError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::EmptyImage);
        }

        let (width, height) = (self.spec.width, self.spec.height);
        let rgb = image
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8();
        let (w, h) = (width as usize, height as usize);
        let mean = self.spec.mean;
        let std = self.spec.std;
        let normalize = |x: usize, y: usize, c: usize| {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            (pixel[c] as f32 / 255.0 - mean[c]) / std[c]
        };

        let data = match self.spec.layout {
            TensorLayout::Nchw => {
                Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| normalize(x, y, c))
            }
            TensorLayout::Nhwc => {
                Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| normalize(x, y, c))
            }
        };

        Ok(ImageTensor {
            data,
            layout: self.spec.layout,
        })
    }

    /// Expected tensor shape for this preprocessor.
    pub fn output_shape(&self) -> [usize; 4] {
        let (w, h) = (self.spec.width as usize, self.spec.height as usize);
        match self.spec.layout {
            TensorLayout::Nchw => [1, 3, h, w],
            TensorLayout::Nhwc => [1, h, w, 3],
        }
    }
}

/// Decode an image file, detecting the format from its contents.
pub fn load_image(path: &Path) -> Result<DynamicImage, PreprocessError> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|source| PreprocessError::Decode {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(source),
        })?;
    reader.decode().map_err(|source| PreprocessError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Softmax function for converting logits to probabilities.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_val = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Vec<f32> = logits.iter().map(|x| (x - max_val).exp()).collect();
    let sum: f32 = exp_vals.iter().sum();
    exp_vals.iter().map(|x| x / sum).collect()
}

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("failed to decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image has no pixels")]
    EmptyImage,
    #[error("invalid input spec: {0}")]
    InvalidSpec(String),
}

/// Errors that can occur during classification.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error("failed to load model {}: {source}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error("inference failed: {0}")]
    Inference(#[source] EngineError),
    #[error("input tensor shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: Vec<i64>,
        actual: Vec<usize>,
    },
    #[error(transparent)]
    Decision(#[from] DecisionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    const TOLERANCE: f32 = 1e-5;

    fn expected(value: u8, c: usize) -> f32 {
        (value as f32 / 255.0 - IMAGE_NET_MEAN[c]) / IMAGE_NET_STD[c]
    }

    #[test]
    fn solid_color_normalizes_every_position() {
        let color = [200u8, 100, 30];
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 400, Rgb(color)));
        let tensor = Preprocessor::default().to_tensor(&image).unwrap();

        assert_eq!(tensor.shape(), [1, 3, 400, 400]);
        let view = tensor.view();
        for c in 0..3 {
            let want = expected(color[c], c);
            for y in 0..400 {
                for x in 0..400 {
                    let got = view[[0, c, y, x]];
                    assert!((got - want).abs() < TOLERANCE, "c={} y={} x={}", c, y, x);
                }
            }
        }
    }

    #[test]
    fn resizes_to_target_ignoring_aspect_ratio() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 120, Rgb([10, 20, 30])));
        let tensor = Preprocessor::default().to_tensor(&image).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 400, 400]);
        let value = tensor.get(1, 399, 0).unwrap();
        assert!((value - expected(20, 1)).abs() < TOLERANCE);
    }

    #[test]
    fn nhwc_layout_puts_channels_last() {
        let spec = ModelInputSpec {
            width: 8,
            height: 4,
            layout: TensorLayout::Nhwc,
            ..ModelInputSpec::default()
        };
        let preprocessor = Preprocessor::new(spec).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([0, 128, 255])));
        let tensor = preprocessor.to_tensor(&image).unwrap();

        assert_eq!(tensor.shape(), [1, 4, 8, 3]);
        assert_eq!(tensor.shape(), preprocessor.output_shape());
        assert!((tensor.view()[[0, 2, 5, 2]] - expected(255, 2)).abs() < TOLERANCE);
        assert_eq!(tensor.get(2, 2, 5), Some(tensor.view()[[0, 2, 5, 2]]));
    }

    #[test]
    fn empty_image_fails_fast() {
        let image = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(
            Preprocessor::default().to_tensor(&image),
            Err(PreprocessError::EmptyImage)
        ));
    }

    #[test]
    fn rejects_invalid_spec() {
        let spec = ModelInputSpec {
            width: 0,
            ..ModelInputSpec::default()
        };
        assert!(matches!(
            Preprocessor::new(spec),
            Err(PreprocessError::InvalidSpec(_))
        ));
    }

    #[test]
    fn load_image_detects_format_without_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1697712345678");
        RgbImage::from_pixel(5, 7, Rgb([1, 2, 3]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let decoded = load_image(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 7));
    }

    #[test]
    fn load_image_reports_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(
            load_image(&path),
            Err(PreprocessError::Decode { .. })
        ));
    }

    #[test]
    fn softmax_sums_to_one() {
        let probabilities = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probabilities[2] > probabilities[1]);
    }
}
