// Product-photo embeddings - CLIP vision tower via Candle
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::{api::sync::Api, Repo, RepoType};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;

/// Default image model; 512-dimensional projection
pub const DEFAULT_IMAGE_MODEL: &str = "openai/clip-vit-base-patch32";

// OpenAI CLIP preprocessing constants
const PIXEL_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const PIXEL_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// CLIP image encoder; only the vision tower and its projection are used
pub struct ImageEmbeddingEngine {
    model: Arc<ClipModel>,
    device: Device,
    image_size: usize,
}

impl ImageEmbeddingEngine {
    /// Create new engine (downloads weights on first use)
    pub fn new(model_id: &str, revision: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));
        let weights_path = repo.get("model.safetensors")
            .context("Failed to download image model weights")?;

        let config = ClipConfig::vit_base_patch32();
        let image_size = config.image_size;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .context("Failed to load image model weights")?
        };
        let model = ClipModel::new(vb, &config)
            .context("Failed to create CLIP model")?;

        tracing::info!(model = model_id, image_size, "loaded image embedding model");

        Ok(Self {
            model: Arc::new(model),
            device,
            image_size,
        })
    }

    /// Unit-length embedding of the image file at `path`
    pub fn embed(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::ImageReader::open(path)
            .with_context(|| format!("Failed to open image {}", path.display()))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("Failed to decode image {}", path.display()))?;

        let pixels = Self::preprocess(&img, self.image_size, &self.device)?;
        let features = self.model.get_image_features(&pixels)?;
        let normalized = Self::l2_normalize(&features)?;

        normalized
            .to_vec2::<f32>()?
            .pop()
            .context("Model returned no image embedding")
    }

    /// Square resize, scale to [0, 1], then per-channel CLIP normalisation.
    /// Output shape is `(1, 3, size, size)`.
    fn preprocess(img: &DynamicImage, size: usize, device: &Device) -> Result<Tensor> {
        let rgb = img
            .resize_to_fill(size as u32, size as u32, FilterType::Triangle)
            .to_rgb8()
            .into_raw();

        let mean = Tensor::new(PIXEL_MEAN.as_slice(), device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(PIXEL_STD.as_slice(), device)?.reshape((3, 1, 1))?;

        let pixels = Tensor::from_vec(rgb, (size, size, 3), device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?;
        Ok(pixels.unsqueeze(0)?)
    }

    fn l2_normalize(embeddings: &Tensor) -> Result<Tensor> {
        let norm = embeddings
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        Ok(embeddings.broadcast_div(&norm)?)
    }
}
