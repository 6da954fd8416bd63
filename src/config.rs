use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DepnnError, Result};
use crate::features::NUM_PROPERTIES;
use crate::network::{BlobLayout, SoftmaxMode};

/// Settings loaded from a TOML or JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    /// Persisted bundle, required for serving.
    #[serde(default)]
    pub model: Option<ModelPaths>,
}

/// Shape of the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Width `D` shared by word vectors and symbol embeddings.
    pub embedding_dim: usize,
    pub hidden_size: usize,
    #[serde(default = "default_output_size")]
    pub output_size: usize,
    #[serde(default)]
    pub softmax: SoftmaxMode,
}

fn default_output_size() -> usize {
    2
}

impl NetworkConfig {
    /// Network layout for `7 * D` inputs.
    pub fn layout(&self) -> Result<BlobLayout> {
        BlobLayout::new(
            NUM_PROPERTIES * self.embedding_dim,
            self.hidden_size,
            self.output_size,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Records per trainer step; 0 feeds a whole pass as one batch.
    pub batch_size: usize,
    pub epochs: usize,
    /// Half-width of the uniform range used to initialise embeddings.
    pub embed_random_range: f32,
    /// Normalise each batch column to zero mean and unit variance before the
    /// trainer sees it.
    pub normalize_batches: bool,
    /// Falls back to the `SEED` environment variable when unset.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            epochs: 1,
            embed_random_range: 0.01,
            normalize_batches: true,
            seed: None,
        }
    }
}

/// Files making up a persisted model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPaths {
    pub coefficients: PathBuf,
    pub category: PathBuf,
    pub slot: PathBuf,
    pub distance: PathBuf,
    pub pos: PathBuf,
    pub word_vectors: PathBuf,
}

impl ModelPaths {
    /// Conventional file names inside `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            coefficients: dir.join("coefficients.bin"),
            category: dir.join("category.emb"),
            slot: dir.join("slot.emb"),
            distance: dir.join("distance.emb"),
            pos: dir.join("pos.emb"),
            word_vectors: dir.join("word_vectors.txt"),
        }
    }

    /// Resolve relative paths against `base`.
    pub fn relative_to(&self, base: &Path) -> Self {
        let join = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        Self {
            coefficients: join(&self.coefficients),
            category: join(&self.category),
            slot: join(&self.slot),
            distance: join(&self.distance),
            pos: join(&self.pos),
            word_vectors: join(&self.word_vectors),
        }
    }
}

impl Config {
    /// Load configuration from the given path. Supports TOML or JSON based on
    /// the file extension. Relative model paths are resolved against the
    /// directory holding the file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config: Config = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .map_err(|e| DepnnError::format(format!("{}: {e}", path.display())))?
        } else {
            toml::from_str(&content)
                .map_err(|e| DepnnError::format(format!("{}: {e}", path.display())))?
        };
        if let (Some(model), Some(base)) = (config.model.as_ref(), path.parent()) {
            config.model = Some(model.relative_to(base));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.embedding_dim == 0 {
            return Err(DepnnError::config("network.embedding_dim must be positive"));
        }
        self.network.layout()?;
        let range = self.training.embed_random_range;
        if !range.is_finite() || range < 0.0 {
            return Err(DepnnError::config(format!(
                "training.embed_random_range must be finite and non-negative, got {range}"
            )));
        }
        Ok(())
    }

    /// The bundle paths, or a config error when the file has none.
    pub fn model_paths(&self) -> Result<&ModelPaths> {
        self.model
            .as_ref()
            .ok_or_else(|| DepnnError::config("no [model] section in configuration"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_defaults_fill_in() {
        let cfg: Config = toml::from_str(
            r#"
            [network]
            embedding_dim = 50
            hidden_size = 200
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.network.output_size, 2);
        assert_eq!(cfg.network.softmax, SoftmaxMode::Exact);
        assert_eq!(cfg.training, TrainingConfig::default());
        assert_eq!(cfg.network.layout().unwrap().input, 350);
        assert!(cfg.model_paths().is_err());
    }

    #[test]
    fn json_with_model_section() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "network": {"embedding_dim": 2, "hidden_size": 3, "softmax": "stabilized"},
                "training": {"batch_size": 0, "seed": 9},
                "model": {
                    "coefficients": "c.bin", "category": "cat.emb", "slot": "slot.emb",
                    "distance": "dist.emb", "pos": "pos.emb", "word_vectors": "w.txt"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.network.softmax, SoftmaxMode::Stabilized);
        assert_eq!(cfg.training.batch_size, 0);
        assert_eq!(cfg.training.epochs, 1);
        let paths = cfg.model_paths().unwrap().relative_to(Path::new("/models"));
        assert_eq!(paths.coefficients, PathBuf::from("/models/c.bin"));
    }

    #[test]
    fn rejects_zero_sizes() {
        let mut cfg: Config =
            toml::from_str("[network]\nembedding_dim = 0\nhidden_size = 4\n").unwrap();
        assert!(matches!(cfg.validate(), Err(DepnnError::Config(_))));
        cfg.network.embedding_dim = 4;
        cfg.network.hidden_size = 0;
        assert!(cfg.validate().is_err());
        cfg.network.hidden_size = 4;
        cfg.training.embed_random_range = -1.0;
        assert!(cfg.validate().is_err());
    }
}
