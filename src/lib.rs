//! Dependency arc scoring.
//!
//! Arcs are described by seven symbolic features. Two of them (head and
//! dependent word) come from pretrained word vectors; the other five are
//! looked up in trainable embedding tables. The concatenated vector is scored
//! by a small dense network whose parameters are loaded from a flat
//! coefficient blob.

pub mod config;
pub mod data;
pub mod embeddings;
pub mod error;
pub mod features;
pub mod math;
pub mod model;
pub mod network;
pub mod rng;
pub mod training;
pub mod word_vectors;

pub use config::{Config, ModelPaths, NetworkConfig, TrainingConfig};
pub use data::{DependencyDataset, Lexicons};
pub use embeddings::{EmbeddingLookup, FrozenEmbeddings, TrainableEmbeddings};
pub use error::{DepnnError, Result};
pub use features::{DependencyRecord, Feature, FeatureTables, FeatureVectorBuilder};
pub use model::DependencyModel;
pub use network::{BlobLayout, Network, SoftmaxMode};
pub use training::{Trainer, TrainingSession};
pub use word_vectors::{WordVectorSource, WordVectors};
