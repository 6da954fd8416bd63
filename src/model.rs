use log::info;

use crate::config::{ModelPaths, NetworkConfig};
use crate::embeddings::{EmbeddingLookup, FrozenEmbeddings};
use crate::error::{DepnnError, Result};
use crate::features::{
    DependencyRecord, Feature, FeatureTables, FeatureVectorBuilder, NUM_PROPERTIES,
};
use crate::math::{argmax, Matrix};
use crate::network::Network;
use crate::word_vectors::{WordVectorSource, WordVectors};

/// A loaded model ready to score arcs.
///
/// Owns the network, the four frozen embedding tables and the word vectors.
/// Several bundles can live side by side in one process.
pub struct DependencyModel<W = WordVectors> {
    network: Network,
    tables: FeatureTables<FrozenEmbeddings>,
    words: W,
    dim: usize,
}

impl DependencyModel<WordVectors> {
    /// Load every file of the bundle; nothing is served unless all of them
    /// parse and agree on dimensions.
    pub fn load(paths: &ModelPaths, config: &NetworkConfig) -> Result<Self> {
        let words = WordVectors::from_file(&paths.word_vectors)?;
        let tables = FeatureTables {
            category: FrozenEmbeddings::from_file(&paths.category)?,
            slot: FrozenEmbeddings::from_file(&paths.slot)?,
            distance: FrozenEmbeddings::from_file(&paths.distance)?,
            pos: FrozenEmbeddings::from_file(&paths.pos)?,
        };
        if tables.dim()? != config.embedding_dim {
            return Err(DepnnError::config(format!(
                "embedding files have dimension {}, configuration says {}",
                tables.dim()?,
                config.embedding_dim
            )));
        }
        let network =
            Network::from_file(&paths.coefficients, config.layout()?)?.with_softmax(config.softmax);
        let model = Self::from_parts(network, tables, words)?;
        info!("Model ready (dim {}, hidden {})", model.dim, config.hidden_size);
        Ok(model)
    }
}

impl<W: WordVectorSource> DependencyModel<W> {
    pub fn from_parts(
        network: Network,
        tables: FeatureTables<FrozenEmbeddings>,
        words: W,
    ) -> Result<Self> {
        let dim = FeatureVectorBuilder::new(&words, &tables)?.dim();
        let input = network.layout().input;
        if input != NUM_PROPERTIES * dim {
            return Err(DepnnError::config(format!(
                "network takes {input} inputs, features produce {}",
                NUM_PROPERTIES * dim
            )));
        }
        Ok(Self {
            network,
            tables,
            words,
            dim,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn tables(&self) -> &FeatureTables<FrozenEmbeddings> {
        &self.tables
    }

    pub fn words(&self) -> &W {
        &self.words
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn builder(&self) -> FeatureVectorBuilder<'_, W, FrozenEmbeddings> {
        FeatureVectorBuilder::validated(&self.words, &self.tables, self.dim)
    }

    /// Network input rows for `records`.
    pub fn vectorize(&self, records: &[DependencyRecord]) -> Matrix {
        self.builder().batch(records)
    }

    /// Class probabilities, one row per record.
    pub fn score_batch(&self, records: &[DependencyRecord]) -> Result<Matrix> {
        self.network.forward(&self.vectorize(records))
    }

    pub fn probabilities(&self, record: &DependencyRecord) -> Result<Vec<f32>> {
        let input = Matrix::row_vector(self.builder().vector(record));
        Ok(self.network.forward(&input)?.data)
    }

    pub fn predict(&self, record: &DependencyRecord) -> Result<usize> {
        Ok(argmax(&self.probabilities(record)?))
    }

    pub fn predict_batch(&self, records: &[DependencyRecord]) -> Result<Vec<usize>> {
        Ok(self.score_batch(records)?.argmax_rows())
    }

    /// Hidden pre-activation contribution of one symbol in one block, for
    /// callers caching `input * W_h` across records.
    pub fn precompute(&self, slot: usize, symbol: &str) -> Result<Vec<f32>> {
        let feature = Feature::ALL
            .get(slot)
            .copied()
            .ok_or_else(|| DepnnError::config(format!("no feature block {slot}")))?;
        let vector = match self.tables.table(feature) {
            Some(table) => table.lookup(symbol),
            None => self.words.lookup(symbol),
        };
        self.network.precompute_slot(slot, &vector)
    }
}
