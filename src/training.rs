//! Embedding updates driven by an external trainer.
//!
//! The dense network itself is trained elsewhere: a [`Trainer`] takes one
//! batch of input rows, performs its own forward/backward/optimiser step and
//! hands back the gradient of the loss with respect to every input row. This
//! module slices those rows per feature block and subtracts each slice from
//! the embedding of the symbol that produced it.

use log::{debug, info};
use rand::Rng;

use crate::config::{ModelPaths, TrainingConfig};
use crate::data::{DependencyDataset, Lexicons};
use crate::embeddings::TrainableEmbeddings;
use crate::error::{DepnnError, Result};
use crate::features::{
    DependencyRecord, Feature, FeatureTables, FeatureVectorBuilder, NUM_PROPERTIES,
};
use crate::math::Matrix;
use crate::network::write_blob;
use crate::rng::rng_from_seed;
use crate::word_vectors::WordVectorSource;

/// Scale applied to error slices. Updates are raw subtractions, independent
/// of the trainer's own learning rate.
pub const EMBEDDING_LEARNING_RATE: f32 = 1.0;

/// External optimiser for the dense layers.
pub trait Trainer {
    /// Run one training step on `inputs` and return the loss gradient with
    /// respect to each input row, in row order.
    fn fit(&mut self, inputs: &Matrix, labels: &[usize]) -> Result<Matrix>;

    /// Current parameters in coefficient blob order.
    fn coefficients(&self) -> Vec<f32>;
}

/// Block `offset` of width `dim` within one error row.
pub fn error_slice(errors: &[f32], offset: usize, dim: usize) -> Result<&[f32]> {
    offset
        .checked_mul(dim)
        .and_then(|start| Some(start..start.checked_add(dim)?))
        .and_then(|range| errors.get(range))
        .ok_or_else(|| {
            DepnnError::config(format!(
                "block {offset} of width {dim} is outside an error row of {} values",
                errors.len()
            ))
        })
}

/// Fresh tables with one random vector per lexicon symbol.
///
/// Every lexicon must be non-empty, otherwise the saved table could not be
/// loaded back.
pub fn init_tables<R: Rng + ?Sized>(
    lexicons: &Lexicons,
    dim: usize,
    range: f32,
    rng: &mut R,
) -> Result<FeatureTables<TrainableEmbeddings>> {
    for (name, lexicon) in [
        ("category", &lexicons.category),
        ("slot", &lexicons.slot),
        ("distance", &lexicons.distance),
        ("pos", &lexicons.pos),
    ] {
        if lexicon.is_empty() {
            return Err(DepnnError::config(format!(
                "no {name} symbols found in the training data"
            )));
        }
    }
    Ok(FeatureTables {
        category: TrainableEmbeddings::from_lexicon(&lexicons.category, dim, range, rng)?,
        slot: TrainableEmbeddings::from_lexicon(&lexicons.slot, dim, range, rng)?,
        distance: TrainableEmbeddings::from_lexicon(&lexicons.distance, dim, range, rng)?,
        pos: TrainableEmbeddings::from_lexicon(&lexicons.pos, dim, range, rng)?,
    })
}

/// Apply one batch of error rows to the tables.
///
/// Rows are processed in order and every occurrence of a symbol gets its own
/// subtraction; nothing is averaged. Both POS blocks update the same table.
/// Returns the number of table entries touched, counting repeats.
pub fn apply_errors(
    tables: &mut FeatureTables<TrainableEmbeddings>,
    records: &[DependencyRecord],
    errors: &Matrix,
) -> Result<usize> {
    let dim = tables.dim()?;
    if errors.rows != records.len() || errors.cols != NUM_PROPERTIES * dim {
        return Err(DepnnError::config(format!(
            "error matrix is {}x{}, expected {}x{}",
            errors.rows,
            errors.cols,
            records.len(),
            NUM_PROPERTIES * dim
        )));
    }
    let mut updated = 0;
    for (row, record) in errors.rows_iter().zip(records) {
        for feature in Feature::TRAINABLE {
            let Some(table) = tables.table_mut(feature) else {
                continue;
            };
            let slice = error_slice(row, feature.index(), dim)?;
            if table.accumulate(record.field(feature), slice, EMBEDDING_LEARNING_RATE)? {
                updated += 1;
            }
        }
    }
    Ok(updated)
}

/// Totals reported by [`TrainingSession::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub batches: usize,
    pub records: usize,
    pub updates: usize,
}

/// Drives a [`Trainer`] over a dataset while keeping the embeddings in sync.
pub struct TrainingSession<T> {
    trainer: T,
    tables: FeatureTables<TrainableEmbeddings>,
    config: TrainingConfig,
}

impl<T: Trainer> TrainingSession<T> {
    /// Start from random embeddings for every symbol in `lexicons`.
    pub fn new(trainer: T, lexicons: &Lexicons, dim: usize, config: TrainingConfig) -> Result<Self> {
        let mut rng = rng_from_seed(config.seed);
        let tables = init_tables(lexicons, dim, config.embed_random_range, &mut rng)?;
        Ok(Self::with_tables(trainer, tables, config))
    }

    /// Continue training existing tables.
    pub fn with_tables(
        trainer: T,
        tables: FeatureTables<TrainableEmbeddings>,
        config: TrainingConfig,
    ) -> Self {
        Self {
            trainer,
            tables,
            config,
        }
    }

    pub fn tables(&self) -> &FeatureTables<TrainableEmbeddings> {
        &self.tables
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn into_parts(self) -> (T, FeatureTables<TrainableEmbeddings>) {
        (self.trainer, self.tables)
    }

    /// One trainer step on `records` followed by the embedding updates.
    ///
    /// Input rows are built from the current tables, so updates made by
    /// earlier batches are visible here.
    pub fn step<W>(&mut self, records: &[DependencyRecord], words: &W) -> Result<usize>
    where
        W: WordVectorSource + ?Sized,
    {
        let labels = records
            .iter()
            .map(|r| {
                r.label
                    .ok_or_else(|| DepnnError::format(format!("training record without label: {r}")))
            })
            .collect::<Result<Vec<usize>>>()?;
        let mut inputs = FeatureVectorBuilder::new(words, &self.tables)?.batch(records);
        if self.config.normalize_batches {
            inputs.normalize_columns();
        }
        let errors = self.trainer.fit(&inputs, &labels)?;
        apply_errors(&mut self.tables, records, &errors)
    }

    /// Train for the configured number of epochs.
    pub fn run<W>(&mut self, dataset: &DependencyDataset, words: &W) -> Result<TrainingSummary>
    where
        W: WordVectorSource + ?Sized,
    {
        let mut summary = TrainingSummary::default();
        for epoch in 0..self.config.epochs {
            let mut epoch_updates = 0;
            for (i, batch) in dataset.batches(self.config.batch_size).enumerate() {
                let batch = batch?;
                let updates = self.step(&batch, words)?;
                debug!("epoch {epoch} batch {i}: {} records, {updates} updates", batch.len());
                summary.batches += 1;
                summary.records += batch.len();
                epoch_updates += updates;
            }
            summary.updates += epoch_updates;
            summary.epochs += 1;
            info!("epoch {epoch} done: {epoch_updates} embedding updates");
        }
        Ok(summary)
    }

    /// Write the trainer's coefficients and the four embedding tables.
    /// Word vectors are trained and saved elsewhere.
    pub fn save(&self, paths: &ModelPaths) -> Result<()> {
        write_blob(&paths.coefficients, &self.trainer.coefficients())?;
        self.tables.category.serialize(&paths.category)?;
        self.tables.slot.serialize(&paths.slot)?;
        self.tables.distance.serialize(&paths.distance)?;
        self.tables.pos.serialize(&paths.pos)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingLookup;

    #[test]
    fn error_slice_picks_block() {
        let row = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(error_slice(&row, 1, 2).unwrap(), &[0.3, 0.4]);
        assert_eq!(error_slice(&row, 0, 2).unwrap(), &[0.1, 0.2]);
    }

    #[test]
    fn error_slice_outside_row_is_config_error() {
        let row = [0.1, 0.2, 0.3, 0.4];
        assert!(matches!(error_slice(&row, 2, 2), Err(DepnnError::Config(_))));
        assert!(error_slice(&row, usize::MAX, 2).is_err());
        assert!(error_slice(&row, 1, usize::MAX).is_err());
    }

    #[test]
    fn empty_lexicon_is_rejected() {
        let mut rng = rand::thread_rng();
        assert!(matches!(
            init_tables(&Lexicons::default(), 3, 0.1, &mut rng),
            Err(DepnnError::Config(_))
        ));
    }

    #[test]
    fn tables_share_dimension() {
        let mut lex = Lexicons::default();
        lex.observe(&DependencyRecord::new(["a", "NP", "1", "b", "2", "DT", "NN"]));
        let mut rng = rand::thread_rng();
        let tables = init_tables(&lex, 3, 0.1, &mut rng).unwrap();
        assert_eq!(tables.dim().unwrap(), 3);
        assert_eq!(tables.pos.len(), 2);
        assert_eq!(tables.symbol_count(), 5);
        assert_eq!(tables.category.lookup("NP").len(), 3);
    }
}
