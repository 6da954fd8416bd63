//! Feature records and the fixed concatenation layout of the network input.
//!
//! The input row for one arc is seven `D`-wide blocks in this order:
//!
//! | slot | block            | source                |
//! |------|------------------|-----------------------|
//! | 0    | head word        | word vectors          |
//! | 1    | category         | category embeddings   |
//! | 2    | slot             | slot embeddings       |
//! | 3    | dependent word   | word vectors          |
//! | 4    | distance bucket  | distance embeddings   |
//! | 5    | head POS         | POS embeddings        |
//! | 6    | dependent POS    | POS embeddings        |
//!
//! The inference engine's input width and the training update offsets both
//! depend on this order.

use std::fmt;
use std::str::FromStr;

use crate::embeddings::{EmbeddingLookup, FrozenEmbeddings, TrainableEmbeddings};
use crate::error::{DepnnError, Result};
use crate::math::Matrix;
use crate::word_vectors::WordVectorSource;

/// Number of blocks in one input row.
pub const NUM_PROPERTIES: usize = 7;

/// One block of the input row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Head,
    Category,
    Slot,
    Dependent,
    Distance,
    HeadPos,
    DependentPos,
}

impl Feature {
    pub const ALL: [Feature; NUM_PROPERTIES] = [
        Feature::Head,
        Feature::Category,
        Feature::Slot,
        Feature::Dependent,
        Feature::Distance,
        Feature::HeadPos,
        Feature::DependentPos,
    ];

    /// Blocks backed by embedding tables, i.e. the targets of training
    /// updates. The two word blocks are fixed.
    pub const TRAINABLE: [Feature; 5] = [
        Feature::Category,
        Feature::Slot,
        Feature::Distance,
        Feature::HeadPos,
        Feature::DependentPos,
    ];

    /// Position of the block in the input row.
    pub fn index(self) -> usize {
        match self {
            Feature::Head => 0,
            Feature::Category => 1,
            Feature::Slot => 2,
            Feature::Dependent => 3,
            Feature::Distance => 4,
            Feature::HeadPos => 5,
            Feature::DependentPos => 6,
        }
    }

    /// Column range of the block for vectors of width `dim`.
    pub fn columns(self, dim: usize) -> std::ops::Range<usize> {
        let start = self.index() * dim;
        start..start + dim
    }

    pub fn is_trainable(self) -> bool {
        !matches!(self, Feature::Head | Feature::Dependent)
    }
}

/// One candidate dependency arc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyRecord {
    pub head: String,
    pub category: String,
    pub slot: String,
    pub dependent: String,
    pub distance: String,
    pub head_pos: String,
    pub dependent_pos: String,
    /// Gold class for training data (0 or 1).
    pub label: Option<usize>,
}

impl DependencyRecord {
    pub fn new(fields: [&str; NUM_PROPERTIES]) -> Self {
        let [head, category, slot, dependent, distance, head_pos, dependent_pos] = fields;
        Self {
            head: head.to_string(),
            category: category.to_string(),
            slot: slot.to_string(),
            dependent: dependent.to_string(),
            distance: distance.to_string(),
            head_pos: head_pos.to_string(),
            dependent_pos: dependent_pos.to_string(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: usize) -> Self {
        self.label = Some(label);
        self
    }

    /// Symbol feeding block `feature`.
    pub fn field(&self, feature: Feature) -> &str {
        match feature {
            Feature::Head => &self.head,
            Feature::Category => &self.category,
            Feature::Slot => &self.slot,
            Feature::Dependent => &self.dependent,
            Feature::Distance => &self.distance,
            Feature::HeadPos => &self.head_pos,
            Feature::DependentPos => &self.dependent_pos,
        }
    }
}

impl FromStr for DependencyRecord {
    type Err = DepnnError;

    /// Seven whitespace-separated fields, optionally followed by a `0`/`1`
    /// label.
    fn from_str(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != NUM_PROPERTIES && fields.len() != NUM_PROPERTIES + 1 {
            return Err(DepnnError::format(format!(
                "expected {} or {} fields, found {}",
                NUM_PROPERTIES,
                NUM_PROPERTIES + 1,
                fields.len()
            )));
        }
        let mut fixed = [""; NUM_PROPERTIES];
        fixed.copy_from_slice(&fields[..NUM_PROPERTIES]);
        let record = DependencyRecord::new(fixed);
        match fields.get(NUM_PROPERTIES) {
            None => Ok(record),
            Some(&"0") => Ok(record.with_label(0)),
            Some(&"1") => Ok(record.with_label(1)),
            Some(other) => Err(DepnnError::format(format!("bad label {other:?}"))),
        }
    }
}

impl fmt::Display for DependencyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = Feature::ALL.iter().map(|&ft| self.field(ft)).collect();
        write!(f, "{}", fields.join(" "))?;
        if let Some(label) = self.label {
            write!(f, " {label}")?;
        }
        Ok(())
    }
}

/// The four symbol tables; `pos` serves both POS blocks.
#[derive(Clone, Debug)]
pub struct FeatureTables<E> {
    pub category: E,
    pub slot: E,
    pub distance: E,
    pub pos: E,
}

impl<E: EmbeddingLookup> FeatureTables<E> {
    /// Shared dimension of the four tables.
    pub fn dim(&self) -> Result<usize> {
        let d = self.category.dim();
        for (name, t) in [("slot", &self.slot), ("distance", &self.distance), ("pos", &self.pos)] {
            if t.dim() != d {
                return Err(DepnnError::config(format!(
                    "{name} embeddings have dimension {}, category embeddings {d}",
                    t.dim()
                )));
            }
        }
        Ok(d)
    }

    /// Table backing `feature`, `None` for the word blocks.
    pub fn table(&self, feature: Feature) -> Option<&E> {
        match feature {
            Feature::Head | Feature::Dependent => None,
            Feature::Category => Some(&self.category),
            Feature::Slot => Some(&self.slot),
            Feature::Distance => Some(&self.distance),
            Feature::HeadPos | Feature::DependentPos => Some(&self.pos),
        }
    }
}

impl FeatureTables<TrainableEmbeddings> {
    pub fn table_mut(&mut self, feature: Feature) -> Option<&mut TrainableEmbeddings> {
        match feature {
            Feature::Head | Feature::Dependent => None,
            Feature::Category => Some(&mut self.category),
            Feature::Slot => Some(&mut self.slot),
            Feature::Distance => Some(&mut self.distance),
            Feature::HeadPos | Feature::DependentPos => Some(&mut self.pos),
        }
    }

    /// Make all four tables read-only.
    pub fn freeze(self) -> FeatureTables<FrozenEmbeddings> {
        FeatureTables {
            category: self.category.freeze(),
            slot: self.slot.freeze(),
            distance: self.distance.freeze(),
            pos: self.pos.freeze(),
        }
    }

    /// Total number of symbols across the tables.
    pub fn symbol_count(&self) -> usize {
        self.category.len() + self.slot.len() + self.distance.len() + self.pos.len()
    }
}

/// Concatenates word vectors and embeddings into network input rows.
pub struct FeatureVectorBuilder<'a, W: ?Sized, E> {
    words: &'a W,
    tables: &'a FeatureTables<E>,
    dim: usize,
}

impl<'a, W, E> FeatureVectorBuilder<'a, W, E>
where
    W: WordVectorSource + ?Sized,
    E: EmbeddingLookup,
{
    /// Fails when the word vectors and the tables disagree on dimension.
    pub fn new(words: &'a W, tables: &'a FeatureTables<E>) -> Result<Self> {
        let dim = tables.dim()?;
        if words.dim() != dim {
            return Err(DepnnError::config(format!(
                "word vectors have dimension {}, embeddings {dim}",
                words.dim()
            )));
        }
        Ok(Self { words, tables, dim })
    }

    pub(crate) fn validated(words: &'a W, tables: &'a FeatureTables<E>, dim: usize) -> Self {
        Self { words, tables, dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Width of one input row, `7 * D`.
    pub fn input_size(&self) -> usize {
        NUM_PROPERTIES * self.dim
    }

    pub fn vector(&self, record: &DependencyRecord) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.input_size());
        self.append(record, &mut out);
        out
    }

    /// One row per record, in record order.
    pub fn batch(&self, records: &[DependencyRecord]) -> Matrix {
        let mut data = Vec::with_capacity(records.len() * self.input_size());
        for record in records {
            self.append(record, &mut data);
        }
        Matrix::from_vec(records.len(), self.input_size(), data)
    }

    fn append(&self, record: &DependencyRecord, out: &mut Vec<f32>) {
        for feature in Feature::ALL {
            let symbol = record.field(feature);
            match self.tables.table(feature) {
                Some(table) => table.lookup_into(symbol, out),
                None => self.words.lookup_into(symbol, out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labelled_and_unlabelled_lines() {
        let r: DependencyRecord = "saw (S\\NP)/NP 2 dog 1 VBD NN 1".parse().unwrap();
        assert_eq!(r.head, "saw");
        assert_eq!(r.category, "(S\\NP)/NP");
        assert_eq!(r.dependent_pos, "NN");
        assert_eq!(r.label, Some(1));

        let r: DependencyRecord = "saw NP 1 dog 1 VBD NN".parse().unwrap();
        assert_eq!(r.label, None);
        assert_eq!(r.to_string(), "saw NP 1 dog 1 VBD NN");
    }

    #[test]
    fn rejects_wrong_arity_and_labels() {
        assert!("a b c".parse::<DependencyRecord>().is_err());
        assert!("a b c d e f g 2".parse::<DependencyRecord>().is_err());
        assert!("a b c d e f g 1 extra".parse::<DependencyRecord>().is_err());
    }

    #[test]
    fn trainable_columns_follow_layout() {
        let offsets: Vec<usize> = Feature::TRAINABLE.iter().map(|f| f.index()).collect();
        assert_eq!(offsets, vec![1, 2, 4, 5, 6]);
        assert_eq!(Feature::Category.columns(2), 2..4);
        assert!(!Feature::Head.is_trainable());
        assert!(Feature::DependentPos.is_trainable());
    }
}
