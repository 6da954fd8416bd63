//! Symbol embedding tables.
//!
//! Two flavours share the [`EmbeddingLookup`] interface: a
//! [`TrainableEmbeddings`] table that is created from a lexicon and mutated by
//! the training update rule, and a read-only [`FrozenEmbeddings`] table loaded
//! from disk for serving. Looking up a symbol that is not in the table yields
//! a zero vector rather than an error.
//!
//! On disk a table is plain text, one symbol per line followed by its
//! components: `SYMBOL v1 v2 ... vD`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::{info, warn};
use rand::Rng;

use crate::error::{DepnnError, Result};

/// Read access shared by trainable and frozen tables.
pub trait EmbeddingLookup {
    /// Dimension of every vector in the table.
    fn dim(&self) -> usize;

    /// Stored vector for `symbol`, if any.
    fn get(&self, symbol: &str) -> Option<&[f32]>;

    /// Stored vector for `symbol`, or `dim` zeros when absent.
    fn lookup(&self, symbol: &str) -> Vec<f32> {
        match self.get(symbol) {
            Some(v) => v.to_vec(),
            None => vec![0.0; self.dim()],
        }
    }

    /// Append the vector for `symbol` (or zeros) to `out`.
    fn lookup_into(&self, symbol: &str, out: &mut Vec<f32>) {
        match self.get(symbol) {
            Some(v) => out.extend_from_slice(v),
            None => out.resize(out.len() + self.dim(), 0.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Table {
    dim: usize,
    // ordered so that serialisation is deterministic
    vectors: BTreeMap<String, Vec<f32>>,
}

impl Table {
    fn empty(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(DepnnError::config("embedding dimension must be positive"));
        }
        Ok(Table {
            dim,
            vectors: BTreeMap::new(),
        })
    }

    fn parse<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut dim = None;
        let mut vectors = BTreeMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let lineno = idx + 1;
            let line = line.map_err(|e| DepnnError::line_read(e, path, lineno))?;
            let mut fields = line.split_whitespace();
            let Some(symbol) = fields.next() else {
                continue;
            };
            let vector = fields
                .map(|f| {
                    f.parse::<f32>().map_err(|e| {
                        DepnnError::parse(path, lineno, format!("bad component {f:?}: {e}"))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            if vector.is_empty() {
                return Err(DepnnError::parse(
                    path,
                    lineno,
                    format!("symbol {symbol:?} has no components"),
                ));
            }
            match dim {
                None => dim = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(DepnnError::parse(
                        path,
                        lineno,
                        format!("expected {d} components, found {}", vector.len()),
                    ));
                }
                Some(_) => {}
            }
            if vectors.insert(symbol.to_string(), vector).is_some() {
                warn!("{}:{lineno}: duplicate symbol {symbol:?}, keeping last", path.display());
            }
        }
        let dim = dim.ok_or_else(|| {
            DepnnError::format(format!("{}: no embeddings found", path.display()))
        })?;
        Ok(Table { dim, vectors })
    }

    // an empty file could not be read back, it carries no dimension
    fn check_writable(&self) -> Result<()> {
        if self.vectors.is_empty() {
            return Err(DepnnError::config(
                "refusing to write an embedding table with no symbols",
            ));
        }
        Ok(())
    }

    fn write<W: Write>(&self, mut out: W) -> Result<()> {
        self.check_writable()?;
        for (symbol, vector) in &self.vectors {
            if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
                return Err(DepnnError::format(format!(
                    "symbol {symbol:?} cannot be written to an embedding file"
                )));
            }
            write!(out, "{symbol}")?;
            for v in vector {
                write!(out, " {v}")?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.check_writable()?;
        let file = File::create(path)?;
        self.write(BufWriter::new(file))?;
        info!(
            "Saved {} embeddings (dim {}) to {}",
            self.vectors.len(),
            self.dim,
            path.display()
        );
        Ok(())
    }
}

/// Growable embedding table used while training.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainableEmbeddings {
    table: Table,
}

impl TrainableEmbeddings {
    /// Empty table of dimension `dim`.
    pub fn new(dim: usize) -> Result<Self> {
        Ok(Self {
            table: Table::empty(dim)?,
        })
    }

    /// One random vector per lexicon symbol, each component drawn uniformly
    /// from `[-range, range]`.
    pub fn from_lexicon<I, S, R>(lexicon: I, dim: usize, range: f32, rng: &mut R) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        if !range.is_finite() || range < 0.0 {
            return Err(DepnnError::config(format!(
                "embedding init range must be finite and non-negative, got {range}"
            )));
        }
        let mut table = Table::empty(dim)?;
        for symbol in lexicon {
            let vector = (0..dim).map(|_| rng.gen_range(-range..=range)).collect();
            table.vectors.insert(symbol.as_ref().to_string(), vector);
        }
        Ok(Self { table })
    }

    /// Insert or replace the vector for `symbol`.
    pub fn insert(&mut self, symbol: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.table.dim {
            return Err(DepnnError::config(format!(
                "vector has {} components, table dimension is {}",
                vector.len(),
                self.table.dim
            )));
        }
        self.table.vectors.insert(symbol.into(), vector);
        Ok(())
    }

    /// Subtract `learning_rate * errors` from the vector of `symbol`.
    ///
    /// A symbol without an entry is left alone and no entry is created:
    /// symbols that were not in the lexicon never get a trained vector and
    /// keep resolving to zeros. Returns whether an entry was updated.
    pub fn accumulate(&mut self, symbol: &str, errors: &[f32], learning_rate: f32) -> Result<bool> {
        if errors.len() != self.table.dim {
            return Err(DepnnError::config(format!(
                "error slice has {} components, table dimension is {}",
                errors.len(),
                self.table.dim
            )));
        }
        let Some(vector) = self.table.vectors.get_mut(symbol) else {
            return Ok(false);
        };
        for (v, e) in vector.iter_mut().zip(errors) {
            *v -= learning_rate * e;
        }
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.table.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.vectors.is_empty()
    }

    /// Symbols in serialisation order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.table.vectors.keys().map(String::as_str)
    }

    /// Write the table in the text format read by [`FrozenEmbeddings::from_file`].
    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.table.save(path.as_ref())
    }

    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        self.table.write(out)
    }

    /// Stop training and make the table read-only.
    pub fn freeze(self) -> FrozenEmbeddings {
        FrozenEmbeddings { table: self.table }
    }
}

impl EmbeddingLookup for TrainableEmbeddings {
    fn dim(&self) -> usize {
        self.table.dim
    }

    fn get(&self, symbol: &str) -> Option<&[f32]> {
        self.table.vectors.get(symbol).map(Vec::as_slice)
    }
}

/// Read-only embedding table loaded from a persisted file.
#[derive(Clone, Debug, PartialEq)]
pub struct FrozenEmbeddings {
    table: Table,
}

impl FrozenEmbeddings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = Table::parse(BufReader::new(file), path)?;
        info!(
            "Loaded {} embeddings (dim {}) from {}",
            table.vectors.len(),
            table.dim,
            path.display()
        );
        Ok(Self { table })
    }

    /// Parse a table from any reader; `origin` is only used in error messages.
    pub fn from_reader<R: BufRead>(reader: R, origin: &Path) -> Result<Self> {
        Ok(Self {
            table: Table::parse(reader, origin)?,
        })
    }

    pub fn len(&self) -> usize {
        self.table.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.vectors.is_empty()
    }

    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.table.save(path.as_ref())
    }

    /// Reopen the table for further training.
    pub fn into_trainable(self) -> TrainableEmbeddings {
        TrainableEmbeddings { table: self.table }
    }
}

impl EmbeddingLookup for FrozenEmbeddings {
    fn dim(&self) -> usize {
        self.table.dim
    }

    fn get(&self, symbol: &str) -> Option<&[f32]> {
        self.table.vectors.get(symbol).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn lexicon_vectors_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = TrainableEmbeddings::from_lexicon(["NP", "S", "PP"], 5, 0.25, &mut rng).unwrap();
        assert_eq!(t.len(), 3);
        for s in ["NP", "S", "PP"] {
            let v = t.lookup(s);
            assert_eq!(v.len(), 5);
            assert!(v.iter().all(|x| (-0.25..=0.25).contains(x)));
        }
        assert_ne!(t.lookup("NP"), t.lookup("S"));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            TrainableEmbeddings::from_lexicon(["NP"], 0, 0.1, &mut rng),
            Err(DepnnError::Config(_))
        ));
        assert!(TrainableEmbeddings::from_lexicon(["NP"], 2, f32::NAN, &mut rng).is_err());
    }

    #[test]
    fn parse_rejects_ragged_rows() {
        let text = "a 1 2\nb 1 2 3\n";
        let err = FrozenEmbeddings::from_reader(text.as_bytes(), Path::new("t.emb")).unwrap_err();
        match err {
            DepnnError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_bad_numbers_and_empty_input() {
        assert!(FrozenEmbeddings::from_reader("a 1 x\n".as_bytes(), Path::new("t")).is_err());
        assert!(FrozenEmbeddings::from_reader("a\n".as_bytes(), Path::new("t")).is_err());
        let err = FrozenEmbeddings::from_reader("\n\n".as_bytes(), Path::new("t")).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn undecodable_line_is_a_parse_error() {
        let err = FrozenEmbeddings::from_reader(&b"NP 1 2\nN\xffP 1 2\n"[..], Path::new("t.emb"))
            .unwrap_err();
        assert!(err.is_format());
        match err {
            DepnnError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_table_is_not_written() {
        let t = TrainableEmbeddings::new(3).unwrap();
        let mut buf = Vec::new();
        assert!(matches!(t.write_to(&mut buf), Err(DepnnError::Config(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn write_is_sorted_by_symbol() {
        let mut t = TrainableEmbeddings::new(1).unwrap();
        t.insert("b", vec![2.0]).unwrap();
        t.insert("a", vec![1.5]).unwrap();
        let mut buf = Vec::new();
        t.write_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a 1.5\nb 2\n");
    }
}
