use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use crate::error::{DepnnError, Result};

/// Token used for out-of-vocabulary words when the vector file provides it.
pub const UNKNOWN_WORD: &str = "UNK";

/// Pretrained word vectors feeding the head and dependent slots.
///
/// Implementations must never fail: unknown words map to a default vector.
pub trait WordVectorSource {
    fn dim(&self) -> usize;

    fn lookup(&self, word: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim());
        self.lookup_into(word, &mut out);
        out
    }

    /// Append the vector for `word` to `out`.
    fn lookup_into(&self, word: &str, out: &mut Vec<f32>);
}

/// Word vectors read from a word2vec-style text file.
#[derive(Clone, Debug)]
pub struct WordVectors {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
    unknown: Vec<f32>,
}

impl WordVectors {
    /// Build from in-memory vectors; all must share `dim`.
    pub fn new(dim: usize, vectors: HashMap<String, Vec<f32>>) -> Result<Self> {
        if dim == 0 {
            return Err(DepnnError::config("word vector dimension must be positive"));
        }
        if let Some((w, v)) = vectors.iter().find(|(_, v)| v.len() != dim) {
            return Err(DepnnError::config(format!(
                "vector for {w:?} has {} components, expected {dim}",
                v.len()
            )));
        }
        let unknown = vectors
            .get(UNKNOWN_WORD)
            .cloned()
            .unwrap_or_else(|| vec![0.0; dim]);
        Ok(Self {
            dim,
            vectors,
            unknown,
        })
    }

    /// Load the text format: one `word v1 .. vD` entry per line, optionally
    /// preceded by a `COUNT DIM` header line.
    ///
    /// A first line of two integers is only taken as a header once the next
    /// entry has `DIM` components; otherwise it is a one-dimensional entry.
    /// A file holding nothing but such a line is a header only if `COUNT` is 0.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut dim: Option<usize> = None;
        let mut header: Option<PendingHeader> = None;
        let mut vectors = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let lineno = idx + 1;
            let line = line.map_err(|e| DepnnError::line_read(e, path, lineno))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if idx == 0 {
                if let Some(pending) = PendingHeader::from_fields(&fields) {
                    header = Some(pending);
                    continue;
                }
            }
            let vector = fields[1..]
                .iter()
                .map(|f| {
                    f.parse::<f32>().map_err(|e| {
                        DepnnError::parse(path, lineno, format!("bad component {f:?}: {e}"))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            if let Some(pending) = header.take() {
                if vector.len() == pending.dim {
                    dim = Some(pending.dim);
                } else {
                    let (word, v) = pending.into_entry();
                    dim = Some(1);
                    vectors.insert(word, v);
                }
            }
            let expected = *dim.get_or_insert(vector.len());
            if vector.len() != expected || expected == 0 {
                return Err(DepnnError::parse(
                    path,
                    lineno,
                    format!("expected {expected} components, found {}", vector.len()),
                ));
            }
            vectors.insert(fields[0].to_string(), vector);
        }
        if let Some(pending) = header {
            if pending.count == 0 && pending.dim > 0 {
                dim = Some(pending.dim);
            } else {
                let (word, v) = pending.into_entry();
                dim = Some(1);
                vectors.insert(word, v);
            }
        }
        let dim = dim.ok_or_else(|| {
            DepnnError::format(format!("{}: no word vectors found", path.display()))
        })?;
        info!(
            "Loaded {} word vectors (dim {dim}) from {}",
            vectors.len(),
            path.display()
        );
        Self::new(dim, vectors)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.vectors.contains_key(word)
    }
}

impl WordVectorSource for WordVectors {
    fn dim(&self) -> usize {
        self.dim
    }

    fn lookup_into(&self, word: &str, out: &mut Vec<f32>) {
        let v = self.vectors.get(word).unwrap_or(&self.unknown);
        out.extend_from_slice(v);
    }
}

/// First line that looks like `COUNT DIM` but may be an entry for a numeric
/// token.
struct PendingHeader {
    count: usize,
    dim: usize,
    word: String,
    value: f32,
}

impl PendingHeader {
    fn from_fields(fields: &[&str]) -> Option<Self> {
        match fields {
            [count, dim] => Some(Self {
                count: count.parse().ok()?,
                dim: dim.parse().ok()?,
                word: (*count).to_string(),
                value: dim.parse().ok()?,
            }),
            _ => None,
        }
    }

    fn into_entry(self) -> (String, Vec<f32>) {
        (self.word, vec![self.value])
    }
}
