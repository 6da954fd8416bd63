use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{DepnnError, Result};
use crate::features::DependencyRecord;

/// Distinct symbols seen per feature type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lexicons {
    pub category: BTreeSet<String>,
    pub slot: BTreeSet<String>,
    pub distance: BTreeSet<String>,
    /// Union of head and dependent POS tags.
    pub pos: BTreeSet<String>,
}

impl Lexicons {
    pub fn observe(&mut self, record: &DependencyRecord) {
        self.category.insert(record.category.clone());
        self.slot.insert(record.slot.clone());
        self.distance.insert(record.distance.clone());
        self.pos.insert(record.head_pos.clone());
        self.pos.insert(record.dependent_pos.clone());
    }
}

/// A directory of record files, one [`DependencyRecord`] per line.
///
/// Opening the dataset scans every file once to collect the lexicons. The
/// records themselves are not kept in memory; each call to
/// [`DependencyDataset::records`] or [`DependencyDataset::batches`] starts a
/// fresh pass that streams the files in sorted order.
#[derive(Clone, Debug)]
pub struct DependencyDataset {
    files: Vec<PathBuf>,
    lexicons: Lexicons,
    len: usize,
}

impl DependencyDataset {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        let dataset = Self::from_files(files)?;
        info!(
            "Scanned {} records in {} files under {}",
            dataset.len,
            dataset.files.len(),
            dir.display()
        );
        Ok(dataset)
    }

    /// Dataset over an explicit list of files, read in the given order.
    pub fn from_files(files: Vec<PathBuf>) -> Result<Self> {
        let mut dataset = Self {
            files,
            lexicons: Lexicons::default(),
            len: 0,
        };
        let mut lexicons = Lexicons::default();
        let mut len = 0;
        for record in dataset.records() {
            lexicons.observe(&record?);
            len += 1;
        }
        dataset.lexicons = lexicons;
        dataset.len = len;
        Ok(dataset)
    }

    pub fn lexicons(&self) -> &Lexicons {
        &self.lexicons
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Number of records seen during the initial scan.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn records(&self) -> Records<'_> {
        Records {
            files: self.files.iter(),
            current: None,
            done: false,
        }
    }

    /// Records grouped into batches of `batch_size`; 0 puts the whole pass
    /// into a single batch.
    pub fn batches(&self, batch_size: usize) -> Batches<'_> {
        Batches {
            records: self.records(),
            batch_size,
        }
    }
}

struct OpenFile<'a> {
    path: &'a Path,
    lines: Lines<BufReader<File>>,
    lineno: usize,
}

/// Lazy pass over all records. Stops after the first error.
pub struct Records<'a> {
    files: std::slice::Iter<'a, PathBuf>,
    current: Option<OpenFile<'a>>,
    done: bool,
}

impl<'a> Records<'a> {
    fn fail(&mut self, err: DepnnError) -> Option<Result<DependencyRecord>> {
        self.done = true;
        self.current = None;
        Some(Err(err))
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<DependencyRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.current.is_none() {
                let Some(path) = self.files.next() else {
                    self.done = true;
                    return None;
                };
                match File::open(path) {
                    Ok(f) => {
                        debug!("reading records from {}", path.display());
                        self.current = Some(OpenFile {
                            path: path.as_path(),
                            lines: BufReader::new(f).lines(),
                            lineno: 0,
                        });
                    }
                    Err(e) => return self.fail(e.into()),
                }
            }
            let Some(file) = self.current.as_mut() else {
                continue;
            };
            match file.lines.next() {
                None => self.current = None,
                Some(Err(e)) => {
                    let err = DepnnError::line_read(e, file.path, file.lineno + 1);
                    return self.fail(err);
                }
                Some(Ok(line)) => {
                    file.lineno += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<DependencyRecord>() {
                        Ok(record) => return Some(Ok(record)),
                        Err(DepnnError::Format(msg)) => {
                            let err = DepnnError::parse(file.path, file.lineno, msg);
                            return self.fail(err);
                        }
                        Err(e) => return self.fail(e),
                    }
                }
            }
        }
    }
}

/// Lazy pass over record batches.
pub struct Batches<'a> {
    records: Records<'a>,
    batch_size: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Result<Vec<DependencyRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::new();
        while self.batch_size == 0 || batch.len() < self.batch_size {
            match self.records.next() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}
