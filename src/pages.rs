//! Sources of record pages
//!
//! A page is one JSON array of record objects. Pages of a table are numbered
//! from zero; a source also reports how many pages to expect and may offer
//! one extra trailing page.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::{Error, Result};

pub trait PageSource: Send + Sync {
    /// Number of numbered pages for `table`
    fn page_count(&self, table: &str) -> Result<usize>;

    /// Page `page` of `table`, or `None` if it does not exist
    fn open_page(&self, table: &str, page: usize) -> Result<Option<Box<dyn Read + '_>>>;

    /// Optional page read after the numbered ones
    fn open_extra_page(&self, _table: &str) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(None)
    }
}

/// Pages stored as files in one directory:
/// `<table>_count.txt`, `<table>_0.json`, `<table>_1.json`, ... and
/// optionally `<table>_test.json`
#[derive(Debug, Clone)]
pub struct DirPageSource {
    dir: PathBuf,
}

impl DirPageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirPageSource { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn count_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}_count.txt", table))
    }

    pub fn page_path(&self, table: &str, page: usize) -> PathBuf {
        self.dir.join(format!("{}_{}.json", table, page))
    }

    pub fn extra_page_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}_test.json", table))
    }

    fn open(path: &Path) -> Result<Option<Box<dyn Read>>> {
        match File::open(path) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl PageSource for DirPageSource {
    fn page_count(&self, table: &str) -> Result<usize> {
        let path = self.count_path(table);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(table, path = %path.display(), "page count file not found, assuming no pages");
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        text.trim().parse().map_err(|_| Error::InvalidPageCount {
            path: path.display().to_string(),
        })
    }

    fn open_page(&self, table: &str, page: usize) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(Self::open(&self.page_path(table, page))?.map(|r| r as Box<dyn Read + '_>))
    }

    fn open_extra_page(&self, table: &str) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(Self::open(&self.extra_page_path(table))?.map(|r| r as Box<dyn Read + '_>))
    }
}

/// Pages held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPageSource {
    pages: HashMap<String, Vec<String>>,
    extra: HashMap<String, String>,
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages<I, S>(mut self, table: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages
            .insert(table.into(), pages.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_extra_page(mut self, table: impl Into<String>, page: impl Into<String>) -> Self {
        self.extra.insert(table.into(), page.into());
        self
    }
}

impl PageSource for MemoryPageSource {
    fn page_count(&self, table: &str) -> Result<usize> {
        Ok(self.pages.get(table).map_or(0, Vec::len))
    }

    fn open_page(&self, table: &str, page: usize) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(self
            .pages
            .get(table)
            .and_then(|pages| pages.get(page))
            .map(|text| Box::new(Cursor::new(text.as_bytes())) as Box<dyn Read + '_>))
    }

    fn open_extra_page(&self, table: &str) -> Result<Option<Box<dyn Read + '_>>> {
        Ok(self
            .extra
            .get(table)
            .map(|text| Box::new(Cursor::new(text.as_bytes())) as Box<dyn Read + '_>))
    }
}
