//! Line-oriented readers for the case files. Each format gets its own submodule;
//! they all share [`LineReader`] so that every error names its file and line.

pub(crate) mod detail;
pub(crate) mod kill;
pub(crate) mod manifest;
pub(crate) mod matrix;
pub(crate) mod surface;
pub(crate) mod vulnerability;

pub use detail::{read_detail, ComponentClasses, DetailData, DetailKey, DetailRecord, FragZone};
pub use kill::{parse_kill_label, read_kill_file, KillHeader, KillItem, KillNode, KillTree, NodeKey};
pub use manifest::{read_manifest, BlastVolume, BlastShape, CaseManifest, ManifestOutcome};
pub use matrix::{read_matrix, MatrixData};
pub use surface::{read_surfaces, SurfaceData};
pub use vulnerability::{read_vulnerability, AveragingMode, Component, VulnerabilityTable};

use crate::error::LoadError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Buffered line source with a one-line push-back and a running line number.
pub struct LineReader<R> {
    inner: R,
    source: PathBuf,
    line_no: usize,
    pending: Option<String>,
    budget: u64,
}

impl LineReader<BufReader<File>> {
    /// Open `path`, refusing files larger than `max_bytes`.
    pub fn open(path: &Path, max_bytes: u64) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
        let bytes = file.metadata().map_err(|e| LoadError::io(path, e))?.len();
        if bytes > max_bytes {
            return Err(LoadError::TooLarge {
                path: path.to_path_buf(),
                bytes,
                max: max_bytes,
            });
        }
        Ok(Self::new(path, BufReader::new(file)).with_budget(bytes))
    }
}

impl<'a> LineReader<&'a [u8]> {
    /// Read from an in-memory string; `label` stands in for the file name in errors.
    pub fn from_text(label: &str, text: &'a str) -> Self {
        Self::new(Path::new(label), text.as_bytes()).with_budget(text.len() as u64)
    }
}

impl<R: BufRead> LineReader<R> {
    pub fn new(source: &Path, inner: R) -> Self {
        Self {
            inner,
            source: source.to_path_buf(),
            line_no: 0,
            pending: None,
            budget: u64::MAX,
        }
    }

    /// Input size in bytes; declared item counts may not exceed it.
    pub fn with_budget(mut self, bytes: u64) -> Self {
        self.budget = bytes;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Line number of the most recently returned line (1-based).
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Next line without its terminator, or `None` at end of input.
    pub fn next_line(&mut self) -> Result<Option<String>, LoadError> {
        if let Some(line) = self.pending.take() {
            self.line_no += 1;
            return Ok(Some(line));
        }
        let mut buf = String::new();
        let n = self
            .inner
            .read_line(&mut buf)
            .map_err(|e| LoadError::io(&self.source, e))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let trimmed_len = buf.trim_end_matches(['\n', '\r']).len();
        buf.truncate(trimmed_len);
        Ok(Some(buf))
    }

    /// Next line; end of input is a format error mentioning `what`.
    pub fn expect_line(&mut self, what: &str) -> Result<String, LoadError> {
        match self.next_line()? {
            Some(line) => Ok(line),
            None => Err(LoadError::Format {
                file: self.source.clone(),
                line: self.line_no + 1,
                message: format!("unexpected end of file, expected {}", what),
            }),
        }
    }

    /// Skip `n` lines, failing if the file ends first.
    pub fn skip_lines(&mut self, n: usize, what: &str) -> Result<(), LoadError> {
        for _ in 0..n {
            self.expect_line(what)?;
        }
        Ok(())
    }

    /// Return a line so the next `next_line` yields it again.
    pub fn push_back(&mut self, line: String) {
        self.line_no = self.line_no.saturating_sub(1);
        self.pending = Some(line);
    }

    /// Format error at the current line.
    pub fn error(&self, message: impl Into<String>) -> LoadError {
        LoadError::Format {
            file: self.source.clone(),
            line: self.line_no,
            message: message.into(),
        }
    }

    /// Parse one token, naming `what` in the error.
    pub fn parse<T: FromStr>(&self, token: Option<&str>, what: &str) -> Result<T, LoadError> {
        let token = token.ok_or_else(|| self.error(format!("missing {}", what)))?;
        token
            .parse::<T>()
            .map_err(|_| self.error(format!("invalid {}: {:?}", what, token)))
    }

    /// Parse a floating-point token that must be finite (`NaN` and `inf` parse
    /// as `f64` but are never valid table values).
    pub fn parse_finite(&self, token: Option<&str>, what: &str) -> Result<f64, LoadError> {
        let value: f64 = self.parse(token, what)?;
        if !value.is_finite() {
            return Err(self.error(format!("non-finite {}: {}", what, value)));
        }
        Ok(value)
    }

    /// Product of header-declared dimensions. Every declared item takes at least
    /// one byte of input, so a product that overflows or exceeds the input size
    /// is a format error rather than an allocation.
    pub fn declared_count(&self, dims: &[usize], what: &str) -> Result<usize, LoadError> {
        let total = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| self.error(format!("{} count overflows: {:?}", what, dims)))?;
        if total as u64 > self.budget {
            return Err(self.error(format!(
                "{} count {} exceeds the {} byte input",
                what, total, self.budget
            )));
        }
        Ok(total)
    }

    /// Parse a count-prefixed array line: `<n> v1 .. vn`.
    pub fn read_counted_array(&mut self, what: &str) -> Result<Vec<f64>, LoadError> {
        let line = self.expect_line(what)?;
        let mut tokens = line.split_whitespace();
        let n: i64 = self.parse(tokens.next(), &format!("{} count", what))?;
        if n <= 0 {
            return Err(self.error(format!("number of items in {} array is 0 or less", what)));
        }
        let values = tokens
            .map(|t| self.parse_finite(Some(t), what))
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() != n as usize {
            return Err(self.error(format!(
                "{} array declares {} values but lists {}",
                what,
                n,
                values.len()
            )));
        }
        Ok(values)
    }
}

/// The text after the first `:` on a keyword line, trimmed.
pub(crate) fn value_after_colon(line: &str) -> &str {
    line.split_once(':').map(|(_, v)| v.trim()).unwrap_or("")
}

/// Split on whitespace into at most `n` fields; the last field keeps the rest of
/// the line (names with spaces).
pub(crate) fn split_fields(line: &str, n: usize) -> Vec<&str> {
    let mut out = Vec::with_capacity(n);
    let mut rest = line.trim();
    while !rest.is_empty() {
        if out.len() + 1 == n {
            out.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(i) => {
                out.push(&rest[..i]);
                rest = rest[i..].trim_start();
            }
            None => {
                out.push(rest);
                break;
            }
        }
    }
    out
}
