//! Load errors shared by every reader and the assembler.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse error class, for callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced file is absent, or the run never completed.
    MissingFile,
    /// Input text failed cross-validation or could not be parsed.
    FormatViolation,
    Io,
    Config,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("couldn't find {artifact}: {}", path.display())]
    MissingFile { artifact: &'static str, path: PathBuf },

    #[error("no existing {artifact} named in {}", manifest.display())]
    UnnamedFile {
        artifact: &'static str,
        manifest: PathBuf,
    },

    #[error("case not usable: run did not complete ({})", path.display())]
    RunIncomplete { path: PathBuf },

    #[error("{}:{line}: {message}", file.display())]
    Format {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("kill k{0} is not defined in the kill file")]
    UnknownKill(u32),

    #[error("kill definition cycle through k{kill},{node}")]
    KillCycle { kill: u32, node: u32 },

    #[error("kill definition nested too deep at k{kill},{node}")]
    KillDepth { kill: u32, node: u32 },

    #[error("kill k{kill},{node} expands to more than {limit} components")]
    KillTooLarge { kill: u32, node: u32, limit: usize },

    #[error("{} is too large: {bytes} bytes (max {max})", path.display())]
    TooLarge { path: PathBuf, bytes: u64, max: u64 },

    #[error("error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config: {0}")]
    Config(String),
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::MissingFile { .. }
            | LoadError::UnnamedFile { .. }
            | LoadError::RunIncomplete { .. } => ErrorKind::MissingFile,
            LoadError::Format { .. }
            | LoadError::UnknownKill(_)
            | LoadError::KillCycle { .. }
            | LoadError::KillDepth { .. }
            | LoadError::KillTooLarge { .. }
            | LoadError::TooLarge { .. } => ErrorKind::FormatViolation,
            LoadError::Io { .. } => ErrorKind::Io,
            LoadError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn missing(artifact: &'static str, path: &Path) -> Self {
        LoadError::MissingFile {
            artifact,
            path: path.to_path_buf(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        let e = LoadError::RunIncomplete {
            path: PathBuf::from("a.out"),
        };
        assert_eq!(e.kind(), ErrorKind::MissingFile);
        assert!(e.to_string().contains("case not usable"));

        let e = LoadError::KillCycle { kill: 1, node: 2 };
        assert_eq!(e.kind(), ErrorKind::FormatViolation);
        assert_eq!(e.to_string(), "kill definition cycle through k1,2");
    }

    #[test]
    fn format_error_names_file_and_line() {
        let e = LoadError::Format {
            file: PathBuf::from("t.av"),
            line: 12,
            message: "Bad fragment AV".to_string(),
        };
        assert_eq!(e.to_string(), "t.av:12: Bad fragment AV");
    }
}
