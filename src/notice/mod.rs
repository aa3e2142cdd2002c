//! Notices raised while assembling a case: severity, summary, technical note.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeSeverity {
    Info,
    Warn,
}

impl NoticeSeverity {
    pub fn label(&self) -> &'static str {
        match self {
            NoticeSeverity::Info => "INFO",
            NoticeSeverity::Warn => "WARN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub code: String,
    pub severity: NoticeSeverity,
    /// One-line explanation for analysts.
    pub summary: String,
    /// Values behind the notice.
    pub technical: String,
    pub component_ids: Vec<u32>,
}

impl Notice {
    pub fn pk_clipped(cells: usize, total: usize) -> Self {
        Self {
            code: "PK_CLIPPED".to_string(),
            severity: NoticeSeverity::Info,
            summary: format!("{} of {} PK cell(s) were clipped into [0, 1].", cells, total),
            technical: "Matrix PK values outside [0, 1] are treated as floating-point noise.".to_string(),
            component_ids: Vec::new(),
        }
    }

    pub fn kill_id_mismatch(matrix_kill: u32, manifest_kill: u32) -> Self {
        Self {
            code: "KILL_ID_MISMATCH".to_string(),
            severity: NoticeSeverity::Warn,
            summary: format!(
                "Matrix was computed for k{} but the manifest requested k{}.",
                matrix_kill, manifest_kill
            ),
            technical: format!(
                "component classes are filtered by the matrix kill k{}",
                matrix_kill
            ),
            component_ids: Vec::new(),
        }
    }

    pub fn blast_component_unknown(ids: Vec<u32>) -> Self {
        Self {
            code: "BLAST_COMPONENT_UNKNOWN".to_string(),
            severity: NoticeSeverity::Warn,
            summary: format!(
                "{} blast component(s) are not in the vulnerability component list.",
                ids.len()
            ),
            technical: format!("blast ids without a component position: {:?}", ids),
            component_ids: ids,
        }
    }

    pub fn no_matrix(expected: &str) -> Self {
        Self {
            code: "NO_MATRIX".to_string(),
            severity: NoticeSeverity::Info,
            summary: "Case has no PK matrix; only vulnerability and surface data are loaded.".to_string(),
            technical: format!("expected matrix at {}", expected),
            component_ids: Vec::new(),
        }
    }
}
