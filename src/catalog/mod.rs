//! Case discovery: every `*.out` file in a directory is a case whose stem reads
//! `<case>_<run>_<aof>-<termvel>-<burst>`.

use crate::config::MAX_CASE_FILES;
use crate::util::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Stem split into case name and terminal conditions. Conditions stay as the
/// text written in the file name so they can be matched back exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStem {
    pub stem: String,
    pub case: String,
    pub aof: String,
    pub term_vel: String,
    pub burst_height: String,
}

impl CaseStem {
    pub fn parse(stem: &str) -> Option<Self> {
        let mut dashes = stem.rsplitn(3, '-');
        let burst_height = dashes.next()?;
        let term_vel = dashes.next()?;
        let head = dashes.next()?;
        let mut unders = head.rsplitn(3, '_');
        let aof = unders.next()?;
        let _run = unders.next()?;
        let case = unders.next()?;
        if case.is_empty() || aof.is_empty() || term_vel.is_empty() || burst_height.is_empty() {
            return None;
        }
        Some(Self {
            stem: stem.to_string(),
            case: case.to_string(),
            aof: aof.to_string(),
            term_vel: term_vel.to_string(),
            burst_height: burst_height.to_string(),
        })
    }
}

/// Stems of every `.out` file directly inside `dir`, sorted, at most
/// `MAX_CASE_FILES` of them (the first in sort order).
pub fn discover_cases(dir: &Path) -> Result<Vec<String>, String> {
    discover_cases_up_to(dir, MAX_CASE_FILES)
}

fn discover_cases_up_to(dir: &Path, limit: usize) -> Result<Vec<String>, String> {
    let mut stems = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| format!("{}: {}", dir.display(), e))?;
    for e in entries {
        let e = e.map_err(|e| e.to_string())?;
        let path = e.path();
        if !path.is_file() || path.extension().map(|x| x != "out").unwrap_or(true) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    if stems.len() > limit {
        tracing::warn!(
            "keeping the first {} of {} case files in {}",
            limit,
            stems.len(),
            dir.display()
        );
        stems.truncate(limit);
    }
    tracing::debug!("found {} case file(s) in {}", stems.len(), dir.display());
    Ok(stems)
}

/// Distinct case names, sorted.
pub fn case_names(stems: &[String]) -> Vec<String> {
    stems
        .iter()
        .filter_map(|s| CaseStem::parse(s))
        .map(|c| c.case)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Terminal conditions available for one case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub aofs: Vec<String>,
    pub term_vels: Vec<String>,
    pub burst_heights: Vec<String>,
}

fn sorted_numeric(values: BTreeSet<String>) -> Vec<String> {
    let mut v: Vec<String> = values.into_iter().collect();
    v.sort_by(|a, b| {
        let (x, y) = (a.parse::<f64>().ok(), b.parse::<f64>().ok());
        match (x, y) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.cmp(b),
        }
    });
    v
}

pub fn conditions(stems: &[String], case: &str) -> Conditions {
    let (mut aofs, mut vels, mut heights) = (BTreeSet::new(), BTreeSet::new(), BTreeSet::new());
    for c in stems.iter().filter_map(|s| CaseStem::parse(s)) {
        if normalize_name(&c.case) != normalize_name(case) {
            continue;
        }
        aofs.insert(c.aof);
        vels.insert(c.term_vel);
        heights.insert(c.burst_height);
    }
    Conditions {
        aofs: sorted_numeric(aofs),
        term_vels: sorted_numeric(vels),
        burst_heights: sorted_numeric(heights),
    }
}

/// The one stem matching `<case>_*_<aof>-<term_vel>-<burst>`; none when zero
/// or several match.
pub fn match_case<'a>(
    stems: &'a [String],
    case: &str,
    aof: &str,
    term_vel: &str,
    burst_height: &str,
) -> Option<&'a str> {
    let prefix = format!("{}_", case);
    let suffix = format!("_{}-{}-{}", aof, term_vel, burst_height);
    let mut hits = stems.iter().filter(|s| {
        s.len() >= prefix.len() + suffix.len() && s.starts_with(&prefix) && s.ends_with(&suffix)
    });
    match (hits.next(), hits.next()) {
        (Some(one), None) => Some(one.as_str()),
        _ => None,
    }
}
