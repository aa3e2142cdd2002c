//! Detailed per-burstpoint output (`.dtl`).
//!
//! Records are keyed by burstpoint and azimuth. Inside a `BPNUM` block the
//! component number is implicit: it starts at 1 and advances on each
//! `:COMPONENT` record, and `:FRAGMENTATION` zones attach to whichever
//! component number is current.

use super::{value_after_colon, LineReader};
use crate::error::LoadError;
use glam::DVec3;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::Path;

const FRAGMENTATION: &str = ":FRAGMENTATION";
const COMPONENT: &str = ":COMPONENT";
const BPNUM: &str = "BPNUM";
const HEADER_LINES: usize = 8;

/// Classes that pick the PK column of a `:COMPONENT` record.
#[derive(Debug, Clone, Default)]
pub struct ComponentClasses {
    pub direct_hit: BTreeSet<u32>,
    pub blast: BTreeSet<u32>,
}

impl ComponentClasses {
    fn column(&self, component: u32) -> usize {
        if self.direct_hit.contains(&component) {
            0
        } else if self.blast.contains(&component) {
            1
        } else {
            2
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DetailKey {
    pub burstpoint: u32,
    /// Whole degrees.
    pub azimuth: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FragZone {
    pub zone: u32,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub sample: DVec3,
    pub burst: DVec3,
    pub surface_hit: u32,
    pub component_pk: BTreeMap<u32, f64>,
    pub frag_zones: BTreeMap<u32, Vec<FragZone>>,
}

#[derive(Debug, Clone)]
pub struct DetailData {
    pub eval_radius: f64,
    pub eval_center: DVec3,
    pub dh_includes_frag: bool,
    pub records: BTreeMap<DetailKey, DetailRecord>,
}

impl DetailData {
    pub fn record(&self, burstpoint: u32, azimuth: f64) -> Option<&DetailRecord> {
        self.records.get(&DetailKey {
            burstpoint,
            azimuth: azimuth.round() as i32,
        })
    }
}

pub fn read_detail(
    path: &Path,
    classes: &ComponentClasses,
    max_bytes: u64,
) -> Result<DetailData, LoadError> {
    let mut scan = LineReader::open(path, max_bytes)?;
    if !has_fragmentation(&mut scan)? {
        return Err(LoadError::Format {
            file: path.to_path_buf(),
            line: 0,
            message: format!("insufficient detail: no {} records", FRAGMENTATION),
        });
    }
    let mut reader = LineReader::open(path, max_bytes)?;
    let data = parse_detail(&mut reader, classes)?;
    tracing::info!(
        "read {} detail record(s) from {}",
        data.records.len(),
        path.display()
    );
    Ok(data)
}

pub(crate) fn has_fragmentation<R: BufRead>(reader: &mut LineReader<R>) -> Result<bool, LoadError> {
    while let Some(line) = reader.next_line()? {
        if line.trim_start().starts_with(FRAGMENTATION) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn parse_flag(token: &str) -> Option<bool> {
    match token.to_ascii_uppercase().as_str() {
        "YES" | "Y" | "TRUE" | "1" => Some(true),
        "NO" | "N" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn point<R: BufRead>(reader: &LineReader<R>, tokens: &[&str], what: &str) -> Result<DVec3, LoadError> {
    Ok(DVec3::new(
        reader.parse(tokens.first().copied(), &format!("{} x", what))?,
        reader.parse(tokens.get(1).copied(), &format!("{} y", what))?,
        reader.parse(tokens.get(2).copied(), &format!("{} z", what))?,
    ))
}

pub(crate) fn parse_detail<R: BufRead>(
    reader: &mut LineReader<R>,
    classes: &ComponentClasses,
) -> Result<DetailData, LoadError> {
    let mut header = Vec::with_capacity(HEADER_LINES);
    for i in 0..HEADER_LINES {
        header.push(reader.expect_line(&format!("detail header line {}", i + 1))?);
    }
    let radius_tokens: Vec<&str> = value_after_colon(&header[2]).split_whitespace().collect();
    let eval_radius: f64 = reader.parse(radius_tokens.first().copied(), "evaluation radius")?;
    let center_tokens: Vec<&str> = value_after_colon(&header[3]).split_whitespace().collect();
    let eval_center = point(reader, &center_tokens, "evaluation center")?;
    let flag = value_after_colon(&header[4]);
    let dh_includes_frag = flag
        .split_whitespace()
        .next()
        .and_then(parse_flag)
        .ok_or_else(|| reader.error(format!("invalid direct-hit fragmentation flag {:?}", flag)))?;

    let mut records: BTreeMap<DetailKey, DetailRecord> = BTreeMap::new();
    let mut current: Option<DetailKey> = None;
    let mut component: u32 = 1;

    while let Some(line) = reader.next_line()? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        match tokens[0] {
            BPNUM => {
                let burstpoint: u32 = reader.parse(tokens.get(1).copied(), "burstpoint id")?;
                let azimuth: f64 = reader.parse(tokens.get(2).copied(), "burstpoint azimuth")?;
                let sample = point(reader, tokens.get(3..).unwrap_or(&[]), "sample location")?;
                let burst = point(reader, tokens.get(6..).unwrap_or(&[]), "burst location")?;
                let surface_hit: u32 = reader.parse(tokens.get(9).copied(), "surface hit")?;
                let key = DetailKey {
                    burstpoint,
                    azimuth: azimuth.round() as i32,
                };
                if records.contains_key(&key) {
                    return Err(reader.error(format!(
                        "duplicate burstpoint {} at azimuth {}",
                        burstpoint, key.azimuth
                    )));
                }
                records.insert(
                    key,
                    DetailRecord {
                        sample,
                        burst,
                        surface_hit,
                        component_pk: BTreeMap::new(),
                        frag_zones: BTreeMap::new(),
                    },
                );
                current = Some(key);
                component = 1;
            }
            FRAGMENTATION => {
                let key = current.ok_or_else(|| reader.error("fragmentation record before any BPNUM"))?;
                let count: usize = reader.parse(tokens.get(1).copied(), "fragmentation zone count")?;
                let mut zones = Vec::with_capacity(reader.declared_count(&[count], "fragmentation zone")?);
                for _ in 0..count {
                    let zl = reader.expect_line("fragmentation zone")?;
                    let z: Vec<&str> = zl.split_whitespace().collect();
                    zones.push(FragZone {
                        zone: reader.parse(z.first().copied(), "zone number")?,
                        lower: reader.parse(z.get(1).copied(), "zone lower bound")?,
                        upper: reader.parse(z.get(2).copied(), "zone upper bound")?,
                    });
                }
                if let Some(rec) = records.get_mut(&key) {
                    rec.frag_zones.entry(component).or_default().extend(zones);
                }
            }
            COMPONENT => {
                let key = current.ok_or_else(|| reader.error("component record before any BPNUM"))?;
                let pl = reader.expect_line("component PK line")?;
                let cols: Vec<&str> = pl.split_whitespace().collect();
                let col = classes.column(component);
                let pk = reader.parse_finite(
                    cols.get(col).copied(),
                    &format!("PK column {} for component {}", col + 1, component),
                )?;
                if let Some(rec) = records.get_mut(&key) {
                    rec.component_pk.insert(component, pk);
                }
                component += 1;
            }
            _ => {}
        }
    }

    Ok(DetailData {
        eval_radius,
        eval_center,
        dh_includes_frag,
        records,
    })
}
