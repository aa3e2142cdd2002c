//! Case loading: run the readers in dependency order, then compose their
//! outputs into a [`Model`] in one transform pass.

use super::{ComponentSets, Model, PkGrid};
use crate::config::LoadConfig;
use crate::error::LoadError;
use crate::geometry::{
    extent, measure_between, midpoints, nearest_index, rotate_and_shift, rotate_pt_around_yz_axes,
};
use crate::notice::Notice;
use crate::parser::{
    read_detail, read_kill_file, read_manifest, read_matrix, read_surfaces, read_vulnerability,
    BlastVolume, CaseManifest, ComponentClasses, DetailData, KillTree, ManifestOutcome,
    MatrixData, SurfaceData, VulnerabilityTable,
};
use glam::{DVec2, DVec3};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Everything the readers produce for one case, before any transform.
#[derive(Debug, Clone)]
pub struct CaseParts {
    pub manifest: CaseManifest,
    pub vulnerability: VulnerabilityTable,
    pub surfaces: SurfaceData,
    pub kills: KillTree,
    pub matrix: Option<MatrixData>,
    pub detail: Option<DetailData>,
}

/// Loads cases with one configuration.
pub struct ModelAssembler<'a> {
    config: &'a LoadConfig,
}

impl<'a> ModelAssembler<'a> {
    pub fn new(config: &'a LoadConfig) -> Self {
        Self { config }
    }

    /// Read every file of the case named by `manifest_path`.
    pub fn read_parts(&self, manifest_path: &Path) -> Result<CaseParts, LoadError> {
        let max = self.config.max_input_bytes;
        let manifest = match read_manifest(manifest_path, max)? {
            ManifestOutcome::Complete(m) => *m,
            ManifestOutcome::Incomplete => {
                return Err(LoadError::RunIncomplete {
                    path: manifest_path.to_path_buf(),
                })
            }
        };

        let vulnerability = read_vulnerability(&manifest.av_file, max)?;
        let surfaces = read_surfaces(&manifest.srf_file, max)?;
        let kills = read_kill_file(&manifest.kill_file, manifest.kill_description.as_deref(), max)?
            .with_max_depth(self.config.max_kill_depth);

        let matrix = if manifest.mtx_file.exists() {
            Some(read_matrix(&manifest.mtx_file, max)?)
        } else if self.config.require_matrix {
            return Err(LoadError::missing("matrix file", &manifest.mtx_file));
        } else {
            None
        };

        let detail = match &manifest.dtl_file {
            Some(path) => {
                let classes = ComponentClasses {
                    direct_hit: manifest.direct_hit_ids.clone(),
                    blast: manifest.blast_volumes.keys().copied().collect(),
                };
                Some(read_detail(path, &classes, max)?)
            }
            None => None,
        };

        Ok(CaseParts {
            manifest,
            vulnerability,
            surfaces,
            kills,
            matrix,
            detail,
        })
    }

    pub fn load(&self, manifest_path: &Path) -> Result<Model, LoadError> {
        self.config.validate()?;
        let parts = self.read_parts(manifest_path)?;
        let model = assemble(parts, self.config)?;
        tracing::info!(
            "assembled case {} ({} component(s), {} notice(s))",
            model.case_name(),
            model.components().len(),
            model.notices().len()
        );
        Ok(model)
    }
}

/// Load one case end to end.
pub fn load_case(manifest_path: &Path, config: &LoadConfig) -> Result<Model, LoadError> {
    ModelAssembler::new(config).load(manifest_path)
}

/// Intersect a class with the kill's components and drop invulnerable ids.
/// An empty kill set leaves the class untouched.
pub fn filter_class(
    class: &BTreeSet<u32>,
    kill: &BTreeSet<u32>,
    invulnerable: &BTreeSet<u32>,
) -> BTreeSet<u32> {
    if kill.is_empty() {
        return class.clone();
    }
    class
        .intersection(kill)
        .filter(|id| !invulnerable.contains(*id))
        .copied()
        .collect()
}

/// Radius that encloses the surface footprint and every blast envelope. Surface
/// points count by their x/y distance from the footprint center.
pub fn volume_radius(
    surfaces: &SurfaceData,
    blasts: &BTreeMap<u32, BlastVolume>,
    margin: f64,
) -> f64 {
    let mut radius: f64 = 0.0;
    if !surfaces.bounds.is_empty() {
        let (cx, cy) = surfaces.bounds.center_xy();
        let center = DVec2::new(cx, cy);
        for p in &surfaces.points {
            radius = radius.max(p.truncate().distance(center));
        }
    }
    for vol in blasts.values() {
        radius = radius.max(vol.z2 + vol.max_radius() + margin);
    }
    radius
}

fn transform_matrix(mut mtx: MatrixData, center: DVec3, notices: &mut Vec<Notice>) -> PkGrid {
    let raw_extent_range = extent(&mtx.gridlines_range);
    let raw_extent_defl = extent(&mtx.gridlines_defl);
    let gridlines_range = rotate_and_shift(&mtx.gridlines_range, mtx.offset_range + center.x);
    let gridlines_defl = rotate_and_shift(&mtx.gridlines_defl, mtx.offset_defl + center.y);

    let clipped = mtx.clipped + mtx.clip_pks();
    if clipped > 0 {
        notices.push(Notice::pk_clipped(clipped, mtx.pks.len()));
    }

    PkGrid {
        kill: mtx.kill,
        cells_range: mtx.cells_range,
        cells_defl: mtx.cells_defl,
        offset_range: mtx.offset_range,
        offset_defl: mtx.offset_defl,
        raw_extent_range,
        raw_extent_defl,
        midpoints_range: midpoints(&gridlines_range),
        midpoints_defl: midpoints(&gridlines_defl),
        cell_sizes_range: measure_between(&gridlines_range),
        cell_sizes_defl: measure_between(&gridlines_defl),
        gridlines_range,
        gridlines_defl,
        pks: mtx.pks,
    }
}

/// Compose reader outputs into a model. Nothing is exposed if this fails.
pub fn assemble(parts: CaseParts, config: &LoadConfig) -> Result<Model, LoadError> {
    let CaseParts {
        manifest,
        vulnerability,
        surfaces,
        kills,
        matrix,
        detail,
    } = parts;
    let mut notices = Vec::new();

    let target_center = manifest
        .target_center
        .unwrap_or(vulnerability.reference_location);

    let matrix_kill = matrix.as_ref().map(|m| m.kill);
    let matrix = match matrix {
        Some(m) => Some(transform_matrix(m, target_center, &mut notices)),
        None => {
            notices.push(Notice::no_matrix(&manifest.mtx_file.to_string_lossy()));
            None
        }
    };

    let active_kill = match (matrix_kill, kills.selected_kill) {
        (Some(m), Some(s)) if m != s => {
            tracing::warn!("matrix kill k{} differs from requested kill k{}", m, s);
            notices.push(Notice::kill_id_mismatch(m, s));
            Some(m)
        }
        (Some(m), _) => Some(m),
        (None, s) => s,
    };
    let kill_components: BTreeSet<u32> = match active_kill {
        Some(k) => kills.extract_components(k, None)?.into_iter().collect(),
        None => BTreeSet::new(),
    };

    let blast_ids: BTreeSet<u32> = manifest.blast_volumes.keys().copied().collect();
    let known: BTreeSet<u32> = vulnerability.components.iter().map(|c| c.id).collect();
    let unknown_blast: Vec<u32> = blast_ids.difference(&known).copied().collect();
    if !unknown_blast.is_empty() {
        notices.push(Notice::blast_component_unknown(unknown_blast));
    }
    let fragment: BTreeSet<u32> = vulnerability
        .components
        .iter()
        .filter(|c| !c.is_dummy())
        .map(|c| c.id)
        .filter(|id| !manifest.direct_hit_ids.contains(id) && !blast_ids.contains(id))
        .collect();
    let invulnerable = &manifest.invulnerable_ids;
    let classes = ComponentSets {
        direct_hit: filter_class(&manifest.direct_hit_ids, &kill_components, invulnerable),
        blast: filter_class(&blast_ids, &kill_components, invulnerable),
        fragment: filter_class(&fragment, &kill_components, invulnerable),
        invulnerable: invulnerable.clone(),
    };
    tracing::debug!(
        "classes: {} direct hit, {} blast, {} fragment, {} invulnerable",
        classes.direct_hit.len(),
        classes.blast.len(),
        classes.fragment.len(),
        classes.invulnerable.len()
    );

    let volume_radius = volume_radius(&surfaces, &manifest.blast_volumes, config.blast_margin);
    let az_index = manifest
        .attack_az
        .and_then(|az| nearest_index(&vulnerability.azimuths, az));
    let el_index = manifest
        .aof
        .and_then(|aof| nearest_index(&vulnerability.elevations, aof));
    let munition_direction = rotate_pt_around_yz_axes(
        DVec3::X,
        manifest.aof.unwrap_or(0.0),
        manifest.attack_az.unwrap_or(0.0),
    );

    let case_name = manifest
        .manifest_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Model {
        case_name,
        manifest,
        vulnerability,
        surfaces,
        kills,
        active_kill,
        kill_components,
        classes,
        matrix,
        detail,
        target_center,
        volume_radius,
        az_index,
        el_index,
        munition_direction,
        notices,
    })
}
