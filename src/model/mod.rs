//! Assembled case model: read-only query surface plus a serializable summary.

mod assemble;

pub use assemble::{assemble, filter_class, load_case, volume_radius, CaseParts, ModelAssembler};

use crate::geometry::Bounds;
use crate::notice::Notice;
use crate::parser::{
    BlastVolume, CaseManifest, Component, DetailData, KillTree, SurfaceData, VulnerabilityTable,
};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Component id sets by class, after kill filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSets {
    pub direct_hit: BTreeSet<u32>,
    pub blast: BTreeSet<u32>,
    pub fragment: BTreeSet<u32>,
    pub invulnerable: BTreeSet<u32>,
}

/// PK matrix in target-centered coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkGrid {
    pub kill: u32,
    pub cells_range: usize,
    pub cells_defl: usize,
    pub offset_range: f64,
    pub offset_defl: f64,
    /// `(min, max)` of the gridlines as read, before rotation.
    pub raw_extent_range: Option<(f64, f64)>,
    pub raw_extent_defl: Option<(f64, f64)>,
    pub gridlines_range: Vec<f64>,
    pub gridlines_defl: Vec<f64>,
    pub midpoints_range: Vec<f64>,
    pub midpoints_defl: Vec<f64>,
    pub cell_sizes_range: Vec<f64>,
    pub cell_sizes_defl: Vec<f64>,
    /// Row-major, `cells_range` rows of `cells_defl`, all in [0, 1].
    pub pks: Vec<f64>,
}

impl PkGrid {
    pub fn pk(&self, range: usize, defl: usize) -> Option<f64> {
        (range < self.cells_range && defl < self.cells_defl)
            .then(|| self.pks[range * self.cells_defl + defl])
    }

    pub fn row(&self, range: usize) -> Option<&[f64]> {
        self.pks
            .get(range * self.cells_defl..(range + 1) * self.cells_defl)
    }

    pub fn mean_pk(&self) -> f64 {
        if self.pks.is_empty() {
            return 0.0;
        }
        self.pks.iter().sum::<f64>() / self.pks.len() as f64
    }

    pub fn max_pk(&self) -> f64 {
        self.pks.iter().copied().fold(0.0, f64::max)
    }
}

/// A fully loaded case. Nothing here is mutable once assembly returns.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) case_name: String,
    pub(crate) manifest: CaseManifest,
    pub(crate) vulnerability: VulnerabilityTable,
    pub(crate) surfaces: SurfaceData,
    pub(crate) kills: KillTree,
    pub(crate) active_kill: Option<u32>,
    pub(crate) kill_components: BTreeSet<u32>,
    pub(crate) classes: ComponentSets,
    pub(crate) matrix: Option<PkGrid>,
    pub(crate) detail: Option<DetailData>,
    pub(crate) target_center: DVec3,
    pub(crate) volume_radius: f64,
    pub(crate) az_index: Option<usize>,
    pub(crate) el_index: Option<usize>,
    pub(crate) munition_direction: DVec3,
    pub(crate) notices: Vec<Notice>,
}

impl Model {
    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    pub fn manifest(&self) -> &CaseManifest {
        &self.manifest
    }

    pub fn components(&self) -> &[Component] {
        &self.vulnerability.components
    }

    pub fn component(&self, id: u32) -> Option<&Component> {
        self.vulnerability.components.iter().find(|c| c.id == id)
    }

    pub fn vulnerability(&self) -> &VulnerabilityTable {
        &self.vulnerability
    }

    pub fn surfaces(&self) -> &SurfaceData {
        &self.surfaces
    }

    pub fn bounds(&self) -> &Bounds {
        &self.surfaces.bounds
    }

    pub fn blast_volumes(&self) -> &BTreeMap<u32, BlastVolume> {
        &self.manifest.blast_volumes
    }

    pub fn blast_volume(&self, id: u32) -> Option<&BlastVolume> {
        self.manifest.blast_volumes.get(&id)
    }

    pub fn kill_tree(&self) -> &KillTree {
        &self.kills
    }

    /// Kill that filters the component classes, if any.
    pub fn active_kill(&self) -> Option<u32> {
        self.active_kill
    }

    pub fn kill_components(&self) -> &BTreeSet<u32> {
        &self.kill_components
    }

    pub fn classes(&self) -> &ComponentSets {
        &self.classes
    }

    pub fn matrix(&self) -> Option<&PkGrid> {
        self.matrix.as_ref()
    }

    pub fn detail(&self) -> Option<&DetailData> {
        self.detail.as_ref()
    }

    pub fn target_center(&self) -> DVec3 {
        self.target_center
    }

    pub fn volume_radius(&self) -> f64 {
        self.volume_radius
    }

    /// Azimuth index nearest the attack azimuth.
    pub fn azimuth_index(&self) -> Option<usize> {
        self.az_index
    }

    /// Elevation index nearest the angle of fall.
    pub fn elevation_index(&self) -> Option<usize> {
        self.el_index
    }

    /// Unit vector of the munition's flight direction.
    pub fn munition_direction(&self) -> DVec3 {
        self.munition_direction
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn summary(&self) -> ModelSummary {
        let m = &self.manifest;
        ModelSummary {
            case_name: self.case_name.clone(),
            manifest_path: m.manifest_path.to_string_lossy().into_owned(),
            term_vel: m.term_vel,
            burst_height: m.burst_height,
            attack_az: m.attack_az,
            az_averaging: m.az_averaging,
            aof: m.aof,
            num_components: self.vulnerability.components.len(),
            num_tables: self.vulnerability.num_tables(),
            num_azimuths: self.vulnerability.azimuths.len(),
            num_elevations: self.vulnerability.elevations.len(),
            num_surfaces: self.surfaces.num_surfaces(),
            bounds: (!self.surfaces.bounds.is_empty()).then_some(self.surfaces.bounds),
            kill_description: m.kill_description.clone(),
            active_kill: self.active_kill,
            classes: self.classes.clone(),
            target_center: self.target_center,
            volume_radius: self.volume_radius,
            matrix: self.matrix.clone(),
            detail_records: self.detail.as_ref().map(|d| d.records.len()),
            notices: self.notices.clone(),
        }
    }
}

/// Flat, serializable view of a model for reports and the case store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub case_name: String,
    pub manifest_path: String,
    pub term_vel: Option<f64>,
    pub burst_height: Option<f64>,
    pub attack_az: Option<f64>,
    pub az_averaging: bool,
    pub aof: Option<f64>,
    pub num_components: usize,
    pub num_tables: usize,
    pub num_azimuths: usize,
    pub num_elevations: usize,
    pub num_surfaces: usize,
    pub bounds: Option<Bounds>,
    pub kill_description: Option<String>,
    pub active_kill: Option<u32>,
    pub classes: ComponentSets,
    pub target_center: DVec3,
    pub volume_radius: f64,
    pub matrix: Option<PkGrid>,
    pub detail_records: Option<usize>,
    pub notices: Vec<Notice>,
}
