use ndarray::Array3;
use std::collections::BTreeMap;

use super::schedule::ReactionSchedule;

/// The closed registry of geochemical phase-group sections.
///
/// Variants are declared in alphabetical order of their section names so
/// that ordered-map iteration matches the deterministic section order of
/// the persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhaseGroupKind {
    EquilibriumPhases,
    ExchangePhases,
    GasPhases,
    KineticPhases,
    SolidSolutionPhases,
    SurfacePhases,
}

impl PhaseGroupKind {
    pub const ALL: [PhaseGroupKind; 6] = [
        PhaseGroupKind::EquilibriumPhases,
        PhaseGroupKind::ExchangePhases,
        PhaseGroupKind::GasPhases,
        PhaseGroupKind::KineticPhases,
        PhaseGroupKind::SolidSolutionPhases,
        PhaseGroupKind::SurfacePhases,
    ];

    /// The top-level section name in the configuration document.
    pub fn section_name(&self) -> &'static str {
        match self {
            PhaseGroupKind::EquilibriumPhases => "equilibrium_phases",
            PhaseGroupKind::ExchangePhases => "exchange_phases",
            PhaseGroupKind::GasPhases => "gas_phases",
            PhaseGroupKind::KineticPhases => "kinetic_phases",
            PhaseGroupKind::SolidSolutionPhases => "solid_solution_phases",
            PhaseGroupKind::SurfacePhases => "surface_phases",
        }
    }

    pub fn from_section_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.section_name() == name)
    }

    /// The reaction-module slot this group occupies in the per-cell
    /// initial-condition vector. Slot 0 is the solution/transport state
    /// and is never assigned through this mapping.
    pub fn module_slot(&self) -> usize {
        match self {
            PhaseGroupKind::EquilibriumPhases => 1,
            PhaseGroupKind::ExchangePhases => 2,
            PhaseGroupKind::SurfacePhases => 3,
            PhaseGroupKind::GasPhases => 4,
            PhaseGroupKind::SolidSolutionPhases => 5,
            PhaseGroupKind::KineticPhases => 6,
        }
    }
}

/// One phase-group section: the declared species and their per-species data.
///
/// `m0` holds the 3-D initial-amount arrays merged from external layer
/// files. A `None` entry records a species whose external data could not be
/// loaded; callers must handle the absence at the point of use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseGroup {
    /// The declared species, in script-generation order. `None` means the
    /// section never declared a `names` key, which is distinct from an
    /// empty list: script generation rejects the former and emits empty
    /// cell blocks for the latter.
    pub names: Option<Vec<String>>,
    pub si: BTreeMap<String, f64>,
    pub parms: BTreeMap<String, Vec<f64>>,
    pub formula: BTreeMap<String, String>,
    pub m0: BTreeMap<String, Option<Array3<f64>>>,
}

impl PhaseGroup {
    /// The merged 3-D array for one species, if it loaded successfully.
    pub fn m0_for(&self, species: &str) -> Option<&Array3<f64>> {
        self.m0.get(species).and_then(|slot| slot.as_ref())
    }
}

/// The typed configuration model.
///
/// Constructed once from a persisted document or explicit attributes,
/// mutated in place by [`add_new_configuration`](crate::core::config::document),
/// and serialized back to disk. Owns no external resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationConfig {
    pub reactive: ReactionSchedule,
    pub phases: BTreeMap<PhaseGroupKind, PhaseGroup>,
    /// Top-level keys outside the reactive/phase schema, passed through
    /// unchanged on round-trip.
    pub extra: BTreeMap<String, toml::Value>,
}

impl SimulationConfig {
    pub fn phase_group(&self, kind: PhaseGroupKind) -> Option<&PhaseGroup> {
        self.phases.get(&kind)
    }

    pub fn phase_group_mut(&mut self, kind: PhaseGroupKind) -> &mut PhaseGroup {
        self.phases.entry(kind).or_default()
    }

    /// The one grid shape shared by every merged `m0` array, if any loaded.
    ///
    /// All species arrays across all groups must agree; a mismatch is a
    /// fatal inconsistency reported with the offending group and species.
    pub fn consistent_m0_shape(
        &self,
    ) -> Result<Option<(usize, usize, usize)>, ShapeInconsistency> {
        let mut shape: Option<(usize, usize, usize)> = None;
        for (kind, group) in &self.phases {
            for (species, slot) in &group.m0 {
                let Some(array) = slot else { continue };
                let dim = array.dim();
                match shape {
                    None => shape = Some(dim),
                    Some(expected) if expected != dim => {
                        return Err(ShapeInconsistency {
                            group: kind.section_name(),
                            species: species.clone(),
                            expected,
                            found: dim,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(shape)
    }
}

/// Fatal inconsistency between merged species arrays.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "inconsistent grid shape for '{group}.{species}': expected {expected:?}, got {found:?}"
)]
pub struct ShapeInconsistency {
    pub group: &'static str,
    pub species: String,
    pub expected: (usize, usize, usize),
    pub found: (usize, usize, usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn kind_ordering_matches_section_name_ordering() {
        let names: Vec<&str> = PhaseGroupKind::ALL
            .iter()
            .map(|k| k.section_name())
            .collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn module_slots_cover_the_six_reaction_slots() {
        let mut slots: Vec<usize> = PhaseGroupKind::ALL.iter().map(|k| k.module_slot()).collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn shape_mismatch_is_reported_with_group_and_species() {
        let mut config = SimulationConfig::default();
        let eq = config.phase_group_mut(PhaseGroupKind::EquilibriumPhases);
        eq.m0
            .insert("calcite".into(), Some(Array3::zeros((2, 3, 4))));
        let kin = config.phase_group_mut(PhaseGroupKind::KineticPhases);
        kin.m0
            .insert("pyrite".into(), Some(Array3::zeros((2, 3, 5))));

        let err = config.consistent_m0_shape().unwrap_err();
        assert_eq!(err.species, "pyrite");
        assert_eq!(err.expected, (2, 3, 4));
        assert_eq!(err.found, (2, 3, 5));
    }

    #[test]
    fn absent_species_slots_do_not_participate_in_shape_checks() {
        let mut config = SimulationConfig::default();
        let eq = config.phase_group_mut(PhaseGroupKind::EquilibriumPhases);
        eq.m0.insert("calcite".into(), None);
        assert_eq!(config.consistent_m0_shape().unwrap(), None);
    }
}
