use ndarray::{Array2, Array3, Axis};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::config::{PhaseGroupKind, SimulationConfig};
use crate::core::grid::GridShape;

/// The deterministic file name for one `(group, species, layer)` triple.
/// Layer indices are 1-based.
pub fn layer_file_name(group: PhaseGroupKind, species: &str, layer: usize) -> String {
    format!("{}_{}_layer{}.txt", group.section_name(), species, layer)
}

/// All layer-file paths for one species under `workdir`.
pub fn layer_file_paths(
    workdir: &Path,
    group: PhaseGroupKind,
    species: &str,
    nlay: usize,
) -> Vec<PathBuf> {
    (1..=nlay)
        .map(|layer| workdir.join(layer_file_name(group, species, layer)))
        .collect()
}

#[derive(Debug, Error)]
pub enum FieldLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid number '{token}' on line {line} of '{path}'")]
    Parse {
        path: String,
        line: usize,
        token: String,
    },
    #[error("ragged array in '{path}': line {line} has {found} values, expected {expected}")]
    Ragged {
        path: String,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("'{path}' is empty")]
    Empty { path: String },
}

/// Reads one layer file as a 2-D array.
///
/// Contents are whitespace-separated floats, one file row per grid row.
pub fn read_layer_array(path: &Path) -> Result<Array2<f64>, FieldLoadError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| FieldLoadError::Io {
        path: display.clone(),
        source,
    })?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let line_num = line_num + 1;
        if line.trim().is_empty() {
            continue;
        }
        let mut row = Vec::new();
        for token in line.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| FieldLoadError::Parse {
                path: display.clone(),
                line: line_num,
                token: token.to_string(),
            })?;
            row.push(value);
        }
        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(FieldLoadError::Ragged {
                    path: display,
                    line: line_num,
                    expected: first.len(),
                    found: row.len(),
                });
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(FieldLoadError::Empty { path: display });
    }
    let nrow = rows.len();
    let ncol = rows[0].len();
    let data: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((nrow, ncol), data).expect("row-major layout by construction"))
}

/// Loads and merges every species' layer files into the configuration.
///
/// Load is best-effort: a group without declared names is skipped with a
/// warning, and any unreadable or shape-inconsistent layer makes the whole
/// species absent (a `None` slot) rather than aborting the aggregate load.
/// Use of an absent species is the caller's hard error, not ours.
#[instrument(skip(config), fields(workdir = %workdir.display()))]
pub fn read_external_files(config: &mut SimulationConfig, workdir: &Path, shape: GridShape) {
    let declared: Vec<(PhaseGroupKind, Option<Vec<String>>)> = config
        .phases
        .iter()
        .map(|(kind, group)| (*kind, group.names.clone()))
        .collect();

    for (kind, names) in declared {
        let Some(names) = names else {
            warn!(
                group = kind.section_name(),
                "phase group declares no species names, skipping external files"
            );
            continue;
        };
        for species in &names {
            let merged = merge_species_layers(workdir, kind, species, shape);
            config
                .phase_group_mut(kind)
                .m0
                .insert(species.clone(), merged);
        }
    }
}

fn merge_species_layers(
    workdir: &Path,
    group: PhaseGroupKind,
    species: &str,
    shape: GridShape,
) -> Option<Array3<f64>> {
    let mut layers: Vec<Array2<f64>> = Vec::with_capacity(shape.nlay);
    let mut missing = 0usize;
    for layer in 1..=shape.nlay {
        let path = workdir.join(layer_file_name(group, species, layer));
        match read_layer_array(&path) {
            Ok(array) => layers.push(array),
            Err(err) => {
                warn!(
                    group = group.section_name(),
                    species,
                    layer,
                    error = %err,
                    "layer file unavailable"
                );
                missing += 1;
            }
        }
    }

    if layers.is_empty() {
        warn!(
            group = group.section_name(),
            species, "no layers loaded, species marked absent"
        );
        return None;
    }
    if missing > 0 {
        // Any absent layer makes the merged 3-D array unusable.
        warn!(
            group = group.section_name(),
            species, missing, "incomplete layer set, species marked absent"
        );
        return None;
    }

    let views: Vec<_> = layers.iter().map(|layer| layer.view()).collect();
    let stacked = match ndarray::stack(Axis(0), &views) {
        Ok(stacked) => stacked,
        Err(err) => {
            warn!(
                group = group.section_name(),
                species,
                error = %err,
                "layer arrays could not be stacked, species marked absent"
            );
            return None;
        }
    };
    if stacked.dim() != shape.dim() {
        warn!(
            group = group.section_name(),
            species,
            found = ?stacked.dim(),
            expected = ?shape.dim(),
            "merged array does not match the grid shape, species marked absent"
        );
        return None;
    }
    debug!(
        group = group.section_name(),
        species,
        shape = ?stacked.dim(),
        "merged species layers"
    );
    Some(stacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_layer(dir: &Path, group: PhaseGroupKind, species: &str, layer: usize, rows: &str) {
        fs::write(dir.join(layer_file_name(group, species, layer)), rows).unwrap();
    }

    fn config_with_names(kind: PhaseGroupKind, names: &[&str]) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.phase_group_mut(kind).names =
            Some(names.iter().map(|n| n.to_string()).collect());
        config
    }

    #[test]
    fn merges_all_layers_into_grid_shape() {
        let dir = tempdir().unwrap();
        let kind = PhaseGroupKind::EquilibriumPhases;
        for layer in 1..=3 {
            write_layer(
                dir.path(),
                kind,
                "calcite",
                layer,
                &format!("{layer}.0 {layer}.0\n{layer}.0 {layer}.0\n"),
            );
        }

        let mut config = config_with_names(kind, &["calcite"]);
        read_external_files(&mut config, dir.path(), GridShape::new(3, 2, 2));

        let merged = config
            .phase_group(kind)
            .unwrap()
            .m0_for("calcite")
            .unwrap();
        assert_eq!(merged.dim(), (3, 2, 2));
        assert_eq!(merged[(0, 0, 0)], 1.0);
        assert_eq!(merged[(2, 1, 1)], 3.0);
    }

    #[test]
    fn missing_layer_marks_the_species_absent() {
        let dir = tempdir().unwrap();
        let kind = PhaseGroupKind::EquilibriumPhases;
        write_layer(dir.path(), kind, "calcite", 1, "1.0\n");
        write_layer(dir.path(), kind, "calcite", 3, "3.0\n");

        let mut config = config_with_names(kind, &["calcite"]);
        read_external_files(&mut config, dir.path(), GridShape::new(3, 1, 1));

        let group = config.phase_group(kind).unwrap();
        assert!(group.m0.contains_key("calcite"));
        assert_eq!(group.m0_for("calcite"), None);
    }

    #[test]
    fn shape_mismatch_marks_the_species_absent() {
        let dir = tempdir().unwrap();
        let kind = PhaseGroupKind::KineticPhases;
        write_layer(dir.path(), kind, "pyrite", 1, "1.0 2.0 3.0\n");

        let mut config = config_with_names(kind, &["pyrite"]);
        read_external_files(&mut config, dir.path(), GridShape::new(1, 1, 2));

        assert_eq!(config.phase_group(kind).unwrap().m0_for("pyrite"), None);
    }

    #[test]
    fn other_species_continue_loading_after_a_failure() {
        let dir = tempdir().unwrap();
        let kind = PhaseGroupKind::EquilibriumPhases;
        write_layer(dir.path(), kind, "gypsum", 1, "7.0\n");

        let mut config = config_with_names(kind, &["calcite", "gypsum"]);
        read_external_files(&mut config, dir.path(), GridShape::new(1, 1, 1));

        let group = config.phase_group(kind).unwrap();
        assert_eq!(group.m0_for("calcite"), None);
        assert_eq!(group.m0_for("gypsum").unwrap()[(0, 0, 0)], 7.0);
    }

    #[test]
    fn layer_parse_errors_carry_path_and_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "1.0 2.0\n3.0 oops\n").unwrap();
        let err = read_layer_array(&path).unwrap_err();
        assert!(matches!(
            err,
            FieldLoadError::Parse { line: 2, ref token, .. } if token == "oops"
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragged.txt");
        fs::write(&path, "1.0 2.0\n3.0\n").unwrap();
        let err = read_layer_array(&path).unwrap_err();
        assert!(matches!(
            err,
            FieldLoadError::Ragged {
                line: 2,
                expected: 2,
                found: 1,
                ..
            }
        ));
    }
}
