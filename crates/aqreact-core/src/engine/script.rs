use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::config::{PhaseGroupKind, SimulationConfig};

/// Section keywords that open a reaction definition in the template.
const REACTION_KEYWORDS: [&str; 6] = [
    "EQUILIBRIUM_PHASES",
    "KINETICS",
    "EXCHANGE",
    "GAS_PHASE",
    "SOLID_SOLUTIONS",
    "SURFACE",
];

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("template script has no '{keyword}' block")]
    MissingKeyword { keyword: &'static str },
    #[error("phase group '{group}' has no 'names' list")]
    MissingNames { group: &'static str },
    #[error("species '{species}' in '{group}' has no '{field}' value")]
    MissingField {
        group: &'static str,
        species: String,
        field: &'static str,
    },
    #[error("species '{species}' in '{group}' has no value for cell {cell}")]
    MissingCellValue {
        group: &'static str,
        species: String,
        cell: usize,
    },
}

/// Formats a magnitude in 5-digit scientific notation, `-1.23456e+07` style.
///
/// Wire-format contract with the reaction engine's text parser: sign and a
/// two-digit exponent are mandatory, which `{:e}` alone does not produce.
pub(crate) fn sci5(value: f64) -> String {
    let formatted = format!("{:.5e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("+", exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted,
    }
}

/// The static fragments of a reaction-engine input script.
///
/// A template script is split into the solution prefix (the `SOLUTION`
/// block, up to but excluding the first reaction-definition keyword) and
/// the output postfix (a `PRINT` directive plus everything from the first
/// `SELECTED_OUTPUT` keyword onward). The generated per-cell blocks are
/// sandwiched between the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    pub solution: String,
    pub postfix: String,
}

impl ScriptTemplate {
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let lines: Vec<&str> = text.lines().collect();
        fn first_token(line: &str) -> &str {
            line.trim_start().split_whitespace().next().unwrap_or("")
        }

        let solution_start = lines
            .iter()
            .position(|line| first_token(line) == "SOLUTION")
            .ok_or(ScriptError::MissingKeyword {
                keyword: "SOLUTION",
            })?;
        let output_start = lines
            .iter()
            .position(|line| first_token(line) == "SELECTED_OUTPUT")
            .ok_or(ScriptError::MissingKeyword {
                keyword: "SELECTED_OUTPUT",
            })?;

        let solution_end = lines
            .iter()
            .skip(solution_start)
            .position(|line| REACTION_KEYWORDS.contains(&first_token(line)))
            .map(|offset| solution_start + offset)
            .unwrap_or(output_start);

        let solution = lines[solution_start..solution_end].join("\n");
        let postfix = format!("PRINT\n{}", lines[output_start..].join("\n"));
        Ok(Self { solution, postfix })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }
}

/// Per-species data flattened for cell-indexed access during generation.
struct SpeciesColumn<'a> {
    species: &'a str,
    values: Vec<f64>,
}

impl<'a> SpeciesColumn<'a> {
    fn value_for_cell(
        &self,
        group: &'static str,
        cell: usize,
    ) -> Result<f64, ScriptError> {
        self.values
            .get(cell - 1)
            .copied()
            .ok_or_else(|| ScriptError::MissingCellValue {
                group,
                species: self.species.to_string(),
                cell,
            })
    }
}

fn m0_columns<'a>(
    config: &'a SimulationConfig,
    kind: PhaseGroupKind,
) -> Result<Vec<SpeciesColumn<'a>>, ScriptError> {
    let group = kind.section_name();
    let phase = config
        .phase_group(kind)
        .expect("caller checked group presence");
    let names = phase
        .names
        .as_ref()
        .ok_or(ScriptError::MissingNames { group })?;
    names
        .iter()
        .map(|species| {
            let array =
                phase
                    .m0_for(species)
                    .ok_or_else(|| ScriptError::MissingField {
                        group,
                        species: species.clone(),
                        field: "m0",
                    })?;
            Ok(SpeciesColumn {
                species,
                values: array.iter().copied().collect(),
            })
        })
        .collect()
}

/// Regenerates the full reaction-engine input script.
///
/// For every grid cell, one block per generated phase-group kind is
/// emitted, keyed by the 1-based cell index; the cell blocks are framed by
/// the template's solution prefix and output postfix. Missing per-species
/// scalars are fatal here, at the point of actual use.
#[instrument(skip_all, fields(nxyz))]
pub fn generate_new_script(
    config: &SimulationConfig,
    template: &ScriptTemplate,
    nxyz: usize,
) -> Result<String, ScriptError> {
    info!(nxyz, "regenerating reaction-engine input script");

    let mut script = String::new();
    script.push_str(template.solution.trim_end());
    script.push_str("\nEND\n");

    if config
        .phase_group(PhaseGroupKind::EquilibriumPhases)
        .is_some()
    {
        append_equilibrium_blocks(&mut script, config, nxyz)?;
    }
    if config.phase_group(PhaseGroupKind::KineticPhases).is_some() {
        append_kinetics_blocks(&mut script, config, nxyz)?;
    }
    if config.phase_group(PhaseGroupKind::ExchangePhases).is_some() {
        append_exchange_blocks(&mut script, config, nxyz)?;
    }

    script.push_str(&template.postfix);
    debug!(bytes = script.len(), "script assembled");
    Ok(script.trim().to_string())
}

fn append_equilibrium_blocks(
    script: &mut String,
    config: &SimulationConfig,
    nxyz: usize,
) -> Result<(), ScriptError> {
    let kind = PhaseGroupKind::EquilibriumPhases;
    let group = kind.section_name();
    let columns = m0_columns(config, kind)?;
    let phase = config.phase_group(kind).expect("group present");

    for cell in 1..=nxyz {
        script.push_str(&format!("EQUILIBRIUM_PHASES {cell}\n"));
        for column in &columns {
            let si = phase
                .si
                .get(column.species)
                .copied()
                .ok_or_else(|| ScriptError::MissingField {
                    group,
                    species: column.species.to_string(),
                    field: "si",
                })?;
            let m0 = column.value_for_cell(group, cell)?;
            script.push_str(&format!("    {} {} {}\n", column.species, sci5(si), sci5(m0)));
        }
        script.push_str("END\n");
    }
    Ok(())
}

fn append_kinetics_blocks(
    script: &mut String,
    config: &SimulationConfig,
    nxyz: usize,
) -> Result<(), ScriptError> {
    let kind = PhaseGroupKind::KineticPhases;
    let group = kind.section_name();
    let columns = m0_columns(config, kind)?;
    let phase = config.phase_group(kind).expect("group present");

    for cell in 1..=nxyz {
        script.push_str(&format!("KINETICS {cell}\n"));
        for column in &columns {
            let m0 = column.value_for_cell(group, cell)?;
            script.push_str(&format!("    {}\n", column.species));
            script.push_str(&format!("        -m0 {}\n", sci5(m0)));
            if let Some(parms) = phase.parms.get(column.species) {
                if !parms.is_empty() {
                    let rendered: Vec<String> = parms.iter().map(|p| sci5(*p)).collect();
                    script.push_str(&format!("        -parms {}\n", rendered.join(" ")));
                }
            }
            if let Some(formula) = phase.formula.get(column.species) {
                script.push_str(&format!("        -formula {formula}\n"));
            }
        }
        script.push_str("END\n");
    }
    Ok(())
}

fn append_exchange_blocks(
    script: &mut String,
    config: &SimulationConfig,
    nxyz: usize,
) -> Result<(), ScriptError> {
    let kind = PhaseGroupKind::ExchangePhases;
    let group = kind.section_name();
    let columns = m0_columns(config, kind)?;

    for cell in 1..=nxyz {
        script.push_str(&format!("EXCHANGE {cell}\n"));
        for column in &columns {
            let m0 = column.value_for_cell(group, cell)?;
            script.push_str(&format!("    {} {}\n", column.species, sci5(m0)));
        }
        // Exchanger composition always equilibrates against solution 1.
        script.push_str("    -equilibrate 1\nEND\n");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    const TEMPLATE: &str = "\
SOLUTION 0
    temp 25.0
    pH 7.0
    units mol/kgw
EQUILIBRIUM_PHASES 1
    Calcite 0.0 0.001
END
SELECTED_OUTPUT 1
    -reset false
    -totals C Ca
";

    fn base_config() -> SimulationConfig {
        SimulationConfig::default()
    }

    fn with_equilibrium(config: &mut SimulationConfig, m0: &[f64]) {
        let group = config.phase_group_mut(PhaseGroupKind::EquilibriumPhases);
        group.names = Some(vec!["Calcite".to_string()]);
        group.si.insert("Calcite".to_string(), 0.0);
        let n = m0.len();
        group.m0.insert(
            "Calcite".to_string(),
            Some(Array3::from_shape_vec((1, 1, n), m0.to_vec()).unwrap()),
        );
    }

    #[test]
    fn sci5_pads_exponents_to_two_digits_with_sign() {
        assert_eq!(sci5(0.0), "0.00000e+00");
        assert_eq!(sci5(1.0), "1.00000e+00");
        assert_eq!(sci5(-2.5e-3), "-2.50000e-03");
        assert_eq!(sci5(6.02e23), "6.02000e+23");
        assert_eq!(sci5(1.0e-100), "1.00000e-100");
    }

    #[test]
    fn template_split_keeps_solution_and_print_prefixed_postfix() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        assert!(template.solution.starts_with("SOLUTION 0"));
        assert!(template.solution.contains("units mol/kgw"));
        assert!(!template.solution.contains("EQUILIBRIUM_PHASES"));
        assert!(template.postfix.starts_with("PRINT\nSELECTED_OUTPUT 1"));
    }

    #[test]
    fn template_without_solution_block_is_rejected() {
        let err = ScriptTemplate::parse("SELECTED_OUTPUT 1\n").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::MissingKeyword {
                keyword: "SOLUTION"
            }
        ));
    }

    #[test]
    fn one_equilibrium_block_per_cell_with_fixed_formatting() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        with_equilibrium(&mut config, &[1.0, 2.0]);

        let script = generate_new_script(&config, &template, 2).unwrap();
        assert!(script.contains("EQUILIBRIUM_PHASES 1\n    Calcite 0.00000e+00 1.00000e+00\nEND"));
        assert!(script.contains("EQUILIBRIUM_PHASES 2\n    Calcite 0.00000e+00 2.00000e+00\nEND"));
        assert_eq!(script.matches("EQUILIBRIUM_PHASES").count(), 2);
    }

    #[test]
    fn kinetics_blocks_include_optional_parms_and_formula() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        let group = config.phase_group_mut(PhaseGroupKind::KineticPhases);
        group.names = Some(vec!["Pyrite".to_string()]);
        group.m0.insert(
            "Pyrite".to_string(),
            Some(Array3::from_shape_vec((1, 1, 1), vec![0.5]).unwrap()),
        );
        group
            .parms
            .insert("Pyrite".to_string(), vec![1.0e-3, 0.67]);
        group
            .formula
            .insert("Pyrite".to_string(), "FeS2".to_string());

        let script = generate_new_script(&config, &template, 1).unwrap();
        assert!(script.contains(
            "KINETICS 1\n    Pyrite\n        -m0 5.00000e-01\n        \
             -parms 1.00000e-03 6.70000e-01\n        -formula FeS2\nEND"
        ));
    }

    #[test]
    fn kinetics_blocks_omit_undeclared_parms_and_formula() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        let group = config.phase_group_mut(PhaseGroupKind::KineticPhases);
        group.names = Some(vec!["Pyrite".to_string()]);
        group.m0.insert(
            "Pyrite".to_string(),
            Some(Array3::from_shape_vec((1, 1, 1), vec![0.5]).unwrap()),
        );

        let script = generate_new_script(&config, &template, 1).unwrap();
        assert!(!script.contains("-parms"));
        assert!(!script.contains("-formula"));
    }

    #[test]
    fn exchange_blocks_always_equilibrate_once() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        let group = config.phase_group_mut(PhaseGroupKind::ExchangePhases);
        group.names = Some(vec!["X".to_string()]);
        group.m0.insert(
            "X".to_string(),
            Some(Array3::from_shape_vec((1, 1, 2), vec![0.1, 0.2]).unwrap()),
        );

        let script = generate_new_script(&config, &template, 2).unwrap();
        assert_eq!(script.matches("-equilibrate 1").count(), 2);
        assert!(script.contains("EXCHANGE 1\n    X 1.00000e-01\n    -equilibrate 1\nEND"));
    }

    #[test]
    fn missing_si_is_fatal_at_generation_time() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        with_equilibrium(&mut config, &[1.0]);
        config
            .phase_group_mut(PhaseGroupKind::EquilibriumPhases)
            .si
            .clear();

        let err = generate_new_script(&config, &template, 1).unwrap_err();
        assert!(matches!(err, ScriptError::MissingField { field: "si", .. }));
    }

    #[test]
    fn absent_species_array_is_fatal_at_generation_time() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        with_equilibrium(&mut config, &[1.0]);
        config
            .phase_group_mut(PhaseGroupKind::EquilibriumPhases)
            .m0
            .insert("Calcite".to_string(), None);

        let err = generate_new_script(&config, &template, 1).unwrap_err();
        assert!(matches!(err, ScriptError::MissingField { field: "m0", .. }));
    }

    #[test]
    fn group_without_names_is_an_error_not_a_skip() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        config.phase_group_mut(PhaseGroupKind::ExchangePhases);

        let err = generate_new_script(&config, &template, 1).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::MissingNames {
                group: "exchange_phases"
            }
        ));
    }

    #[test]
    fn zero_species_exchange_still_emits_header_and_equilibrate() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        config.phase_group_mut(PhaseGroupKind::ExchangePhases).names = Some(Vec::new());

        let script = generate_new_script(&config, &template, 2).unwrap();
        assert!(script.contains("EXCHANGE 1\n    -equilibrate 1\nEND"));
        assert!(script.contains("EXCHANGE 2\n    -equilibrate 1\nEND"));
        assert_eq!(script.matches("-equilibrate 1").count(), 2);
    }

    #[test]
    fn script_starts_with_solution_and_ends_with_postfix() {
        let template = ScriptTemplate::parse(TEMPLATE).unwrap();
        let mut config = base_config();
        with_equilibrium(&mut config, &[1.0]);

        let script = generate_new_script(&config, &template, 1).unwrap();
        assert!(script.starts_with("SOLUTION 0"));
        assert!(script.ends_with("-totals C Ca"));
    }
}
