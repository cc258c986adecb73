use ndarray::{Array1, Array2};
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::core::config::SimulationConfig;
use crate::core::grid::{FlowGridInfo, GridError, GridShape, total_cells};
use crate::core::io::layers::{layer_file_paths, read_external_files};
use crate::engine::commands::{Command, CommandLog};
use crate::engine::error::EngineError;
use crate::engine::replay::{CommandSink, ReplayOutcome, replay};
use crate::engine::script::{ScriptTemplate, generate_new_script};

/// Configuration document expected in the working directory.
pub const CONFIG_FILE_NAME: &str = "aqreact.toml";
/// Recorded engine command log expected in the working directory.
pub const COMMAND_LOG_NAME: &str = "aqreact.yaml";
/// Name of the regenerated command log written next to the inputs.
pub const OUTPUT_LOG_NAME: &str = "aqreact_regen.yaml";

/// Engine directive clearing prior solution/component state before the
/// regenerated definitions take over.
const CLEAR_STATE_DIRECTIVE: &str = "DELETE; -all";

/// Number of reaction-module slots per cell in the initial-condition
/// vector. Slot 0 is the solution state; slots 1-6 map to the phase groups.
const MODULE_SLOTS: usize = 7;

/// Reorders the replayed initial-condition vector for per-cell definitions.
///
/// The vector arrives flattened as `(slots, cells)`. For every phase group
/// present in the configuration, its slot column is overwritten with the
/// 1-based cell index sequence, matching the one-block-per-cell script
/// generation, then the result is flattened back in the engine's
/// column-major layout.
pub fn rebuild_initial_conditions(
    ic1: Vec<i32>,
    config: &SimulationConfig,
    nxyz: usize,
) -> Result<Vec<i32>, EngineError> {
    let expected = MODULE_SLOTS * nxyz;
    if ic1.len() != expected {
        return Err(EngineError::InitialConditionShape {
            expected,
            found: ic1.len(),
        });
    }
    let slots = Array2::from_shape_vec((MODULE_SLOTS, nxyz), ic1)
        .expect("length checked against the slot layout");
    let mut cells = slots.reversed_axes();

    for kind in config.phases.keys() {
        let column = Array1::from_iter(1..=nxyz as i32);
        cells.column_mut(kind.module_slot()).assign(&column);
    }

    Ok(cells.t().iter().copied().collect())
}

/// Rebuilds the reaction-engine inputs for one working directory.
///
/// Construction reads the configuration document; [`regenerate`] then
/// drives the whole pipeline against a command sink and a grid-geometry
/// provider. One regeneration run owns its working directory and engine
/// handle exclusively; concurrent runs over the same directory must be
/// serialized by the caller.
///
/// [`regenerate`]: Regenerator::regenerate
#[derive(Debug, Clone)]
pub struct Regenerator {
    workdir: PathBuf,
    template_name: String,
    config: SimulationConfig,
}

/// Summary of one completed regeneration run.
#[derive(Debug, Clone)]
pub struct RegenerationReport {
    pub total_cells: usize,
    pub script: String,
    pub replay: ReplayOutcome,
    pub log_path: PathBuf,
}

impl Regenerator {
    /// Opens a working directory, reading its configuration document.
    pub fn open(
        workdir: impl Into<PathBuf>,
        template_name: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let workdir = workdir.into();
        let config = SimulationConfig::from_toml_file(workdir.join(CONFIG_FILE_NAME))?;
        Ok(Self {
            workdir,
            template_name: template_name.into(),
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    /// Checks that the template script and every per-layer species file
    /// exist, reporting all missing paths together.
    pub fn validate_external_files(&self, shape: GridShape) -> Result<(), EngineError> {
        let mut missing = Vec::new();
        let template = self.workdir.join(&self.template_name);
        if !template.exists() {
            missing.push(template);
        }
        for (kind, group) in &self.config.phases {
            let Some(names) = &group.names else { continue };
            for species in names {
                for path in layer_file_paths(&self.workdir, *kind, species, shape.nlay) {
                    if !path.exists() {
                        missing.push(path);
                    }
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::MissingExternalFiles { paths: missing })
        }
    }

    /// Runs the full regeneration pipeline.
    ///
    /// Replays the recorded log (capturing the initial-condition vector),
    /// merges the external species fields, regenerates the input script,
    /// rebuilds the initial conditions, re-issues the deferred execution
    /// commands, and asks the engine to persist the final command log.
    #[instrument(skip_all, name = "regeneration_workflow")]
    pub fn regenerate<S: CommandSink>(
        &mut self,
        grid: &dyn FlowGridInfo,
        engine: &mut S,
    ) -> Result<RegenerationReport, EngineError> {
        let nxyz = total_cells(grid)?;
        let shape = grid
            .structured_shape()
            .ok_or_else(|| GridError::MissingGeometry {
                kind: grid.grid_kind().to_string(),
                what: "a structured (nlay, nrow, ncol) shape",
            })?;
        info!(nxyz, ?shape, "Starting regeneration: replaying recorded engine setup.");

        let log = CommandLog::from_yaml_file(self.workdir.join(COMMAND_LOG_NAME))?;
        let outcome = replay(&log, engine);
        let ic1 = outcome
            .initial_conditions
            .clone()
            .ok_or(EngineError::MissingInitialConditions)?;

        info!("Merging external species fields.");
        read_external_files(&mut self.config, &self.workdir, shape);
        self.config.consistent_m0_shape()?;

        info!("Generating per-cell reaction definitions.");
        let template = ScriptTemplate::from_path(self.workdir.join(&self.template_name))?;
        let script = generate_new_script(&self.config, &template, nxyz)?;

        let ic1 = rebuild_initial_conditions(ic1, &self.config, nxyz)?;

        info!("Re-issuing execution commands against the engine.");
        let second_pass = [
            Command::RunString {
                workers: true,
                initial_phreeqc: true,
                utility: true,
                input_string: script.clone(),
            },
            Command::RunString {
                workers: true,
                initial_phreeqc: true,
                utility: true,
                input_string: CLEAR_STATE_DIRECTIVE.to_string(),
            },
            Command::AddOutputVars {
                option: "AddOutputVars".to_string(),
                definition: "true".to_string(),
            },
            Command::FindComponents,
            Command::InitialPhreeqc2Module { ic: ic1 },
            Command::RunCells,
            Command::SetTime { time: 0.0 },
        ];
        for command in &second_pass {
            engine.apply(command).map_err(|err| EngineError::Engine {
                key: command.key().to_string(),
                message: err.to_string(),
            })?;
        }

        let log_path = self.workdir.join(OUTPUT_LOG_NAME);
        engine
            .write_log(&log_path)
            .map_err(|err| EngineError::Engine {
                key: "WriteLog".to_string(),
                message: err.to_string(),
            })?;
        info!(path = %log_path.display(), "Regeneration complete.");

        Ok(RegenerationReport {
            total_cells: nxyz,
            script,
            replay: outcome,
            log_path,
        })
    }
}
