use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// One recorded reaction-engine operation.
///
/// The command log on disk is an ordered sequence of maps, each tagged by a
/// `key` naming the operation. The set of operations is closed; a tag
/// outside it deserializes to [`Command::Unrecognized`] so that nothing is
/// ever silently dropped by a dictionary miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "key")]
pub enum Command {
    SetGridCellCount { count: usize },
    ThreadCount { nthreads: i64 },
    SetComponentH2O { tf: bool },
    UseSolutionDensityVolume { tf: bool },
    SetFilePrefix { prefix: String },
    OpenFiles,
    SetErrorHandlerMode { mode: i64 },
    SetRebalanceFraction { f: f64 },
    SetRebalanceByCell { tf: bool },
    SetPartitionUZSolids { tf: bool },
    SetUnitsSolution { option: i64 },
    SetUnitsPPassemblage { option: i64 },
    SetUnitsExchange { option: i64 },
    SetUnitsSurface { option: i64 },
    SetUnitsGasPhase { option: i64 },
    SetUnitsSSassemblage { option: i64 },
    SetUnitsKinetics { option: i64 },
    SetPorosity { por: Vec<f64> },
    SetPrintChemistryMask { cell_mask: Vec<i32> },
    SetPrintChemistryOn {
        workers: bool,
        initial_phreeqc: bool,
        utility: bool,
    },
    SetRepresentativeVolume { rv: Vec<f64> },
    LoadDatabase { database: String },
    RunFile {
        workers: bool,
        initial_phreeqc: bool,
        utility: bool,
        chemistry_name: String,
    },
    RunString {
        workers: bool,
        initial_phreeqc: bool,
        utility: bool,
        input_string: String,
    },
    AddOutputVars { option: String, definition: String },
    FindComponents,
    InitialPhreeqc2Module { ic: Vec<i32> },
    RunCells,
    SetTime { time: f64 },
    /// A log entry whose tag matches no known operation.
    #[serde(skip)]
    Unrecognized { key: String },
}

impl Command {
    /// The operation tag, as it appears in the log document.
    pub fn key(&self) -> &str {
        match self {
            Command::SetGridCellCount { .. } => "SetGridCellCount",
            Command::ThreadCount { .. } => "ThreadCount",
            Command::SetComponentH2O { .. } => "SetComponentH2O",
            Command::UseSolutionDensityVolume { .. } => "UseSolutionDensityVolume",
            Command::SetFilePrefix { .. } => "SetFilePrefix",
            Command::OpenFiles => "OpenFiles",
            Command::SetErrorHandlerMode { .. } => "SetErrorHandlerMode",
            Command::SetRebalanceFraction { .. } => "SetRebalanceFraction",
            Command::SetRebalanceByCell { .. } => "SetRebalanceByCell",
            Command::SetPartitionUZSolids { .. } => "SetPartitionUZSolids",
            Command::SetUnitsSolution { .. } => "SetUnitsSolution",
            Command::SetUnitsPPassemblage { .. } => "SetUnitsPPassemblage",
            Command::SetUnitsExchange { .. } => "SetUnitsExchange",
            Command::SetUnitsSurface { .. } => "SetUnitsSurface",
            Command::SetUnitsGasPhase { .. } => "SetUnitsGasPhase",
            Command::SetUnitsSSassemblage { .. } => "SetUnitsSSassemblage",
            Command::SetUnitsKinetics { .. } => "SetUnitsKinetics",
            Command::SetPorosity { .. } => "SetPorosity",
            Command::SetPrintChemistryMask { .. } => "SetPrintChemistryMask",
            Command::SetPrintChemistryOn { .. } => "SetPrintChemistryOn",
            Command::SetRepresentativeVolume { .. } => "SetRepresentativeVolume",
            Command::LoadDatabase { .. } => "LoadDatabase",
            Command::RunFile { .. } => "RunFile",
            Command::RunString { .. } => "RunString",
            Command::AddOutputVars { .. } => "AddOutputVars",
            Command::FindComponents => "FindComponents",
            Command::InitialPhreeqc2Module { .. } => "InitialPhreeqc2Module",
            Command::RunCells => "RunCells",
            Command::SetTime { .. } => "SetTime",
            Command::Unrecognized { key } => key,
        }
    }

    /// Whether this is an execution command.
    ///
    /// Execution commands are not replayed during reconstruction: their
    /// payload and ordering depend on artifacts (the regenerated script,
    /// the rebuilt initial conditions) that do not exist yet at load time.
    /// The workflow re-issues them explicitly afterwards.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Command::RunFile { .. }
                | Command::RunString { .. }
                | Command::AddOutputVars { .. }
                | Command::FindComponents
                | Command::RunCells
                | Command::SetTime { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum CommandLogError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("YAML parsing error for '{path}': {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("YAML serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// An ordered engine command log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLog {
    pub entries: Vec<Command>,
}

impl CommandLog {
    pub fn new(entries: Vec<Command>) -> Self {
        Self { entries }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CommandLogError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CommandLogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|source| match source {
            CommandLogError::Serialize(source) => CommandLogError::Yaml {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parses a log document, preserving entry order.
    ///
    /// Each record is converted individually so a tag outside the known set
    /// becomes [`Command::Unrecognized`] instead of failing the whole log.
    pub fn from_yaml_str(text: &str) -> Result<Self, CommandLogError> {
        let raw: Vec<serde_yaml::Value> = serde_yaml::from_str(text)?;
        let entries = raw
            .into_iter()
            .map(|record| {
                let key = record
                    .get("key")
                    .and_then(serde_yaml::Value::as_str)
                    .unwrap_or("<missing key>")
                    .to_string();
                match serde_yaml::from_value::<Command>(record) {
                    Ok(command) => command,
                    Err(_) => Command::Unrecognized { key },
                }
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn to_yaml_string(&self) -> Result<String, CommandLogError> {
        let serializable: Vec<&Command> = self
            .entries
            .iter()
            .filter(|command| {
                let keep = !matches!(command, Command::Unrecognized { .. });
                if !keep {
                    warn!(key = command.key(), "dropping unrecognized entry from log");
                }
                keep
            })
            .collect();
        Ok(serde_yaml::to_string(&serializable)?)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<(), CommandLogError> {
        let path = path.as_ref();
        let text = self.to_yaml_string()?;
        fs::write(path, text).map_err(|source| CommandLogError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"
- key: SetGridCellCount
  count: 8
- key: ThreadCount
  nthreads: 2
- key: SetPorosity
  por: [0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3]
- key: RunFile
  workers: true
  initial_phreeqc: true
  utility: true
  chemistry_name: phinp.dat
- key: FrobnicateCells
  amount: 3
- key: SetTime
  time: 0.0
"#;

    #[test]
    fn parses_tagged_records_in_order() {
        let log = CommandLog::from_yaml_str(LOG).unwrap();
        assert_eq!(log.entries.len(), 6);
        assert_eq!(log.entries[0], Command::SetGridCellCount { count: 8 });
        assert_eq!(
            log.entries[3],
            Command::RunFile {
                workers: true,
                initial_phreeqc: true,
                utility: true,
                chemistry_name: "phinp.dat".to_string(),
            }
        );
    }

    #[test]
    fn unknown_tags_become_unrecognized_entries() {
        let log = CommandLog::from_yaml_str(LOG).unwrap();
        assert_eq!(
            log.entries[4],
            Command::Unrecognized {
                key: "FrobnicateCells".to_string()
            }
        );
    }

    #[test]
    fn execution_commands_are_classified() {
        let log = CommandLog::from_yaml_str(LOG).unwrap();
        let deferred: Vec<&str> = log
            .entries
            .iter()
            .filter(|c| c.is_execution())
            .map(|c| c.key())
            .collect();
        assert_eq!(deferred, vec!["RunFile", "SetTime"]);
    }

    #[test]
    fn yaml_round_trip_skips_unrecognized_entries() {
        let log = CommandLog::from_yaml_str(LOG).unwrap();
        let text = log.to_yaml_string().unwrap();
        let reparsed = CommandLog::from_yaml_str(&text).unwrap();
        assert_eq!(reparsed.entries.len(), 5);
        assert!(
            !reparsed
                .entries
                .iter()
                .any(|c| matches!(c, Command::Unrecognized { .. }))
        );
    }

    #[test]
    fn initial_conditions_payload_round_trips() {
        let log = CommandLog::new(vec![Command::InitialPhreeqc2Module {
            ic: vec![1, -1, 2, -1],
        }]);
        let text = log.to_yaml_string().unwrap();
        let reparsed = CommandLog::from_yaml_str(&text).unwrap();
        assert_eq!(reparsed, log);
    }
}
