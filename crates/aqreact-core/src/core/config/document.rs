use ndarray::Array3;
use std::fs;
use std::path::Path;
use thiserror::Error;
use toml::{Table, Value};
use tracing::warn;

use super::model::{PhaseGroupKind, SimulationConfig};
use super::schedule::{ReactionSchedule, ReactionTiming, ScheduleError, TstepIssue};

/// Errors raised while loading, validating, or persisting a configuration
/// document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("configuration key '{key}': expected {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Flattens a nested document into `_`-joined attribute keys.
///
/// `{equilibrium_phases: {si: {calcite: 0.0}}}` becomes the single pair
/// `("equilibrium_phases_si_calcite", 0.0)`. Insertion order of the source
/// document is preserved. The `reactive` section must be removed by the
/// caller before flattening; it is handled specially so that phase keys
/// sharing a `reactive_` prefix can never collide with it.
pub fn flatten(table: &Table) -> Vec<(String, Value)> {
    let mut items = Vec::new();
    flatten_into(table, None, &mut items);
    items
}

fn flatten_into(table: &Table, parent: Option<&str>, out: &mut Vec<(String, Value)>) {
    for (key, value) in table {
        let joined = match parent {
            Some(prefix) => format!("{prefix}_{key}"),
            None => key.clone(),
        };
        match value {
            Value::Table(inner) => flatten_into(inner, Some(&joined), out),
            other => out.push((joined, other.clone())),
        }
    }
}

impl SimulationConfig {
    /// Builds the typed model from a nested configuration document.
    ///
    /// The `reactive` section is validated directly; every other section is
    /// flattened into the attribute namespace and re-expanded through the
    /// phase-group registry. Keys that match no registered field pass
    /// through unchanged.
    pub fn from_dict(mut doc: Table) -> Result<Self, ConfigError> {
        let reactive = match doc.remove("reactive") {
            Some(Value::Table(table)) => parse_reactive(table)?,
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    key: "reactive".to_string(),
                    expected: "a table",
                    found: other.type_str(),
                });
            }
            None => ReactionSchedule::default(),
        };

        let mut config = SimulationConfig {
            reactive,
            ..Default::default()
        };
        for (key, value) in flatten(&doc) {
            // Leftover reactive_* attributes would shadow the reactive
            // section; they are dropped, matching the flatten rule.
            if key.starts_with("reactive_") {
                warn!(
                    key = key.as_str(),
                    "dropping flattened key shadowing the reactive section"
                );
                continue;
            }
            config.set_flat_attribute(&key, value)?;
        }
        Ok(config)
    }

    /// Serializes the model back into a nested document.
    ///
    /// Output ordering is deterministic so persisted documents stay
    /// diff-stable: `reactive` first, phase groups alphabetically (with
    /// `names` ahead of the per-species sub-sections, sub-sections
    /// alphabetically), then passthrough keys alphabetically.
    pub fn to_dict(&self) -> Table {
        let mut doc = Table::new();
        doc.insert(
            "reactive".to_string(),
            Value::Table(reactive_to_table(&self.reactive)),
        );

        for (kind, group) in &self.phases {
            let mut section = Table::new();
            if let Some(names) = &group.names {
                section.insert(
                    "names".to_string(),
                    Value::Array(names.iter().map(|n| Value::String(n.clone())).collect()),
                );
            }
            if !group.formula.is_empty() {
                let mut sub = Table::new();
                for (species, formula) in &group.formula {
                    sub.insert(species.clone(), Value::String(formula.clone()));
                }
                section.insert("formula".to_string(), Value::Table(sub));
            }
            if group.m0.values().any(|slot| slot.is_some()) {
                let mut sub = Table::new();
                for (species, slot) in &group.m0 {
                    if let Some(array) = slot {
                        sub.insert(species.clone(), array3_to_value(array));
                    }
                }
                section.insert("m0".to_string(), Value::Table(sub));
            }
            if !group.parms.is_empty() {
                let mut sub = Table::new();
                for (species, parms) in &group.parms {
                    sub.insert(
                        species.clone(),
                        Value::Array(parms.iter().map(|p| Value::Float(*p)).collect()),
                    );
                }
                section.insert("parms".to_string(), Value::Table(sub));
            }
            if !group.si.is_empty() {
                let mut sub = Table::new();
                for (species, si) in &group.si {
                    sub.insert(species.clone(), Value::Float(*si));
                }
                section.insert("si".to_string(), Value::Table(sub));
            }
            doc.insert(kind.section_name().to_string(), Value::Table(section));
        }

        for (key, value) in &self.extra {
            doc.insert(key.clone(), value.clone());
        }
        doc
    }

    /// Loads a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let doc: Table = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_dict(doc)
    }

    /// Renders the configuration as a TOML document.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self.to_dict())?)
    }

    /// Saves the configuration to a TOML file, replacing any existing one.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_toml_string()?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies flat attribute pairs, e.g. from programmatic configuration.
    pub fn add_new_configuration(
        &mut self,
        attrs: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in attrs {
            self.set_flat_attribute(&key, value)?;
        }
        Ok(())
    }

    /// Routes one flat `_`-joined attribute into its typed field.
    ///
    /// The phase-group registry replaces prefix-matching heuristics: a key
    /// either addresses a registered `names`/`si`/`parms`/`formula`/`m0`
    /// field of a known group, or it passes through to the `extra` map.
    pub fn set_flat_attribute(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        for kind in PhaseGroupKind::ALL {
            let Some(rest) = key.strip_prefix(kind.section_name()) else {
                continue;
            };
            let Some(rest) = rest.strip_prefix('_') else {
                continue;
            };
            if rest == "names" {
                self.phase_group_mut(kind).names = Some(as_string_array(key, &value)?);
                return Ok(());
            }
            if let Some(species) = rest.strip_prefix("si_") {
                let si = as_float(key, &value)?;
                self.phase_group_mut(kind).si.insert(species.to_string(), si);
                return Ok(());
            }
            if let Some(species) = rest.strip_prefix("parms_") {
                let parms = as_float_array(key, &value)?;
                self.phase_group_mut(kind)
                    .parms
                    .insert(species.to_string(), parms);
                return Ok(());
            }
            if let Some(species) = rest.strip_prefix("formula_") {
                let formula = as_string(key, &value)?;
                self.phase_group_mut(kind)
                    .formula
                    .insert(species.to_string(), formula);
                return Ok(());
            }
            if let Some(species) = rest.strip_prefix("m0_") {
                let array = as_array3(key, &value)?;
                self.phase_group_mut(kind)
                    .m0
                    .insert(species.to_string(), Some(array));
                return Ok(());
            }
            warn!(
                key,
                group = kind.section_name(),
                "unknown phase-group field, passing through unchanged"
            );
            break;
        }
        self.extra.insert(key.to_string(), value);
        Ok(())
    }
}

fn parse_reactive(table: Table) -> Result<ReactionSchedule, ConfigError> {
    let mut enabled = true;
    let mut timing = ReactionTiming::All;
    let mut raw_tsteps: Vec<Vec<i64>> = Vec::new();
    let mut externalio = false;

    for (key, value) in table {
        match key.as_str() {
            "enabled" => enabled = as_bool("reactive.enabled", &value)?,
            "timing" => {
                timing = as_string("reactive.timing", &value)?.parse::<ReactionTiming>()?;
            }
            "tsteps" => raw_tsteps = parse_raw_tsteps(&value)?,
            "externalio" => externalio = as_bool("reactive.externalio", &value)?,
            other => warn!(key = other, "ignoring unknown key in the reactive section"),
        }
    }

    let pairs = ReactionSchedule::validate_tsteps(&raw_tsteps)?;
    Ok(ReactionSchedule::new(enabled, timing, pairs, externalio))
}

fn parse_raw_tsteps(value: &Value) -> Result<Vec<Vec<i64>>, ConfigError> {
    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            return Err(ConfigError::TypeMismatch {
                key: "reactive.tsteps".to_string(),
                expected: "an array of (period, step) pairs",
                found: other.type_str(),
            });
        }
    };

    let mut raw = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Value::Array(pair) = entry else {
            return Err(ScheduleError::InvalidTstep {
                index,
                issue: TstepIssue::NotASequence,
            }
            .into());
        };
        let mut elements = Vec::with_capacity(pair.len());
        for element in pair {
            match element {
                Value::Integer(n) => elements.push(*n),
                _ => {
                    return Err(ScheduleError::InvalidTstep {
                        index,
                        issue: TstepIssue::NotAnInteger,
                    }
                    .into());
                }
            }
        }
        raw.push(elements);
    }
    Ok(raw)
}

fn reactive_to_table(schedule: &ReactionSchedule) -> Table {
    let mut table = Table::new();
    table.insert("enabled".to_string(), Value::Boolean(schedule.enabled));
    table.insert(
        "timing".to_string(),
        Value::String(schedule.timing.as_str().to_string()),
    );
    table.insert(
        "tsteps".to_string(),
        Value::Array(
            schedule
                .tsteps
                .iter()
                .map(|(period, step)| {
                    Value::Array(vec![
                        Value::Integer(*period as i64),
                        Value::Integer(*step as i64),
                    ])
                })
                .collect(),
        ),
    );
    table.insert(
        "externalio".to_string(),
        Value::Boolean(schedule.externalio),
    );
    table
}

fn as_bool(key: &str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| ConfigError::TypeMismatch {
        key: key.to_string(),
        expected: "a boolean",
        found: value.type_str(),
    })
}

fn as_string(key: &str, value: &Value) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::TypeMismatch {
            key: key.to_string(),
            expected: "a string",
            found: value.type_str(),
        })
}

fn as_float(key: &str, value: &Value) -> Result<f64, ConfigError> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Integer(i) => Ok(*i as f64),
        other => Err(ConfigError::TypeMismatch {
            key: key.to_string(),
            expected: "a float",
            found: other.type_str(),
        }),
    }
}

fn as_string_array(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let entries = value.as_array().ok_or_else(|| ConfigError::TypeMismatch {
        key: key.to_string(),
        expected: "an array of strings",
        found: value.type_str(),
    })?;
    entries.iter().map(|entry| as_string(key, entry)).collect()
}

fn as_float_array(key: &str, value: &Value) -> Result<Vec<f64>, ConfigError> {
    let entries = value.as_array().ok_or_else(|| ConfigError::TypeMismatch {
        key: key.to_string(),
        expected: "an array of floats",
        found: value.type_str(),
    })?;
    entries.iter().map(|entry| as_float(key, entry)).collect()
}

fn as_array3(key: &str, value: &Value) -> Result<Array3<f64>, ConfigError> {
    let mismatch = || ConfigError::TypeMismatch {
        key: key.to_string(),
        expected: "a rectangular 3-D array of floats",
        found: value.type_str(),
    };

    let layers = value.as_array().ok_or_else(mismatch)?;
    let mut data = Vec::new();
    let mut nrow = 0;
    let mut ncol = 0;
    for (l, layer) in layers.iter().enumerate() {
        let rows = layer.as_array().ok_or_else(mismatch)?;
        if l == 0 {
            nrow = rows.len();
        } else if rows.len() != nrow {
            return Err(mismatch());
        }
        for (r, row) in rows.iter().enumerate() {
            let cols = row.as_array().ok_or_else(mismatch)?;
            if l == 0 && r == 0 {
                ncol = cols.len();
            } else if cols.len() != ncol {
                return Err(mismatch());
            }
            for col in cols {
                data.push(as_float(key, col)?);
            }
        }
    }
    Array3::from_shape_vec((layers.len(), nrow, ncol), data).map_err(|_| mismatch())
}

fn array3_to_value(array: &Array3<f64>) -> Value {
    Value::Array(
        array
            .outer_iter()
            .map(|layer| {
                Value::Array(
                    layer
                        .outer_iter()
                        .map(|row| Value::Array(row.iter().map(|v| Value::Float(*v)).collect()))
                        .collect(),
                )
            })
            .collect(),
    )
}
