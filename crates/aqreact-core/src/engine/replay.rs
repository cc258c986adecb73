use std::path::Path;
use tracing::{debug, info, instrument, warn};

use super::commands::{Command, CommandLog, CommandLogError};

/// An opaque handle to the external reaction engine.
///
/// The engine's execution semantics are out of scope; the coupling only
/// needs to hand commands over, one at a time, and ask the engine to
/// persist its own command log.
pub trait CommandSink {
    type Error: std::error::Error;

    /// Applies one command to the engine.
    fn apply(&mut self, command: &Command) -> Result<(), Self::Error>;

    /// Persists the engine's accumulated command log to a document.
    fn write_log(&self, path: &Path) -> Result<(), Self::Error>;
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayOutcome {
    /// Commands applied to the engine.
    pub applied: usize,
    /// Execution commands left for the caller to re-issue.
    pub deferred: usize,
    /// Unrecognized entries skipped.
    pub skipped: usize,
    /// Entries whose application failed (reported, not fatal).
    pub failed: usize,
    /// The captured initial-condition vector, if the log carried one.
    pub initial_conditions: Option<Vec<i32>>,
}

/// Replays a recorded command log against an engine handle.
///
/// Entries are processed strictly in log order. Execution commands are
/// deferred (their payloads depend on artifacts regenerated later), the
/// initial-condition payload is captured without being applied, and a
/// failing entry is reported with its tag and error, then skipped so the
/// remaining log still replays.
#[instrument(skip_all, name = "command_log_replay")]
pub fn replay<S: CommandSink>(log: &CommandLog, sink: &mut S) -> ReplayOutcome {
    let mut outcome = ReplayOutcome::default();
    for command in &log.entries {
        match command {
            Command::Unrecognized { key } => {
                warn!(key = key.as_str(), "unknown operation in command log");
                outcome.skipped += 1;
            }
            Command::InitialPhreeqc2Module { ic } => {
                debug!(cells = ic.len(), "captured initial-condition vector");
                outcome.initial_conditions = Some(ic.clone());
            }
            command if command.is_execution() => {
                debug!(key = command.key(), "deferring execution command");
                outcome.deferred += 1;
            }
            command => match sink.apply(command) {
                Ok(()) => outcome.applied += 1,
                Err(err) => {
                    warn!(key = command.key(), error = %err, "command application failed");
                    outcome.failed += 1;
                }
            },
        }
    }
    info!(
        applied = outcome.applied,
        deferred = outcome.deferred,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "replay complete"
    );
    outcome
}

/// A [`CommandSink`] that records every applied command.
///
/// Stands in for the engine's own serializer at the process boundary: the
/// accumulated commands are written out as a YAML command log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    commands: Vec<Command>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_log(self) -> CommandLog {
        CommandLog::new(self.commands)
    }
}

impl CommandSink for RecordingSink {
    type Error = CommandLogError;

    fn apply(&mut self, command: &Command) -> Result<(), Self::Error> {
        self.commands.push(command.clone());
        Ok(())
    }

    fn write_log(&self, path: &Path) -> Result<(), Self::Error> {
        CommandLog::new(self.commands.clone()).to_yaml_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct FailOn {
        key: &'static str,
        recorded: Vec<String>,
    }

    #[derive(Debug)]
    struct FailError;

    impl fmt::Display for FailError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("injected failure")
        }
    }

    impl std::error::Error for FailError {}

    impl CommandSink for FailOn {
        type Error = FailError;

        fn apply(&mut self, command: &Command) -> Result<(), Self::Error> {
            if command.key() == self.key {
                return Err(FailError);
            }
            self.recorded.push(command.key().to_string());
            Ok(())
        }

        fn write_log(&self, _path: &Path) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn sample_log() -> CommandLog {
        CommandLog::new(vec![
            Command::RunFile {
                workers: true,
                initial_phreeqc: true,
                utility: true,
                chemistry_name: "phinp.dat".to_string(),
            },
            Command::SetPorosity {
                por: vec![0.3, 0.3],
            },
            Command::InitialPhreeqc2Module { ic: vec![1, -1] },
            Command::Unrecognized {
                key: "FrobnicateCells".to_string(),
            },
            Command::SetTime { time: 0.0 },
        ])
    }

    #[test]
    fn execution_commands_are_deferred() {
        let mut sink = RecordingSink::new();
        let outcome = replay(&sample_log(), &mut sink);
        // Only the porosity entry reaches the engine.
        assert_eq!(sink.commands().len(), 1);
        assert_eq!(sink.commands()[0].key(), "SetPorosity");
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.deferred, 2);
    }

    #[test]
    fn initial_conditions_are_captured_not_applied() {
        let mut sink = RecordingSink::new();
        let outcome = replay(&sample_log(), &mut sink);
        assert_eq!(outcome.initial_conditions, Some(vec![1, -1]));
        assert!(
            !sink
                .commands()
                .iter()
                .any(|c| matches!(c, Command::InitialPhreeqc2Module { .. }))
        );
    }

    #[test]
    fn a_failing_entry_does_not_abort_the_replay() {
        let log = CommandLog::new(vec![
            Command::OpenFiles,
            Command::SetPorosity { por: vec![0.1] },
            Command::ThreadCount { nthreads: 4 },
        ]);
        let mut sink = FailOn {
            key: "SetPorosity",
            recorded: Vec::new(),
        };
        let outcome = replay(&log, &mut sink);
        assert_eq!(outcome.failed, 1);
        assert_eq!(sink.recorded, vec!["OpenFiles", "ThreadCount"]);
    }

    #[test]
    fn unrecognized_entries_are_counted_as_skipped() {
        let mut sink = RecordingSink::new();
        let outcome = replay(&sample_log(), &mut sink);
        assert_eq!(outcome.skipped, 1);
    }
}
