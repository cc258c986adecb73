use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Controls when geochemical reactions are calculated during transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactionTiming {
    /// Calculate reactions at every time step.
    #[default]
    All,
    /// Calculate reactions only at user-registered `(period, step)` pairs.
    User,
    /// Adaptive timing based on convergence criteria. Currently a
    /// placeholder that behaves like [`ReactionTiming::All`].
    Adaptive,
}

impl ReactionTiming {
    /// The accepted spellings in configuration documents.
    pub const ALLOWED: [&'static str; 3] = ["all", "user", "adaptive"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionTiming::All => "all",
            ReactionTiming::User => "user",
            ReactionTiming::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for ReactionTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionTiming {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ReactionTiming::All),
            "user" => Ok(ReactionTiming::User),
            "adaptive" => Ok(ReactionTiming::Adaptive),
            other => Err(ScheduleError::InvalidTiming {
                value: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

/// Reasons a `(period, step)` entry can fail validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TstepIssue {
    /// The entry is not a sequence at all.
    NotASequence,
    /// The entry is not a pair (wrong number of elements).
    WrongArity(usize),
    /// An element of the pair is not an integer.
    NotAnInteger,
    /// Period and step are 1-based; zero or negative values are invalid.
    OutOfRange { period: i64, step: i64 },
}

impl fmt::Display for TstepIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TstepIssue::NotASequence => write!(f, "must be a (period, step) sequence"),
            TstepIssue::WrongArity(n) => {
                write!(f, "must be a pair of length 2, got {} element(s)", n)
            }
            TstepIssue::NotAnInteger => write!(f, "must contain integers"),
            TstepIssue::OutOfRange { period, step } => write!(
                f,
                "period and step must be 1-indexed, got ({}, {})",
                period, step
            ),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("reaction timing must be one of {allowed:?}, got '{value}'")]
    InvalidTiming {
        value: String,
        allowed: [&'static str; 3],
    },
    #[error("tsteps[{index}]: {issue}")]
    InvalidTstep { index: usize, issue: TstepIssue },
}

/// Reaction-timing schedule from the `reactive` configuration section.
///
/// Time-step 1 of stress period 1 is always a reaction step: `(1, 1)` is a
/// member of `tsteps` regardless of user input. Entries follow set
/// semantics, so duplicates collapse and iteration is ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSchedule {
    pub enabled: bool,
    pub timing: ReactionTiming,
    pub tsteps: BTreeSet<(u32, u32)>,
    pub externalio: bool,
}

impl Default for ReactionSchedule {
    fn default() -> Self {
        Self::new(true, ReactionTiming::All, [], false)
    }
}

impl ReactionSchedule {
    /// Builds a schedule from already-validated pairs, inserting `(1, 1)`.
    pub fn new(
        enabled: bool,
        timing: ReactionTiming,
        tsteps: impl IntoIterator<Item = (u32, u32)>,
        externalio: bool,
    ) -> Self {
        let mut tsteps: BTreeSet<(u32, u32)> = tsteps.into_iter().collect();
        tsteps.insert((1, 1));
        Self {
            enabled,
            timing,
            tsteps,
            externalio,
        }
    }

    /// Validates raw `(period, step)` pairs as read from a document.
    ///
    /// Each entry must be a 2-element integer pair with both elements >= 1.
    /// The error names the offending index and reason.
    pub fn validate_tsteps(raw: &[Vec<i64>]) -> Result<Vec<(u32, u32)>, ScheduleError> {
        let mut normalized = Vec::with_capacity(raw.len());
        for (index, pair) in raw.iter().enumerate() {
            if pair.len() != 2 {
                return Err(ScheduleError::InvalidTstep {
                    index,
                    issue: TstepIssue::WrongArity(pair.len()),
                });
            }
            let (period, step) = (pair[0], pair[1]);
            if period < 1 || step < 1 {
                return Err(ScheduleError::InvalidTstep {
                    index,
                    issue: TstepIssue::OutOfRange { period, step },
                });
            }
            normalized.push((period as u32, step as u32));
        }
        Ok(normalized)
    }

    /// Whether reactions should be calculated at `(period, step)`.
    ///
    /// Under `all` every step reacts; under `user` only registered pairs do.
    /// `adaptive` is a placeholder and reacts at every step.
    pub fn is_reaction_tstep(&self, period: u32, step: u32) -> bool {
        match self.timing {
            ReactionTiming::All => true,
            ReactionTiming::User => self.tsteps.contains(&(period, step)),
            ReactionTiming::Adaptive => true,
        }
    }

    /// The ascending step numbers registered for one stress period.
    pub fn tsteps_for_period(&self, period: u32) -> Vec<u32> {
        self.tsteps
            .iter()
            .filter(|(p, _)| *p == period)
            .map(|(_, s)| *s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_of_first_period_is_always_registered() {
        let schedule = ReactionSchedule::new(true, ReactionTiming::User, [(2, 5)], false);
        assert!(schedule.tsteps.contains(&(1, 1)));
    }

    #[test]
    fn duplicate_pairs_collapse() {
        let schedule =
            ReactionSchedule::new(true, ReactionTiming::User, [(1, 1), (2, 5), (2, 5)], false);
        assert_eq!(schedule.tsteps.len(), 2);
    }

    #[test]
    fn timing_all_reacts_at_undeclared_steps() {
        let schedule = ReactionSchedule::new(true, ReactionTiming::All, [], false);
        assert!(schedule.is_reaction_tstep(17, 93));
    }

    #[test]
    fn timing_user_is_a_membership_test() {
        let schedule = ReactionSchedule::new(true, ReactionTiming::User, [(1, 1), (2, 5)], false);
        assert!(schedule.is_reaction_tstep(2, 5));
        assert!(!schedule.is_reaction_tstep(2, 1));
    }

    #[test]
    fn steps_for_period_are_sorted_ascending() {
        let schedule =
            ReactionSchedule::new(true, ReactionTiming::User, [(1, 1), (1, 10), (2, 5)], false);
        assert_eq!(schedule.tsteps_for_period(1), vec![1, 10]);
        assert_eq!(schedule.tsteps_for_period(2), vec![5]);
        assert!(schedule.tsteps_for_period(3).is_empty());
    }

    #[test]
    fn invalid_timing_names_value_and_allowed_set() {
        let err = "sometimes".parse::<ReactionTiming>().unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InvalidTiming {
                value: "sometimes".to_string(),
                allowed: ReactionTiming::ALLOWED,
            }
        );
    }

    #[test]
    fn tstep_validation_reports_index_and_reason() {
        let err = ReactionSchedule::validate_tsteps(&[vec![1, 1], vec![2, 5, 9]]).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InvalidTstep {
                index: 1,
                issue: TstepIssue::WrongArity(3),
            }
        );

        let err = ReactionSchedule::validate_tsteps(&[vec![0, 3]]).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InvalidTstep {
                index: 0,
                issue: TstepIssue::OutOfRange { period: 0, step: 3 },
            }
        );
    }
}
