use crate::ProfileError;
use std::fmt;

/// Phase of one profile execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AcquiringManager,
    AcquiringFeature,
    Submitting,
    Interpreting,
    Completed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AcquiringManager => "acquiring-manager",
            Self::AcquiringFeature => "acquiring-feature",
            Self::Submitting => "submitting",
            Self::Interpreting => "interpreting",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

pub fn validate_transition(from: Phase, to: Phase) -> Result<(), ProfileError> {
    let valid = matches!(
        (from, to),
        (Phase::Idle, Phase::AcquiringManager)
            | (
                Phase::AcquiringManager | Phase::AcquiringFeature,
                Phase::AcquiringManager | Phase::AcquiringFeature
            )
            | (Phase::AcquiringFeature, Phase::Submitting)
            | (Phase::Submitting, Phase::Interpreting)
    ) || (!from.is_terminal() && to.is_terminal());

    if valid {
        Ok(())
    } else {
        Err(ProfileError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(Phase::Idle, Phase::AcquiringManager).is_ok());
        assert!(validate_transition(Phase::AcquiringManager, Phase::AcquiringFeature).is_ok());
        assert!(validate_transition(Phase::AcquiringFeature, Phase::AcquiringManager).is_ok()); // restart from the top
        assert!(validate_transition(Phase::AcquiringFeature, Phase::Submitting).is_ok());
        assert!(validate_transition(Phase::Submitting, Phase::Interpreting).is_ok());
        assert!(validate_transition(Phase::Interpreting, Phase::Completed).is_ok());
        assert!(validate_transition(Phase::AcquiringManager, Phase::Completed).is_ok()); // watchdog
        assert!(validate_transition(Phase::Idle, Phase::Completed).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Phase::Idle, Phase::Submitting).is_err());
        assert!(validate_transition(Phase::AcquiringManager, Phase::Submitting).is_err());
        assert!(validate_transition(Phase::Interpreting, Phase::AcquiringManager).is_err());
        assert!(validate_transition(Phase::Completed, Phase::Completed).is_err());
        assert!(validate_transition(Phase::Completed, Phase::AcquiringManager).is_err());
    }
}
