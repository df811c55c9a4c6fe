use crate::CoreError;
use std::fmt;

/// Progress of one artifact through the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildState {
    Idle,
    Building,
    Pushing,
    Done,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildState::Idle => "idle",
            BuildState::Building => "building",
            BuildState::Pushing => "pushing",
            BuildState::Done => "done",
            BuildState::Failed => "failed",
        })
    }
}

pub fn validate_transition(from: BuildState, to: BuildState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (BuildState::Idle, BuildState::Building)
            | (BuildState::Building, BuildState::Pushing | BuildState::Done)
            | (BuildState::Pushing, BuildState::Done)
            | (
                BuildState::Idle | BuildState::Building | BuildState::Pushing,
                BuildState::Failed
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
