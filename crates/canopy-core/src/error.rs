use thiserror::Error;

use crate::tree::BehaviorKey;

pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors surfaced when building or starting a tree.
///
/// Runtime behavior faults are not errors: a failing task is an
/// `ExecuteFail` bubble, not an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("tree `{0}` has no usable root node")]
    MissingRoot(String),

    #[error("tree is already running")]
    AlreadyRunning,

    #[error("no task behavior registered for `{0}`")]
    UnmappedTask(BehaviorKey),

    #[error("no condition behavior registered for `{0}`")]
    UnmappedCondition(BehaviorKey),

    #[error("no service behavior registered for `{0}`")]
    UnmappedService(BehaviorKey),

    #[error("blackboard already defines a field named `{0}`")]
    DuplicateField(String),
}
