#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome a node reports while the search bubbles back toward the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SearchResult {
    /// Nothing failed; composites interpret this as "child succeeded".
    Normal,
    /// A decorator rejected the node during the search descent.
    CheckFail,
    /// The activated task finished without success.
    ExecuteFail,
}

/// What a task reports from `on_activation` and every `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_running(self) -> bool {
        self == TaskStatus::Running
    }
}

/// Why an activated task was deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// The task reported success.
    Success,
    /// The task reported failure on its own.
    Cancel,
    /// The engine tore the task down (abort or stop).
    Abort,
}

/// Decorator re-check policy once its node has been searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AbortMode {
    /// Never interrupts anything.
    #[default]
    None,
    /// May interrupt a lower-priority branch when the condition turns true.
    LowerPriority,
    /// May interrupt its own running branch when the condition turns false.
    SelfBranch,
    /// Both of the above.
    Both,
}

impl AbortMode {
    pub fn aborts_self(self) -> bool {
        matches!(self, AbortMode::SelfBranch | AbortMode::Both)
    }

    pub fn aborts_lower_priority(self) -> bool {
        matches!(self, AbortMode::LowerPriority | AbortMode::Both)
    }
}
