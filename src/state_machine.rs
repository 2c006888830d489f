//! Legal moves between task statuses.
//!
//! The table is actor-agnostic: it says whether a move exists at all and
//! whether it is reserved for the project owner. Who may request a move is
//! decided in `permissions`.

use crate::models::TaskStatus;

/// Classification of a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target equals the current status.
    NoOp,
    /// Open to the owner and the assignee.
    Allowed,
    /// Only the project owner may perform it (`completed -> verified`).
    OwnerOnly,
    Forbidden,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Verified,
    ];

    /// `verified` has no way out.
    pub fn is_terminal(self) -> bool {
        self == TaskStatus::Verified
    }

    pub fn transition_to(self, target: TaskStatus) -> Transition {
        use TaskStatus::*;

        if self == target {
            return Transition::NoOp;
        }
        match (self, target) {
            (Verified, _) => Transition::Forbidden,
            (Completed, Verified) => Transition::OwnerOnly,
            (_, Verified) => Transition::Forbidden,
            (Pending | InProgress | Completed, Pending | InProgress | Completed) => {
                Transition::Allowed
            }
        }
    }
}
