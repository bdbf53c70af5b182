//! The monitor's own view of this node's role.

use crate::{LeaderError, LeaderResult};
use std::fmt;

/// Role tracked by the leadership monitor.
///
/// `Initial` is the only starting value and `Exiting` is terminal:
///
/// ```text
/// Initial ──▶ Leader ⇄ Follower ──▶ Exiting
///    └───────────────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Initial,
    Leader,
    Follower,
    Exiting,
}

impl Role {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Role::Exiting)
    }

    /// Roles that run a dedicated background worker.
    pub fn has_worker(&self) -> bool {
        matches!(self, Role::Leader | Role::Follower)
    }

    /// Whether moving from `self` to `next` is a real transition. Staying in
    /// the same role is never a transition.
    pub fn can_transition_to(&self, next: Role) -> bool {
        match (self, next) {
            (Role::Exiting, _) => false,
            (_, Role::Initial) => false,
            (current, next) => *current != next,
        }
    }

    /// Validates and returns `next`.
    pub fn transition(self, next: Role) -> LeaderResult<Role> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LeaderError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Initial => "initial",
            Role::Leader => "leader",
            Role::Follower => "follower",
            Role::Exiting => "exiting",
        };
        f.write_str(name)
    }
}
