//! Confirm-then-transition rule shared by every role signal.
//!
//! The election signal is timely but may never fire for a follower on
//! initial cluster formation; the poll timer is late but always fires. Both
//! are confirmed against a direct query of the engine's role before the
//! monitor moves.

use crate::Role;
use replikv_core::RaftRole;

/// What woke the coordination loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Election channel fired with "I am (no longer) the leader"
    Elected(bool),
    /// Poll tick, or a role-changed observation
    Poll,
}

/// Computes the role to move to, if any.
///
/// `observed` is the engine's role queried right after the signal arrived.
/// Returns `None` when the monitor should stay where it is, including
/// duplicate notifications of the current role.
pub fn reconcile(current: Role, signal: Signal, observed: RaftRole) -> Option<Role> {
    if current.is_terminal() {
        return None;
    }
    if observed == RaftRole::Shutdown {
        return Some(Role::Exiting);
    }

    let next = match signal {
        Signal::Elected(elected) => {
            let relevant = current == Role::Initial
                || (current == Role::Follower && elected)
                || (current == Role::Leader && !elected);
            if !relevant {
                return None;
            }
            match observed {
                RaftRole::Leader if elected => Role::Leader,
                RaftRole::Follower => Role::Follower,
                _ => return None,
            }
        }
        Signal::Poll => match observed {
            RaftRole::Leader => Role::Leader,
            RaftRole::Follower => Role::Follower,
            _ => return None,
        },
    };

    current.can_transition_to(next).then_some(next)
}

/// True when `signal` merely repeats the role the monitor already holds.
pub fn is_duplicate(current: Role, signal: Signal) -> bool {
    matches!(
        (current, signal),
        (Role::Leader, Signal::Elected(true)) | (Role::Follower, Signal::Elected(false))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_election_confirmed_by_engine() {
        assert_eq!(
            reconcile(Role::Initial, Signal::Elected(true), RaftRole::Leader),
            Some(Role::Leader)
        );
        assert_eq!(
            reconcile(Role::Follower, Signal::Elected(true), RaftRole::Leader),
            Some(Role::Leader)
        );
        // engine has not caught up yet; wait for the poll
        assert_eq!(
            reconcile(Role::Follower, Signal::Elected(true), RaftRole::Candidate),
            None
        );
    }

    #[test]
    fn test_demotion_confirmed_by_engine() {
        assert_eq!(
            reconcile(Role::Leader, Signal::Elected(false), RaftRole::Follower),
            Some(Role::Follower)
        );
        assert_eq!(
            reconcile(Role::Leader, Signal::Elected(false), RaftRole::Leader),
            None
        );
    }

    #[test]
    fn test_duplicate_signals_are_noops() {
        assert_eq!(
            reconcile(Role::Leader, Signal::Elected(true), RaftRole::Leader),
            None
        );
        assert_eq!(
            reconcile(Role::Follower, Signal::Elected(false), RaftRole::Follower),
            None
        );
        assert_eq!(reconcile(Role::Leader, Signal::Poll, RaftRole::Leader), None);
        assert!(is_duplicate(Role::Leader, Signal::Elected(true)));
        assert!(!is_duplicate(Role::Leader, Signal::Elected(false)));
        assert!(!is_duplicate(Role::Initial, Signal::Elected(true)));
    }

    #[test]
    fn test_poll_catches_missed_signals() {
        assert_eq!(
            reconcile(Role::Initial, Signal::Poll, RaftRole::Follower),
            Some(Role::Follower)
        );
        assert_eq!(
            reconcile(Role::Follower, Signal::Poll, RaftRole::Leader),
            Some(Role::Leader)
        );
        assert_eq!(
            reconcile(Role::Leader, Signal::Poll, RaftRole::Follower),
            Some(Role::Follower)
        );
        assert_eq!(reconcile(Role::Initial, Signal::Poll, RaftRole::Candidate), None);
    }

    #[test]
    fn test_shutdown_and_terminal_state() {
        assert_eq!(
            reconcile(Role::Leader, Signal::Poll, RaftRole::Shutdown),
            Some(Role::Exiting)
        );
        assert_eq!(
            reconcile(Role::Initial, Signal::Elected(false), RaftRole::Shutdown),
            Some(Role::Exiting)
        );
        assert_eq!(reconcile(Role::Exiting, Signal::Poll, RaftRole::Leader), None);
        assert_eq!(
            reconcile(Role::Exiting, Signal::Elected(true), RaftRole::Shutdown),
            None
        );
    }
}
