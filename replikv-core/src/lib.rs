//! # Replikv Core
//!
//! Shared building blocks for a replicated key-value node driven by an
//! external leader-based consensus engine.
//!
//! ## Components
//!
//! - **Entry**: committed log payload plus its index
//! - **Command Protocol**: tagged `Command` / `CommandResult` envelopes
//! - **StateMachine Trait**: apply / snapshot / restore contract the engine calls
//! - **Snapshot Persistence**: sink and store contracts for snapshot handles
//! - **Consensus Contracts**: role accessor, observations and proposer
//! - **Error Handling**: the `ReplikvError` taxonomy
//!
//! ```rust
//! use replikv_core::{Command, CommandResult, Entry};
//!
//! let entry = Entry::from_command(3, &Command::set("k", "v")).unwrap();
//! assert!(entry.command().unwrap().is_write());
//!
//! let result = CommandResult::Set { index: entry.index };
//! assert_eq!(result.index(), 3);
//! ```

pub mod command;
pub mod consensus;
pub mod error;
pub mod persistence;
pub mod state_machine;
pub mod types;

pub use command::*;
pub use consensus::*;
pub use error::*;
pub use types::*;
