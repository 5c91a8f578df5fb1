//! Error types for the simulator
//!
//! [`SetupError`] covers everything that stops a simulation from starting:
//! an invalid configuration or a program that fails static validation.
//!
//! Once running, nothing is an error in the host sense. Component failures
//! (capacity exhaustion, a block freed twice) are converted into
//! [`Violation`]s here so the interpreter can propagate them with `?` and the
//! diagnostics engine can put them in the report.

use crate::config::ConfigError;
use crate::diagnostics::{DiagnosticKind, Violation};
use crate::memory::address_space::SpaceError;
use crate::memory::heap::HeapError;
use crate::memory::stack::StackError;
use crate::program::ProgramError;
use thiserror::Error;

/// Reasons a simulation cannot start
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Program(#[from] ProgramError),
}

impl From<SpaceError> for Violation {
    fn from(err: SpaceError) -> Self {
        match err {
            SpaceError::StackExhausted { .. } | SpaceError::HeapExhausted { .. } => {
                Violation::new(DiagnosticKind::CapacityExceeded, err.to_string())
            }
            SpaceError::OutOfRange { addr, .. } => {
                Violation::new(DiagnosticKind::OutOfBounds, err.to_string()).at(addr)
            }
        }
    }
}

impl From<HeapError> for Violation {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::Space(space) => space.into(),
            HeapError::AlreadyFreed(_) => {
                Violation::new(DiagnosticKind::DoubleFree, err.to_string())
            }
            HeapError::UnknownBlock(_) => {
                Violation::new(DiagnosticKind::InvalidOperand, err.to_string())
            }
        }
    }
}

impl From<StackError> for Violation {
    fn from(err: StackError) -> Self {
        match err {
            StackError::Space(space) => space.into(),
            StackError::DuplicateSlot { .. } | StackError::NoFrame | StackError::RootFrame => {
                Violation::new(DiagnosticKind::InvalidOperand, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_maps_to_capacity_exceeded() {
        let violation: Violation = HeapError::Space(SpaceError::HeapExhausted {
            requested: 8,
            available: 4,
            capacity: 16,
        })
        .into();
        assert_eq!(violation.kind, DiagnosticKind::CapacityExceeded);
        assert!(violation.message.contains("heap exhausted"));

        let violation: Violation = StackError::Space(SpaceError::StackExhausted {
            requested: 8,
            available: 0,
            capacity: 8,
        })
        .into();
        assert_eq!(violation.kind, DiagnosticKind::CapacityExceeded);
    }

    #[test]
    fn test_component_misuse_maps_to_findings() {
        let violation: Violation = HeapError::AlreadyFreed(3).into();
        assert_eq!(violation.kind, DiagnosticKind::DoubleFree);
        let violation: Violation = StackError::RootFrame.into();
        assert_eq!(violation.kind, DiagnosticKind::InvalidOperand);
    }
}
