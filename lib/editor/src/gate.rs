//! At-most-one-in-flight gate for network-bound operations.
//!
//! Each operation key can be held once. A UI disables the triggering control
//! while the key is held; a second acquisition fails instead of queueing.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Operations guarded by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Save,
    Execute,
    Export,
    Import,
    Debug,
}

impl Operation {
    /// Returns the key name of this operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Execute => "execute",
            Self::Export => "export",
            Self::Import => "import",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared set of held operation keys.
#[derive(Debug, Clone, Default)]
pub struct OperationGate {
    held: Arc<Mutex<HashSet<Operation>>>,
}

impl OperationGate {
    /// Creates a gate with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds `operation` until the returned guard drops.
    ///
    /// Returns `None` if the operation is already in flight.
    #[must_use]
    pub fn try_acquire(&self, operation: Operation) -> Option<GateGuard> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(operation) {
            return None;
        }
        Some(GateGuard {
            gate: self.clone(),
            operation,
        })
    }

    /// Returns true while `operation` is in flight.
    #[must_use]
    pub fn is_held(&self, operation: Operation) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&operation)
    }

    fn release(&self, operation: Operation) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&operation);
    }
}

/// Releases its operation key on drop.
#[derive(Debug)]
pub struct GateGuard {
    gate: OperationGate,
    operation: Operation,
}

impl GateGuard {
    /// Returns the operation this guard holds.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.release(self.operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquisition_fails_while_held() {
        let gate = OperationGate::new();
        let guard = gate.try_acquire(Operation::Save).expect("first acquire");
        assert!(gate.try_acquire(Operation::Save).is_none());
        assert!(gate.is_held(Operation::Save));
        drop(guard);
        assert!(!gate.is_held(Operation::Save));
        assert!(gate.try_acquire(Operation::Save).is_some());
    }

    #[test]
    fn keys_are_independent() {
        let gate = OperationGate::new();
        let _save = gate.try_acquire(Operation::Save).expect("save");
        let debug = gate.try_acquire(Operation::Debug);
        assert_eq!(debug.map(|g| g.operation()), Some(Operation::Debug));
    }

    #[test]
    fn clones_share_state() {
        let gate = OperationGate::new();
        let other = gate.clone();
        let _guard = gate.try_acquire(Operation::Import).expect("import");
        assert!(other.try_acquire(Operation::Import).is_none());
    }
}
