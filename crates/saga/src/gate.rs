//! Resource-scoped mutual exclusion.
//!
//! A gate is identified by (participant, table, access mode). Each
//! participant owns one write gate, taken by operations that reduce
//! capacity, and one read gate, taken by operations that confirm holds or
//! restore capacity. Gates are plain values, so two participants built in
//! the same process never share one.

use std::sync::Arc;
use std::time::Instant;

use inventory::ResourceTable;
use messaging::Stage;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Which side of the capacity counter an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Reduces capacity (provisional reserve).
    Write,
    /// Confirms holds or restores capacity (confirm, rollback, expiry).
    Read,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Write => "write",
            AccessMode::Read => "read",
        }
    }
}

/// Identity of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateScope {
    pub participant: Stage,
    pub table: ResourceTable,
    pub mode: AccessMode,
}

/// A mutual-exclusion gate held for a whole read-check-mutate-commit sequence.
#[derive(Debug, Clone)]
pub struct ResourceGate {
    scope: GateScope,
    lock: Arc<Mutex<()>>,
}

impl ResourceGate {
    pub fn new(scope: GateScope) -> Self {
        Self {
            scope,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn scope(&self) -> GateScope {
        self.scope
    }

    /// Waits for the gate. It is released when the guard drops.
    pub async fn enter(&self) -> OwnedMutexGuard<()> {
        let started = Instant::now();
        let guard = Arc::clone(&self.lock).lock_owned().await;
        metrics::histogram!(
            "resource_gate_wait_seconds",
            "table" => self.scope.table.as_str(),
            "mode" => self.scope.mode.as_str()
        )
        .record(started.elapsed().as_secs_f64());
        guard
    }
}

/// The write and read gates of one participant's table.
#[derive(Debug, Clone)]
pub struct ResourceGates {
    write: ResourceGate,
    read: ResourceGate,
}

impl ResourceGates {
    /// Creates a fresh, unshared pair of gates.
    pub fn new(participant: Stage, table: ResourceTable) -> Self {
        let scope = |mode| GateScope {
            participant,
            table,
            mode,
        };
        Self {
            write: ResourceGate::new(scope(AccessMode::Write)),
            read: ResourceGate::new(scope(AccessMode::Read)),
        }
    }

    pub fn write(&self) -> &ResourceGate {
        &self.write
    }

    pub fn read(&self) -> &ResourceGate {
        &self.read
    }

    pub fn for_mode(&self, mode: AccessMode) -> &ResourceGate {
        match mode {
            AccessMode::Write => &self.write,
            AccessMode::Read => &self.read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn read_and_write_gates_are_disjoint() {
        let gates = ResourceGates::new(Stage::Flight, ResourceTable::Flights);
        let _write = gates.write().enter().await;

        // The read gate is free while the write gate is held.
        let read = tokio::time::timeout(Duration::from_millis(50), gates.read().enter()).await;
        assert!(read.is_ok());
    }

    #[tokio::test]
    async fn gate_excludes_second_holder() {
        let gates = ResourceGates::new(Stage::Hotel, ResourceTable::Rooms);
        let held = gates.write().enter().await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), gates.write().enter()).await;
        assert!(blocked.is_err());

        drop(held);
        let entered =
            tokio::time::timeout(Duration::from_millis(50), gates.write().enter()).await;
        assert!(entered.is_ok());
    }

    #[tokio::test]
    async fn separately_built_gates_do_not_interfere() {
        let a = ResourceGates::new(Stage::Flight, ResourceTable::Flights);
        let b = ResourceGates::new(Stage::Flight, ResourceTable::Flights);
        let _held = a.write().enter().await;

        let other = tokio::time::timeout(Duration::from_millis(50), b.write().enter()).await;
        assert!(other.is_ok());
        assert_eq!(a.write().scope(), b.write().scope());
    }

    #[test]
    fn scopes_carry_mode() {
        let gates = ResourceGates::new(Stage::Flight, ResourceTable::Flights);
        assert_eq!(gates.for_mode(AccessMode::Read).scope().mode, AccessMode::Read);
        assert_eq!(gates.write().scope().table, ResourceTable::Flights);
    }
}
