//! Exclusive cell: per-scope serialization with reentrancy detection.
//!
//! Wraps a value in a mutex and remembers which thread is currently inside.
//! A second thread entering waits its turn, so operations on one scope never
//! interleave their read-modify-write. The thread already inside (a
//! collaborator calling back mid-operation) is rejected with
//! [`VaultError::ReentrantCall`] instead of deadlocking.
//!
//! The holder mark is cleared when the guard drops, on every exit path.
//!
//! A [`CallGate`] covers a whole object the same way: each thread passes it
//! at most once at a time, so a callback cannot open a second scope while
//! its caller still holds the first.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use argus_types::{Result, VaultError};

/// A value reachable by one operation at a time.
#[derive(Debug)]
pub struct ExclusiveCell<T> {
    scope: String,
    value: Mutex<T>,
    holder: Mutex<Option<ThreadId>>,
}

/// Proof of exclusive access. Dereferences to the protected value.
pub struct CellGuard<'a, T> {
    cell: &'a ExclusiveCell<T>,
    value: MutexGuard<'a, T>,
}

impl<T> ExclusiveCell<T> {
    /// Wrap `value`; `scope` names it in reentrancy errors.
    pub fn new(scope: impl Into<String>, value: T) -> Self {
        Self {
            scope: scope.into(),
            value: Mutex::new(value),
            holder: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        // Only ever holds a thread id; never poisoned mid-update.
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the calling thread is currently inside this cell.
    #[must_use]
    pub fn held_by_current_thread(&self) -> bool {
        *self.holder() == Some(thread::current().id())
    }

    /// Enter the cell, waiting for any other thread to leave first.
    ///
    /// # Errors
    /// - [`VaultError::ReentrantCall`] if the calling thread is already inside
    /// - [`VaultError::Internal`] if a previous holder panicked mid-mutation
    pub fn enter(&self) -> Result<CellGuard<'_, T>> {
        if self.held_by_current_thread() {
            return Err(VaultError::ReentrantCall {
                scope: self.scope.clone(),
            });
        }
        let value = self.value.lock().map_err(|_| {
            VaultError::Internal(format!("{} poisoned by a panicked operation", self.scope))
        })?;
        *self.holder() = Some(thread::current().id());
        Ok(CellGuard { cell: self, value })
    }
}

impl<T> Deref for CellGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CellGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for CellGuard<'_, T> {
    fn drop(&mut self) {
        // Runs before `value` is released, so no other thread can observe
        // the cell unlocked while still marked as held.
        *self.cell.holder() = None;
    }
}

/// Admits each thread once at a time; other threads pass freely.
#[derive(Debug)]
pub struct CallGate {
    scope: String,
    inside: Mutex<HashSet<ThreadId>>,
}

/// Marks the calling thread as inside its [`CallGate`] until dropped.
pub struct GatePass<'a> {
    gate: &'a CallGate,
    thread: ThreadId,
}

impl CallGate {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            inside: Mutex::new(HashSet::new()),
        }
    }

    fn inside(&self) -> MutexGuard<'_, HashSet<ThreadId>> {
        // Insert and remove only; never poisoned mid-update.
        self.inside.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pass the gate.
    ///
    /// # Errors
    /// [`VaultError::ReentrantCall`] if the calling thread is already inside.
    pub fn enter(&self) -> Result<GatePass<'_>> {
        let thread = thread::current().id();
        if !self.inside().insert(thread) {
            return Err(VaultError::ReentrantCall {
                scope: self.scope.clone(),
            });
        }
        Ok(GatePass { gate: self, thread })
    }
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        self.gate.inside().remove(&self.thread);
    }
}
