//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Session lock. Poisoning is not recoverable here, so a poisoned lock
//! surfaces as a labeled [`CallError::MutexPoisoned`] instead of a panic;
//! the label says which lock died when several managers share a log.

use std::sync::{Mutex, MutexGuard};

use crate::common::Result;
use crate::error::CallError;

pub struct CallMutex<T> {
    label: &'static str,
    mutex: Mutex<T>,
}

impl<T> CallMutex<T> {
    pub fn new(value: T, label: &'static str) -> CallMutex<T> {
        CallMutex {
            mutex: Mutex::new(value),
            label,
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        match self.mutex.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => Err(CallError::MutexPoisoned(self.label.to_string()).into()),
        }
    }

    /// Runs `f` under the lock; for short reads that need no early return.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        Ok(f(&mut *self.lock()?))
    }
}
