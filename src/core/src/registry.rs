//! Termination Registry
//!
//! Records the binding each entry point had before it was patched. This is
//! the single source of truth for restore.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::entry::EntryPoint;
use crate::error::Result;
use crate::namespace::{ExitBinding, Namespace, SlotTable};

/// The pre-patch state of one entry point.
#[derive(Debug, Clone)]
pub struct OriginalBinding {
    pub entry: EntryPoint,
    /// `None` when the slot did not exist before capture.
    pub value: Option<ExitBinding>,
}

impl OriginalBinding {
    pub fn was_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// Captured originals, at most one per entry point.
#[derive(Default)]
pub struct TerminationRegistry {
    originals: RwLock<BTreeMap<EntryPoint, OriginalBinding>>,
}

impl TerminationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current binding of `entry`.
    ///
    /// Only the first capture per entry point is kept; later calls return
    /// the stored original without looking at the namespace again, so a
    /// guard that is already installed is never recorded as "original".
    pub fn capture(&self, namespace: &Namespace, entry: EntryPoint) -> OriginalBinding {
        let mut originals = self.originals.write();
        originals
            .entry(entry)
            .or_insert_with(|| {
                let value = namespace.get(entry.slot());
                tracing::debug!(
                    entry = %entry,
                    absent = value.is_none(),
                    "Captured original binding"
                );
                OriginalBinding { entry, value }
            })
            .clone()
    }

    /// Write the original of `entry` back, or remove the slot if it was absent.
    pub fn restore(&self, namespace: &Namespace, entry: EntryPoint) -> Result<()> {
        let original = match self.original(entry) {
            Some(original) => original,
            None => return Ok(()),
        };
        namespace.update(|table| restore_slot(table, &original))
    }

    /// Restore every captured entry point under one namespace write lock.
    ///
    /// All slots are attempted; the first error is returned.
    pub fn restore_all(&self, namespace: &Namespace) -> Result<()> {
        let originals: Vec<OriginalBinding> = self.originals.read().values().cloned().collect();
        namespace.update(|table| {
            let mut first_err = None;
            for original in &originals {
                if let Err(e) = restore_slot(table, original) {
                    tracing::warn!(entry = %original.entry, error = %e, "Failed to restore entry point");
                    first_err.get_or_insert(e);
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }

    pub fn original(&self, entry: EntryPoint) -> Option<OriginalBinding> {
        self.originals.read().get(&entry).cloned()
    }

    pub fn is_captured(&self, entry: EntryPoint) -> bool {
        self.originals.read().contains_key(&entry)
    }

    pub fn len(&self) -> usize {
        self.originals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Captured entry points in declaration order.
    pub fn entries(&self) -> Vec<EntryPoint> {
        self.originals.read().keys().copied().collect()
    }
}

fn restore_slot(table: &mut SlotTable, original: &OriginalBinding) -> Result<()> {
    let slot = original.entry.slot();
    match &original.value {
        Some(value) => {
            if table.get(slot).is_some_and(|current| current.same_as(value)) {
                return Ok(());
            }
            table.set(slot, value.clone())?;
        }
        None => {
            if table.get(slot).is_some() {
                table.remove(slot)?;
            }
        }
    }
    tracing::debug!(entry = %original.entry, "Restored entry point");
    Ok(())
}
