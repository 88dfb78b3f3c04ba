//! Host termination namespace.
//!
//! A process-wide table of named slots holding termination callables.
//! The guard swaps entries in and out of this table; front ends may keep
//! their own table for user-visible bindings.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entry::{EntryPoint, ExitArg, ExitResult, ExitSignal};
use crate::error::{GuardError, Result};
use crate::frontend::{FileRunner, HookSlot, RunnerKind};

/// Signature of a termination callable.
pub type ExitFn = dyn Fn(ExitArg) -> ExitResult + Send + Sync;

/// A termination callable bound into a namespace slot.
///
/// Cloning shares the callable; `same_as` compares identity, which is how
/// restore is verified to put back the exact original rather than a copy.
#[derive(Clone)]
pub struct ExitBinding {
    label: Arc<str>,
    func: Arc<ExitFn>,
}

impl ExitBinding {
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(ExitArg) -> ExitResult + Send + Sync + 'static,
    {
        let label: String = label.into();
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Invoke the callable.
    pub fn call(&self, arg: ExitArg) -> ExitResult {
        (self.func)(arg)
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &ExitBinding) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl std::fmt::Debug for ExitBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitBinding")
            .field("label", &self.label)
            .finish()
    }
}

/// Performs immediate process termination.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Terminates the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        std::process::exit(code)
    }
}

/// Slot contents under a single lock.
#[derive(Default)]
pub struct SlotTable {
    bindings: HashMap<String, ExitBinding>,
    sealed: HashSet<String>,
}

impl SlotTable {
    pub fn get(&self, slot: &str) -> Option<&ExitBinding> {
        self.bindings.get(slot)
    }

    pub fn set(&mut self, slot: &str, binding: ExitBinding) -> Result<()> {
        if self.sealed.contains(slot) {
            return Err(GuardError::ReadOnlySlot {
                slot: slot.to_string(),
            });
        }
        self.bindings.insert(slot.to_string(), binding);
        Ok(())
    }

    pub fn remove(&mut self, slot: &str) -> Result<Option<ExitBinding>> {
        if self.sealed.contains(slot) {
            return Err(GuardError::ReadOnlySlot {
                slot: slot.to_string(),
            });
        }
        Ok(self.bindings.remove(slot))
    }
}

/// Host-level operations that execute a file or module.
///
/// These sit below any front end: whatever a front end or a script helper
/// runs ends up here, so `ExitLock::install` wraps them in trust regions
/// whether or not a front end is attached.
#[derive(Default)]
pub struct HostRunners {
    exec_file: HookSlot<FileRunner>,
    exec_notebook: HookSlot<FileRunner>,
    run_module: HookSlot<FileRunner>,
}

impl HostRunners {
    pub fn slot(&self, kind: RunnerKind) -> &HookSlot<FileRunner> {
        match kind {
            RunnerKind::ExecFile => &self.exec_file,
            RunnerKind::ExecNotebook => &self.exec_notebook,
            RunnerKind::RunModule => &self.run_module,
        }
    }
}

/// Named termination slots.
pub struct Namespace {
    name: String,
    table: RwLock<SlotTable>,
    runners: HostRunners,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: RwLock::new(SlotTable::default()),
            runners: HostRunners::default(),
        }
    }

    /// Host-level file and module runners.
    pub fn runners(&self) -> &HostRunners {
        &self.runners
    }

    /// Build the host's standard termination bindings.
    ///
    /// `exit`, `quit` and `sys.exit` unwind with [`ExitSignal::Exit`];
    /// `os._exit` hands the status straight to `terminator`.
    pub fn host_defaults(terminator: Arc<dyn Terminator>) -> Self {
        let ns = Self::new("host");
        {
            let mut table = ns.table.write();
            for entry in [EntryPoint::Exit, EntryPoint::Quit, EntryPoint::SysExit] {
                table
                    .bindings
                    .insert(entry.slot().to_string(), polite_exit(entry));
            }
            table.bindings.insert(
                EntryPoint::OsExit.slot().to_string(),
                ExitBinding::new("host:os._exit", move |arg: ExitArg| {
                    let code = arg.status();
                    terminator.terminate(code);
                    Err(ExitSignal::Exit { code })
                }),
            );
        }
        ns
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, slot: &str) -> Option<ExitBinding> {
        self.table.read().get(slot).cloned()
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.table.read().bindings.contains_key(slot)
    }

    /// Bind `slot`. Fails if the slot was sealed.
    pub fn set(&self, slot: &str, binding: ExitBinding) -> Result<()> {
        tracing::trace!(namespace = %self.name, slot, label = binding.label(), "Binding slot");
        self.table.write().set(slot, binding)
    }

    /// Unbind `slot`, returning the previous binding.
    pub fn remove(&self, slot: &str) -> Result<Option<ExitBinding>> {
        self.table.write().remove(slot)
    }

    /// Forbid further writes to `slot`.
    pub fn seal(&self, slot: &str) {
        self.table.write().sealed.insert(slot.to_string());
    }

    /// Run `f` with exclusive access to every slot.
    pub fn update<R>(&self, f: impl FnOnce(&mut SlotTable) -> R) -> R {
        f(&mut self.table.write())
    }

    pub fn len(&self) -> usize {
        self.table.read().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound slot names, sorted.
    pub fn slots(&self) -> Vec<String> {
        let mut slots: Vec<String> = self.table.read().bindings.keys().cloned().collect();
        slots.sort();
        slots
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("slots", &self.slots())
            .finish()
    }
}

fn polite_exit(entry: EntryPoint) -> ExitBinding {
    ExitBinding::new(format!("host:{}", entry), |arg: ExitArg| {
        if let ExitArg::Message(message) = &arg {
            eprintln!("{}", message);
        }
        Err(ExitSignal::Exit { code: arg.status() })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct RecordingTerminator(AtomicI32);

    impl Terminator for RecordingTerminator {
        fn terminate(&self, code: i32) {
            self.0.store(code, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_host_defaults_bind_all_entry_points() {
        let ns = Namespace::host_defaults(Arc::new(ProcessTerminator));
        for entry in EntryPoint::ALL {
            assert!(ns.contains(entry.slot()), "missing {}", entry);
        }
        assert_eq!(ns.len(), 4);
    }

    #[test]
    fn test_polite_exit_unwinds_with_status() {
        let ns = Namespace::host_defaults(Arc::new(ProcessTerminator));
        let exit = ns.get("sys.exit").unwrap();
        let err = exit.call(ExitArg::Code(3)).unwrap_err();
        assert_eq!(err, ExitSignal::Exit { code: 3 });
    }

    #[test]
    fn test_os_exit_calls_terminator() {
        let terminator = Arc::new(RecordingTerminator(AtomicI32::new(-1)));
        let ns = Namespace::host_defaults(terminator.clone());
        let os_exit = ns.get("os._exit").unwrap();
        let _ = os_exit.call(ExitArg::Code(9));
        assert_eq!(terminator.0.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_sealed_slot_rejects_writes() {
        let ns = Namespace::host_defaults(Arc::new(ProcessTerminator));
        ns.seal("os._exit");
        let replacement = ExitBinding::new("other", |_| Err(ExitSignal::Exit { code: 0 }));
        assert!(matches!(
            ns.set("os._exit", replacement),
            Err(GuardError::ReadOnlySlot { .. })
        ));
        assert!(ns.remove("os._exit").is_err());
        assert!(ns.contains("os._exit"));
    }

    #[test]
    fn test_binding_identity() {
        let a = ExitBinding::new("a", |_| Err(ExitSignal::Exit { code: 0 }));
        let b = ExitBinding::new("a", |_| Err(ExitSignal::Exit { code: 0 }));
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_host_runners_start_empty() {
        let ns = Namespace::host_defaults(Arc::new(ProcessTerminator));
        for kind in RunnerKind::ALL {
            assert!(!ns.runners().slot(kind).is_set());
        }
    }

    #[test]
    fn test_remove_returns_previous() {
        let ns = Namespace::host_defaults(Arc::new(ProcessTerminator));
        let removed = ns.remove("quit").unwrap();
        assert!(removed.is_some());
        assert!(!ns.contains("quit"));
        assert!(ns.remove("quit").unwrap().is_none());
    }
}
