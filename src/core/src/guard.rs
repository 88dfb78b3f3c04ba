//! Guard Function
//!
//! The callable installed at every termination entry point. While the
//! console is untrusted it refuses the call; inside a trust region it puts
//! the original bindings back and hands the call to the original.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::entry::{EntryPoint, ExitArg, ExitResult, ExitSignal};
use crate::namespace::{ExitBinding, Namespace};
use crate::registry::TerminationRegistry;
use crate::trust::TrustState;

/// Source label used for the front end's interactive exit request.
pub const INTERACTIVE_EXIT: &str = "ask_exit";

/// Blocked attempts kept in the journal; older ones are dropped first.
pub const JOURNAL_CAPACITY: usize = 256;

/// A refused termination attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedAttempt {
    /// Entry point slot, or [`INTERACTIVE_EXIT`]
    pub source: String,
    /// Status the caller asked for
    pub status: i32,
    pub at: DateTime<Utc>,
}

/// State every guard binding consults.
pub(crate) struct GuardCore {
    pub(crate) namespace: Arc<Namespace>,
    pub(crate) registry: TerminationRegistry,
    pub(crate) trust: TrustState,
    pub(crate) installed: AtomicBool,
    /// At least one slot holds a guard, even if installation is incomplete
    pub(crate) engaged: AtomicBool,
    journal: Mutex<VecDeque<BlockedAttempt>>,
}

impl GuardCore {
    pub(crate) fn new(namespace: Arc<Namespace>, trust: TrustState) -> Self {
        Self {
            namespace,
            registry: TerminationRegistry::new(),
            trust,
            installed: AtomicBool::new(false),
            engaged: AtomicBool::new(false),
            journal: Mutex::new(VecDeque::with_capacity(JOURNAL_CAPACITY)),
        }
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    /// Guards are bound and the caller is not inside a trust region.
    pub(crate) fn is_armed(&self) -> bool {
        self.is_engaged() && !self.trust.is_trusted()
    }

    /// Mark every slot as restored.
    pub(crate) fn disengage(&self) {
        self.engaged.store(false, Ordering::SeqCst);
        self.installed.store(false, Ordering::SeqCst);
    }

    pub(crate) fn invoke(&self, entry: EntryPoint, arg: ExitArg) -> ExitResult {
        if self.is_armed() {
            tracing::warn!(entry = %entry, status = arg.status(), "Blocked termination attempt");
            self.record(entry.slot(), arg.status());
            return Err(ExitSignal::Blocked { entry });
        }

        if self.is_engaged() {
            tracing::info!(entry = %entry, status = arg.status(), "Trusted termination");
            if let Err(e) = self.registry.restore_all(&self.namespace) {
                tracing::warn!(error = %e, "Entry points only partially restored");
            }
            self.disengage();
        }

        self.delegate(entry, arg)
    }

    pub(crate) fn record(&self, source: &str, status: i32) {
        let mut journal = self.journal.lock();
        if journal.len() == JOURNAL_CAPACITY {
            journal.pop_front();
        }
        journal.push_back(BlockedAttempt {
            source: source.to_string(),
            status,
            at: Utc::now(),
        });
    }

    pub(crate) fn blocked_attempts(&self) -> Vec<BlockedAttempt> {
        self.journal.lock().iter().cloned().collect()
    }

    /// Call the original of `entry`, falling back to the original `sys.exit`
    /// when the host never had `entry`.
    fn delegate(&self, entry: EntryPoint, arg: ExitArg) -> ExitResult {
        let original = [entry, EntryPoint::SysExit]
            .into_iter()
            .find_map(|e| self.registry.original(e).and_then(|o| o.value));
        match original {
            Some(binding) => binding.call(arg),
            None => Err(ExitSignal::Exit { code: arg.status() }),
        }
    }
}

impl Drop for GuardCore {
    fn drop(&mut self) {
        if self.is_engaged() {
            if let Err(e) = self.registry.restore_all(&self.namespace) {
                tracing::warn!(error = %e, "Entry points only partially restored on drop");
            }
        }
    }
}

/// Build the guard binding for `entry`.
///
/// The binding only holds a weak handle: it lives inside the namespace that
/// the core itself owns.
pub(crate) fn guard_binding(core: &Arc<GuardCore>, entry: EntryPoint) -> ExitBinding {
    let core: Weak<GuardCore> = Arc::downgrade(core);
    ExitBinding::new(format!("guard:{}", entry), move |arg: ExitArg| match core.upgrade() {
        Some(core) => core.invoke(entry, arg),
        None => Err(ExitSignal::Blocked { entry }),
    })
}
