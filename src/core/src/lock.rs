//! Installer
//!
//! `ExitLock` swaps every termination entry point for the guard, exactly
//! once, and attaches to front ends whenever one shows up.
//!
//! # Usage
//!
//! ```ignore
//! let namespace = Arc::new(Namespace::host_defaults(Arc::new(ProcessTerminator)));
//! let lock = ExitLock::new(namespace, GuardConfig::default());
//! lock.install(None);              // core guard only
//! lock.install(Some(&console));    // again, once the console exists
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{FrontEndConfig, GuardConfig};
use crate::entry::{EntryPoint, ExitSignal};
use crate::error::{GuardError, Result};
use crate::frontend::{
    AskExitHook, AttachOutcome, FileRunner, FrontEnd, FrontEndId, RunRequest, RunnerKind,
};
use crate::guard::{guard_binding, BlockedAttempt, GuardCore, INTERACTIVE_EXIT};
use crate::namespace::{ExitBinding, Namespace};
use crate::registry::TerminationRegistry;
use crate::trust::TrustState;

/// What one `install()` call did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    /// The core guard was already in place; nothing was re-patched
    pub already_installed: bool,
    /// Entry points now bound to the guard
    pub patched: Vec<EntryPoint>,
    /// Entry points the host never exposed
    pub missing: Vec<EntryPoint>,
    /// Entry points that could not be patched, with the reason
    pub failed: Vec<(EntryPoint, String)>,
    /// Host runners wrapped in a trust region by this call
    pub trusted_runners: Vec<RunnerKind>,
    /// Front-end attachment result
    pub front_end: Option<AttachOutcome>,
}

impl InstallReport {
    /// True when every entry point the host exposes is guarded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Serializable view of the lock.
#[derive(Debug, Clone, Serialize)]
pub struct GuardSnapshot {
    pub installed: bool,
    pub engaged: bool,
    pub trusted: bool,
    pub trust_depth: usize,
    pub captured: Vec<EntryPoint>,
    pub guarded: Vec<EntryPoint>,
    pub trusted_runners: Vec<RunnerKind>,
    pub attached_front_ends: Vec<FrontEndId>,
    pub blocked_attempts: Vec<BlockedAttempt>,
}

/// Originals stashed when a front end was attached.
#[derive(Default)]
struct Attachment {
    exit_hook: Option<Arc<AskExitHook>>,
    runners: Vec<(RunnerKind, Arc<FileRunner>)>,
    user_bindings: Vec<(EntryPoint, Option<ExitBinding>)>,
}

impl Attachment {
    /// Put every stashed original back on `front_end`.
    fn restore(self, front_end: &dyn FrontEnd) {
        if let (Some(original), Some(slot)) = (self.exit_hook, front_end.exit_hook()) {
            slot.replace(original);
        }
        for (kind, original) in self.runners {
            if let Some((_, slot)) = front_end.file_runners().into_iter().find(|(k, _)| *k == kind) {
                slot.replace(original);
            }
        }
        if let Some(ns) = front_end.user_namespace() {
            for (entry, previous) in self.user_bindings {
                let result = match previous {
                    Some(binding) => ns.set(entry.slot(), binding),
                    None => ns.remove(entry.slot()).map(|_| ()),
                };
                if let Err(e) = result {
                    tracing::warn!(entry = %entry, error = %e, "Failed to restore user binding");
                }
            }
        }
    }
}

/// A host runner and the trusted wrapper that replaced it.
struct WrappedRunner {
    original: Arc<FileRunner>,
    wrapper: Arc<FileRunner>,
}

/// Guarded-termination installer for one host namespace.
#[derive(Clone)]
pub struct ExitLock {
    core: Arc<GuardCore>,
    guards: Arc<BTreeMap<EntryPoint, ExitBinding>>,
    front_end: FrontEndConfig,
    attachments: Arc<Mutex<HashMap<FrontEndId, Attachment>>>,
    host_runners: Arc<Mutex<HashMap<RunnerKind, WrappedRunner>>>,
}

impl ExitLock {
    /// Create an installer over `namespace`. Nothing is patched yet.
    pub fn new(namespace: Arc<Namespace>, config: GuardConfig) -> Self {
        let core = Arc::new(GuardCore::new(namespace, TrustState::new(config.trust_mode)));
        let guards = EntryPoint::ALL
            .into_iter()
            .map(|entry| (entry, guard_binding(&core, entry)))
            .collect();
        Self {
            core,
            guards: Arc::new(guards),
            front_end: config.front_end,
            attachments: Arc::new(Mutex::new(HashMap::new())),
            host_runners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Install the guard, wrap the host runners, then attach to `front_end`
    /// if given.
    ///
    /// Repeated calls never re-patch a guard that is in place, but always
    /// wrap host runners that appeared since and retry front-end
    /// attachment, which may have become possible since.
    pub fn install(&self, front_end: Option<&dyn FrontEnd>) -> InstallReport {
        let mut report = InstallReport::default();

        if self.core.is_installed() {
            report.already_installed = true;
        } else {
            self.patch_entry_points(&mut report);
        }
        report.trusted_runners = self.wrap_host_runners();

        report.front_end = Some(match front_end {
            Some(front_end) => self.attach(front_end),
            None => AttachOutcome::Absent,
        });
        report
    }

    fn patch_entry_points(&self, report: &mut InstallReport) {
        let ns = &self.core.namespace;
        for (entry, guard) in self.guards.iter() {
            let original = self.core.registry.capture(ns, *entry);
            if original.was_absent() && !entry.may_synthesize() {
                tracing::debug!(entry = %entry, "Host does not expose entry point");
                report.missing.push(*entry);
                continue;
            }
            match ns.set(entry.slot(), guard.clone()) {
                Ok(()) => {
                    self.core.engaged.store(true, Ordering::SeqCst);
                    report.patched.push(*entry);
                }
                Err(e) => {
                    tracing::warn!(entry = %entry, error = %e, "Failed to patch entry point");
                    report.failed.push((*entry, e.to_string()));
                }
            }
        }

        if report.failed.is_empty() {
            self.core.installed.store(true, Ordering::SeqCst);
            tracing::info!(
                patched = report.patched.len(),
                missing = report.missing.len(),
                "Exit lock installed"
            );
        }
    }

    /// Put trust regions around every host runner that is set and not
    /// already wrapped. Returns the kinds wrapped by this call.
    fn wrap_host_runners(&self) -> Vec<RunnerKind> {
        let runners = self.core.namespace.runners();
        let mut wrapped = self.host_runners.lock();
        let mut newly = Vec::new();

        for kind in RunnerKind::ALL {
            if !self.front_end.runners.contains(&kind) {
                continue;
            }
            let slot = runners.slot(kind);
            let current = match slot.get() {
                Some(current) => current,
                None => continue,
            };
            if wrapped
                .get(&kind)
                .is_some_and(|w| Arc::ptr_eq(&w.wrapper, &current))
            {
                continue;
            }

            let inner = current.clone();
            let wrapper: Arc<FileRunner> =
                Arc::new(self.core.trust.wrap(move |request: RunRequest| inner(request)));
            slot.replace(wrapper.clone());
            wrapped.insert(
                kind,
                WrappedRunner {
                    original: current,
                    wrapper,
                },
            );
            tracing::debug!(runner = %kind, "Host runner wrapped in trust region");
            newly.push(kind);
        }
        newly
    }

    fn unwrap_host_runners(&self) {
        let runners = self.core.namespace.runners();
        for (kind, w) in self.host_runners.lock().drain() {
            let slot = runners.slot(kind);
            if slot.get().is_some_and(|current| Arc::ptr_eq(&current, &w.wrapper)) {
                slot.replace(w.original);
            }
        }
    }

    /// Restore every original binding and host runner, and clear the
    /// installed flag.
    ///
    /// Front ends stay attached, but their hooks pass through while the
    /// lock is not installed. Use [`ExitLock::detach`] to unwrap them.
    pub fn uninstall(&self) -> Result<()> {
        self.core.registry.restore_all(&self.core.namespace)?;
        self.core.disengage();
        self.unwrap_host_runners();
        tracing::info!("Exit lock uninstalled");
        Ok(())
    }

    /// Wrap the hooks of `front_end`. Idempotent per instance.
    pub fn attach(&self, front_end: &dyn FrontEnd) -> AttachOutcome {
        let id = front_end.instance_id();
        let mut attachments = self.attachments.lock();
        if attachments.contains_key(&id) {
            return AttachOutcome::AlreadyAttached;
        }
        if !self.front_end.attach {
            return AttachOutcome::Disabled;
        }

        let mut attachment = Attachment::default();
        match self.wrap_front_end(front_end, &mut attachment) {
            Ok(()) => {
                let outcome = AttachOutcome::Attached {
                    exit_hook: attachment.exit_hook.is_some(),
                    runners: attachment.runners.iter().map(|(k, _)| *k).collect(),
                    user_bindings: attachment.user_bindings.len(),
                };
                tracing::info!(frontend = front_end.name(), id = %id, "Attached to front end");
                attachments.insert(id, attachment);
                outcome
            }
            Err(e) => {
                tracing::warn!(frontend = front_end.name(), error = %e, "Front-end attach failed");
                attachment.restore(front_end);
                AttachOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Put back the hooks stashed when `front_end` was attached.
    ///
    /// Returns false if it was never attached.
    pub fn detach(&self, front_end: &dyn FrontEnd) -> bool {
        let attachment = self.attachments.lock().remove(&front_end.instance_id());
        match attachment {
            Some(attachment) => {
                attachment.restore(front_end);
                tracing::info!(frontend = front_end.name(), "Detached from front end");
                true
            }
            None => false,
        }
    }

    fn wrap_front_end(&self, front_end: &dyn FrontEnd, attachment: &mut Attachment) -> Result<()> {
        let attach_err = |message: String| GuardError::AttachFailed {
            frontend: front_end.name().to_string(),
            message,
        };

        if let Some(slot) = front_end.exit_hook() {
            let original = slot
                .get()
                .ok_or_else(|| attach_err("exit hook is not set".to_string()))?;
            slot.replace(self.guarded_exit_hook(original.clone()));
            attachment.exit_hook = Some(original);
        }

        if let Some(ns) = front_end.user_namespace() {
            for entry in EntryPoint::ALL.into_iter().filter(|e| e.is_user_visible()) {
                let previous = ns.get(entry.slot());
                ns.set(entry.slot(), self.guards[&entry].clone())
                    .map_err(|e| attach_err(e.to_string()))?;
                attachment.user_bindings.push((entry, previous));
            }
        }

        for (kind, slot) in front_end.file_runners() {
            if !self.front_end.runners.contains(&kind) {
                continue;
            }
            let original = slot
                .get()
                .ok_or_else(|| attach_err(format!("{} runner is not set", kind)))?;
            let inner = original.clone();
            let trusted: Arc<FileRunner> =
                Arc::new(self.core.trust.wrap(move |request: RunRequest| inner(request)));
            slot.replace(trusted);
            attachment.runners.push((kind, original));
        }

        Ok(())
    }

    fn guarded_exit_hook(&self, original: Arc<AskExitHook>) -> Arc<AskExitHook> {
        let core = Arc::downgrade(&self.core);
        Arc::new(move || {
            if let Some(core) = core.upgrade() {
                if core.is_armed() {
                    tracing::warn!("Blocked interactive exit request");
                    core.record(INTERACTIVE_EXIT, 0);
                    return Err(ExitSignal::InteractiveBlocked);
                }
            }
            original()
        })
    }

    pub fn is_installed(&self) -> bool {
        self.core.is_installed()
    }

    pub fn is_trusted(&self) -> bool {
        self.core.trust.is_trusted()
    }

    pub fn is_attached(&self, id: FrontEndId) -> bool {
        self.attachments.lock().contains_key(&id)
    }

    /// The trust tracker shared with every guard of this lock.
    pub fn trust(&self) -> &TrustState {
        &self.core.trust
    }

    pub fn registry(&self) -> &TerminationRegistry {
        &self.core.registry
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.core.namespace
    }

    /// The guard bound at `entry`.
    pub fn guard(&self, entry: EntryPoint) -> &ExitBinding {
        &self.guards[&entry]
    }

    pub fn blocked_attempts(&self) -> Vec<BlockedAttempt> {
        self.core.blocked_attempts()
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let ns = &self.core.namespace;
        let guarded = self
            .guards
            .iter()
            .filter(|(entry, guard)| ns.get(entry.slot()).is_some_and(|b| b.same_as(guard)))
            .map(|(entry, _)| *entry)
            .collect();
        let trusted_runners = {
            let wrapped = self.host_runners.lock();
            RunnerKind::ALL
                .into_iter()
                .filter(|kind| wrapped.contains_key(kind))
                .collect()
        };
        let mut attached_front_ends: Vec<FrontEndId> = self.attachments.lock().keys().copied().collect();
        attached_front_ends.sort();
        GuardSnapshot {
            installed: self.is_installed(),
            engaged: self.core.is_engaged(),
            trusted: self.is_trusted(),
            trust_depth: self.core.trust.depth(),
            captured: self.core.registry.entries(),
            guarded,
            trusted_runners,
            attached_front_ends,
            blocked_attempts: self.blocked_attempts(),
        }
    }
}

impl std::fmt::Debug for ExitLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitLock")
            .field("installed", &self.is_installed())
            .field("engaged", &self.core.is_engaged())
            .field("trust", &self.core.trust)
            .field("namespace", &self.core.namespace.name())
            .finish()
    }
}
