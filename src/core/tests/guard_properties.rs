//! Integration tests for the guarded-termination boundary.
//!
//! Each test drives `ExitLock` over a host namespace whose `os._exit`
//! records the status instead of ending the test process.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use console_guard_core::{
    AskExitHook, AttachOutcome, EntryPoint, ExitArg, ExitBinding, ExitLock, ExitSignal,
    FileRunner, FrontEnd, FrontEndId, GuardConfig, HookSlot, Namespace, RunError, RunRequest, RunnerKind,
    Terminator, TrustMode,
};
use uuid::Uuid;

struct RecordingTerminator(AtomicI32);

impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        self.0.store(code, Ordering::SeqCst);
    }
}

fn host() -> (Arc<Namespace>, Arc<RecordingTerminator>) {
    let terminator = Arc::new(RecordingTerminator(AtomicI32::new(-1)));
    let ns = Arc::new(Namespace::host_defaults(terminator.clone()));
    (ns, terminator)
}

fn originals(ns: &Namespace) -> Vec<(EntryPoint, ExitBinding)> {
    EntryPoint::ALL
        .into_iter()
        .filter_map(|entry| ns.get(entry.slot()).map(|b| (entry, b)))
        .collect()
}

#[test]
fn test_registry_keeps_pre_install_values_across_installs() {
    let (ns, _) = host();
    let before = originals(&ns);
    let lock = ExitLock::new(ns.clone(), GuardConfig::default());

    lock.install(None);
    let second = lock.install(None);
    assert!(second.already_installed);

    for (entry, original) in &before {
        let captured = lock.registry().original(*entry).unwrap();
        let value = captured.value.unwrap();
        assert!(value.same_as(original), "{} captured a guard", entry);
        assert!(!value.same_as(lock.guard(*entry)));
    }
}

#[test]
fn test_every_entry_point_blocked_when_untrusted() {
    let (ns, terminator) = host();
    let lock = ExitLock::new(ns.clone(), GuardConfig::default());
    lock.install(None);

    for entry in EntryPoint::ALL {
        let binding = ns.get(entry.slot()).unwrap();
        let err = binding.call(ExitArg::Code(7)).unwrap_err();
        assert_eq!(err, ExitSignal::Blocked { entry });
    }
    assert_eq!(terminator.0.load(Ordering::SeqCst), -1);
    assert!(lock.is_installed());
    assert_eq!(lock.blocked_attempts().len(), 4);
}

#[test]
fn test_trusted_call_restores_originals_and_delegates() {
    let (ns, _) = host();
    let before = originals(&ns);
    let lock = ExitLock::new(ns.clone(), GuardConfig::default());
    lock.install(None);

    let exit = ns.get("exit").unwrap();
    let err = lock
        .trust()
        .run_trusted(|| exit.call(ExitArg::Code(5)))
        .unwrap_err();

    assert_eq!(err, ExitSignal::Exit { code: 5 });
    assert!(!lock.is_installed());
    for (entry, original) in &before {
        assert!(ns.get(entry.slot()).unwrap().same_as(original));
    }
}

#[test]
fn test_trusted_os_exit_reaches_terminator() {
    let (ns, terminator) = host();
    let lock = ExitLock::new(ns.clone(), GuardConfig::default());
    lock.install(None);

    let os_exit = ns.get("os._exit").unwrap();
    let _ = lock.trust().run_trusted(|| os_exit.call(ExitArg::Code(9)));
    assert_eq!(terminator.0.load(Ordering::SeqCst), 9);
}

#[test]
fn test_trust_does_not_leak_after_error_or_panic() {
    let (ns, _) = host();
    let lock = ExitLock::new(ns, GuardConfig::default());
    lock.install(None);

    let result: Result<(), String> = lock.trust().run_trusted(|| Err("script failed".to_string()));
    assert!(result.is_err());
    assert!(!lock.is_trusted());

    let trust = lock.trust().clone();
    let panicked = catch_unwind(AssertUnwindSafe(|| {
        trust.run_trusted(|| panic!("runner blew up"));
    }));
    assert!(panicked.is_err());
    assert!(!lock.is_trusted());

    let quit = lock.namespace().get("quit").unwrap();
    assert!(quit.call(ExitArg::None).unwrap_err().is_blocked());
}

#[test]
fn test_nested_regions_restore_outer_state() {
    for mode in [TrustMode::SaveRestore, TrustMode::Depth] {
        let (ns, _) = host();
        let config = GuardConfig {
            trust_mode: mode,
            ..GuardConfig::default()
        };
        let lock = ExitLock::new(ns, config);
        let trust = lock.trust();

        {
            let _outer = trust.enter();
            {
                let _inner = trust.enter();
                assert!(trust.is_trusted());
            }
            assert!(trust.is_trusted(), "{:?}: inner region ended outer trust", mode);
        }
        assert!(!trust.is_trusted());
        assert_eq!(trust.depth(), 0);
    }
}

struct LateFrontEnd {
    id: FrontEndId,
    exit_hook: HookSlot<AskExitHook>,
    exec_file: HookSlot<FileRunner>,
}

impl LateFrontEnd {
    fn new(ns: Arc<Namespace>) -> Self {
        let exit_hook: Arc<AskExitHook> = Arc::new(|| Ok(()));
        let exec_file: Arc<FileRunner> = Arc::new(move |request: RunRequest| -> Result<(), RunError> {
            let code: i32 = request.target.parse().unwrap_or(0);
            let sys_exit = ns.get("sys.exit").unwrap();
            match sys_exit.call(ExitArg::Code(code)) {
                Ok(never) => match never {},
                Err(signal) => Err(RunError::from(signal)),
            }
        });
        Self {
            id: Uuid::new_v4(),
            exit_hook: HookSlot::new(exit_hook),
            exec_file: HookSlot::new(exec_file),
        }
    }
}

impl FrontEnd for LateFrontEnd {
    fn instance_id(&self) -> FrontEndId {
        self.id
    }

    fn exit_hook(&self) -> Option<&HookSlot<AskExitHook>> {
        Some(&self.exit_hook)
    }

    fn file_runners(&self) -> Vec<(RunnerKind, &HookSlot<FileRunner>)> {
        vec![(RunnerKind::ExecFile, &self.exec_file)]
    }
}

#[test]
fn test_front_end_attached_on_later_install() {
    let (ns, _) = host();
    let lock = ExitLock::new(ns.clone(), GuardConfig::default());

    let first = lock.install(None);
    assert_eq!(first.front_end, Some(AttachOutcome::Absent));

    let front_end = LateFrontEnd::new(ns.clone());
    let second = lock.install(Some(&front_end));
    assert!(second.already_installed);
    assert!(matches!(second.front_end, Some(AttachOutcome::Attached { .. })));

    let hook = front_end.exit_hook.get().unwrap();
    assert_eq!(hook(), Err(ExitSignal::InteractiveBlocked));

    let runner = front_end.exec_file.get().unwrap();
    let err = runner(RunRequest::new("3")).unwrap_err();
    assert_eq!(err.to_string(), ExitSignal::Exit { code: 3 }.to_string());
    assert!(!lock.is_trusted());
    assert!(!lock.is_installed());
}
