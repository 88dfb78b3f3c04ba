//! Interactive console front end.
//!
//! Evaluates script statements one at a time against three layers of
//! names: console builtins, the user namespace (`exit`, `quit`), then the
//! host termination namespace. Exposes the hooks an `ExitLock` wraps.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use console_guard_core::{
    AskExitHook, ExitArg, ExitBinding, ExitSignal, FileRunner, FrontEnd, FrontEndId, GuardConfig,
    GuardError, HookSlot, Namespace, RunError, RunRequest, RunnerKind,
};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::script::{self, Call};

/// What the read-evaluate loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Keep reading input
    Continue,
    /// End the session with this status
    Exit(i32),
}

/// Callback that puts the guard back after a script ended with its own exit.
pub type RearmHook = dyn Fn() + Send + Sync;

struct ConsoleInner {
    id: FrontEndId,
    host: Arc<Namespace>,
    user_ns: Namespace,
    exit_hook: HookSlot<AskExitHook>,
    exec_file: HookSlot<FileRunner>,
    exec_notebook: HookSlot<FileRunner>,
    run_module: HookSlot<FileRunner>,
    rearm: HookSlot<RearmHook>,
    argv: RwLock<Vec<String>>,
    output: Mutex<Box<dyn Write + Send>>,
    blocked_message: String,
    module_paths: Vec<PathBuf>,
    line_count: AtomicUsize,
    run_depth: AtomicUsize,
    max_run_depth: usize,
}

/// Holds one level of script nesting until dropped.
struct RunDepth<'a>(&'a AtomicUsize);

impl Drop for RunDepth<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A line-oriented console over a host termination namespace.
pub struct Console {
    inner: Arc<ConsoleInner>,
}

impl Console {
    /// Create a console writing to stdout.
    pub fn new(host: Arc<Namespace>, config: &GuardConfig) -> Self {
        Self::with_output(host, config, Box::new(std::io::stdout()))
    }

    /// Create a console writing to `output`.
    pub fn with_output(
        host: Arc<Namespace>,
        config: &GuardConfig,
        output: Box<dyn Write + Send>,
    ) -> Self {
        let ask_exit: Arc<AskExitHook> = Arc::new(|| Ok(()));
        let inner = Arc::new_cyclic(|weak: &Weak<ConsoleInner>| ConsoleInner {
            id: Uuid::new_v4(),
            host,
            user_ns: user_namespace(weak.clone()),
            exit_hook: HookSlot::new(ask_exit),
            exec_file: HookSlot::new(file_runner(weak.clone(), RunnerKind::ExecFile)),
            exec_notebook: HookSlot::new(file_runner(weak.clone(), RunnerKind::ExecNotebook)),
            run_module: HookSlot::new(file_runner(weak.clone(), RunnerKind::RunModule)),
            rearm: HookSlot::empty(),
            argv: RwLock::new(vec![String::new()]),
            output: Mutex::new(output),
            blocked_message: config.blocked_message.clone(),
            module_paths: config.module_paths.clone(),
            line_count: AtomicUsize::new(0),
            run_depth: AtomicUsize::new(0),
            max_run_depth: config.max_run_depth,
        });

        // The host runners are what an installed lock trusts, attached or not.
        let weak = Arc::downgrade(&inner);
        for kind in RunnerKind::ALL {
            inner
                .host
                .runners()
                .slot(kind)
                .replace(host_runner(weak.clone(), kind));
        }
        Self { inner }
    }

    /// Set the callback run after `cel.run` swallowed a script's exit.
    pub fn set_rearm(&self, rearm: Arc<RearmHook>) {
        self.inner.rearm.replace(rearm);
    }

    /// Evaluate one line of interactive input.
    pub fn feed_line(&self, text: &str) -> LoopControl {
        let line = self.inner.line_count.fetch_add(1, Ordering::SeqCst) + 1;
        let result = script::parse_line(line, text)
            .map_err(RunError::from)
            .and_then(|call| match call {
                Some(call) => self.inner.eval(&call),
                None => Ok(()),
            });
        self.inner.settle(result)
    }

    /// Run a script file through the console's file runner.
    pub fn run_file(&self, path: &Path, args: Vec<String>) -> LoopControl {
        let request = RunRequest::new(path.display().to_string()).with_args(args);
        let result = self.inner.run_with(RunnerKind::ExecFile, request);
        self.inner.settle(result)
    }

    /// Fire the interactive exit request, as on end-of-input.
    pub fn handle_eof(&self) -> LoopControl {
        let signal = match self.inner.exit_hook.get().map(|hook| hook()) {
            Some(Err(signal)) => signal,
            _ => self.inner.host_exit("exit", ExitArg::None),
        };
        self.inner.settle(Err(signal.into()))
    }

    /// Current script arguments.
    pub fn argv(&self) -> Vec<String> {
        self.inner.argv.read().clone()
    }

    pub fn host_namespace(&self) -> &Arc<Namespace> {
        &self.inner.host
    }
}

impl FrontEnd for Console {
    fn instance_id(&self) -> FrontEndId {
        self.inner.id
    }

    fn name(&self) -> &str {
        "console"
    }

    fn exit_hook(&self) -> Option<&HookSlot<AskExitHook>> {
        Some(&self.inner.exit_hook)
    }

    fn file_runners(&self) -> Vec<(RunnerKind, &HookSlot<FileRunner>)> {
        vec![
            (RunnerKind::ExecFile, &self.inner.exec_file),
            (RunnerKind::ExecNotebook, &self.inner.exec_notebook),
            (RunnerKind::RunModule, &self.inner.run_module),
        ]
    }

    fn user_namespace(&self) -> Option<&Namespace> {
        Some(&self.inner.user_ns)
    }
}

impl ConsoleInner {
    /// Turn an evaluation result into a loop decision, reporting to the user.
    fn settle(&self, result: Result<(), RunError>) -> LoopControl {
        match result {
            Ok(()) => LoopControl::Continue,
            Err(RunError::Signal(ExitSignal::Exit { code })) => LoopControl::Exit(code),
            Err(RunError::Signal(signal)) => {
                self.write_line(&format!("{} ({})", self.blocked_message, signal));
                LoopControl::Continue
            }
            Err(RunError::Failed(e)) => {
                self.write_line(&format!("Error: {}", e));
                LoopControl::Continue
            }
        }
    }

    fn eval(&self, call: &Call) -> Result<(), RunError> {
        match call.target.as_str() {
            "print" => {
                let text: Vec<String> = call.args.iter().map(|a| a.to_string()).collect();
                self.write_line(&text.join(" "));
                Ok(())
            }
            "argv" => {
                let argv = self.argv.read().join(" ");
                self.write_line(&argv);
                Ok(())
            }
            "run" => self.run_with(RunnerKind::ExecFile, request_from(call)?),
            "run_notebook" => self.run_with(RunnerKind::ExecNotebook, request_from(call)?),
            "run_module" => self.run_with(RunnerKind::RunModule, request_from(call)?),
            "cel.run" => self.run_isolated(call),
            name => {
                let binding = self
                    .user_ns
                    .get(name)
                    .or_else(|| self.host.get(name))
                    .ok_or_else(|| call.error(format!("name '{}' is not defined", name)))?;
                match binding.call(call.exit_arg()?) {
                    Ok(never) => match never {},
                    Err(signal) => Err(signal.into()),
                }
            }
        }
    }

    fn runner(&self, kind: RunnerKind) -> &HookSlot<FileRunner> {
        match kind {
            RunnerKind::ExecFile => &self.exec_file,
            RunnerKind::ExecNotebook => &self.exec_notebook,
            RunnerKind::RunModule => &self.run_module,
        }
    }

    fn run_with(&self, kind: RunnerKind, request: RunRequest) -> Result<(), RunError> {
        let runner = self
            .runner(kind)
            .get()
            .ok_or_else(|| GuardError::Other(format!("{} runner is not available", kind)))?;
        runner(request)
    }

    /// Run through the host runner for `kind`, executing directly if none is set.
    fn run_hosted(&self, kind: RunnerKind, request: RunRequest) -> Result<(), RunError> {
        match self.host.runners().slot(kind).get() {
            Some(runner) => runner(request),
            None => self.execute(kind, request),
        }
    }

    /// Call the host binding `name`, or end the session if the host lacks it.
    fn host_exit(&self, name: &str, arg: ExitArg) -> ExitSignal {
        match self.host.get(name) {
            Some(binding) => match binding.call(arg) {
                Ok(never) => match never {},
                Err(signal) => signal,
            },
            None => ExitSignal::Exit { code: arg.status() },
        }
    }

    fn enter_run(&self) -> Result<RunDepth<'_>, GuardError> {
        let depth = self.run_depth.fetch_add(1, Ordering::SeqCst);
        let level = RunDepth(&self.run_depth);
        if depth >= self.max_run_depth {
            return Err(GuardError::RunDepthExceeded {
                limit: self.max_run_depth,
            });
        }
        Ok(level)
    }

    /// `cel.run("script args...")`: run a file, swallow its exit, keep going.
    fn run_isolated(&self, call: &Call) -> Result<(), RunError> {
        let command = call.str_arg(0)?;
        let (path, args) = if call.args.len() > 1 {
            (command.to_string(), call.rest_args(1))
        } else {
            let mut parts = shell_words::split(command)
                .map_err(|e| call.error(format!("invalid script arguments: {}", e)))?
                .into_iter();
            match parts.next() {
                Some(path) => (path, parts.collect()),
                None => {
                    self.write_line("No script specified.");
                    return Ok(());
                }
            }
        };

        let request = RunRequest::new(path).with_args(args);
        match self.run_hosted(RunnerKind::ExecFile, request) {
            Ok(()) => {}
            Err(RunError::Signal(ExitSignal::Exit { code })) => {
                tracing::info!(status = code, "Script exited; console continues");
                if let Some(rearm) = self.rearm.get() {
                    rearm();
                }
            }
            Err(RunError::Signal(signal)) => return Err(signal.into()),
            Err(RunError::Failed(e)) => {
                self.write_line(&format!("Error while running script: {}", e));
            }
        }
        Ok(())
    }

    /// Execute a file of the given kind with `argv` swapped in for its duration.
    fn execute(&self, kind: RunnerKind, request: RunRequest) -> Result<(), RunError> {
        let _level = self.enter_run()?;
        let path = match kind {
            RunnerKind::RunModule => self.resolve_module(&request.target)?,
            _ => PathBuf::from(&request.target),
        };
        let source = std::fs::read_to_string(&path).map_err(GuardError::from)?;
        tracing::debug!(kind = %kind, path = %path.display(), "Running script");

        let previous = std::mem::replace(&mut *self.argv.write(), request.argv);
        let result = match kind {
            RunnerKind::ExecNotebook => self.execute_notebook(&source),
            _ => script::parse_script(&source)
                .map_err(RunError::from)
                .and_then(|calls| calls.iter().try_for_each(|call| self.eval(call))),
        };
        *self.argv.write() = previous;
        result
    }

    fn execute_notebook(&self, source: &str) -> Result<(), RunError> {
        for (index, cell) in script::parse_notebook(source)?.iter().enumerate() {
            tracing::debug!(cell = index + 1, statements = cell.len(), "Running cell");
            cell.iter().try_for_each(|call| self.eval(call))?;
        }
        Ok(())
    }

    fn resolve_module(&self, name: &str) -> Result<PathBuf, GuardError> {
        let relative = format!("{}.gs", name.replace('.', "/"));
        self.module_paths
            .iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| GuardError::Other(format!("No module named '{}'", name)))
    }

    fn write_line(&self, text: &str) {
        let mut output = self.output.lock();
        let _ = writeln!(output, "{}", text);
        let _ = output.flush();
    }
}

fn request_from(call: &Call) -> Result<RunRequest, GuardError> {
    Ok(RunRequest::new(call.str_arg(0)?).with_args(call.rest_args(1)))
}

/// User-visible `exit`/`quit`: ask the front end, then defer to the host binding.
fn user_namespace(console: Weak<ConsoleInner>) -> Namespace {
    let ns = Namespace::new("user");
    for name in ["exit", "quit"] {
        let console = console.clone();
        let binding = ExitBinding::new(format!("console:{}", name), move |arg: ExitArg| {
            let console = match console.upgrade() {
                Some(console) => console,
                None => return Err(ExitSignal::Exit { code: arg.status() }),
            };
            if let Some(hook) = console.exit_hook.get() {
                hook()?;
            }
            Err(console.host_exit(name, arg))
        });
        if let Err(e) = ns.set(name, binding) {
            tracing::warn!(slot = name, error = %e, "Console binding not installed");
        }
    }
    ns
}

/// Front-end runner: hand the request to the host runner of the same kind.
fn file_runner(console: Weak<ConsoleInner>, kind: RunnerKind) -> Arc<FileRunner> {
    Arc::new(move |request: RunRequest| match console.upgrade() {
        Some(console) => console.run_hosted(kind, request),
        None => Err(GuardError::Other("console is gone".to_string()).into()),
    })
}

fn host_runner(console: Weak<ConsoleInner>, kind: RunnerKind) -> Arc<FileRunner> {
    Arc::new(move |request: RunRequest| match console.upgrade() {
        Some(console) => console.execute(kind, request),
        None => Err(GuardError::Other("console is gone".to_string()).into()),
    })
}
