//! Trust Region Tracker
//!
//! Tracks whether the calling context may actually terminate. The only way
//! to change it is [`TrustState::enter`], whose scope guard puts the previous
//! value back when dropped: on return, on `?`, and while unwinding a panic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How nested trust regions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustMode {
    /// Boolean flag; each region saves the prior value and puts it back.
    #[default]
    SaveRestore,
    /// Saturating depth counter; trusted while any region is open.
    Depth,
}

struct TrustInner {
    mode: TrustMode,
    level: AtomicUsize,
}

/// Shared trust flag for one console.
///
/// Cloning hands out another handle to the same flag. The console runs one
/// command at a time, so the atomic is only there to make the handle
/// `Send + Sync` for bindings stored in a namespace.
#[derive(Clone)]
pub struct TrustState {
    inner: Arc<TrustInner>,
}

impl TrustState {
    pub fn new(mode: TrustMode) -> Self {
        Self {
            inner: Arc::new(TrustInner {
                mode,
                level: AtomicUsize::new(0),
            }),
        }
    }

    pub fn mode(&self) -> TrustMode {
        self.inner.mode
    }

    pub fn is_trusted(&self) -> bool {
        self.inner.level.load(Ordering::SeqCst) > 0
    }

    /// Current nesting depth (`0` or `1` in save/restore mode).
    pub fn depth(&self) -> usize {
        self.inner.level.load(Ordering::SeqCst)
    }

    /// Open a trust region that lasts until the returned scope is dropped.
    #[must_use = "trust is revoked as soon as the scope is dropped"]
    pub fn enter(&self) -> TrustScope {
        let level = &self.inner.level;
        let previous = match self.inner.mode {
            TrustMode::SaveRestore => level.swap(1, Ordering::SeqCst),
            TrustMode::Depth => level
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    Some(n.saturating_add(1))
                })
                .unwrap_or_default(),
        };
        tracing::trace!(previous, "Entered trust region");
        TrustScope {
            state: self.clone(),
            previous,
        }
    }

    /// Run `f` inside a trust region.
    pub fn run_trusted<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.enter();
        f()
    }

    /// Wrap `f` so that every call runs inside a trust region.
    pub fn wrap<A, R, F>(&self, f: F) -> impl Fn(A) -> R + Send + Sync + 'static
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let state = self.clone();
        move |arg| state.run_trusted(|| f(arg))
    }
}

impl Default for TrustState {
    fn default() -> Self {
        Self::new(TrustMode::default())
    }
}

impl std::fmt::Debug for TrustState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustState")
            .field("mode", &self.inner.mode)
            .field("depth", &self.depth())
            .finish()
    }
}

/// An open trust region.
pub struct TrustScope {
    state: TrustState,
    previous: usize,
}

impl Drop for TrustScope {
    fn drop(&mut self) {
        let level = &self.state.inner.level;
        match self.state.inner.mode {
            TrustMode::SaveRestore => level.store(self.previous, Ordering::SeqCst),
            TrustMode::Depth => {
                let _ = level.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    Some(n.saturating_sub(1))
                });
            }
        }
        tracing::trace!(restored = self.previous, "Left trust region");
    }
}
