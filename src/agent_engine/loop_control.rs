use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delays are sliced this finely so a stop request cuts them short.
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Stop flag shared between the operator surface and the running loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Only a new task clears the flag.
    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Single-run gate shared by the operator surface and the engine task.
#[derive(Debug, Default)]
pub struct RunControl {
    running: AtomicBool,
    stop: StopSignal,
}

impl RunControl {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            running: AtomicBool::new(false),
            stop,
        }
    }

    /// Marks a run as active and clears any stale stop request. Returns `false` when a run
    /// is already active.
    pub fn try_claim(&self) -> bool {
        let claimed = self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            self.stop.clear();
        }
        claimed
    }

    pub fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }
}

/// Sleeps for `duration` unless a stop is requested first. Returns `true` when the
/// sleep was cut short.
pub async fn interruptible_sleep(duration: Duration, stop: &StopSignal) -> bool {
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        if stop.is_requested() {
            return true;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep((deadline - now).min(SLEEP_SLICE)).await;
    }
}

/// Iteration budget of a run.
#[derive(Debug, Clone)]
pub struct LoopController {
    max_iterations: u32,
    iteration_count: u32,
}

impl LoopController {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            iteration_count: 0,
        }
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn budget_exhausted(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    /// Counts a new iteration and returns its 1-based number.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.iteration_count
    }
}
