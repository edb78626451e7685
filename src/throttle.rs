use std::thread;
use std::time::Duration;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    /// Submissions made before the pause started.
    pub after: u64,
    pub duration: Duration,
}

/// Submission rate policy. `admit_next` is called once per attempted
/// submission and blocks until the next one may start.
pub trait Throttle {
    fn admit_next(&mut self) -> Option<Pause>;
}

/// Blocks for `cooldown` after every `batch_size` submissions.
#[derive(Debug)]
pub struct BatchCooldown<S: Sleeper = ThreadSleeper> {
    batch_size: u64,
    cooldown: Duration,
    submitted: u64,
    sleeper: S,
}

impl BatchCooldown<ThreadSleeper> {
    pub fn new(batch_size: usize, cooldown: Duration) -> Self {
        Self::with_sleeper(batch_size, cooldown, ThreadSleeper)
    }
}

impl<S: Sleeper> BatchCooldown<S> {
    pub fn with_sleeper(batch_size: usize, cooldown: Duration, sleeper: S) -> Self {
        Self {
            batch_size: batch_size.max(1) as u64,
            cooldown,
            submitted: 0,
            sleeper,
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }
}

impl<S: Sleeper> Throttle for BatchCooldown<S> {
    fn admit_next(&mut self) -> Option<Pause> {
        self.submitted += 1;
        if self.submitted % self.batch_size != 0 {
            return None;
        }
        tracing::info!(
            submitted = self.submitted,
            cooldown_secs = self.cooldown.as_secs_f64(),
            "waiting for engine, batch {} submitted",
            self.submitted
        );
        self.sleeper.sleep(self.cooldown);
        Some(Pause {
            after: self.submitted,
            duration: self.cooldown,
        })
    }
}

/// No pacing at all; used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unthrottled;

impl Throttle for Unthrottled {
    fn admit_next(&mut self) -> Option<Pause> {
        None
    }
}
