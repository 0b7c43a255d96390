use std::time::{Duration, Instant};

/// Interval between two automatic advances.
pub const SLIDESHOW_PERIOD: Duration = Duration::from_millis(3500);

pub const INACTIVE_SYMBOL: &str = "🌙";
pub const ACTIVE_SYMBOL: &str = "🌕";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowState {
    Stopped,
    Running { next_tick: Instant },
}

/// Repeating timer behind the slideshow toggle.
#[derive(Debug, Clone)]
pub struct Slideshow {
    state: SlideshowState,
    period: Duration,
}

impl Default for Slideshow {
    fn default() -> Self {
        Self::new(SLIDESHOW_PERIOD)
    }
}

impl Slideshow {
    pub fn new(period: Duration) -> Self {
        Self {
            state: SlideshowState::Stopped,
            period,
        }
    }

    pub fn state(&self) -> SlideshowState {
        self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SlideshowState::Running { .. })
    }

    pub fn start(&mut self, now: Instant) {
        if !self.is_running() {
            self.state = SlideshowState::Running {
                next_tick: now + self.period,
            };
        }
    }

    /// Cancel the timer. No tick fires after this returns.
    pub fn stop(&mut self) {
        self.state = SlideshowState::Stopped;
    }

    /// Flip the toggle; returns whether the slideshow now runs.
    pub fn toggle(&mut self, now: Instant) -> bool {
        if self.is_running() {
            self.stop();
        } else {
            self.start(now);
        }
        self.is_running()
    }

    /// Instants of the ticks that fired up to `now`, oldest first.
    /// Ticks land on `start + k * period` regardless of when this is called.
    pub fn due_ticks(&mut self, now: Instant) -> Vec<Instant> {
        let mut fired = Vec::new();
        if let SlideshowState::Running { mut next_tick } = self.state {
            while next_tick <= now {
                fired.push(next_tick);
                next_tick += self.period;
            }
            self.state = SlideshowState::Running { next_tick };
        }
        fired
    }

    /// Symbol shown on the toggle control.
    pub fn symbol(&self) -> &'static str {
        if self.is_running() {
            ACTIVE_SYMBOL
        } else {
            INACTIVE_SYMBOL
        }
    }
}
