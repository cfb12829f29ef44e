use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running(u64),
    /// Emitted exactly once, by the tick that reaches zero.
    Expired,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u64,
    stopped: bool,
}

impl Countdown {
    pub fn new(seconds: u64) -> Self {
        Self {
            remaining: seconds,
            stopped: false,
        }
    }

    pub fn tick(&mut self) -> Tick {
        if self.stopped {
            return Tick::Stopped;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.stopped = true;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn clock(&self) -> Clock {
        Clock::from_secs(self.remaining)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Clock {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Clock {
    pub fn from_secs(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn detach(&mut self) {
        self.task.take();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub fn spawn_ticker<F, Fut>(period: Duration, mut on_tick: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if on_tick().await.is_break() {
                break;
            }
        }
    });
    TimerHandle { task: Some(task) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[test]
    fn countdown_floors_at_zero_and_stops() {
        let mut countdown = Countdown::new(3);
        assert_eq!(countdown.tick(), Tick::Running(2));
        assert_eq!(countdown.tick(), Tick::Running(1));
        assert_eq!(countdown.tick(), Tick::Expired);
        assert_eq!(countdown.remaining(), 0);
        assert_eq!(countdown.tick(), Tick::Stopped);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn zero_length_countdown_expires_on_first_tick() {
        let mut countdown = Countdown::new(0);
        assert_eq!(countdown.tick(), Tick::Expired);
        assert!(countdown.is_stopped());
    }

    #[test]
    fn stopped_countdown_keeps_remaining() {
        let mut countdown = Countdown::new(90);
        countdown.tick();
        countdown.stop();
        assert_eq!(countdown.tick(), Tick::Stopped);
        assert_eq!(countdown.remaining(), 89);
    }

    #[test]
    fn clock_is_zero_padded() {
        assert_eq!(Clock::from_secs(5400).to_string(), "01:30:00");
        assert_eq!(Clock::from_secs(3725).to_string(), "01:02:05");
        assert_eq!(Clock::from_secs(59).to_string(), "00:00:59");
        assert_eq!(
            Clock::from_secs(7384),
            Clock { hours: 2, minutes: 3, seconds: 4 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_runs_countdown_to_zero_then_ends() {
        let countdown = Arc::new(Mutex::new(Countdown::new(5)));
        let ticks = Arc::new(AtomicU32::new(0));

        let handle = {
            let countdown = countdown.clone();
            let ticks = ticks.clone();
            spawn_ticker(DEFAULT_TICK, move || {
                let countdown = countdown.clone();
                let ticks = ticks.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    match countdown.lock().await.tick() {
                        Tick::Running(_) => ControlFlow::Continue(()),
                        Tick::Expired | Tick::Stopped => ControlFlow::Break(()),
                    }
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(countdown.lock().await.remaining(), 1);
        assert!(!handle.is_finished());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(countdown.lock().await.remaining(), 0);
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels_ticker() {
        let ticks = Arc::new(AtomicU32::new(0));
        let handle = {
            let ticks = ticks.clone();
            spawn_ticker(DEFAULT_TICK, move || {
                let ticks = ticks.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    ControlFlow::Continue(())
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        drop(handle);
        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
