use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

use log::trace;
use once_cell::sync::Lazy;

use super::channel::{channel, orphan_receiver, Receiver, Sender};
use crate::utils::capacity::Capacity;

/// Timers created through `after` all share this queue, served by a single thread.
static TIMERS: Lazy<TimerQueue> = Lazy::new(TimerQueue::start);

/// Returns a receiver that delivers the current instant once `duration` has elapsed,
/// and is closed right after.
pub fn after(duration: Duration) -> Receiver<Instant> {
    TIMERS.schedule(Instant::now() + duration)
}

/// Returns a receiver that never delivers a value and is never closed.
pub fn never<T>() -> Receiver<T> {
    orphan_receiver(Capacity::bounded(1))
}

#[derive(Debug)]
struct Timer {
    deadline: Instant,
    sender: Sender<Instant>,
}

// Ordered so that the earliest deadline is at the top of the (max) heap
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for Timer {}

#[derive(Debug, Default)]
struct TimerState {
    timers: BinaryHeap<Timer>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    cv: Condvar,
}

#[derive(Debug)]
struct TimerQueue {
    shared: Arc<TimerShared>,
}

impl TimerQueue {
    fn start() -> Self {
        let shared = Arc::new(TimerShared::default());

        let worker = shared.clone();
        thread::spawn(move || Self::run(&worker));

        Self { shared }
    }

    fn schedule(&self, deadline: Instant) -> Receiver<Instant> {
        let (sender, receiver) = channel(Capacity::bounded(1));

        let mut state = self.shared.state.lock().unwrap();

        // Timers whose receiver is gone would otherwise stay queued until their deadline
        let before = state.timers.len();
        state.timers.retain(|timer| timer.sender.has_receivers());
        if state.timers.len() < before {
            trace!("Discarded {} abandoned timers", before - state.timers.len());
        }

        state.timers.push(Timer { deadline, sender });
        self.shared.cv.notify_one();

        receiver
    }

    fn len(&self) -> usize {
        self.shared.state.lock().unwrap().timers.len()
    }

    fn run(shared: &TimerShared) {
        let mut state = shared.state.lock().unwrap();

        while !state.shutdown {
            let now = Instant::now();

            match state.timers.peek().map(|timer| timer.deadline) {
                None => state = shared.cv.wait(state).unwrap(),
                Some(deadline) if deadline <= now => {
                    if let Some(timer) = state.timers.pop() {
                        // Dropping the sender afterwards closes the channel
                        let _ = timer.sender.send(now);
                    }
                }
                Some(deadline) => {
                    state = shared.cv.wait_timeout(state, deadline - now).unwrap().0;
                }
            }
        }
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        self.shared.state.lock().unwrap().shutdown = true;
        self.shared.cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ringchannel::ChannelError;

    #[test]
    fn test_after() {
        let start = Instant::now();
        let timer = after(Duration::from_millis(50));

        assert_eq!(timer.try_recv(), Err(ChannelError::Empty));

        let fired = timer.recv().unwrap();
        assert!(fired.duration_since(start) >= Duration::from_millis(50));

        assert_eq!(timer.recv(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let queue = TimerQueue::start();
        let now = Instant::now();

        let late = queue.schedule(now + Duration::from_millis(60));
        let early = queue.schedule(now + Duration::from_millis(20));

        let early_fired = early.recv().unwrap();
        assert_eq!(late.try_recv(), Err(ChannelError::Empty));

        let late_fired = late.recv().unwrap();
        assert!(early_fired < late_fired);
    }

    #[test]
    fn test_past_deadline_fires_immediately() {
        let queue = TimerQueue::start();

        let timer = queue.schedule(Instant::now());

        assert!(timer.recv().is_ok());
        assert_eq!(timer.recv(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_dropped_timers_discarded() {
        let queue = TimerQueue::start();
        let deadline = Instant::now() + Duration::from_secs(30);

        for _ in 0..1000 {
            drop(queue.schedule(deadline));
        }

        // Scheduling prunes every abandoned timer, keeping only the live one
        let _live = queue.schedule(deadline);
        assert_eq!(queue.len(), 1);
    }

    #[cfg(target_os = "linux")]
    fn num_threads() -> usize {
        std::fs::read_to_string("/proc/self/status")
            .unwrap()
            .lines()
            .find_map(|line| line.strip_prefix("Threads:"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_after_does_not_spawn_per_timer() {
        // Make sure the shared timer thread already exists
        drop(after(Duration::from_secs(30)));

        let before = num_threads();
        for _ in 0..2000 {
            drop(after(Duration::from_secs(30)));
        }
        let after_timers = num_threads();

        // Leaves room for test harness threads started meanwhile
        assert!(
            after_timers < before + 50,
            "threads before: {before}, after: {after_timers}"
        );
    }

    #[test]
    fn test_never() {
        let r = never::<i32>();

        assert_eq!(r.try_recv(), Err(ChannelError::Empty));
        assert!(!r.is_closed());
    }
}
