//! Server lifecycle and leadership state.
//!
//! ```text
//!   Idle ──start()──► Running ──halt()──► Halting ──► Halted
//! ```
//!
//! Every transition is a compare-and-set, so of two concurrent `halt()`
//! calls exactly one performs the teardown. A halted server is not
//! restarted.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Running = 1,
    Halting = 2,
    Halted = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Running,
            2 => LifecycleState::Halting,
            _ => LifecycleState::Halted,
        }
    }
}

/// Atomically stored [`LifecycleState`].
#[derive(Debug)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Idle as u8))
    }

    pub fn load(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. Returns `false` if the state was not `from`.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn store(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether this node currently leads the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Leadership {
    Follower = 0,
    Alpha = 1,
}

/// Atomically stored [`Leadership`]. Starts as `Follower`.
#[derive(Debug, Default)]
pub struct LeadershipFlag(AtomicU8);

impl LeadershipFlag {
    pub fn load(&self) -> Leadership {
        match self.0.load(Ordering::Acquire) {
            0 => Leadership::Follower,
            _ => Leadership::Alpha,
        }
    }

    pub fn store(&self, leadership: Leadership) {
        self.0.store(leadership as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_state_machine() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.load(), LifecycleState::Idle);
        assert!(!lifecycle.transition(LifecycleState::Running, LifecycleState::Halting));
        assert!(lifecycle.transition(LifecycleState::Idle, LifecycleState::Running));
        assert!(lifecycle.transition(LifecycleState::Running, LifecycleState::Halting));
        assert!(!lifecycle.transition(LifecycleState::Running, LifecycleState::Halting));
        lifecycle.store(LifecycleState::Halted);
        assert_eq!(lifecycle.load(), LifecycleState::Halted);
    }

    #[test]
    fn concurrent_halts_have_one_winner() {
        let lifecycle = std::sync::Arc::new(Lifecycle::new());
        lifecycle.transition(LifecycleState::Idle, LifecycleState::Running);

        let winners: usize = (0..8)
            .map(|_| {
                let lifecycle = std::sync::Arc::clone(&lifecycle);
                std::thread::spawn(move || {
                    lifecycle.transition(LifecycleState::Running, LifecycleState::Halting)
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn leadership_defaults_to_follower() {
        let flag = LeadershipFlag::default();
        assert_eq!(flag.load(), Leadership::Follower);
        flag.store(Leadership::Alpha);
        assert_eq!(flag.load(), Leadership::Alpha);
    }
}
