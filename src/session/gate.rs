use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exclusive-run guard with drop-on-contention semantics
///
/// At most one permit exists at a time. A caller that fails to acquire does
/// not wait and is not queued; its request is simply dropped. The permit
/// releases the gate when dropped, on success and error paths alike.
#[derive(Debug, Clone, Default)]
pub struct RunGate {
    busy: Arc<AtomicBool>,
}

/// Proof of exclusive access; releases the gate on drop
#[derive(Debug)]
pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_dropped() {
        let gate = RunGate::new();
        let permit = gate.try_acquire().expect("gate starts free");
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());

        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_clones_share_one_gate() {
        let gate = RunGate::new();
        let other = gate.clone();
        let _permit = other.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn test_release_on_error_path() {
        fn failing_run(gate: &RunGate) -> Result<(), &'static str> {
            let _permit = gate.try_acquire().ok_or("busy")?;
            Err("boom")
        }

        let gate = RunGate::new();
        assert_eq!(failing_run(&gate), Err("boom"));
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_release_on_panic() {
        let gate = RunGate::new();
        let cloned = gate.clone();
        let outcome = std::panic::catch_unwind(move || {
            let _permit = cloned.try_acquire();
            panic!("filter crashed");
        });
        assert!(outcome.is_err());
        assert!(!gate.is_busy());
    }
}
