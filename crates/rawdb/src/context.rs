//! Services handed to operations instead of process-wide singletons

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tessera_serialization::SerializationRegistry;

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait TimeService: Send + Sync {
    /// Current time
    fn current_time(&self) -> u64;
}

/// Time from the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn current_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualTimeService {
    now: AtomicU64,
}

impl ManualTimeService {
    /// Start at `now`
    pub fn new(now: u64) -> Self {
        ManualTimeService {
            now: AtomicU64::new(now),
        }
    }

    /// Set the current time
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::Release);
    }

    /// Move the clock forward
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::AcqRel);
    }
}

impl TimeService for ManualTimeService {
    fn current_time(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

/// Context shared with every operation run by a database.
#[derive(Clone)]
pub struct OperationContext {
    time: Arc<dyn TimeService>,
    registry: Arc<SerializationRegistry>,
}

impl OperationContext {
    /// Create a context
    pub fn new(time: Arc<dyn TimeService>, registry: Arc<SerializationRegistry>) -> Self {
        OperationContext { time, registry }
    }

    /// Time service
    pub fn time(&self) -> &Arc<dyn TimeService> {
        &self.time
    }

    /// Shortcut for `time().current_time()`
    pub fn current_time(&self) -> u64 {
        self.time.current_time()
    }

    /// Registry used for checkpoints and operation payloads
    pub fn registry(&self) -> &Arc<SerializationRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("current_time", &self.time.current_time())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time() {
        let time = ManualTimeService::new(1_000);
        time.advance(500);
        assert_eq!(time.current_time(), 1_500);
        time.set(10);
        assert_eq!(time.current_time(), 10);
    }

    #[test]
    fn test_context_uses_service() {
        let time = Arc::new(ManualTimeService::new(42));
        let context = OperationContext::new(time.clone(), Arc::new(SerializationRegistry::new()));
        assert_eq!(context.current_time(), 42);
        time.advance(1);
        assert_eq!(context.clone().current_time(), 43);
    }

    #[test]
    fn test_system_time_is_after_2020() {
        assert!(SystemTimeService.current_time() > 1_577_836_800_000);
    }
}
