//! Service trait and lifecycle management.
//!
//! All services implement the `Service` trait which provides a standard
//! lifecycle (init, shutdown) and health checking interface. Services are
//! shared behind `Arc` by request handlers, so lifecycle methods take `&self`
//! and keep their state in a [`StateCell`].

use std::sync::atomic::{AtomicU8, Ordering};

use rimay_core::error::RimayResult;

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    /// Service has been created but not initialized.
    Created = 0,
    /// Service is initializing.
    Initializing = 1,
    /// Service is running and ready.
    Running = 2,
    /// Service is shutting down.
    ShuttingDown = 3,
    /// Service has been stopped.
    Stopped = 4,
    /// Service encountered a fatal error.
    Failed = 5,
}

impl ServiceState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            4 => Self::Stopped,
            _ => Self::Failed,
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lock-free holder for a service's lifecycle state.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ServiceState::Created as u8))
    }

    pub fn get(&self) -> ServiceState {
        ServiceState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait that all Rimay services must implement.
///
/// Services are initialized in dependency order by the ServiceRegistry.
pub trait Service: Send + Sync {
    /// Human-readable name of this service.
    fn name(&self) -> &str;

    /// Current state of this service.
    fn state(&self) -> ServiceState;

    /// Initialize the service. Called once during application startup.
    fn init(&self) -> RimayResult<()>;

    /// Gracefully shut down the service. Called during application teardown.
    fn shutdown(&self) -> RimayResult<()>;

    /// Health check. Returns true if the service is operational.
    fn is_healthy(&self) -> bool {
        self.state() == ServiceState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestService {
        state: StateCell,
    }

    impl Service for TestService {
        fn name(&self) -> &str { "test" }
        fn state(&self) -> ServiceState { self.state.get() }
        fn init(&self) -> RimayResult<()> {
            self.state.set(ServiceState::Running);
            Ok(())
        }
        fn shutdown(&self) -> RimayResult<()> {
            self.state.set(ServiceState::Stopped);
            Ok(())
        }
    }

    #[test]
    fn test_service_lifecycle() {
        let svc = TestService { state: StateCell::new() };
        assert!(!svc.is_healthy());
        svc.init().unwrap();
        assert!(svc.is_healthy());
        svc.shutdown().unwrap();
        assert!(!svc.is_healthy());
        assert_eq!(svc.state().to_string(), "stopped");
    }
}
