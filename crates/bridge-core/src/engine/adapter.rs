//! Lifecycle owner for the engine
//!
//! The adapter is the only holder of the engine instance. It applies
//! [`EngineOptions`], starts and stops the engine, and pumps its event loop
//! when the coordinator's tick fires. Dropping the adapter stops a running
//! engine, so every exit path of the coordinator releases it.

use tracing::{debug, info};

use crate::config::EngineOptions;
use crate::error::{BridgeError, BridgeResult};

use super::{EngineEventSink, SipEngine};

/// Owns and drives one [`SipEngine`]
pub struct EngineAdapter {
    engine: Box<dyn SipEngine>,
    options: EngineOptions,
    sink: EngineEventSink,
    running: bool,
    ticks: u64,
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("engine", &"<engine>")
            .field("options", &self.options)
            .field("running", &self.running)
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl EngineAdapter {
    /// Wrap an engine that has not been started yet
    pub fn new(engine: Box<dyn SipEngine>, options: EngineOptions, sink: EngineEventSink) -> Self {
        Self {
            engine,
            options,
            sink,
            running: false,
            ticks: 0,
        }
    }

    /// Configure and start the engine. Starting a running engine is a no-op.
    pub fn start(&mut self) -> BridgeResult<()> {
        if self.running {
            debug!("engine already running");
            return Ok(());
        }

        self.engine
            .configure(&self.options)
            .map_err(|e| BridgeError::engine_start(e.to_string()))?;
        self.engine
            .start(self.sink.clone())
            .map_err(|e| BridgeError::engine_start(e.to_string()))?;

        self.running = true;
        info!(stun = self.options.stun_enabled, "engine started");
        Ok(())
    }

    /// Stop the engine if it is running
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.engine.stop();
        self.running = false;
        info!(ticks = self.ticks, "engine stopped");
    }

    /// Pump the engine's event loop once
    pub fn tick(&mut self) {
        if self.running {
            self.engine.iterate();
            self.ticks = self.ticks.wrapping_add(1);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The engine, if it has been started
    pub fn running_engine(&mut self) -> BridgeResult<&mut Box<dyn SipEngine>> {
        if !self.running {
            return Err(BridgeError::not_initialized("engine has not been initialized"));
        }
        Ok(&mut self.engine)
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::mock::{EngineOp, MockEngine};
    use tracing_test::traced_test;

    fn adapter() -> (EngineAdapter, crate::mock::MockEngineHandle) {
        let (engine, handle) = MockEngine::new();
        let (sink, _rx) = EngineEventSink::channel();
        (EngineAdapter::new(Box::new(engine), EngineOptions::default(), sink), handle)
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut adapter, handle) = adapter();
        adapter.start().unwrap();
        adapter.start().unwrap();
        let starts = handle.ops().iter().filter(|op| **op == EngineOp::Start).count();
        assert_eq!(starts, 1);
        assert!(adapter.is_running());
    }

    #[test]
    fn test_tick_only_when_running() {
        let (mut adapter, handle) = adapter();
        adapter.tick();
        assert_eq!(handle.iterations(), 0);
        adapter.start().unwrap();
        adapter.tick();
        adapter.tick();
        assert_eq!(handle.iterations(), 2);
    }

    #[test]
    #[traced_test]
    fn test_lifecycle_is_logged() {
        let (mut adapter, _handle) = adapter();
        adapter.start().unwrap();
        adapter.stop();
        assert!(logs_contain("engine started"));
        assert!(logs_contain("engine stopped"));
    }

    #[test]
    fn test_drop_stops_engine() {
        let (mut adapter, handle) = adapter();
        adapter.start().unwrap();
        drop(adapter);
        assert!(!handle.is_started());
        assert_eq!(handle.ops().last(), Some(&EngineOp::Stop));
    }

    #[test]
    fn test_running_engine_requires_start() {
        let (mut adapter, _handle) = adapter();
        assert!(matches!(adapter.running_engine(), Err(BridgeError::NotInitialized { .. })));
    }

    #[test]
    fn test_start_failure_is_reported() {
        let (mut adapter, handle) = adapter();
        handle.fail_next("start", EngineError::StartFailed { reason: "no audio".into() });
        let err = adapter.start().unwrap_err();
        assert!(matches!(err, BridgeError::EngineStartError { .. }));
        assert!(!adapter.is_running());
    }
}
