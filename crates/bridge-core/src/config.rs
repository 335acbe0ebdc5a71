//! Coordinator and engine configuration
//!
//! [`BridgeConfig`] controls the coordinator itself (tick cadence, the
//! accept/decline delay, channel sizes). [`EngineOptions`] is handed to the
//! engine by the adapter before the engine is started.
//!
//! # Examples
//!
//! ```rust
//! use sipbridge_core::BridgeConfig;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::new()
//!     .with_tick_interval(Duration::from_millis(10))
//!     .with_answer_delay(Duration::ZERO);
//!
//! assert_eq!(config.tick_interval(), Duration::from_millis(10));
//! assert!(config.answer_delay().is_zero());
//! assert!(config.validate().is_ok());
//! ```
//!
//! Host applications usually pass configuration as JSON:
//!
//! ```rust
//! use sipbridge_core::BridgeConfig;
//!
//! let config = BridgeConfig::from_json(r#"{ "answer_delay_ms": 250, "engine": { "stun_enabled": false } }"#).unwrap();
//! assert_eq!(config.answer_delay_ms, 250);
//! assert!(!config.engine.stun_enabled);
//! assert_eq!(config.tick_interval_ms, 20);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Default engine tick period
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 20;

/// Default pause between stopping the ringtone and accepting/declining
pub const DEFAULT_ANSWER_DELAY_MS: u64 = 100;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How often the engine's event loop is pumped, in milliseconds
    pub tick_interval_ms: u64,

    /// Delay between stopping the ringtone and invoking accept/decline, in
    /// milliseconds. Zero invokes the engine immediately.
    ///
    /// Engines that tear down ringtone playback asynchronously can corrupt
    /// their audio filter graph when a call is answered in the same instant,
    /// so the default keeps a short gap.
    pub answer_delay_ms: u64,

    /// Capacity of the host command queue
    pub command_buffer: usize,

    /// Capacity of the event broadcast channel. Slow listeners that fall
    /// further behind than this lose the oldest events.
    pub event_buffer: usize,

    /// Options applied to the engine before it starts
    pub engine: EngineOptions,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            answer_delay_ms: DEFAULT_ANSWER_DELAY_MS,
            command_buffer: 64,
            event_buffer: 256,
            engine: EngineOptions::default(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BridgeError::invalid_input(format!("bad configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the engine tick period
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the accept/decline delay
    pub fn with_answer_delay(mut self, delay: Duration) -> Self {
        self.answer_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Replace the engine options
    pub fn with_engine_options(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }

    /// Engine tick period as a `Duration`
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Accept/decline delay as a `Duration`
    pub fn answer_delay(&self) -> Duration {
        Duration::from_millis(self.answer_delay_ms)
    }

    /// Check that the settings can drive a coordinator
    pub fn validate(&self) -> BridgeResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(BridgeError::invalid_input("tick_interval_ms must be greater than zero"));
        }
        if self.command_buffer == 0 {
            return Err(BridgeError::invalid_input("command_buffer must be greater than zero"));
        }
        if self.event_buffer == 0 {
            return Err(BridgeError::invalid_input("event_buffer must be greater than zero"));
        }
        Ok(())
    }
}

/// Engine tuning applied by the adapter before start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Enable STUN in the engine's NAT policy
    pub stun_enabled: bool,
    /// Send DTMF as RFC 2833 telephone events
    pub rfc2833_dtmf: bool,
    /// Playback gain in dB
    pub playback_gain_db: f32,
    /// Microphone gain in dB
    pub mic_gain_db: f32,
    /// Turn on the engine's own debug logging
    pub debug_logging: bool,
    /// User-Agent the engine advertises, if overridden
    pub user_agent: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stun_enabled: true,
            rfc2833_dtmf: true,
            playback_gain_db: 1.0,
            mic_gain_db: 1.0,
            debug_logging: false,
            user_agent: None,
        }
    }
}
