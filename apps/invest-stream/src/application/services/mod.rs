//! Application Services
//!
//! - `StreamingSession`: owns the channel, routes frames, reconnects
//! - `ReconnectPolicy`: bounded exponential backoff with jitter
//! - `IdleWatchdog`: detects a silent channel

pub mod reconnect;
pub mod session;
pub mod watchdog;

pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use session::{
    ClosedReason, SessionConfig, SessionError, SessionState, SessionStats, StreamingSession,
};
pub use watchdog::IdleWatchdog;
