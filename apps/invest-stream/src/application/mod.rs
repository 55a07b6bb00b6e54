//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the streaming session and the port interfaces
//! that define how it talks to the transport.

/// Port interfaces for the transport channel.
pub mod ports;

/// Application services: streaming session, reconnect policy, idle watchdog.
pub mod services;
