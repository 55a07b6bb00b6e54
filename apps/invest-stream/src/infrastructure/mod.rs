//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// gRPC transport for the market data stream.
pub mod grpc;

/// In-process transport for tests and simulations.
pub mod memory;

/// Environment-driven configuration.
pub mod config;

/// Metrics instrumentation through the `metrics` facade.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
