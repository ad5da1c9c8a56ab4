// Shared infrastructure
pub mod admission;
pub mod config;
pub mod error;
pub mod metrics;

// Rooms and fan-out
pub mod connection_manager;

// Application layer
pub mod api;
pub mod cli;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
