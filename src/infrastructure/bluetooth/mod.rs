//! Bluetooth Module
//!
//! Direct-command communication with an EV3 brick over a host-supplied
//! Bluetooth Classic transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     BrickService                         │
//! │  (Public facade - connection lifecycle and operations)   │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┬──────────────┐
//!         │             │             │              │
//!         ▼             ▼             ▼              ▼
//! ┌───────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐
//! │  Poller   │  │ Calibrator │  │    Link    │  │ Protocol │
//! │           │  │            │  │            │  │          │
//! │ - Device  │  │ - Gyro     │  │ - Shared   │  │ - Frames │
//! │   list    │  │   zeroing  │  │   state    │  │ - Opcodes│
//! │ - Values  │  │   loop     │  │ - Replies  │  │ - Decode │
//! └───────────┘  └────────────┘  └─────┬──────┘  └──────────┘
//!                                      │
//!                                      ▼
//!                               ┌────────────┐
//!                               │ Transport  │
//!                               │ (host)     │
//!                               └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Direct command framing, opcodes and reply decoding
//! - [`transport`] - Trait implemented by the host's Bluetooth stack
//! - [`poller`] - Device discovery / value polling alternation
//! - [`calibrator`] - Gyro zeroing loop
//! - [`service`] - Main service coordinator

pub(crate) mod calibrator;
pub(crate) mod link;
pub mod poller;
pub mod protocol;
pub mod service;
pub mod transport;

// Re-export main service for convenience
pub use service::BrickService;
pub use transport::Transport;
