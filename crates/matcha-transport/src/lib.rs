//! # Matcha Transport
//!
//! Carries protocol traffic between the simulator and a bot program.
//!
//! The simulator plays the reverse WebSocket client role: it dials out to a
//! server run by the bot program, pushes events and answers action requests.
//!
//! ## Features
//!
//! - `ws-client` (default): tokio-tungstenite backed [`WsConnector`]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Protocol adapter    │  (ConnectionHandler)
//! ├──────────────────────┤
//! │  WsClientDriver      │  <- reconnect, heartbeat, request/response
//! ├──────────────────────┤
//! │  Connector           │  <- socket I/O
//! └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use matcha_core::LogNotifier;
//! use matcha_transport::{DriverConfig, WsClientDriver, WsConnector};
//!
//! let driver = WsClientDriver::new(
//!     DriverConfig::new("ws://127.0.0.1:8120/onebot/v11/ws"),
//!     Arc::new(WsConnector::new()),
//!     handler,
//!     Arc::new(LogNotifier),
//! );
//! driver.run().await;
//! ```

pub mod connector;
pub mod driver;

#[cfg(feature = "ws-client")]
pub mod websocket;

pub use connector::{Connector, Inbound, WireSession};
pub use driver::{DriverConfig, DriverState, WsClientDriver};

#[cfg(feature = "ws-client")]
pub use websocket::WsConnector;
