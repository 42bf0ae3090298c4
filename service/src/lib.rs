//! # socket_service
//!
//! A single shared real-time messaging connection with `emit`/`listen`.
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use socket_service::{SocketConfig, SocketService};
//!
//! let service = SocketService::connect(SocketConfig::new("ws://localhost:3000"));
//!
//! service.listen("chat", |payload| println!("chat: {}", payload));
//! service.emit("join", Some(json!({ "room": "lobby" })), None);
//! ```
//!
//! Applications normally build one [`SocketService`] at startup and hand
//! clones to whatever needs it. [`SocketService::global`] gives a
//! process-wide instance configured from the environment instead.

mod socket;

pub use socket::*;
