//! Connection lifecycle management for Pairlink.
//!
//! A [`ConnectionManager`] runs as an isolated Tokio task (actor model)
//! that owns the connection state and at most one live role: a listener,
//! a connector, or a duplex channel over an established stream.
//!
//! # Key types
//!
//! - [`ConnectionManager`]: spawns the manager task over a transport
//! - [`ConnectionHandle`]: send commands to a running manager
//! - [`ConnectionState`]: lifecycle state machine
//! - [`ConnectionEvent`]: ordered notifications for the owner
//! - [`ManagerConfig`]: role policy and read buffer size

mod config;
mod error;
mod event;
mod manager;
mod roles;

pub use config::{ConnectionState, ManagerConfig, RolePolicy};
pub use error::ConnectionError;
pub use event::ConnectionEvent;
pub use manager::{ConnectionHandle, ConnectionManager, PLACEHOLDER_LABEL};
pub use pairlink_transport::{PeerAddress, PeerIdentity};
