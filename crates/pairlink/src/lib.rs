//! # Pairlink
//!
//! Paired-device session framework: two endpoints find each other over a
//! reliable byte stream, agree they're ready, and exchange typed session
//! messages.
//!
//! The layers, bottom-up:
//!
//! - `pairlink-transport`: the stream seam and its TCP implementation
//! - `pairlink-protocol`: the [`Message`](prelude::Message) set and framing
//! - `pairlink-connection`: the listen/connect/connected state machine
//! - `pairlink-session`: ready flags, round start, pass-through events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairlink::prelude::*;
//!
//! # async fn demo() -> Result<(), PairlinkError> {
//! pairlink::init_tracing();
//! let link = Pairlink::builder().display_name("Ada").build()?;
//! link.session().connect("192.168.1.20:7000").await?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;

pub use builder::{Pairlink, PairlinkBuilder};
pub use error::PairlinkError;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything needed to drive a session, in one import.
pub mod prelude {
    pub use crate::{Pairlink, PairlinkBuilder, PairlinkError};
    pub use pairlink_connection::{
        ConnectionEvent, ConnectionHandle, ConnectionState, ManagerConfig, RolePolicy,
    };
    pub use pairlink_protocol::Message;
    pub use pairlink_session::{
        ContentProvider, SessionConfig, SessionEvent, SessionHandle, SessionId, SessionMode,
        SessionSnapshot, StaticContent, into_event_stream,
    };
    pub use pairlink_transport::{PeerAddress, PeerIdentity};
}
