//! Session coordination for Pairlink.
//!
//! A [`SessionCoordinator`] sits on top of a connection manager. It
//! decodes the raw byte stream into [`Message`](pairlink_protocol::Message)s
//! and turns them into [`SessionEvent`]s: ready flags, round start, moves,
//! state syncs, chat, and game over. It holds no game logic itself.
//!
//! # How it fits in the stack
//!
//! ```text
//! Game layer (above)  ← reacts to SessionEvents, calls SessionHandle
//!     ↕
//! Session Layer (this crate)  ← ready/started flags, HELLO, REQUEST
//!     ↕
//! Connection Layer (below)  ← roles, state machine, raw bytes
//! ```

mod config;
mod coordinator;
mod error;
mod event;
mod provider;

pub use config::{SessionConfig, SessionId, SessionMode, SessionSnapshot};
pub use coordinator::{SessionCoordinator, SessionHandle};
pub use error::SessionError;
pub use event::{SessionEvent, into_event_stream};
pub use provider::{ContentProvider, NoContent, StaticContent};
