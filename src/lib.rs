//! Embeddable Substreams sink client core (see `SPEC_FULL.md`).
//!
//! Consumes a server-streamed sequence of block-scoped data from a
//! Substreams RPC endpoint, reconciles chain reorganizations on behalf of a
//! downstream consumer via [`undo_buffer::UndoBuffer`], and delivers a
//! well-ordered stream of block outputs and undo signals to a user-supplied
//! [`handler::BlockDataHandler`] with cursor-based resumability.
//!
//! The entry point is [`sinker::Sinker`]; everything else in this crate is a
//! collaborator it owns or threads through: [`cursor::Cursor`] for
//! resumability, [`session::StreamSession`] for one live RPC attempt,
//! [`backoff::BackoffPolicy`] for reconnection, [`auth::Authenticator`] and
//! [`transport::Transport`] for getting bytes on and off the wire.

pub mod auth;
pub mod backoff;
pub mod block_range;
pub mod config;
pub mod cursor;
pub mod error;
pub mod handler;
pub mod liveness;
pub mod metrics;
pub mod pb;
pub mod request;
pub mod session;
pub mod sinker;
pub mod transport;
pub mod undo_buffer;

pub use config::{ClientConfig, EndpointConfig, SinkerOptions};
pub use cursor::Cursor;
pub use error::{RetryableError, SinkError};
pub use handler::{BlockDataHandler, CompletionHandler};
pub use session::Mode;
pub use sinker::{ShutdownHandle, Sinker};
