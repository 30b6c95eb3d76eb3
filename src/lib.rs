//! A minimal SOCKS5 CONNECT proxy.
//!
//! Each accepted connection runs one [`Session`]: method negotiation, a single
//! CONNECT request, an optional destination rewrite, the outbound dial and a
//! bidirectional relay until both directions are done.

pub mod config;
pub mod consts;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod protocol;
pub mod rewrite;

pub use config::{NoMethodPolicy, ServerConfig};
pub use error::{Error, ProtocolError, Result, Stage};
pub use handler::{Context, RelayStats, Session, State, handle_connection};
pub use handshake::negotiate;
pub use protocol::{ProxyRequest, Reply, Resolver, SystemResolver, decode};
pub use rewrite::{LoopbackRedirect, Passthrough, RewriteDestination, Rewriter};
