//! Destination rewrite policies applied between request decoding and dialing.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::info;

/// Maps a candidate destination to the endpoint that is actually dialed.
///
/// Implementations are pure and infallible: when no rule applies the
/// candidate comes back unchanged.
pub trait RewriteDestination: Send + Sync {
    fn rewrite(&self, candidate: SocketAddr) -> SocketAddr;
}

impl<F> RewriteDestination for F
where
    F: Fn(SocketAddr) -> SocketAddr + Send + Sync,
{
    fn rewrite(&self, candidate: SocketAddr) -> SocketAddr {
        self(candidate)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl RewriteDestination for Passthrough {
    fn rewrite(&self, candidate: SocketAddr) -> SocketAddr {
        candidate
    }
}

/// Sends requests for 127.0.0.1 to a fixed internal host, keeping the port.
#[derive(Debug, Clone, Copy)]
pub struct LoopbackRedirect {
    target: IpAddr,
}

impl LoopbackRedirect {
    pub fn new(target: IpAddr) -> Self {
        Self { target }
    }
}

impl RewriteDestination for LoopbackRedirect {
    fn rewrite(&self, candidate: SocketAddr) -> SocketAddr {
        if candidate.ip() != IpAddr::V4(Ipv4Addr::LOCALHOST) {
            return candidate;
        }
        let redirected = SocketAddr::new(self.target, candidate.port());
        info!("redirecting {} -> {}", candidate, redirected);
        redirected
    }
}

/// Policy selected at startup, shared by every session.
#[derive(Debug, Clone, Copy)]
pub enum Rewriter {
    Passthrough(Passthrough),
    LoopbackRedirect(LoopbackRedirect),
}

impl Rewriter {
    pub fn from_redirect(target: Option<IpAddr>) -> Self {
        match target {
            Some(ip) => Rewriter::LoopbackRedirect(LoopbackRedirect::new(ip)),
            None => Rewriter::Passthrough(Passthrough),
        }
    }
}

impl RewriteDestination for Rewriter {
    fn rewrite(&self, candidate: SocketAddr) -> SocketAddr {
        match self {
            Rewriter::Passthrough(p) => p.rewrite(candidate),
            Rewriter::LoopbackRedirect(r) => r.rewrite(candidate),
        }
    }
}
