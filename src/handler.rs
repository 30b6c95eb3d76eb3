use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{NoMethodPolicy, ServerConfig};
use crate::consts::REPLY_LEN;
use crate::error::{Error, ProtocolError, Result, Stage};
use crate::handshake::{negotiate, no_acceptable_reply, read_method_selection};
use crate::protocol::{ProxyRequest, Resolver, SystemResolver, decode, read_request};
use crate::rewrite::{RewriteDestination, Rewriter};

/// Everything a session needs besides the client stream. Shared by all
/// sessions of a listener.
#[derive(Debug)]
pub struct Context<R = SystemResolver, W = Rewriter> {
    pub config: ServerConfig,
    pub resolver: R,
    pub rewriter: W,
}

impl Context {
    pub fn from_config(config: ServerConfig) -> Self {
        let rewriter = Rewriter::from_redirect(config.redirect_loopback);
        Context {
            config,
            resolver: SystemResolver,
            rewriter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Handshaking,
    RequestPending,
    Dialing,
    Relaying,
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Handshaking => write!(f, "handshaking"),
            State::RequestPending => write!(f, "request-pending"),
            State::Dialing => write!(f, "dialing"),
            State::Relaying => write!(f, "relaying"),
            State::Closed => write!(f, "closed"),
        }
    }
}

/// Bytes moved by a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// client -> destination
    pub upstream: u64,
    /// destination -> client
    pub downstream: u64,
}

/// One client connection, from the first handshake byte to close.
pub struct Session<'a, R, W> {
    ctx: &'a Context<R, W>,
    peer: SocketAddr,
    state: State,
    failed_in: Option<State>,
}

impl<'a, R, W> Session<'a, R, W>
where
    R: Resolver,
    W: RewriteDestination,
{
    pub fn new(ctx: &'a Context<R, W>, peer: SocketAddr) -> Self {
        Self {
            ctx,
            peer,
            state: State::Handshaking,
            failed_in: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// State the session was in when it failed, if it did.
    pub fn failed_in(&self) -> Option<State> {
        self.failed_in
    }

    fn transition(&mut self, next: State) {
        debug!("[{}] {} -> {}", self.peer, self.state, next);
        self.state = next;
    }

    /// Runs the whole session. Both streams are closed when this returns.
    pub async fn run<S>(&mut self, mut client: S) -> Result<RelayStats>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.drive(&mut client).await;
        if result.is_err() {
            self.failed_in = Some(self.state);
        }
        self.transition(State::Closed);
        result
    }

    async fn drive<S>(&mut self, client: &mut S) -> Result<RelayStats>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // ==========================================
        // handshake
        // ==========================================
        self.handshake(client).await?;
        self.transition(State::RequestPending);

        // ==========================================
        // request
        // ==========================================
        let (request, endpoint, reply) = match self.request(client).await {
            Ok(decoded) => decoded,
            Err(e) => {
                self.send_failure(client, &e).await;
                return Err(e);
            }
        };
        info!("[{}] CONNECT {} ({})", self.peer, request, endpoint);
        self.transition(State::Dialing);

        // ==========================================
        // dial, then answer
        // ==========================================
        let mut server = match self.dial(endpoint).await {
            Ok(server) => server,
            Err(e) => {
                self.send_failure(client, &e).await;
                return Err(e);
            }
        };
        client.write_all(&reply).await?;
        self.transition(State::Relaying);

        transfer(client, &mut server).await
    }

    async fn handshake<S>(&mut self, client: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = within(
            Stage::Handshake,
            self.ctx.config.handshake_timeout,
            read_method_selection(client),
        )
        .await?;

        match negotiate(&frame) {
            Ok(reply) => {
                client.write_all(&reply).await?;
                Ok(())
            }
            Err(ProtocolError::NoAcceptableMethod) => {
                if self.ctx.config.no_method_policy == NoMethodPolicy::Reply {
                    if let Err(e) = client.write_all(&no_acceptable_reply()).await {
                        debug!("[{}] failed to send method rejection: {}", self.peer, e);
                    }
                }
                Err(ProtocolError::NoAcceptableMethod.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn request<S>(
        &mut self,
        client: &mut S,
    ) -> Result<(ProxyRequest, SocketAddr, [u8; REPLY_LEN])>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = within(
            Stage::Request,
            self.ctx.config.handshake_timeout,
            read_request(client),
        )
        .await?;
        decode(&frame, &self.ctx.resolver, self.ctx.config.resolve_timeout).await
    }

    async fn dial(&self, endpoint: SocketAddr) -> Result<TcpStream> {
        let target = self.ctx.rewriter.rewrite(endpoint);
        let after = self.ctx.config.connect_timeout;

        match timeout(after, TcpStream::connect(target)).await {
            Err(_) => Err(Error::Timeout {
                stage: Stage::Connect,
                after,
            }),
            Ok(Err(source)) => Err(Error::Dial {
                addr: target,
                source,
            }),
            Ok(Ok(stream)) => {
                debug!("[{}] connected to {}", self.peer, target);
                Ok(stream)
            }
        }
    }

    async fn send_failure<S>(&self, client: &mut S, err: &Error)
    where
        S: AsyncWrite + Unpin,
    {
        let Some(reply) = err.reply() else {
            return;
        };
        debug!("[{}] replying {}", self.peer, reply);
        if let Err(e) = client.write_all(&reply.encode()).await {
            debug!("[{}] failed to send reply: {}", self.peer, e);
        }
    }
}

/// Bounds one blocking step with a deadline.
async fn within<T, E, F>(stage: Stage, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    Error: From<E>,
{
    match timeout(after, fut).await {
        Ok(res) => res.map_err(Error::from),
        Err(_) => Err(Error::Timeout { stage, after }),
    }
}

/// Copies both directions until both have finished.
///
/// EOF on one side only half-closes the other, so a late response still
/// reaches the client; an error on either side ends both.
async fn transfer<S>(client: &mut S, server: &mut TcpStream) -> Result<RelayStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::io::copy_bidirectional(client, server).await {
        Ok((upstream, downstream)) => {
            debug!("relay finished: up {}b, down {}b", upstream, downstream);
            Ok(RelayStats {
                upstream,
                downstream,
            })
        }
        Err(e) => {
            debug!("relay interrupted: {}", e);
            Err(e.into())
        }
    }
}

/// Listener-facing entry point: runs a session and logs how it ended.
pub async fn handle_connection<S, R, W>(stream: S, peer: SocketAddr, ctx: Arc<Context<R, W>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: Resolver,
    W: RewriteDestination,
{
    let mut session = Session::new(&*ctx, peer);
    let result = session.run(stream).await;
    let state = session.failed_in().unwrap_or(State::Closed);

    match result {
        Ok(stats) => info!(
            "[{}] closed: up {}b, down {}b",
            peer, stats.upstream, stats.downstream
        ),
        Err(e) if e.is_protocol() => warn!("[{}] rejected while {}: {}", peer, state, e),
        Err(e @ Error::Transport(_)) => debug!("[{}] closed while {}: {}", peer, state, e),
        Err(e) => error!("[{}] failed while {}: {}", peer, state, e),
    }
}
