//! Client for a ledger served over a Unix socket.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chainfeed_core::{
    Account, Address, FundingProvider, ProgramId, ProgramLoader, Session, SessionError, Signature,
    Subscription, Transaction,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::protocol::{Request, Response};

fn transient(context: &str, err: impl std::fmt::Display) -> SessionError {
    SessionError::Transient(format!("{}: {}", context, err))
}

fn unexpected(response: Response) -> SessionError {
    SessionError::Transient(format!("unexpected response from ledger: {:?}", response))
}

/// One socket connection speaking the line protocol.
struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn open(socket_path: &Path) -> Result<Self, SessionError> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            transient(&format!("failed to connect to ledger at {}", socket_path.display()), e)
        })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    async fn send(&mut self, request: &Request) -> Result<(), SessionError> {
        let line = serde_json::to_string(request).map_err(|e| transient("encode request", e))? + "\n";
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| transient("send request", e))
    }

    async fn recv(&mut self) -> Result<Response, SessionError> {
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| transient("read response", e))?
            .ok_or_else(|| SessionError::Transient("ledger closed the connection".into()))?;
        match serde_json::from_str(&line).map_err(|e| transient("decode response", e))? {
            Response::Error { error } => Err(error.into()),
            response => Ok(response),
        }
    }
}

/// A [`Session`] backed by a ledger node's socket.
///
/// Every request uses a fresh connection; subscriptions hold theirs open until
/// the notification arrives or the [`Subscription`] is dropped.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    socket_path: PathBuf,
}

impl RemoteSession {
    /// Create a client for the node listening on `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn call(&self, request: Request) -> Result<Response, SessionError> {
        let mut conn = Connection::open(&self.socket_path).await?;
        conn.send(&request).await?;
        conn.recv().await
    }
}

#[async_trait]
impl Session for RemoteSession {
    async fn fetch_account(&self, address: &Address) -> Result<Option<Account>, SessionError> {
        match self.call(Request::FetchAccount { address: *address }).await? {
            Response::Account { account } => Ok(account),
            other => Err(unexpected(other)),
        }
    }

    async fn submit(&self, transaction: Transaction) -> Result<Signature, SessionError> {
        match self.call(Request::Submit { transaction }).await? {
            Response::Signature { signature } => Ok(signature),
            other => Err(unexpected(other)),
        }
    }

    async fn subscribe(&self, address: &Address) -> Result<Subscription, SessionError> {
        let mut conn = Connection::open(&self.socket_path).await?;
        conn.send(&Request::Subscribe { address: *address }).await?;
        match conn.recv().await? {
            Response::Subscribed => {}
            other => return Err(unexpected(other)),
        }

        let (mut notifier, subscription) = Subscription::channel(*address);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                response = conn.recv() => match response {
                    Ok(Response::Changed { account }) => Ok(account),
                    Ok(other) => Err(unexpected(other)),
                    Err(e) => Err(e),
                },
                // Dropping the connection cancels the subscription server-side.
                _ = notifier.closed() => return,
            };
            notifier.notify(outcome);
        });
        Ok(subscription)
    }
}

#[async_trait]
impl FundingProvider for RemoteSession {
    async fn airdrop(&self, to: &Address, lamports: u64) -> Result<(), SessionError> {
        match self.call(Request::Airdrop { to: *to, lamports }).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn balance(&self, address: &Address) -> Result<u64, SessionError> {
        match self.call(Request::Balance { address: *address }).await? {
            Response::Balance { lamports } => Ok(lamports),
            other => Err(unexpected(other)),
        }
    }
}

#[async_trait]
impl ProgramLoader for RemoteSession {
    async fn ensure_program(&self, known: Option<ProgramId>) -> Result<ProgramId, SessionError> {
        match self.call(Request::EnsureProgram { known }).await? {
            Response::Program { program } => Ok(program),
            other => Err(unexpected(other)),
        }
    }
}
