//! Unix socket server for the ledger.
//!
//! Serves [`Request`]s against a shared [`LocalLedger`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chainfeed_core::{FundingProvider, ProgramLoader, Session, SessionError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};

use crate::error::Result;
use crate::ledger::LocalLedger;
use crate::protocol::{Request, Response};

/// Ledger socket server.
pub struct LedgerServer {
    ledger: Arc<LocalLedger>,
    socket_path: PathBuf,
}

impl LedgerServer {
    /// Create a new server for `ledger`.
    pub fn new(ledger: Arc<LocalLedger>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            socket_path: socket_path.into(),
        }
    }

    /// Bind the socket. The listener is ready to accept once this returns.
    pub fn bind(&self) -> Result<UnixListener> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Ledger socket listening on {}", self.socket_path.display());
        Ok(listener)
    }

    /// Bind and serve forever.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: UnixListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let ledger = Arc::clone(&self.ledger);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ledger).await {
                            tracing::debug!("Ledger connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept ledger connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let response_json = serde_json::to_string(response)? + "\n";
    writer.write_all(response_json.as_bytes()).await?;
    Ok(())
}

async fn handle_connection(stream: UnixStream, ledger: Arc<LocalLedger>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request = match serde_json::from_str::<Request>(&line) {
            Ok(request) => request,
            Err(e) => {
                let response =
                    Response::error(SessionError::Transient(format!("Invalid request: {}", e)));
                write_response(&mut writer, &response).await?;
                continue;
            }
        };

        if let Request::Subscribe { address } = request {
            let subscription = match ledger.subscribe(&address).await {
                Ok(subscription) => subscription,
                Err(e) => return write_response(&mut writer, &Response::error(e)).await,
            };
            write_response(&mut writer, &Response::Subscribed).await?;

            // The connection now belongs to this subscription. The client
            // hanging up cancels it.
            let response = tokio::select! {
                changed = subscription.changed() => match changed {
                    Ok(account) => Response::Changed { account },
                    Err(e) => Response::error(e),
                },
                _ = lines.next_line() => return Ok(()),
            };
            return write_response(&mut writer, &response).await;
        }

        let response = execute_request(request, &ledger).await;
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn execute_request(request: Request, ledger: &LocalLedger) -> Response {
    let result = match request {
        Request::FetchAccount { address } => ledger
            .fetch_account(&address)
            .await
            .map(|account| Response::Account { account }),

        Request::Submit { transaction } => ledger
            .submit(transaction)
            .await
            .map(|signature| Response::Signature { signature }),

        Request::Airdrop { to, lamports } => {
            ledger.airdrop(&to, lamports).await.map(|()| Response::Ok)
        }

        Request::Balance { address } => ledger
            .balance(&address)
            .await
            .map(|lamports| Response::Balance { lamports }),

        Request::EnsureProgram { known } => ledger
            .ensure_program(known)
            .await
            .map(|program| Response::Program { program }),

        Request::Subscribe { .. } => Err(SessionError::Transient(
            "subscribe is only served on its own connection".into(),
        )),
    };
    result.unwrap_or_else(Response::error)
}
