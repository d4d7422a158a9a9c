use crate::error::client::ClientError;

use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::io::Result as IoResult;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout as TokioTimeout;

/// Any duplex byte stream the client can speak the protocol over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedTransport = Box<dyn Transport>;

type DialFuture = Pin<Box<dyn Future<Output = IoResult<BoxedTransport>> + Send>>;
type DialFn = Arc<dyn Fn() -> DialFuture + Send + Sync>;

/// Opens fresh transports to the broker.
///
/// The default dialer connects to a Unix domain socket. [`Dialer::from_fn`]
/// accepts any async constructor, which is how tests run the client over
/// in-memory pipes.
#[derive(Clone)]
pub struct Dialer {
    target: String,
    dial: DialFn,
}

impl Dialer {
    /// Dialer for the broker's Unix domain socket at `path`.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let target = path.display().to_string();

        Self::from_fn(target, move || {
            let path = path.clone();
            async move { connect_unix(path).await }
        })
    }

    /// Dialer backed by an arbitrary async constructor. `target` is only used
    /// in log lines and error messages.
    pub fn from_fn<F, Fut, T>(target: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IoResult<T>> + Send + 'static,
        T: Transport,
    {
        let dial: DialFn = Arc::new(move || -> DialFuture {
            let fut = constructor();
            Box::pin(async move { fut.await.map(|transport| Box::new(transport) as BoxedTransport) })
        });

        Self {
            target: target.into(),
            dial,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Opens one transport, giving up after `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the dial fails or times out.
    pub async fn dial(&self, deadline: Duration) -> Result<BoxedTransport, ClientError> {
        debug!("Dialing broker at {} (deadline {deadline:?})", self.target);

        match TokioTimeout(deadline, (self.dial)()).await {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(e)) => Err(ClientError::connect(format!(
                "failed to connect to broker socket {}: {e}",
                self.target
            ))),
            Err(_) => Err(ClientError::connect(format!(
                "timed out after {deadline:?} connecting to broker socket {}",
                self.target
            ))),
        }
    }
}

impl Debug for Dialer {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter
            .debug_struct("Dialer")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
async fn connect_unix(path: PathBuf) -> IoResult<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(not(unix))]
async fn connect_unix(path: PathBuf) -> IoResult<tokio::io::DuplexStream> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!(
            "unix domain sockets are not available on this platform ({})",
            path.display()
        ),
    ))
}
