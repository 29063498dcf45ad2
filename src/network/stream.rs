//! Byte channels and the stream type agents speak over.
//!
//! Accepted connections arrive as boxed [`ByteChannel`]s (TCP sockets in
//! production, in-memory duplex pipes in tests). A [`ChannelWrapper`] turns
//! one into a [`ReplicationStream`], optionally running a TLS handshake.

use crate::config::TlsConfig;
use crate::error::ServerError;
use async_trait::async_trait;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{self, BufReader, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::server::TlsStream;

/// Anything an agent can exchange bytes over.
pub trait ByteChannel: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteChannel for T {}

pub type BoxedChannel = Box<dyn ByteChannel>;

/// A plaintext or TLS-wrapped replication connection.
pub enum ReplicationStream {
    Plain(BoxedChannel),
    Tls(Box<TlsStream<BoxedChannel>>),
}

impl ReplicationStream {
    /// Returns true if this is a TLS-encrypted connection.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for ReplicationStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ReplicationStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            ReplicationStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ReplicationStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ReplicationStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            ReplicationStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ReplicationStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            ReplicationStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ReplicationStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            ReplicationStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Secures (or passes through) an accepted channel.
#[async_trait]
pub trait ChannelWrapper: Send + Sync {
    async fn wrap(&self, channel: BoxedChannel) -> io::Result<ReplicationStream>;
}

/// No transport security.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainWrapper;

#[async_trait]
impl ChannelWrapper for PlainWrapper {
    async fn wrap(&self, channel: BoxedChannel) -> io::Result<ReplicationStream> {
        Ok(ReplicationStream::Plain(channel))
    }
}

/// Server-side TLS handshake on every accepted channel.
#[derive(Clone)]
pub struct TlsWrapper {
    acceptor: TlsAcceptor,
}

impl TlsWrapper {
    pub fn new(acceptor: TlsAcceptor) -> Self {
        Self { acceptor }
    }

    /// Load certificates and key from the configured PEM files.
    pub fn from_config(config: &TlsConfig) -> Result<Self, ServerError> {
        let cert_file = read_pem(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer<'static>> =
            certs(cert_reader).collect::<Result<Vec<_>, _>>()?;

        if certs.is_empty() {
            return Err(ServerError::Tls(format!(
                "no certificates found in {}",
                config.cert_path
            )));
        }

        let key_file = read_pem(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let mut keys: Vec<PrivateKeyDer<'static>> = pkcs8_private_keys(key_reader)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(PrivateKeyDer::from)
            .collect();

        if keys.is_empty() {
            return Err(ServerError::Tls(format!(
                "no private keys found in {}",
                config.key_path
            )));
        }

        let key = keys.remove(0);
        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(e.to_string()))?;

        Ok(Self::new(TlsAcceptor::from(Arc::new(tls_config))))
    }
}

fn read_pem(path: &str) -> Result<Vec<u8>, ServerError> {
    std::fs::read(path).map_err(|e| ServerError::Tls(format!("failed to read {path}: {e}")))
}

#[async_trait]
impl ChannelWrapper for TlsWrapper {
    async fn wrap(&self, channel: BoxedChannel) -> io::Result<ReplicationStream> {
        let stream = self.acceptor.accept(channel).await?;
        Ok(ReplicationStream::Tls(Box::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_plain_wrapper_passes_bytes_through() {
        let (client, server) = tokio::io::duplex(64);
        let mut stream = PlainWrapper.wrap(Box::new(server)).await.unwrap();
        assert!(!stream.is_tls());

        let mut client = client;
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_tls_wrapper_rejects_empty_pem() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a certificate").unwrap();
        writeln!(key, "not a key").unwrap();

        let config = TlsConfig {
            cert_path: cert.path().display().to_string(),
            key_path: key.path().display().to_string(),
        };
        let err = TlsWrapper::from_config(&config).err().unwrap();
        assert!(matches!(err, ServerError::Tls(msg) if msg.contains("no certificates")));
    }

    #[test]
    fn test_tls_wrapper_reports_missing_file() {
        let config = TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        };
        assert!(matches!(
            TlsWrapper::from_config(&config),
            Err(ServerError::Tls(msg)) if msg.contains("/nonexistent/cert.pem")
        ));
    }
}
