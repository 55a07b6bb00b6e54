//! gRPC Channel Factory
//!
//! Opens the market data stream as one bidirectional gRPC call over TLS.
//! Control frames are queued into the request stream; responses are decoded
//! into [`InboundFrame`]s.
//!
//! The call runs on its own task from the moment the channel opens, and its
//! response headers are awaited on the first receive, so an open never
//! blocks on a server that only answers after the first request arrives.
//! Authentication failures therefore surface as a transport error on the
//! first receive.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::Streaming;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{ClientTlsConfig, Endpoint};

use super::client::market_data_stream_service_client::MarketDataStreamServiceClient;
use super::codec::{MarketDataCodec, response_kind};
use super::proto::{MarketDataRequest, MarketDataResponse};
use crate::application::ports::{
    Channel, ChannelError, ChannelFactory, ConnectionError, ControlFrame, FrameSink, FrameSource,
    InboundFrame,
};
use crate::infrastructure::config::ClientConfig;

/// Largest response the client accepts. Order books at full depth for many
/// instruments exceed tonic's 4 MiB default.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Control frames buffered ahead of the HTTP/2 stream.
const REQUEST_BUFFER: usize = 64;

// =============================================================================
// Authentication
// =============================================================================

/// Adds the bearer token and application name to every request.
#[derive(Clone)]
pub struct AuthInterceptor {
    authorization: MetadataValue<Ascii>,
    app_name: Option<MetadataValue<Ascii>>,
}

impl AuthInterceptor {
    /// Build the interceptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidCredentials`] if the token or the
    /// application name is not valid header text.
    pub fn new(token: &str, app_name: &str) -> Result<Self, ConnectionError> {
        let authorization = format!("Bearer {token}")
            .parse()
            .map_err(|_| ConnectionError::InvalidCredentials("token is not valid ASCII".into()))?;
        let app_name = if app_name.is_empty() {
            None
        } else {
            Some(app_name.parse().map_err(|_| {
                ConnectionError::InvalidCredentials(format!("app name {app_name:?} is not valid"))
            })?)
        };
        Ok(Self {
            authorization,
            app_name,
        })
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("authorization", &"Bearer [REDACTED]")
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl tonic::service::Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        let metadata = request.metadata_mut();
        metadata.insert("authorization", self.authorization.clone());
        if let Some(app_name) = &self.app_name {
            metadata.insert("x-app-name", app_name.clone());
        }
        Ok(request)
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Opens market data channels to the configured endpoint.
#[derive(Debug, Clone)]
pub struct GrpcChannelFactory {
    endpoint: Endpoint,
    interceptor: AuthInterceptor,
    codec: MarketDataCodec,
}

impl GrpcChannelFactory {
    /// Prepare a factory from client configuration. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidEndpoint`] if the endpoint cannot be
    /// parsed and [`ConnectionError::InvalidCredentials`] if the token cannot
    /// be sent as metadata.
    pub fn new(config: &ClientConfig) -> Result<Self, ConnectionError> {
        let tls = ClientTlsConfig::new()
            .with_native_roots()
            .domain_name(config.host());

        let endpoint = Endpoint::from_shared(config.endpoint_url())
            .map_err(|e| ConnectionError::InvalidEndpoint(e.to_string()))?
            .tls_config(tls)
            .map_err(|e| ConnectionError::InvalidEndpoint(e.to_string()))?
            .connect_timeout(CONNECT_TIMEOUT)
            .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
            .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        let interceptor = AuthInterceptor::new(config.credentials.token(), &config.app_name)?;

        Ok(Self {
            endpoint,
            interceptor,
            codec: MarketDataCodec::new(config.stream.candles_waiting_close),
        })
    }
}

#[async_trait]
impl ChannelFactory for GrpcChannelFactory {
    async fn open_channel(&self) -> Result<Channel, ConnectionError> {
        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| ConnectionError::Unavailable(e.to_string()))?;

        let mut client =
            MarketDataStreamServiceClient::with_interceptor(channel, self.interceptor.clone())
                .max_decoding_message_size(MAX_MESSAGE_SIZE);

        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let (call_tx, call_rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = client
                .market_data_stream(ReceiverStream::new(rx))
                .await
                .map(tonic::Response::into_inner);
            let _ = call_tx.send(result);
        });

        tracing::debug!(endpoint = %self.endpoint.uri(), "Market data channel opened");

        Ok(Channel::new(
            GrpcSink {
                tx: Some(tx),
                codec: self.codec,
            },
            GrpcSource {
                inbound: Inbound::Pending(call_rx),
                codec: self.codec,
            },
        ))
    }
}

// =============================================================================
// Channel Halves
// =============================================================================

struct GrpcSink {
    tx: Option<mpsc::Sender<MarketDataRequest>>,
    codec: MarketDataCodec,
}

#[async_trait]
impl FrameSink for GrpcSink {
    async fn send(&mut self, frame: ControlFrame) -> Result<(), ChannelError> {
        let request = self
            .codec
            .encode(&frame)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        let tx = self.tx.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(request).await.map_err(|_| ChannelError::Closed)
    }

    async fn close(&mut self) {
        // Dropping the sender ends the request stream (half-close).
        self.tx = None;
    }
}

type PendingCall = oneshot::Receiver<Result<Streaming<MarketDataResponse>, tonic::Status>>;

enum Inbound {
    Pending(PendingCall),
    Open(Streaming<MarketDataResponse>),
    Done,
}

struct GrpcSource {
    inbound: Inbound,
    codec: MarketDataCodec,
}

#[async_trait]
impl FrameSource for GrpcSource {
    async fn receive(&mut self) -> Result<InboundFrame, ChannelError> {
        loop {
            match &mut self.inbound {
                Inbound::Pending(call) => match call.await {
                    Ok(Ok(stream)) => self.inbound = Inbound::Open(stream),
                    Ok(Err(status)) => {
                        self.inbound = Inbound::Done;
                        return Err(status_error(&status));
                    }
                    Err(_) => {
                        self.inbound = Inbound::Done;
                        return Err(ChannelError::Closed);
                    }
                },
                Inbound::Open(stream) => match stream.message().await {
                    Ok(Some(response)) => {
                        let kind = response.payload.as_ref().and_then(response_kind);
                        match self.codec.decode(response) {
                            Ok(Some(frame)) => return Ok(frame),
                            Ok(None) => {}
                            Err(e) => {
                                let detail = match kind {
                                    Some(kind) => format!("{kind}: {e}"),
                                    None => e.to_string(),
                                };
                                return Err(ChannelError::Decode(detail));
                            }
                        }
                    }
                    Ok(None) => {
                        self.inbound = Inbound::Done;
                        return Err(ChannelError::Closed);
                    }
                    Err(status) => {
                        self.inbound = Inbound::Done;
                        return Err(status_error(&status));
                    }
                },
                Inbound::Done => return Err(ChannelError::Closed),
            }
        }
    }
}

fn status_error(status: &tonic::Status) -> ChannelError {
    ChannelError::Transport(format!("{:?}: {}", status.code(), status.message()))
}
