//! Opens the server-streaming RPC against a configured endpoint (spec §4.G
//! step 3 "Open gRPC client").
//!
//! Kept behind a trait so `Sinker` can be driven in tests by a canned fake
//! without a live server, the same "inject a stream of canned responses"
//! idea the teacher's `SubstreamsStream` wraps a boxed `Stream` trait object
//! for.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tonic::metadata::{AsciiMetadataValue, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::Status;

use crate::auth::{Credential, CredentialKind};
use crate::config::ClientConfig;
use crate::error::SinkError;
use crate::pb::{self, StreamClient};

pub type ResponseStream =
    Pin<Box<dyn Stream<Item = Result<pb::Response, Status>> + Send>>;

/// Opens one server-streaming RPC attempt per call; each call corresponds to
/// exactly one [`crate::session::StreamSession`] (spec §4.F).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: pb::Request) -> Result<ResponseStream, SinkError>;
}

/// Attaches extra headers plus the resolved credential to every outgoing
/// request.
#[derive(Clone)]
struct HeaderInterceptor {
    headers: Vec<(String, String)>,
    credential: Credential,
}

impl Interceptor for HeaderInterceptor {
    fn call(&mut self, mut req: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
        for (key, value) in &self.headers {
            let key = tonic::metadata::MetadataKey::from_bytes(key.as_bytes())
                .map_err(|_| Status::invalid_argument(format!("invalid header name {key:?}")))?;
            let value = AsciiMetadataValue::try_from(value.as_str())
                .map_err(|_| Status::invalid_argument(format!("invalid header value for {key:?}")))?;
            req.metadata_mut().insert(key, value);
        }

        if let Some(header_name) = self.credential.kind.header_name() {
            let value = match self.credential.kind {
                CredentialKind::Jwt => format!("Bearer {}", self.credential.value),
                _ => self.credential.value.clone(),
            };
            let value: MetadataValue<_> = AsciiMetadataValue::try_from(value)
                .map_err(|_| Status::invalid_argument("invalid credential value"))?;
            req.metadata_mut().insert(
                tonic::metadata::MetadataKey::from_bytes(header_name.as_bytes()).unwrap(),
                value,
            );
        }

        Ok(req)
    }
}

/// Real transport: a lazily-connected tonic channel to a single configured
/// endpoint (spec §1 "single configured endpoint" non-goal — no multi-target
/// routing).
pub struct GrpcTransport {
    config: ClientConfig,
    channel: Channel,
}

impl GrpcTransport {
    pub async fn connect(config: ClientConfig) -> Result<Self, SinkError> {
        let mut endpoint = tonic::transport::Endpoint::from_shared(config.endpoint.url.clone())
            .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?;

        if !config.endpoint.plaintext {
            let tls = if config.endpoint.insecure {
                tonic::transport::ClientTlsConfig::new()
            } else {
                tonic::transport::ClientTlsConfig::new().with_native_roots()
            };
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| SinkError::Other(anyhow::Error::new(e)))?;

        Ok(GrpcTransport { config, channel })
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn open(&self, request: pb::Request) -> Result<ResponseStream, SinkError> {
        let credential = self.config.authenticator.resolve();
        let interceptor =
            HeaderInterceptor { headers: self.config.extra_headers.clone(), credential };

        let mut client =
            StreamClient::with_interceptor(self.channel.clone(), interceptor);

        let response = client.blocks(request).await.map_err(|status| {
            classify_connect_error(status)
        })?;

        Ok(Box::pin(response.into_inner()))
    }
}

fn classify_connect_error(status: Status) -> SinkError {
    use crate::error::RetryableError;
    match status.code() {
        tonic::Code::Unauthenticated => SinkError::Authentication(status),
        tonic::Code::InvalidArgument => SinkError::InvalidRequest(status),
        _ => SinkError::Transient(RetryableError::new(status)),
    }
}
