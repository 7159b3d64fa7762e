//! Hand-rolled tonic client stub for `sf.substreams.rpc.v2.Stream/Blocks`.
//!
//! The wire schema is treated as an opaque IDL (spec §1), so there is no
//! `build.rs`/`protoc` step generating this; it follows the same shape
//! `tonic-build` itself emits for a single server-streaming RPC, the way the
//! teacher crate hand-writes its own schema module instead of generating it.

use tonic::codegen::*;

use super::sf::substreams::rpc::v2::{Request, Response};

#[derive(Debug, Clone)]
pub struct StreamClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl StreamClient<tonic::transport::Channel> {
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
        D: TryInto<tonic::transport::Endpoint>,
        D::Error: Into<StdError>,
    {
        let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
        Ok(Self::new(conn))
    }
}

impl<T> StreamClient<T>
where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    pub fn new(inner: T) -> Self {
        let inner = tonic::client::Grpc::new(inner);
        Self { inner }
    }

    pub fn with_interceptor<F>(
        inner: T,
        interceptor: F,
    ) -> StreamClient<tonic::service::interceptor::InterceptedService<T, F>>
    where
        F: tonic::service::Interceptor,
        T::ResponseBody: Default,
        T: tonic::codegen::Service<
            http::Request<tonic::body::BoxBody>,
            Response = http::Response<
                <T as tonic::client::GrpcService<tonic::body::BoxBody>>::ResponseBody,
            >,
        >,
        <T as tonic::codegen::Service<http::Request<tonic::body::BoxBody>>>::Error:
            Into<StdError> + Send + Sync,
    {
        StreamClient::new(tonic::service::interceptor::InterceptedService::new(
            inner,
            interceptor,
        ))
    }

    /// `sf.substreams.rpc.v2.Stream/Blocks`: opens the server-streaming RPC
    /// carrying `Response` messages for the given `Request`.
    pub async fn blocks(
        &mut self,
        request: impl tonic::IntoRequest<Request>,
    ) -> Result<tonic::Response<tonic::codec::Streaming<Response>>, tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::new(
                tonic::Code::Unknown,
                format!("Service was not ready: {}", e.into()),
            )
        })?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static("/sf.substreams.rpc.v2.Stream/Blocks");
        self.inner.server_streaming(request.into_request(), path, codec).await
    }
}
