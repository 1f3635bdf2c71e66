//! Transparent forwarding of every RPC the gateway does not intercept.
//!
//! Installed as the fallback service on the gRPC router, so any method that
//! misses the registered services lands here. Frames are relayed in both
//! directions with the raw byte codec; the gateway never learns the message
//! schemas.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::uri::PathAndQuery;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, warn};

use crate::codec::RawCodec;
use crate::upstream::MAX_MESSAGE_SIZE;

type BoxFut<T> = Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Fallback tower service that relays unknown methods to the upstream
/// backend over the shared channel.
#[derive(Clone)]
pub struct TransparentForwarder {
    channel: Channel,
}

impl TransparentForwarder {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

impl tower::Service<http::Request<axum::body::Body>> for TransparentForwarder {
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFut<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<axum::body::Body>) -> Self::Future {
        let channel = self.channel.clone();
        Box::pin(async move {
            let path = req.uri().path().to_owned();
            debug!(method = %path, "relaying unregistered method to upstream");

            let mut grpc = tonic::server::Grpc::new(RawCodec)
                .apply_max_message_size_config(Some(MAX_MESSAGE_SIZE), Some(MAX_MESSAGE_SIZE));
            let relay = RelayCall { channel, path };
            Ok(grpc.streaming(relay, req).await)
        })
    }
}

/// Per-call relay: pumps the producer stream upstream and the upstream
/// stream back down.
struct RelayCall {
    channel: Channel,
    path: String,
}

impl tonic::server::StreamingService<Bytes> for RelayCall {
    type Response = Bytes;
    type ResponseStream = ReceiverStream<Result<Bytes, Status>>;
    type Future = BoxFut<Result<Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, request: Request<Streaming<Bytes>>) -> Self::Future {
        let channel = self.channel.clone();
        let path = self.path.clone();
        Box::pin(async move { relay(channel, path, request).await })
    }
}

async fn relay(
    channel: Channel,
    path: String,
    request: Request<Streaming<Bytes>>,
) -> Result<Response<ReceiverStream<Result<Bytes, Status>>>, Status> {
    let path = PathAndQuery::from_maybe_shared(path)
        .map_err(|e| Status::internal(format!("invalid method path: {e}")))?;

    let (mut metadata, _extensions, mut inbound) = request.into_parts();
    strip_transport_metadata(&mut metadata);

    // producer -> upstream; dropping the sender half-closes the client stream
    let (uplink_tx, uplink_rx) = mpsc::channel::<Bytes>(16);
    // a failed read on the producer side aborts the whole call
    let (abort_tx, mut abort_rx) = mpsc::channel::<Status>(1);

    tokio::spawn(async move {
        loop {
            match inbound.message().await {
                Ok(Some(frame)) => {
                    if uplink_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(status) => {
                    warn!(error = %status, "failed reading producer stream");
                    let _ = abort_tx.try_send(Status::internal(format!(
                        "failed forwarding to upstream: {status}"
                    )));
                    break;
                }
            }
        }
    });

    let mut grpc = tonic::client::Grpc::new(channel)
        .max_encoding_message_size(MAX_MESSAGE_SIZE)
        .max_decoding_message_size(MAX_MESSAGE_SIZE);
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("upstream unavailable: {e}")))?;

    let mut outbound = Request::new(ReceiverStream::new(uplink_rx));
    *outbound.metadata_mut() = metadata;

    let response = grpc.streaming(outbound, path, RawCodec).await?;
    let (mut response_metadata, mut upstream, _) = response.into_parts();
    strip_transport_metadata(&mut response_metadata);

    // upstream -> producer; dropping the upstream stream cancels the call
    let (downlink_tx, downlink_rx) = mpsc::channel::<Result<Bytes, Status>>(16);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = upstream.message() => match frame {
                    Ok(Some(frame)) => {
                        if downlink_tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        let _ = downlink_tx.send(Err(status)).await;
                        break;
                    }
                },
                Some(status) = abort_rx.recv() => {
                    let _ = downlink_tx.send(Err(status)).await;
                    break;
                }
            }
        }
    });

    let mut response = Response::new(ReceiverStream::new(downlink_rx));
    *response.metadata_mut() = response_metadata;
    Ok(response)
}

/// Drop hop-level entries before relaying a metadata map. The transport
/// re-derives these for its own codec; a stale copy would duplicate or
/// shadow them.
fn strip_transport_metadata(metadata: &mut MetadataMap) {
    for key in ["content-type", "te", "grpc-encoding", "grpc-accept-encoding"] {
        metadata.remove(key);
    }
}
