use crate::channel::{create_channel, HUNDRED_MEBIBYTE};
use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::message_handler::{self, LegacyOutcome};
use crate::proto::{self, flower_service_client::FlowerServiceClient};

use std::sync::Arc;

use async_channel::Sender;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tracing::{debug, error, info, warn};

/// Turns one inbound server message into exactly one reply, or a failure
/// that the bridge records without closing the stream.
pub trait MessageHandler: Send + 'static {
    fn handle(&mut self, msg: proto::ServerMessage) -> Result<LegacyOutcome>;
}

impl<F> MessageHandler for F
where
    F: FnMut(proto::ServerMessage) -> Result<LegacyOutcome> + Send + 'static,
{
    fn handle(&mut self, msg: proto::ServerMessage) -> Result<LegacyOutcome> {
        self(msg)
    }
}

/// Dispatches every message to `client` through the legacy handler.
pub fn client_handler<C>(client: Arc<C>) -> impl MessageHandler
where
    C: Client + 'static,
{
    move |msg| message_handler::handle_legacy_message(client.as_ref(), msg)
}

#[derive(Debug)]
pub enum Termination {
    /// The server closed the stream.
    Completed,
    /// The stream ended with an error status.
    Failed(ClientError),
    /// The server asked us to disconnect; the reply was written first.
    Disconnected { sleep_duration: i64 },
    /// The request side of the stream went away before a reply was written.
    OutboundClosed,
}

#[derive(Debug)]
pub struct BridgeSummary {
    /// Messages answered on the stream.
    pub handled: usize,
    /// Handler failures, in arrival order; no reply was written for these.
    pub failures: Vec<ClientError>,
    pub termination: Termination,
}

/// Completion signal of a running bridge.
pub struct BridgeHandle {
    task: JoinHandle<BridgeSummary>,
}

impl BridgeHandle {
    /// Resolves once, when the stream has terminated.
    pub async fn wait(self) -> Result<BridgeSummary> {
        Ok(self.task.await?)
    }
}

/// Generated `FlowerService` client with the inbound message cap applied.
pub fn flower_service_client(channel: Channel) -> FlowerServiceClient<Channel> {
    FlowerServiceClient::new(channel).max_decoding_message_size(HUNDRED_MEBIBYTE)
}

/// Opens the `Join` stream on a fresh channel and starts bridging it.
pub async fn open<H: MessageHandler>(config: &ClientConfig, handler: H) -> Result<BridgeHandle> {
    let channel = create_channel(
        &config.server_address,
        config.use_tls,
        config.root_certificates.as_deref(),
    )
    .await?;
    open_on(flower_service_client(channel), handler).await
}

pub async fn open_on<H: MessageHandler>(
    mut client: FlowerServiceClient<Channel>,
    handler: H,
) -> Result<BridgeHandle> {
    // Outbound queue doubles as the request stream; one reply in flight.
    let (tx, rx) = async_channel::bounded(1);
    let inbound = client
        .join(rx)
        .await
        .map_err(|status| {
            error!(%status, "Join failed");
            ClientError::Rpc(status)
        })?
        .into_inner();
    info!("legacy stream opened");
    Ok(spawn_bridge(inbound, tx, handler))
}

pub fn spawn_bridge<S, H>(
    inbound: S,
    outbound: Sender<proto::ClientMessage>,
    handler: H,
) -> BridgeHandle
where
    S: Stream<Item = std::result::Result<proto::ServerMessage, tonic::Status>>
        + Unpin
        + Send
        + 'static,
    H: MessageHandler,
{
    BridgeHandle {
        task: tokio::spawn(run_bridge(inbound, outbound, handler)),
    }
}

/// Answers inbound messages one at a time until the stream terminates.
pub async fn run_bridge<S, H>(
    mut inbound: S,
    outbound: Sender<proto::ClientMessage>,
    mut handler: H,
) -> BridgeSummary
where
    S: Stream<Item = std::result::Result<proto::ServerMessage, tonic::Status>> + Unpin,
    H: MessageHandler,
{
    let mut handled = 0;
    let mut failures = Vec::new();

    let termination = loop {
        let msg = match inbound.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(status)) => {
                error!(%status, "legacy stream failed");
                break Termination::Failed(ClientError::Rpc(status));
            }
            None => break Termination::Completed,
        };

        let outcome = match handler.handle(msg) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "message handler failed, stream stays open");
                failures.push(err);
                continue;
            }
        };

        if outbound.send(outcome.message).await.is_err() {
            warn!("outbound queue closed");
            break Termination::OutboundClosed;
        }
        handled += 1;

        if !outcome.keep_going {
            break Termination::Disconnected {
                sleep_duration: outcome.sleep_duration,
            };
        }
    };

    outbound.close();
    debug!(handled, failures = failures.len(), ?termination, "legacy stream terminated");
    BridgeSummary {
        handled,
        failures,
        termination,
    }
}
