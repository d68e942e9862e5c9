use crate::channel::{create_channel, HUNDRED_MEBIBYTE};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::proto::{self, fleet_client::FleetClient};
use crate::task_handler;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tonic::transport::Channel;
use tracing::{debug, error, info, warn};

/// The four Fleet calls a request/response connection relies on.
#[async_trait]
pub trait FleetApi: Send {
    async fn create_node(
        &mut self,
        request: proto::CreateNodeRequest,
    ) -> std::result::Result<proto::CreateNodeResponse, tonic::Status>;

    async fn delete_node(
        &mut self,
        request: proto::DeleteNodeRequest,
    ) -> std::result::Result<proto::DeleteNodeResponse, tonic::Status>;

    async fn pull_task_ins(
        &mut self,
        request: proto::PullTaskInsRequest,
    ) -> std::result::Result<proto::PullTaskInsResponse, tonic::Status>;

    async fn push_task_res(
        &mut self,
        request: proto::PushTaskResRequest,
    ) -> std::result::Result<proto::PushTaskResResponse, tonic::Status>;
}

/// Generated Fleet client with the inbound message cap applied.
pub fn fleet_client(channel: Channel) -> FleetClient<Channel> {
    FleetClient::new(channel).max_decoding_message_size(HUNDRED_MEBIBYTE)
}

#[async_trait]
impl FleetApi for FleetClient<Channel> {
    async fn create_node(
        &mut self,
        request: proto::CreateNodeRequest,
    ) -> std::result::Result<proto::CreateNodeResponse, tonic::Status> {
        Ok(FleetClient::create_node(self, request).await?.into_inner())
    }

    async fn delete_node(
        &mut self,
        request: proto::DeleteNodeRequest,
    ) -> std::result::Result<proto::DeleteNodeResponse, tonic::Status> {
        Ok(FleetClient::delete_node(self, request).await?.into_inner())
    }

    async fn pull_task_ins(
        &mut self,
        request: proto::PullTaskInsRequest,
    ) -> std::result::Result<proto::PullTaskInsResponse, tonic::Status> {
        Ok(FleetClient::pull_task_ins(self, request).await?.into_inner())
    }

    async fn push_task_res(
        &mut self,
        request: proto::PushTaskResRequest,
    ) -> std::result::Result<proto::PushTaskResResponse, tonic::Status> {
        Ok(FleetClient::push_task_res(self, request).await?.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unregistered,
    RegisteredIdle,
    RegisteredHasPendingTask,
}

/// Request/response connection to the Fleet service.
///
/// Holds at most one node identity and at most one pending instruction.
/// Every operation takes `&mut self`, so state transitions never interleave.
pub struct GrpcRereConnection<F = FleetClient<Channel>> {
    stub: F,
    node: Option<proto::Node>,
    current_task_ins: Option<proto::TaskIns>,
    consumer: Option<mpsc::Sender<proto::TaskIns>>,
}

impl GrpcRereConnection<FleetClient<Channel>> {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let channel = create_channel(
            &config.server_address,
            config.use_tls,
            config.root_certificates.as_deref(),
        )
        .await?;
        Ok(Self::new(fleet_client(channel)))
    }
}

impl<F: FleetApi> GrpcRereConnection<F> {
    pub fn new(stub: F) -> Self {
        Self {
            stub,
            node: None,
            current_task_ins: None,
            consumer: None,
        }
    }

    pub fn node(&self) -> Option<&proto::Node> {
        self.node.as_ref()
    }

    pub fn current_task_ins(&self) -> Option<&proto::TaskIns> {
        self.current_task_ins.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        match (&self.node, &self.current_task_ins) {
            (None, _) => ConnectionState::Unregistered,
            (Some(_), None) => ConnectionState::RegisteredIdle,
            (Some(_), Some(_)) => ConnectionState::RegisteredHasPendingTask,
        }
    }

    /// Registers the single consumer of pulled tasks, replacing any previous
    /// one. A task that finds the channel full is dropped for the consumer;
    /// the pull still returns it and caches it as pending.
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<proto::TaskIns> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.consumer = Some(tx);
        rx
    }

    /// No-op when a node is already registered.
    pub async fn create_node(&mut self) -> Result<()> {
        if let Some(node) = &self.node {
            warn!(node_id = node.node_id, "node already registered, CreateNode skipped");
            return Ok(());
        }

        let response = self
            .stub
            .create_node(proto::CreateNodeRequest::default())
            .await
            .map_err(|status| {
                error!(%status, "CreateNode failed");
                ClientError::Rpc(status)
            })?;

        let node = response.node.ok_or_else(|| {
            ClientError::ProtocolMismatch("CreateNodeResponse without node".to_string())
        })?;
        info!(node_id = node.node_id, "node registered");
        self.node = Some(node);
        Ok(())
    }

    /// No-op when no node is registered.
    pub async fn delete_node(&mut self) -> Result<()> {
        let Some(node) = self.node.clone() else {
            debug!("DeleteNode skipped, no node registered");
            return Ok(());
        };

        let node_id = node.node_id;
        self.stub
            .delete_node(proto::DeleteNodeRequest { node: Some(node) })
            .await
            .map_err(|status| {
                error!(%status, node_id, "DeleteNode failed");
                ClientError::Rpc(status)
            })?;

        info!(node_id, "node deregistered");
        self.node = None;
        self.current_task_ins = None;
        Ok(())
    }

    /// Pulls pending instructions. At most one task surfaces per call: the
    /// head of the response, and only if it passes validation.
    pub async fn receive(&mut self) -> Result<Option<proto::TaskIns>> {
        let Some(node) = self.node.clone() else {
            warn!("Node not available, skipping pull");
            return Ok(None);
        };

        let request = proto::PullTaskInsRequest {
            node: Some(node),
            ..Default::default()
        };
        let response = self.stub.pull_task_ins(request).await.map_err(|status| {
            error!(%status, "PullTaskIns failed");
            ClientError::Rpc(status)
        })?;

        if let Some(reconnect) = &response.reconnect {
            debug!(seconds = reconnect.reconnect, "server reconnect hint");
        }

        let task_ins = match task_handler::get_task_ins(&response) {
            Some(task_ins) if task_handler::validate_task_ins(&task_ins, true) => task_ins,
            Some(task_ins) => {
                debug!(task_id = %task_ins.task_id, "discarding invalid TaskIns");
                return Ok(None);
            }
            None => return Ok(None),
        };

        debug!(
            task_id = %task_ins.task_id,
            batch = response.task_ins_list.len(),
            "TaskIns received"
        );
        self.current_task_ins = Some(task_ins.clone());
        self.emit(task_ins.clone());
        Ok(Some(task_ins))
    }

    fn emit(&mut self, task_ins: proto::TaskIns) {
        let Some(consumer) = &self.consumer else {
            return;
        };
        match consumer.try_send(task_ins) {
            Ok(()) => {}
            Err(TrySendError::Full(task_ins)) => {
                warn!(task_id = %task_ins.task_id, "task consumer is full, dropping emission");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("task consumer dropped, unsubscribing");
                self.consumer = None;
            }
        }
    }

    /// Pushes the result for the pending instruction. The pending instruction
    /// is cleared by every attempt that gets past the state checks, whether
    /// the result is rejected, the call fails or it succeeds.
    pub async fn send(&mut self, task_res: proto::TaskRes) -> Result<()> {
        let Some(node) = self.node.clone() else {
            error!("Node instance missing");
            return Err(ClientError::NodeMissing);
        };
        let Some(task_ins) = self.current_task_ins.take() else {
            error!("No current TaskIns");
            return Err(ClientError::NoPendingTask);
        };

        if !task_handler::validate_task_res(&task_res) {
            error!(task_id = %task_ins.task_id, "TaskRes is invalid");
            return Err(ClientError::InvalidTaskRes);
        }

        let task_res = task_handler::configure_task_res(task_res, &task_ins, node);
        let request = proto::PushTaskResRequest {
            task_res_list: vec![task_res],
        };
        let response = self.stub.push_task_res(request).await.map_err(|status| {
            error!(%status, task_id = %task_ins.task_id, "PushTaskRes failed");
            ClientError::Rpc(status)
        })?;

        debug!(
            task_id = %task_ins.task_id,
            results = ?response.results,
            "TaskRes pushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_handler::tests::fit_task_ins;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        deletes: Vec<proto::DeleteNodeRequest>,
        pulls: Vec<proto::PullTaskInsRequest>,
        pushes: Vec<proto::PushTaskResRequest>,
    }

    #[derive(Default)]
    struct FakeFleet {
        pulls: VecDeque<proto::PullTaskInsResponse>,
        creates: usize,
        fail_create: bool,
        fail_delete: bool,
        fail_push: bool,
        calls: Arc<Mutex<Calls>>,
    }

    #[async_trait]
    impl FleetApi for FakeFleet {
        async fn create_node(
            &mut self,
            _request: proto::CreateNodeRequest,
        ) -> std::result::Result<proto::CreateNodeResponse, tonic::Status> {
            if self.fail_create {
                return Err(tonic::Status::unavailable("down"));
            }
            self.creates += 1;
            Ok(proto::CreateNodeResponse {
                node: Some(proto::Node {
                    node_id: 10 + self.creates as i64,
                    anonymous: false,
                }),
            })
        }

        async fn delete_node(
            &mut self,
            request: proto::DeleteNodeRequest,
        ) -> std::result::Result<proto::DeleteNodeResponse, tonic::Status> {
            self.calls.lock().unwrap().deletes.push(request);
            if self.fail_delete {
                return Err(tonic::Status::internal("boom"));
            }
            Ok(proto::DeleteNodeResponse::default())
        }

        async fn pull_task_ins(
            &mut self,
            request: proto::PullTaskInsRequest,
        ) -> std::result::Result<proto::PullTaskInsResponse, tonic::Status> {
            self.calls.lock().unwrap().pulls.push(request);
            Ok(self.pulls.pop_front().unwrap_or_default())
        }

        async fn push_task_res(
            &mut self,
            request: proto::PushTaskResRequest,
        ) -> std::result::Result<proto::PushTaskResResponse, tonic::Status> {
            self.calls.lock().unwrap().pushes.push(request);
            if self.fail_push {
                return Err(tonic::Status::deadline_exceeded("slow"));
            }
            Ok(proto::PushTaskResResponse::default())
        }
    }

    fn batch(tasks: Vec<proto::TaskIns>) -> proto::PullTaskInsResponse {
        proto::PullTaskInsResponse {
            reconnect: None,
            task_ins_list: tasks,
        }
    }

    fn unstamped_res() -> proto::TaskRes {
        task_handler::wrap_client_message_in_task_res(proto::ClientMessage::default())
    }

    #[tokio::test]
    async fn failed_registration_leaves_no_identity() {
        let mut conn = GrpcRereConnection::new(FakeFleet {
            fail_create: true,
            ..Default::default()
        });
        let err = conn.create_node().await.unwrap_err();
        assert!(matches!(err, ClientError::Rpc(_)));
        assert_eq!(conn.state(), ConnectionState::Unregistered);
    }

    #[tokio::test]
    async fn second_registration_keeps_first_node() {
        let mut conn = GrpcRereConnection::new(FakeFleet::default());
        conn.create_node().await.unwrap();
        conn.create_node().await.unwrap();

        assert_eq!(conn.stub.creates, 1);
        assert_eq!(conn.node().map(|n| n.node_id), Some(11));
    }

    #[tokio::test]
    async fn delete_without_node_is_a_noop() {
        let fleet = FakeFleet::default();
        let calls = fleet.calls.clone();
        let mut conn = GrpcRereConnection::new(fleet);

        conn.delete_node().await.unwrap();
        assert!(calls.lock().unwrap().deletes.is_empty());
    }

    #[tokio::test]
    async fn failed_delete_keeps_identity() {
        let mut conn = GrpcRereConnection::new(FakeFleet {
            fail_delete: true,
            ..Default::default()
        });
        conn.create_node().await.unwrap();

        assert!(conn.delete_node().await.is_err());
        assert_eq!(conn.node().map(|n| n.node_id), Some(11));
    }

    #[tokio::test]
    async fn pull_without_node_sends_nothing() {
        let fleet = FakeFleet {
            pulls: VecDeque::from([batch(vec![fit_task_ins("a")])]),
            ..Default::default()
        };
        let calls = fleet.calls.clone();
        let mut conn = GrpcRereConnection::new(fleet);
        let mut rx = conn.subscribe(1);

        assert_eq!(conn.receive().await.unwrap(), None);
        assert!(calls.lock().unwrap().pulls.is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.state(), ConnectionState::Unregistered);
    }

    #[tokio::test]
    async fn pull_carries_node_identity() {
        let fleet = FakeFleet::default();
        let calls = fleet.calls.clone();
        let mut conn = GrpcRereConnection::new(fleet);
        conn.create_node().await.unwrap();

        conn.receive().await.unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.pulls[0].node.as_ref().map(|n| n.node_id), Some(11));
    }

    #[tokio::test]
    async fn only_one_task_surfaces_per_batch() {
        let mut conn = GrpcRereConnection::new(FakeFleet {
            pulls: VecDeque::from([batch(vec![fit_task_ins("a"), fit_task_ins("b")])]),
            ..Default::default()
        });
        let mut rx = conn.subscribe(4);
        conn.create_node().await.unwrap();

        let task = conn.receive().await.unwrap().unwrap();
        assert_eq!(task.task_id, "a");
        assert_eq!(rx.try_recv().unwrap().task_id, "a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_instruction_is_not_surfaced() {
        let mut reconnect = fit_task_ins("r");
        if let Some(task) = reconnect.task.as_mut() {
            task.legacy_server_message = Some(proto::ServerMessage {
                msg: Some(proto::server_message::Msg::ReconnectIns(
                    proto::server_message::ReconnectIns { seconds: 1 },
                )),
            });
        }
        let mut conn = GrpcRereConnection::new(FakeFleet {
            pulls: VecDeque::from([batch(vec![reconnect])]),
            ..Default::default()
        });
        conn.create_node().await.unwrap();

        assert_eq!(conn.receive().await.unwrap(), None);
        assert_eq!(conn.state(), ConnectionState::RegisteredIdle);
    }

    #[tokio::test]
    async fn dropped_consumer_does_not_fail_pull() {
        let mut conn = GrpcRereConnection::new(FakeFleet {
            pulls: VecDeque::from([batch(vec![fit_task_ins("a")])]),
            ..Default::default()
        });
        drop(conn.subscribe(1));
        conn.create_node().await.unwrap();

        assert!(conn.receive().await.unwrap().is_some());
        assert_eq!(conn.state(), ConnectionState::RegisteredHasPendingTask);
    }

    #[tokio::test]
    async fn full_consumer_does_not_block_pulls() {
        let mut conn = GrpcRereConnection::new(FakeFleet {
            pulls: VecDeque::from([
                batch(vec![fit_task_ins("a")]),
                batch(vec![fit_task_ins("b")]),
            ]),
            ..Default::default()
        });
        let mut rx = conn.subscribe(1);
        conn.create_node().await.unwrap();

        assert_eq!(conn.receive().await.unwrap().unwrap().task_id, "a");
        assert_eq!(conn.receive().await.unwrap().unwrap().task_id, "b");
        assert_eq!(conn.current_task_ins().map(|t| t.task_id.as_str()), Some("b"));

        assert_eq!(rx.try_recv().unwrap().task_id, "a");
        assert!(rx.try_recv().is_err());
        conn.delete_node().await.unwrap();
    }

    #[tokio::test]
    async fn push_without_pending_task_is_rejected() {
        let fleet = FakeFleet::default();
        let calls = fleet.calls.clone();
        let mut conn = GrpcRereConnection::new(fleet);
        conn.create_node().await.unwrap();

        let err = conn.send(unstamped_res()).await.unwrap_err();
        assert!(matches!(err, ClientError::NoPendingTask));
        assert!(calls.lock().unwrap().pushes.is_empty());
    }

    #[tokio::test]
    async fn push_without_node_is_rejected() {
        let mut conn = GrpcRereConnection::new(FakeFleet::default());
        assert!(matches!(
            conn.send(unstamped_res()).await,
            Err(ClientError::NodeMissing)
        ));
    }

    #[tokio::test]
    async fn invalid_result_still_clears_pending_task() {
        let fleet = FakeFleet {
            pulls: VecDeque::from([batch(vec![fit_task_ins("a")])]),
            ..Default::default()
        };
        let calls = fleet.calls.clone();
        let mut conn = GrpcRereConnection::new(fleet);
        conn.create_node().await.unwrap();
        conn.receive().await.unwrap();

        let mut res = unstamped_res();
        res.task_id = "already-set".to_string();
        let err = conn.send(res).await.unwrap_err();

        assert!(matches!(err, ClientError::InvalidTaskRes));
        assert!(calls.lock().unwrap().pushes.is_empty());
        assert_eq!(conn.state(), ConnectionState::RegisteredIdle);
    }

    #[tokio::test]
    async fn failed_push_still_clears_pending_task() {
        let mut conn = GrpcRereConnection::new(FakeFleet {
            pulls: VecDeque::from([batch(vec![fit_task_ins("a")])]),
            fail_push: true,
            ..Default::default()
        });
        conn.create_node().await.unwrap();
        conn.receive().await.unwrap();

        assert!(matches!(
            conn.send(unstamped_res()).await,
            Err(ClientError::Rpc(_))
        ));
        assert_eq!(conn.state(), ConnectionState::RegisteredIdle);
    }

    #[tokio::test]
    async fn pushed_result_is_the_stamped_copy() {
        let fleet = FakeFleet {
            pulls: VecDeque::from([batch(vec![fit_task_ins("a")])]),
            ..Default::default()
        };
        let calls = fleet.calls.clone();
        let mut conn = GrpcRereConnection::new(fleet);
        conn.create_node().await.unwrap();
        conn.receive().await.unwrap();
        conn.send(unstamped_res()).await.unwrap();

        let calls = calls.lock().unwrap();
        let pushed = &calls.pushes[0].task_res_list[0];
        let task = pushed.task.as_ref().unwrap();
        assert_eq!(pushed.group_id, "round-1");
        assert_eq!(pushed.workload_id, 7);
        assert_eq!(task.producer.as_ref().map(|n| n.node_id), Some(11));
        assert_eq!(task.ancestry, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn delete_clears_identity_and_pending_task() {
        let mut conn = GrpcRereConnection::new(FakeFleet {
            pulls: VecDeque::from([batch(vec![fit_task_ins("a")])]),
            ..Default::default()
        });
        conn.create_node().await.unwrap();
        conn.receive().await.unwrap();

        conn.delete_node().await.unwrap();
        assert!(conn.node().is_none());
        assert!(conn.current_task_ins().is_none());
        assert_eq!(conn.state(), ConnectionState::Unregistered);
    }
}
