//! Shared test utilities for onf-node integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use onf_node::clients::{
    ClientError, CreateNodePayload, CreatedNode, NodeClient, NodeDetail, NodeStatus, Result,
    UpdateNodePayload,
};
use onf_node::{NodeConfig, NodeSpec, NodeState};

pub const WORKSPACE_ID: u64 = 6635707676612587520;
pub const NODE_ID: u64 = 42;
pub const IMAGE: &str = "onfinality/polkadot:v0.9.27";

/// A recorded control plane call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(u64, CreateNodePayload),
    GetDetail(u64, u64),
    GetStatus(u64, u64),
    Update(u64, u64, UpdateNodePayload),
    ExpandStorage(u64, u64, String),
    Stop(u64, u64),
    Resume(u64, u64),
    Terminate(u64, u64),
}

impl Call {
    pub fn is_status_poll(&self) -> bool {
        matches!(self, Call::GetStatus(..))
    }
}

/// In-memory control plane that records every call.
///
/// Status polls replay a script; the last entry repeats once the script is
/// exhausted.
pub struct FakeNodeClient {
    calls: Mutex<Vec<Call>>,
    statuses: Mutex<VecDeque<String>>,
    detail: Mutex<Option<NodeDetail>>,
    fail_on: Mutex<Option<&'static str>>,
}

impl Default for FakeNodeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeNodeClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::from(["running".to_string()])),
            detail: Mutex::new(None),
            fail_on: Mutex::new(None),
        }
    }

    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        *self.statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_detail(self, detail: NodeDetail) -> Self {
        *self.detail.lock().unwrap() = Some(detail);
        self
    }

    /// Make the named call ("update", "stop", "status", ...) fail.
    pub fn failing(self, call: &'static str) -> Self {
        *self.fail_on.lock().unwrap() = Some(call);
        self
    }

    pub fn set_detail(&self, detail: NodeDetail) {
        *self.detail.lock().unwrap() = Some(detail);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than status polls.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !c.is_status_poll() && !matches!(c, Call::GetDetail(..)))
            .collect()
    }

    pub fn status_polls(&self) -> usize {
        self.calls().iter().filter(|c| c.is_status_poll()).count()
    }

    fn record(&self, call: Call, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if *self.fail_on.lock().unwrap() == Some(name) {
            return Err(ClientError::Api {
                status: 500,
                message: format!("{name} failed"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NodeClient for FakeNodeClient {
    async fn create_node(
        &self,
        workspace_id: u64,
        payload: &CreateNodePayload,
    ) -> Result<CreatedNode> {
        self.record(Call::Create(workspace_id, payload.clone()), "create")?;
        Ok(CreatedNode {
            id: NODE_ID,
            image: format!("onfinality/polkadot:{}", payload.image_version),
        })
    }

    async fn get_node_detail(&self, workspace_id: u64, node_id: u64) -> Result<NodeDetail> {
        self.record(Call::GetDetail(workspace_id, node_id), "detail")?;
        self.detail.lock().unwrap().clone().ok_or(ClientError::Api {
            status: 404,
            message: "node not found".to_string(),
        })
    }

    async fn get_node_status(&self, workspace_id: u64, node_id: u64) -> Result<NodeStatus> {
        self.record(Call::GetStatus(workspace_id, node_id), "status")?;
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front().unwrap_or_default()
        } else {
            statuses.front().cloned().unwrap_or_default()
        };
        Ok(NodeStatus { status })
    }

    async fn update_node(
        &self,
        workspace_id: u64,
        node_id: u64,
        payload: &UpdateNodePayload,
    ) -> Result<()> {
        self.record(Call::Update(workspace_id, node_id, payload.clone()), "update")
    }

    async fn expand_node_storage(
        &self,
        workspace_id: u64,
        node_id: u64,
        storage: &str,
    ) -> Result<()> {
        self.record(
            Call::ExpandStorage(workspace_id, node_id, storage.to_string()),
            "expand",
        )
    }

    async fn stop_node(&self, workspace_id: u64, node_id: u64) -> Result<()> {
        self.record(Call::Stop(workspace_id, node_id), "stop")
    }

    async fn resume_node(&self, workspace_id: u64, node_id: u64) -> Result<()> {
        self.record(Call::Resume(workspace_id, node_id), "resume")
    }

    async fn terminate_node(&self, workspace_id: u64, node_id: u64) -> Result<()> {
        self.record(Call::Terminate(workspace_id, node_id), "terminate")
    }
}

pub fn make_config() -> NodeConfig {
    NodeConfig {
        workspace_id: WORKSPACE_ID,
        network_spec_key: "polkadot".to_string(),
        node_spec: NodeSpec {
            key: "unit".to_string(),
            multiplier: 4,
        },
        node_type: "full".to_string(),
        node_name: "ian test".to_string(),
        cluster_hash: "jm".to_string(),
        storage: "150Gi".to_string(),
        image_version: "v0.9.27".to_string(),
        stopped: false,
    }
}

pub fn make_state() -> NodeState {
    NodeState {
        id: NODE_ID,
        image: IMAGE.to_string(),
        config: make_config(),
    }
}

pub fn make_detail(status: &str) -> NodeDetail {
    NodeDetail {
        id: NODE_ID,
        workspace_id: WORKSPACE_ID,
        name: "ian test".to_string(),
        network_spec_key: "polkadot".to_string(),
        node_spec: "unit".to_string(),
        node_spec_multiplier: 4,
        node_type: "full".to_string(),
        cluster_hash: "jm".to_string(),
        storage: "150Gi".to_string(),
        image: IMAGE.to_string(),
        status: status.to_string(),
    }
}
