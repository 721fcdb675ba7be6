use async_trait::async_trait;
use meshroom_client::{LinkError, SessionTransport, TransportEvent, TransportFactory};
use meshroom_core::{ConnectionId, IceCandidate, IceServerConfig, SessionDescription};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Accepts every description and reports one host candidate per local description.
pub struct MockTransport {
    remote: ConnectionId,
    events: mpsc::Sender<TransportEvent>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    fn record(&self, op: impl Into<String>) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op.into());
        }
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription, LinkError> {
        self.record("create_offer");
        Ok(SessionDescription::offer(format!("v=0 offer to {}", self.remote)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        self.record("create_answer");
        Ok(SessionDescription::answer(format!("v=0 answer to {}", self.remote)))
    }

    async fn set_local_description(&self, _desc: SessionDescription) -> Result<(), LinkError> {
        self.record("set_local");
        let _ = self
            .events
            .send(TransportEvent::LocalCandidate(IceCandidate::new(
                "candidate:1 1 udp 2122260223 10.0.0.1 50000 typ host",
            )))
            .await;
        Ok(())
    }

    async fn set_remote_description(&self, _desc: SessionDescription) -> Result<(), LinkError> {
        self.record("set_remote");
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError> {
        self.record(format!("candidate {}", candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.record("close");
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockTransportFactory {
    pub ops: Arc<Mutex<Vec<String>>>,
}

impl MockTransportFactory {
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    type Transport = MockTransport;

    async fn create(
        &self,
        remote: ConnectionId,
        _ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<MockTransport, LinkError> {
        Ok(MockTransport {
            remote,
            events,
            ops: self.ops.clone(),
        })
    }
}
