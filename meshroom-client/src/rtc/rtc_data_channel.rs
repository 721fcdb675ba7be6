use crate::error::LinkError;
use crate::link::DataChannel;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct RtcDataChannel {
    inner: Arc<RTCDataChannel>,
}

impl RtcDataChannel {
    pub fn new(inner: Arc<RTCDataChannel>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DataChannel for RtcDataChannel {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn is_open(&self) -> bool {
        self.inner.ready_state() == RTCDataChannelState::Open
    }

    async fn send(&self, data: Bytes) -> Result<(), LinkError> {
        self.inner
            .send(&data)
            .await
            .map(|_| ())
            .map_err(|e| LinkError::Transport(e.to_string()))
    }

    async fn buffered_amount(&self) -> usize {
        self.inner.buffered_amount().await
    }

    async fn wait_buffered_low(&self, threshold: usize) -> Result<(), LinkError> {
        loop {
            if !self.is_open() {
                return Err(LinkError::Closed);
            }
            if self.inner.buffered_amount().await <= threshold {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
