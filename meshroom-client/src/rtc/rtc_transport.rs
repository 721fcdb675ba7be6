use crate::error::LinkError;
use crate::link::{SessionTransport, TransportEvent, TransportFactory};
use crate::rtc::rtc_data_channel::RtcDataChannel;
use async_trait::async_trait;
use meshroom_core::{Channel, ConnectionId, IceCandidate, IceServerConfig, SdpType, SessionDescription};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

impl From<webrtc::Error> for LinkError {
    fn from(e: webrtc::Error) -> Self {
        LinkError::Transport(e.to_string())
    }
}

/// Builds a WebRTC peer connection per remote participant.
#[derive(Debug, Default, Clone)]
pub struct RtcTransportFactory;

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    type Transport = RtcTransport;

    async fn create(
        &self,
        remote: ConnectionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<RtcTransport, LinkError> {
        RtcTransport::new(remote, ice_servers, events).await
    }
}

pub struct RtcTransport {
    remote: ConnectionId,
    peer_connection: Arc<RTCPeerConnection>,
    events: mpsc::Sender<TransportEvent>,
    /// Set once the chat and file channels exist, created locally or by the remote.
    channels_ready: Arc<AtomicBool>,
}

impl RtcTransport {
    pub async fn new(
        remote: ConnectionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, LinkError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };
        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let channels_ready = Arc::new(AtomicBool::new(false));

        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    info!("Peer connection to {:?} is {:?}", remote, s);
                    if matches!(
                        s,
                        RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                    ) {
                        let _ = tx.send(TransportEvent::Disconnected).await;
                    }
                })
            },
        ));

        let ice_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                };
                let _ = tx.send(TransportEvent::LocalCandidate(candidate)).await;
            })
        }));

        let dc_tx = events.clone();
        let dc_ready = channels_ready.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            let ready = dc_ready.clone();
            Box::pin(async move {
                let Some(channel) = Channel::from_label(dc.label()) else {
                    warn!("Ignoring unknown data channel '{}' from {:?}", dc.label(), remote);
                    return;
                };
                ready.store(true, Ordering::SeqCst);
                wire_channel(remote, channel, &dc, tx);
            })
        }));

        Ok(Self {
            remote,
            peer_connection,
            events,
            channels_ready,
        })
    }

    async fn open_channels(&self) -> Result<(), LinkError> {
        for channel in Channel::ALL {
            let init = RTCDataChannelInit {
                ordered: Some(true),
                ..Default::default()
            };
            let dc = self
                .peer_connection
                .create_data_channel(channel.label(), Some(init))
                .await?;
            wire_channel(self.remote, channel, &dc, self.events.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionTransport for RtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription, LinkError> {
        // The offering side owns channel creation; the answerer gets them via on_data_channel.
        open_once(&self.channels_ready, || self.open_channels()).await?;
        let offer = self.peer_connection.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        self.peer_connection
            .set_local_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        self.peer_connection
            .set_remote_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Runs `open` unless `ready` is already set; the flag is only set on success.
async fn open_once<F, Fut>(ready: &AtomicBool, open: F) -> Result<(), LinkError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), LinkError>>,
{
    if ready.load(Ordering::SeqCst) {
        return Ok(());
    }
    open().await?;
    ready.store(true, Ordering::SeqCst);
    Ok(())
}

fn wire_channel(
    remote: ConnectionId,
    channel: Channel,
    dc: &Arc<RTCDataChannel>,
    events: mpsc::Sender<TransportEvent>,
) {
    debug!("Wiring {:?} channel to {:?}", channel, remote);

    let open_tx = events.clone();
    let dc_open = dc.clone();
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            let _ = open_tx
                .send(TransportEvent::ChannelOpen(
                    channel,
                    Arc::new(RtcDataChannel::new(dc_open)),
                ))
                .await;
        })
    }));

    let msg_tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = msg_tx.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::Message(channel, msg.data)).await;
        })
    }));

    dc.on_close(Box::new(move || {
        let tx = events.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::ChannelClosed(channel)).await;
        })
    }));
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, LinkError> {
    Ok(match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp)?,
        SdpType::Rollback => {
            return Err(LinkError::UnexpectedDescription(
                "rollback is not supported".into(),
            ));
        }
    })
}

fn to_rtc_ice_server(server: &IceServerConfig) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
    }
}
