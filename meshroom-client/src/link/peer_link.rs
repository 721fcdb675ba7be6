use crate::error::LinkError;
use crate::link::negotiation_state::NegotiationState;
use crate::link::transport::{DataChannel, SessionTransport};
use meshroom_core::{Channel, ClientMessage, ConnectionId, IceCandidate, SdpType, SessionDescription};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How an incoming offer reached us; decides which reply carries the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferKind {
    Initial,
    Renegotiation,
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    epoch: u64,
    deadline: Instant,
}

/// Negotiation state and logical channels for one remote participant.
///
/// Driven by discrete inbound events; each method returns the signaling
/// message to relay, if any. Errors never leave the link: a failed
/// description puts it in [`NegotiationState::Failed`] until a fresh offer.
pub struct PeerLink<T: SessionTransport> {
    remote: ConnectionId,
    transport: T,
    state: NegotiationState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending_candidates: VecDeque<IceCandidate>,
    control: Option<Arc<dyn DataChannel>>,
    bulk: Option<Arc<dyn DataChannel>>,
    negotiation_timeout: Duration,
    attempt: Option<Attempt>,
    epoch: u64,
    established: bool,
}

impl<T: SessionTransport> PeerLink<T> {
    pub fn new(remote: ConnectionId, transport: T, negotiation_timeout: Duration) -> Self {
        Self {
            remote,
            transport,
            state: NegotiationState::Idle,
            local_description: None,
            remote_description: None,
            pending_candidates: VecDeque::new(),
            control: None,
            bulk: None,
            negotiation_timeout,
            attempt: None,
            epoch: 0,
            established: false,
        }
    }

    pub fn remote(&self) -> ConnectionId {
        self.remote
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn queued_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Epoch and deadline of the negotiation attempt in flight.
    pub fn deadline(&self) -> Option<(u64, Instant)> {
        self.attempt.map(|a| (a.epoch, a.deadline))
    }

    /// Creates and applies a local offer. Only one offer may be outstanding.
    pub async fn start_offer(&mut self) -> Result<ClientMessage, LinkError> {
        if self.state.is_closed() {
            return Err(LinkError::Closed);
        }
        if !self.state.can_offer() {
            return Err(LinkError::OfferInProgress);
        }

        let renegotiation = self.established;
        self.begin_attempt(NegotiationState::LocalOfferPending);

        let offer = match self.transport.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail(e)),
        };
        if let Err(e) = self.transport.set_local_description(offer.clone()).await {
            return Err(self.fail(e));
        }
        self.local_description = Some(offer.clone());
        self.state = NegotiationState::LocalOfferSet;

        debug!("Offer for {:?} ready, awaiting answer", self.remote);
        self.state = NegotiationState::AnswerAwaited;

        let to = self.remote;
        Ok(if renegotiation {
            ClientMessage::Renegotiate { to, offer }
        } else {
            ClientMessage::Call { to, offer }
        })
    }

    /// Applies a remote offer and produces the answer to relay back.
    pub async fn handle_remote_offer(
        &mut self,
        offer: SessionDescription,
        kind: OfferKind,
    ) -> Result<ClientMessage, LinkError> {
        if self.state.is_closed() {
            return Err(LinkError::Closed);
        }
        if offer.sdp_type != SdpType::Offer {
            return Err(self.fail(LinkError::UnexpectedDescription(format!(
                "expected an offer, got {:?}",
                offer.sdp_type
            ))));
        }
        if self.state.is_negotiating() {
            return Err(self.fail(LinkError::UnexpectedDescription(format!(
                "offer arrived while {:?}",
                self.state
            ))));
        }

        self.begin_attempt(NegotiationState::RemoteOfferReceived);

        if let Err(e) = self.transport.set_remote_description(offer.clone()).await {
            return Err(self.fail(e));
        }
        self.remote_description = Some(offer);
        self.flush_candidates().await;

        let answer = match self.transport.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(e)),
        };
        if let Err(e) = self.transport.set_local_description(answer.clone()).await {
            return Err(self.fail(e));
        }
        self.local_description = Some(answer.clone());
        self.state = NegotiationState::AnswerCreated;
        self.reach_stable();

        let to = self.remote;
        Ok(match kind {
            OfferKind::Initial => ClientMessage::CallAccepted { to, answer },
            OfferKind::Renegotiation => ClientMessage::RenegotiateDone { to, answer },
        })
    }

    pub async fn handle_remote_answer(&mut self, answer: SessionDescription) -> Result<(), LinkError> {
        if self.state.is_closed() {
            return Err(LinkError::Closed);
        }
        if self.state != NegotiationState::AnswerAwaited {
            return Err(self.fail(LinkError::UnexpectedDescription(format!(
                "answer arrived while {:?}",
                self.state
            ))));
        }
        if answer.sdp_type != SdpType::Answer {
            return Err(self.fail(LinkError::UnexpectedDescription(format!(
                "expected an answer, got {:?}",
                answer.sdp_type
            ))));
        }

        if let Err(e) = self.transport.set_remote_description(answer.clone()).await {
            return Err(self.fail(e));
        }
        self.remote_description = Some(answer);
        self.flush_candidates().await;
        self.reach_stable();
        Ok(())
    }

    /// Applies a remote candidate, or queues it until a remote description is set.
    /// Application failures are logged and swallowed.
    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), LinkError> {
        if self.state.is_closed() {
            return Err(LinkError::Closed);
        }

        if self.remote_description.is_none() {
            debug!(
                "Queueing candidate from {:?} ({} queued)",
                self.remote,
                self.pending_candidates.len() + 1
            );
            self.pending_candidates.push_back(candidate);
            return Ok(());
        }

        if let Err(e) = self.transport.add_ice_candidate(candidate).await {
            warn!("Ignoring candidate from {:?}: {}", self.remote, e);
        }
        Ok(())
    }

    /// Wraps a locally gathered candidate for the relay.
    pub fn local_candidate(&self, candidate: IceCandidate) -> Option<ClientMessage> {
        if self.state.is_closed() {
            return None;
        }
        Some(ClientMessage::Candidate {
            to: self.remote,
            candidate,
        })
    }

    /// Fails the attempt identified by `epoch` if it is still in flight.
    pub fn expire(&mut self, epoch: u64) -> bool {
        let current = self
            .attempt
            .is_some_and(|a| a.epoch == epoch && self.state.is_negotiating());
        if !current {
            return false;
        }

        self.fail(LinkError::Timeout);
        true
    }

    pub fn attach_channel(&mut self, channel: Channel, dc: Arc<dyn DataChannel>) {
        debug!("{:?} channel to {:?} is open", channel, self.remote);
        match channel {
            Channel::Control => self.control = Some(dc),
            Channel::Bulk => self.bulk = Some(dc),
        }
    }

    pub fn detach_channel(&mut self, channel: Channel) {
        match channel {
            Channel::Control => self.control = None,
            Channel::Bulk => self.bulk = None,
        }
    }

    pub fn channel(&self, channel: Channel) -> Option<Arc<dyn DataChannel>> {
        match channel {
            Channel::Control => self.control.clone(),
            Channel::Bulk => self.bulk.clone(),
        }
    }

    pub async fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }

        self.state = NegotiationState::Closed;
        self.attempt = None;
        self.pending_candidates.clear();
        self.control = None;
        self.bulk = None;

        if let Err(e) = self.transport.close().await {
            warn!("Error closing transport to {:?}: {}", self.remote, e);
        }
        info!("Link to {:?} closed", self.remote);
    }

    fn begin_attempt(&mut self, state: NegotiationState) {
        self.epoch += 1;
        self.attempt = Some(Attempt {
            epoch: self.epoch,
            deadline: Instant::now() + self.negotiation_timeout,
        });
        self.state = state;
    }

    fn reach_stable(&mut self) {
        self.state = NegotiationState::Stable;
        self.attempt = None;
        self.established = true;
        info!("Link to {:?} is stable", self.remote);
    }

    fn fail(&mut self, err: LinkError) -> LinkError {
        warn!("Negotiation with {:?} failed: {}", self.remote, err);
        self.state = NegotiationState::Failed;
        self.attempt = None;
        self.pending_candidates.clear();
        err
    }

    async fn flush_candidates(&mut self) {
        let queued: Vec<IceCandidate> = self.pending_candidates.drain(..).collect();
        if queued.is_empty() {
            return;
        }

        debug!(
            "Applying {} queued candidates from {:?}",
            queued.len(),
            self.remote
        );
        for candidate in queued {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!("Ignoring queued candidate from {:?}: {}", self.remote, e);
            }
        }
    }
}
