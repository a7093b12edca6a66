use crate::error::NegotiationError;
use crate::signal::session::create_webrtc_api;
use crate::signal::{PeerSession, Signal};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use webrtc::api::API;

/// Signaling lifecycle of the one session a process negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet announced to the relay.
    Idle,
    /// Join sent, waiting for a second participant.
    AwaitingPeer,
    /// A peer joined after us; we are producing the offer.
    Offering,
    /// We joined second; we are answering a received offer.
    Answering,
    /// Descriptions in flight, ICE candidates trickling.
    Negotiating,
    /// Offer and answer both applied. The pipeline may start; transport
    /// connectivity converges underneath it.
    Established,
    /// Negotiation failed. Terminal.
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::AwaitingPeer => "AwaitingPeer",
            SessionState::Offering => "Offering",
            SessionState::Answering => "Answering",
            SessionState::Negotiating => "Negotiating",
            SessionState::Established => "Established",
            SessionState::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

/// Negotiates exactly one [`PeerSession`] against the relay.
///
/// All inbound messages pass through [`handle`](Self::handle) on a single
/// task, in arrival order; two offers can never race against the session
/// state. Candidates arriving before the peer connection exists are dropped
/// with a warning.
pub struct SignalingMachine {
    api: Arc<API>,
    state: SessionState,
    session: Option<Arc<PeerSession>>,
    outbound: mpsc::Sender<Signal>,
}

impl SignalingMachine {
    pub fn new(outbound: mpsc::Sender<Signal>) -> Result<SignalingMachine, NegotiationError> {
        Ok(SignalingMachine {
            api: create_webrtc_api()?,
            state: SessionState::Idle,
            session: None,
            outbound,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Arc<PeerSession>> {
        self.session.as_ref()
    }

    fn advance(&mut self, next: SessionState) {
        log::info!("signaling: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Announce ourselves to the relay and start waiting for a peer.
    pub async fn join(&mut self) -> Result<(), NegotiationError> {
        self.send(Signal::join()).await?;
        self.advance(SessionState::AwaitingPeer);
        Ok(())
    }

    /// Process one inbound signaling message. A [`NegotiationError`] is
    /// fatal and leaves the machine in [`SessionState::Failed`].
    pub async fn handle(&mut self, signal: Signal) -> Result<(), NegotiationError> {
        log::debug!("signaling: received {} in state {}", signal.kind(), self.state);
        let outcome = match signal {
            Signal::Join(_) => self.on_join().await,
            Signal::Offer(sdp) => self.on_offer(sdp).await,
            Signal::Answer(sdp) => self.on_answer(sdp).await,
            Signal::IceCandidate(candidate) => {
                self.on_candidate(candidate).await;
                Ok(())
            }
        };
        if outcome.is_err() {
            self.advance(SessionState::Failed);
        }
        outcome
    }

    /// Drive the machine until the session is established, then keep
    /// serializing late candidates and stray joins on a background task.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Signal>,
    ) -> Result<(Arc<PeerSession>, JoinHandle<()>), NegotiationError> {
        self.join().await?;

        while self.state != SessionState::Established {
            let Some(signal) = inbound.recv().await else {
                self.advance(SessionState::Failed);
                return Err(NegotiationError::RelayClosed);
            };
            self.handle(signal).await?;
        }

        let session = Arc::clone(self.session.as_ref().expect("established without a session"));

        let drain = tokio::spawn(async move {
            while let Some(signal) = inbound.recv().await {
                if let Err(e) = self.handle(signal).await {
                    log::error!("signaling error after establishment: {e}");
                    break;
                }
            }
        });

        Ok((session, drain))
    }

    /// A second participant joined the call: take the offering role.
    async fn on_join(&mut self) -> Result<(), NegotiationError> {
        if self.state != SessionState::AwaitingPeer {
            log::warn!("ignoring join in state {}", self.state);
            return Ok(());
        }

        self.advance(SessionState::Offering);
        let session = PeerSession::new(&self.api, self.outbound.clone()).await?;
        let sdp = session.create_offer().await?;
        self.session = Some(session);

        self.send(Signal::Offer(sdp)).await?;
        self.advance(SessionState::Negotiating);
        Ok(())
    }

    /// We are the second participant: answer the received offer.
    async fn on_offer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        if self.state != SessionState::AwaitingPeer {
            log::warn!("ignoring offer in state {}", self.state);
            return Ok(());
        }

        self.advance(SessionState::Answering);
        let session = PeerSession::new(&self.api, self.outbound.clone()).await?;
        let answer = session.accept_offer(sdp).await?;
        self.session = Some(session);

        self.send(Signal::Answer(answer)).await?;
        // Both descriptions are applied; nothing left to negotiate but
        // transport-level candidates.
        self.advance(SessionState::Negotiating);
        self.advance(SessionState::Established);
        Ok(())
    }

    async fn on_answer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        if self.state != SessionState::Negotiating {
            log::warn!("ignoring answer in state {}", self.state);
            return Ok(());
        }
        let Some(session) = self.session.as_ref() else {
            log::warn!("ignoring answer: no peer connection");
            return Ok(());
        };
        session.accept_answer(sdp).await?;
        self.advance(SessionState::Established);
        Ok(())
    }

    async fn on_candidate(&mut self, candidate: String) {
        match self.session.as_ref() {
            Some(session) => {
                if let Err(e) = session.add_candidate(candidate).await {
                    log::warn!("failed to apply remote ICE candidate: {e}");
                }
            }
            None => {
                log::warn!("dropping ICE candidate received before peer connection exists");
            }
        }
    }

    async fn send(&self, signal: Signal) -> Result<(), NegotiationError> {
        self.outbound
            .send(signal)
            .await
            .map_err(|_| NegotiationError::RelayClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> (SignalingMachine, mpsc::Receiver<Signal>) {
        let (tx, rx) = mpsc::channel(16);
        (SignalingMachine::new(tx).unwrap(), rx)
    }

    /// Next outbound message that is not a locally gathered candidate;
    /// gathering runs in the background and may interleave with the
    /// description messages.
    async fn next_description(out: &mut mpsc::Receiver<Signal>) -> Signal {
        loop {
            match out.recv().await.unwrap() {
                Signal::IceCandidate(_) => continue,
                signal => return signal,
            }
        }
    }

    /// A valid offer SDP as a remote participant would produce it.
    async fn remote_offer() -> (Arc<PeerSession>, mpsc::Receiver<Signal>, String) {
        let api = create_webrtc_api().unwrap();
        let (tx, rx) = mpsc::channel(16);
        let peer = PeerSession::new(&api, tx).await.unwrap();
        let sdp = peer.create_offer().await.unwrap();
        (peer, rx, sdp)
    }

    #[tokio::test]
    async fn answering_role_follows_message_order() {
        let (mut m, mut out) = machine();

        m.join().await.unwrap();
        assert_eq!(m.state(), SessionState::AwaitingPeer);
        assert_eq!(out.recv().await.unwrap(), Signal::join());

        // A candidate before the peer connection exists is dropped, not
        // applied and not fatal.
        m.handle(Signal::IceCandidate("candidate:0 1 udp 1 127.0.0.1 9 typ host".into()))
            .await
            .unwrap();
        assert_eq!(m.state(), SessionState::AwaitingPeer);
        assert!(m.session().is_none());

        let (_peer, _peer_out, offer_sdp) = remote_offer().await;
        m.handle(Signal::Offer(offer_sdp)).await.unwrap();
        assert_eq!(m.state(), SessionState::Established);
        assert!(m.session().is_some());

        match next_description(&mut out).await {
            Signal::Answer(sdp) => assert!(sdp.contains("v=0")),
            other => panic!("expected answer, got {}", other.kind()),
        }

        // With the session in place candidates are applied immediately;
        // an unparseable one is logged and skipped.
        m.handle(Signal::IceCandidate("not a candidate".into()))
            .await
            .unwrap();
        assert_eq!(m.state(), SessionState::Established);
    }

    #[tokio::test]
    async fn offering_role_completes_on_answer() {
        let (mut m, mut out) = machine();
        m.join().await.unwrap();
        let _ = out.recv().await.unwrap();

        m.handle(Signal::join()).await.unwrap();
        assert_eq!(m.state(), SessionState::Negotiating);
        let offer_sdp = match next_description(&mut out).await {
            Signal::Offer(sdp) => sdp,
            other => panic!("expected offer, got {}", other.kind()),
        };

        // The remote side answers our offer.
        let api = create_webrtc_api().unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let remote = PeerSession::new(&api, tx).await.unwrap();
        let answer_sdp = remote.accept_offer(offer_sdp).await.unwrap();

        m.handle(Signal::Answer(answer_sdp)).await.unwrap();
        assert_eq!(m.state(), SessionState::Established);
    }

    #[tokio::test]
    async fn second_join_after_established_is_ignored() {
        let (mut m, mut out) = machine();
        m.join().await.unwrap();
        let _ = out.recv().await.unwrap();

        let (_peer, _peer_out, offer_sdp) = remote_offer().await;
        m.handle(Signal::Offer(offer_sdp)).await.unwrap();
        assert_eq!(m.state(), SessionState::Established);

        let before = Arc::as_ptr(m.session().unwrap());
        m.handle(Signal::join()).await.unwrap();
        assert_eq!(m.state(), SessionState::Established);
        assert_eq!(Arc::as_ptr(m.session().unwrap()), before);

        // Same for a late offer: one session per process, ever.
        let (_peer2, _peer_out2, offer2) = remote_offer().await;
        m.handle(Signal::Offer(offer2)).await.unwrap();
        assert_eq!(Arc::as_ptr(m.session().unwrap()), before);
    }

    #[tokio::test]
    async fn answer_before_offer_is_ignored() {
        let (mut m, mut out) = machine();
        m.join().await.unwrap();
        let _ = out.recv().await.unwrap();

        m.handle(Signal::Answer("v=0".into())).await.unwrap();
        assert_eq!(m.state(), SessionState::AwaitingPeer);
    }

    #[tokio::test]
    async fn malformed_offer_is_fatal() {
        let (mut m, mut out) = machine();
        m.join().await.unwrap();
        let _ = out.recv().await.unwrap();

        let err = m.handle(Signal::Offer("not an sdp".into())).await;
        assert!(matches!(err, Err(NegotiationError::Sdp(_))));
        assert_eq!(m.state(), SessionState::Failed);
    }
}
