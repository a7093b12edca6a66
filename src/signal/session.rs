use crate::assets::STUN_SERVERS;
use crate::error::NegotiationError;
use crate::signal::Signal;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_H264, MediaEngine};
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

pub fn create_webrtc_api() -> Result<Arc<API>, NegotiationError> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(NegotiationError::PeerSetup)?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(NegotiationError::PeerSetup)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    Ok(Arc::new(api))
}

/// The one peer-connection handle a process ever owns.
///
/// Created by the signaling state machine when the remote participant shows
/// up, then shared read-only: the machine keeps applying ICE candidates to
/// it, the media pipeline writes samples to its video track.
pub struct PeerSession {
    connection: Arc<RTCPeerConnection>,
    video_track: Arc<TrackLocalStaticSample>,
}

impl PeerSession {
    pub async fn new(
        api: &API,
        outbound: mpsc::Sender<Signal>,
    ) -> Result<Arc<PeerSession>, NegotiationError> {
        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let connection = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(NegotiationError::PeerSetup)?,
        );

        let video_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "arcall".to_owned(),
        ));

        let rtp_sender = connection
            .add_track(Arc::clone(&video_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(NegotiationError::PeerSetup)?;

        // Read incoming RTCP packets. Before these packets are returned
        // they are processed by interceptors; for things like NACK this
        // needs to be called.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
        });

        // Locally gathered candidates go out through the relay as plain
        // candidate strings.
        connection.on_ice_candidate(Box::new(move |candidate| {
            let outbound = outbound.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        if outbound.send(Signal::IceCandidate(init.candidate)).await.is_err() {
                            log::warn!("relay channel closed, dropping local ICE candidate");
                        }
                    }
                    Err(e) => log::warn!("failed to serialize local ICE candidate: {e}"),
                }
            })
        }));

        connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                match state {
                    RTCPeerConnectionState::Connected => {
                        log::info!("peer transport connected");
                    }
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => {
                        log::warn!("peer connection state: {state}");
                    }
                    _ => log::debug!("peer connection state: {state}"),
                }
                Box::pin(async {})
            },
        ));

        // The remote track is drained so the transport keeps flowing; this
        // process renders nothing.
        connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            log::info!("remote track received: {}", track.kind());
            Box::pin(async move {
                tokio::spawn(async move {
                    while let Ok((_packet, _)) = track.read_rtp().await {}
                    log::info!("remote track ended");
                });
            })
        }));

        Ok(Arc::new(PeerSession {
            connection,
            video_track,
        }))
    }

    /// Generate and install the local offer, returning its SDP.
    pub async fn create_offer(&self) -> Result<String, NegotiationError> {
        let offer = self
            .connection
            .create_offer(None)
            .await
            .map_err(NegotiationError::Sdp)?;
        let sdp = offer.sdp.clone();
        self.connection
            .set_local_description(offer)
            .await
            .map_err(NegotiationError::Sdp)?;
        Ok(sdp)
    }

    /// Apply a remote offer and produce the local answer SDP.
    pub async fn accept_offer(&self, sdp: String) -> Result<String, NegotiationError> {
        let offer = RTCSessionDescription::offer(sdp).map_err(NegotiationError::Sdp)?;
        self.connection
            .set_remote_description(offer)
            .await
            .map_err(NegotiationError::Sdp)?;

        let answer = self
            .connection
            .create_answer(None)
            .await
            .map_err(NegotiationError::Sdp)?;
        let sdp = answer.sdp.clone();
        self.connection
            .set_local_description(answer)
            .await
            .map_err(NegotiationError::Sdp)?;
        Ok(sdp)
    }

    /// Apply the remote answer, completing the description exchange.
    pub async fn accept_answer(&self, sdp: String) -> Result<(), NegotiationError> {
        let answer = RTCSessionDescription::answer(sdp).map_err(NegotiationError::Sdp)?;
        self.connection
            .set_remote_description(answer)
            .await
            .map_err(NegotiationError::Sdp)
    }

    /// Apply one remote ICE candidate. Failures here are per-candidate,
    /// never fatal to the session.
    pub async fn add_candidate(&self, candidate: String) -> Result<(), webrtc::Error> {
        self.connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate,
                ..Default::default()
            })
            .await
    }

    pub fn video_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.video_track)
    }

    pub async fn close(&self) {
        if let Err(e) = self.connection.close().await {
            log::warn!("error closing peer connection: {e}");
        }
    }
}
