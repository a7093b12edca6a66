use crate::error::PipelineError;
use crate::pipeline::types::EncodedSample;
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn write(&mut self, sample: EncodedSample) -> Result<(), PipelineError>;
}

/// Writes encoded samples onto the negotiated session's video track.
///
/// The track handle is shared read-only with the signaling layer; this sink
/// is the only writer of media onto it.
pub struct TrackSink {
    track: Arc<TrackLocalStaticSample>,
}

impl TrackSink {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> TrackSink {
        TrackSink { track }
    }
}

#[async_trait]
impl SampleSink for TrackSink {
    async fn write(&mut self, sample: EncodedSample) -> Result<(), PipelineError> {
        self.track
            .write_sample(&Sample {
                data: sample.data,
                duration: sample.duration,
                ..Default::default()
            })
            .await
            .map_err(PipelineError::Sink)
    }
}
