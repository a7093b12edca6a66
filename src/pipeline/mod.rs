//! Media pipeline: decode → filter → encode → emit.
//!
//! The pipeline is organized around four seams, each a trait owned by the
//! loop for exactly one stage of a frame's life:
//! - `FrameSource` produces decoded RGBA frames ([`source::FfmpegSource`])
//! - `FrameFilter` runs the out-of-process AR round trip
//!   ([`crate::filter::FilterChannel`])
//! - `SampleEncoder` turns frames into H.264 samples
//!   ([`encode::FfmpegEncoder`])
//! - `SampleSink` delivers samples to the outbound track
//!   ([`sink::TrackSink`])
//!
//! Frames move through the seams strictly in source order, one in flight at
//! a time, so latency stays bounded and predictable. The loop owns every
//! stage handle; teardown on any exit path is by drop.

pub mod encode;
pub mod sink;
pub mod source;
pub mod types;

pub use encode::FfmpegEncoder;
pub use sink::{SampleSink, TrackSink};
pub use source::FfmpegSource;
pub use types::{EncodedSample, Frame, PixelLayout, SourceStatus};

use crate::error::PipelineError;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

pub trait FrameSource: Send {
    /// Pull the next decoded frame, if one is available right now.
    fn poll_frame(&mut self) -> Result<SourceStatus, PipelineError>;
}

/// The AR transform step. Infallible by contract: implementations degrade
/// to the input frame internally rather than surfacing per-frame errors.
pub trait FrameFilter: Send {
    fn apply(&mut self, frame: Frame) -> Frame;
}

pub trait SampleEncoder: Send {
    /// Encode one frame, returning zero or more ready samples.
    fn encode(&mut self, frame: &Frame) -> Result<Vec<EncodedSample>, PipelineError>;
}

pub struct MediaPipeline<S, F, E, K> {
    source: S,
    filter: F,
    encoder: E,
    sink: K,
    tick: Duration,
    pts: i64,
}

impl<S, F, E, K> MediaPipeline<S, F, E, K>
where
    S: FrameSource,
    F: FrameFilter,
    E: SampleEncoder,
    K: SampleSink,
{
    pub fn new(source: S, filter: F, encoder: E, sink: K, tick: Duration) -> Self {
        MediaPipeline {
            source,
            filter,
            encoder,
            sink,
            tick,
            pts: 0,
        }
    }

    /// Run until the source is exhausted or a fatal stage error.
    ///
    /// Timestamps are assigned here, not taken from the source: the
    /// downstream encoder only needs ordering, and the emitted cadence is
    /// this loop's, not the capture clock's.
    pub async fn run(mut self) -> Result<(), PipelineError> {
        log::info!("pipeline started, {:?} cadence", self.tick);
        let mut deadline = Instant::now();

        loop {
            sleep_until(deadline).await;
            // The next wakeup is anchored to this one, so consecutive
            // iterations stay at least one tick apart: a slow filter round
            // trip stretches the gap instead of causing a burst.
            deadline = Instant::now() + self.tick;

            let mut frame = match self.source.poll_frame()? {
                SourceStatus::Ready(frame) => frame,
                SourceStatus::Pending => continue,
                SourceStatus::Exhausted => break,
            };

            self.pts += 1;
            frame.pts = self.pts;

            let frame = self.filter.apply(frame);

            for sample in self.encoder.encode(&frame)? {
                self.sink.write(sample).await?;
            }
        }

        log::info!("pipeline finished after {} frames", self.pts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const TICK: Duration = Duration::from_millis(20);

    struct StubSource {
        script: VecDeque<SourceStatus>,
    }

    impl StubSource {
        fn frames(n: usize) -> StubSource {
            let script = (0..n)
                .map(|_| SourceStatus::Ready(Frame::rgba(4, 4, vec![0; 64])))
                .collect();
            StubSource { script }
        }
    }

    impl FrameSource for StubSource {
        fn poll_frame(&mut self) -> Result<SourceStatus, PipelineError> {
            Ok(self.script.pop_front().unwrap_or(SourceStatus::Exhausted))
        }
    }

    struct SlowFilter {
        delay: Duration,
    }

    impl FrameFilter for SlowFilter {
        fn apply(&mut self, frame: Frame) -> Frame {
            std::thread::sleep(self.delay);
            frame
        }
    }

    struct OneSampleEncoder;

    impl SampleEncoder for OneSampleEncoder {
        fn encode(&mut self, frame: &Frame) -> Result<Vec<EncodedSample>, PipelineError> {
            Ok(vec![EncodedSample {
                data: Bytes::from_static(b"sample"),
                pts: frame.pts,
                duration: TICK,
            }])
        }
    }

    struct FailingEncoder;

    impl SampleEncoder for FailingEncoder {
        fn encode(&mut self, _frame: &Frame) -> Result<Vec<EncodedSample>, PipelineError> {
            Err(PipelineError::NoVideoStream)
        }
    }

    #[derive(Clone)]
    struct RecordingSink {
        emitted: Arc<Mutex<Vec<(i64, std::time::Instant)>>>,
    }

    impl RecordingSink {
        fn new() -> RecordingSink {
            RecordingSink {
                emitted: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl SampleSink for RecordingSink {
        async fn write(&mut self, sample: EncodedSample) -> Result<(), PipelineError> {
            self.emitted
                .lock()
                .unwrap()
                .push((sample.pts, std::time::Instant::now()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn emission_is_clock_paced_not_round_trip_paced() {
        let sink = RecordingSink::new();
        let pipeline = MediaPipeline::new(
            StubSource::frames(6),
            SlowFilter {
                delay: Duration::from_millis(5),
            },
            OneSampleEncoder,
            sink.clone(),
            TICK,
        );
        pipeline.run().await.unwrap();

        let emitted = sink.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 6);

        // Were the loop paced by the 5 ms round trip, gaps would sit near
        // 5 ms and the whole run would take ~30 ms. Per-gap slack covers
        // scheduler jitter on the filter stage.
        for pair in emitted.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= Duration::from_millis(15), "gap was {gap:?}");
        }
        let span = emitted.last().unwrap().1 - emitted.first().unwrap().1;
        assert!(span >= Duration::from_millis(95), "span was {span:?}");
    }

    #[tokio::test]
    async fn frames_keep_source_order_and_pipeline_timestamps() {
        let sink = RecordingSink::new();
        let mut script: VecDeque<SourceStatus> =
            vec![SourceStatus::Pending, SourceStatus::Pending]
                .into_iter()
                .collect();
        for _ in 0..3 {
            script.push_back(SourceStatus::Ready(Frame::rgba(4, 4, vec![0; 64])));
        }
        script.push_back(SourceStatus::Pending);
        script.push_back(SourceStatus::Ready(Frame::rgba(4, 4, vec![0; 64])));

        let pipeline = MediaPipeline::new(
            StubSource { script },
            SlowFilter {
                delay: Duration::ZERO,
            },
            OneSampleEncoder,
            sink.clone(),
            Duration::from_millis(1),
        );
        pipeline.run().await.unwrap();

        let pts: Vec<i64> = sink.emitted.lock().unwrap().iter().map(|(p, _)| *p).collect();
        assert_eq!(pts, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn encoder_failure_is_fatal() {
        let pipeline = MediaPipeline::new(
            StubSource::frames(3),
            SlowFilter {
                delay: Duration::ZERO,
            },
            FailingEncoder,
            RecordingSink::new(),
            Duration::from_millis(1),
        );
        assert!(pipeline.run().await.is_err());
    }
}
