//! Call-participant orchestration: negotiate the session, then run the
//! media pipeline against its video track.

use crate::assets::FRAME_TICK;
use crate::config::CallConfig;
use crate::filter::FilterChannel;
use crate::pipeline::{FfmpegEncoder, FfmpegSource, MediaPipeline, TrackSink};
use crate::signal::{SignalChannel, SignalingMachine};

pub async fn run(config: CallConfig) -> anyhow::Result<()> {
    let channel = SignalChannel::connect(&config.relay_url).await?;
    let machine = SignalingMachine::new(channel.outbound.clone())?;

    // Blocks until both descriptions are applied; transport connectivity
    // keeps converging underneath while media already flows.
    let (session, signaling) = machine.run(channel.inbound).await?;
    log::info!("session established, starting media pipeline");

    let source = FfmpegSource::open(&config.source)?;
    let filter = FilterChannel::connect(config.filter_addr.as_str())?;
    let encoder = FfmpegEncoder::new(FRAME_TICK);
    let sink = TrackSink::new(session.video_track());

    let result = MediaPipeline::new(source, filter, encoder, sink, FRAME_TICK)
        .run()
        .await;

    session.close().await;
    signaling.abort();

    result?;
    Ok(())
}
