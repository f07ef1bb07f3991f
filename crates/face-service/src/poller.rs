use crate::camera::FrameSource;
use crate::processor::FaceRecognitionProcessor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs one recognition cycle per scan interval for a polled source
pub struct SnapshotPoller {
    processor: Arc<FaceRecognitionProcessor>,
    frames: Arc<dyn FrameSource>,
    interval: Duration,
}

impl SnapshotPoller {
    pub fn new(
        processor: Arc<FaceRecognitionProcessor>,
        frames: Arc<dyn FrameSource>,
        interval: Duration,
    ) -> Self {
        Self {
            processor,
            frames,
            interval,
        }
    }

    /// Poll until `cancel` fires. A cycle that overruns the interval delays the
    /// next tick instead of queueing catch-up cycles.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                source = %self.processor.source_id(),
                frames = %self.frames.describe(),
                interval_secs = self.interval.as_secs(),
                "Snapshot poller started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.poll_once().await,
                }
            }

            info!(source = %self.processor.source_id(), "Snapshot poller stopped");
        })
    }

    async fn poll_once(&self) {
        let frame = match self.frames.fetch_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(source = %self.processor.source_id(), error = %e, "Failed to fetch frame");
                return;
            }
        };

        match self.processor.process_image(&frame).await {
            Ok(report) => debug!(
                source = %report.source,
                outcome = report.outcome.as_str(),
                match_count = report.result.match_count,
                "Polled cycle complete"
            ),
            Err(e) => warn!(source = %self.processor.source_id(), error = %e, "Polled cycle aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecognitionSettings, SourceConfig};
    use crate::events::EventDispatcher;
    use crate::search::MockSearchClient;
    use anyhow::Result;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct StaticFrames(Vec<u8>);

    #[async_trait]
    impl FrameSource for StaticFrames {
        async fn fetch_frame(&self) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    #[tokio::test]
    async fn test_poller_runs_cycles_until_cancelled() {
        let mut frame = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])))
            .write_to(&mut Cursor::new(&mut frame), ImageFormat::Png)
            .unwrap();

        let client = Arc::new(MockSearchClient::new());
        let processor = Arc::new(FaceRecognitionProcessor::new(
            SourceConfig::new("camera.garage"),
            RecognitionSettings::new("home_faces"),
            client.clone(),
            EventDispatcher::new(),
        ));

        let cancel = CancellationToken::new();
        let handle = SnapshotPoller::new(
            processor.clone(),
            Arc::new(StaticFrames(frame)),
            Duration::from_millis(10),
        )
        .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(client.calls() >= 1);
        assert_eq!(processor.state().await.state, Some(0));
    }
}
