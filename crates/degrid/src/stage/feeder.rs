use futures_util::{StreamExt, stream};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::StreamBundle;
use crate::source::FrameSource;

/// Emits discovered frames in order until the run is cancelled.
pub struct FrameFeeder {
    frames: Vec<FrameSource>,
    cancel: watch::Receiver<bool>,
}

impl FrameFeeder {
    pub fn new(frames: Vec<FrameSource>, cancel: watch::Receiver<bool>) -> Self {
        Self { frames, cancel }
    }

    pub fn attach(self) -> StreamBundle<FrameSource> {
        let total_frames = Some(self.frames.len() as u64);
        let mut updates = WatchStream::new(self.cancel);
        let cancelled = async move {
            while let Some(cancelled) = updates.next().await {
                if cancelled {
                    return;
                }
            }
            // The handle was dropped without cancelling; never stop.
            std::future::pending::<()>().await;
        };
        let stream = stream::iter(self.frames).take_until(cancelled);
        StreamBundle::new(Box::pin(stream), total_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use degrid_types::{CaptureTime, FrameMeta};
    use std::path::PathBuf;

    fn frame(seconds: u32) -> FrameSource {
        FrameSource {
            meta: FrameMeta {
                satellite: "32A".into(),
                capture: CaptureTime {
                    year: 1977,
                    day_of_year: 1,
                    seconds_of_day: seconds,
                },
                band: "vi".into(),
            },
            image_path: PathBuf::from(format!("{seconds}.png")),
            sidecar_path: None,
        }
    }

    #[tokio::test]
    async fn yields_every_frame_without_cancel() {
        let (_tx, rx) = watch::channel(false);
        let bundle = FrameFeeder::new(vec![frame(1), frame(2)], rx).attach();
        assert_eq!(bundle.total_frames, Some(2));
        let frames: Vec<FrameSource> = bundle.stream.collect().await;
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn stops_after_cancel() {
        let (tx, rx) = watch::channel(false);
        let mut bundle = FrameFeeder::new(vec![frame(1), frame(2), frame(3)], rx).attach();
        assert!(bundle.stream.next().await.is_some());
        tx.send(true).unwrap();
        assert!(bundle.stream.next().await.is_none());
    }
}
