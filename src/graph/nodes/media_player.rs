//! Media player source node.
//!
//! A loop source: once media is loaded it decodes one frame per pass,
//! writes it into its shared-memory frame channel, and publishes an empty
//! params event as the frame-ready notification. The decoder itself sits
//! behind a trait; the built-in implementation renders a synthetic test
//! pattern so the whole pipeline runs without codec libraries.

use crate::error::{FlowError, Result};
use crate::frame::{FrameChannel, FrameShape, FrameSpec};
use crate::graph::node::{KernelContext, NodeKernel};
use crate::graph::port::{Payload, PortRegistrar};
use crate::types::{DataKind, Dtype, NodeName};
use crate::{bus::NodeParams, config::RuntimeConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const TYPE_NAME: &str = "MediaPlayer";

/// Pixel format of an opened media stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub shape: FrameShape,
    pub dtype: Dtype,
}

impl MediaFormat {
    pub fn frame_len(&self) -> usize {
        self.shape.height as usize
            * self.shape.width as usize
            * self.shape.channels as usize
            * self.dtype.itemsize()
    }
}

/// Decoding boundary. Real codec integrations implement this; decoders are
/// expected to loop the media rather than signal end-of-stream.
#[cfg_attr(test, mockall::automock)]
pub trait VideoDecoder: Send {
    /// Open a media source and report its pixel format.
    fn open(&mut self, path: &Path) -> Result<MediaFormat>;

    /// Decode the next frame into `frame`, whose length matches the format
    /// reported by [`VideoDecoder::open`].
    fn next_frame(&mut self, frame: &mut [u8]) -> Result<()>;

    /// Release decoder resources.
    fn close(&mut self) {}
}

/// Synthetic decoder producing a scrolling gradient, 320x240 RGB.
#[derive(Default)]
pub struct TestPatternDecoder {
    tick: u64,
}

impl TestPatternDecoder {
    pub const FORMAT: MediaFormat = MediaFormat {
        shape: FrameShape {
            height: 240,
            width: 320,
            channels: 3,
        },
        dtype: Dtype::U8,
    };
}

impl VideoDecoder for TestPatternDecoder {
    fn open(&mut self, _path: &Path) -> Result<MediaFormat> {
        self.tick = 0;
        Ok(Self::FORMAT)
    }

    fn next_frame(&mut self, frame: &mut [u8]) -> Result<()> {
        let shape = Self::FORMAT.shape;
        let width = shape.width as usize;
        let channels = shape.channels as usize;
        for (i, px) in frame.chunks_exact_mut(channels).enumerate() {
            let x = (i % width) as u64;
            let y = (i / width) as u64;
            px[0] = ((x + self.tick) & 0xFF) as u8;
            px[1] = ((y + self.tick) & 0xFF) as u8;
            px[2] = (self.tick & 0xFF) as u8;
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }
}

pub struct MediaPlayerKernel {
    name: NodeName,
    frame_dir: PathBuf,
    frame_interval: Duration,
    decoder: Box<dyn VideoDecoder>,
    channel: Option<FrameChannel>,
    buf: Vec<u8>,
}

impl MediaPlayerKernel {
    pub fn new(name: &NodeName, config: &RuntimeConfig) -> Self {
        Self::with_decoder(name, config, Box::new(TestPatternDecoder::default()))
    }

    pub fn with_decoder(
        name: &NodeName,
        config: &RuntimeConfig,
        decoder: Box<dyn VideoDecoder>,
    ) -> Self {
        Self {
            name: name.clone(),
            frame_dir: config.frame_dir.clone(),
            frame_interval: config.frame_interval(),
            decoder,
            channel: None,
            buf: Vec::new(),
        }
    }

    fn load_media(&mut self, ctx: &mut KernelContext<'_>, path: &Path) -> Result<()> {
        let format = self.decoder.open(path)?;
        let spec = FrameSpec {
            name: self.name.to_string(),
            shape: format.shape,
            dtype: format.dtype,
        };

        // Drop the previous channel first so the backing file name is free.
        self.channel = None;
        self.channel = Some(FrameChannel::create(&self.frame_dir, spec.clone())?);
        self.buf = vec![0u8; format.frame_len()];

        info!(node = %self.name, path = %path.display(), "media loaded");

        // Announce the channel so observers can attach, then schedule the
        // first pass.
        let mut params = NodeParams::new();
        params.insert("frame".into(), serde_json::to_value(&spec).map_err(|e| {
            FlowError::Params(format!("failed to serialize frame spec: {e}"))
        })?);
        ctx.publish_params(params);
        ctx.start_self();
        Ok(())
    }
}

impl NodeKernel for MediaPlayerKernel {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_output("Frame", &[DataKind::Frame]);
    }

    fn update_params(&mut self, ctx: &mut KernelContext<'_>, params: &NodeParams) -> Result<()> {
        if let Some(path) = params.get("media_path").and_then(|v| v.as_str()) {
            self.load_media(ctx, Path::new(path))?;
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut KernelContext<'_>) -> Result<()> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| FlowError::Params("no media loaded".to_string()))?;

        self.decoder.next_frame(&mut self.buf)?;
        channel.write(&self.buf)?;
        ctx.set_output("Frame", Payload::Frame(channel.spec().clone()))?;

        // Empty params are the frame-ready notification.
        ctx.publish_params(NodeParams::new());

        std::thread::sleep(self.frame_interval);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.decoder.close();
        // Dropping the channel unlinks the backing file.
        self.channel = None;
    }
}
