//! Shared-memory frame channel.
//!
//! Bulk pixel data never travels over the message bus. A producing node
//! creates a memory-mapped backing file named after the node, writes frames
//! into it, and broadcasts the (name, shape, dtype) triple through a
//! `ParamsChanged` event. Any observer can attach to the mapping by name and
//! copy out the latest frame.
//!
//! Layout of the backing file:
//!
//! ```text
//! [u32 magic][u32 latest buffer index][buffer 0][buffer 1]
//! ```
//!
//! The writer fills the buffer the index does *not* point at, then flips the
//! index with a release store. Readers acquire-load the index and copy the
//! frame out. A reader that is lapped mid-copy can observe a torn frame;
//! for a visual preview a rare stale or torn frame is acceptable and the
//! writer is never blocked by slow readers.

use crate::error::{FlowError, Result};
use crate::types::Dtype;
use memmap2::MmapRaw;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

const MAGIC: u32 = 0x464C_4F57; // "FLOW"
const HEADER_LEN: usize = 8;

/// Shape of a frame buffer, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

/// Everything an observer needs to attach to a frame channel: the channel
/// name (the producing node's name), the buffer shape, and the element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub name: String,
    pub shape: FrameShape,
    pub dtype: Dtype,
}

impl FrameSpec {
    /// Size of one frame buffer in bytes.
    pub fn frame_len(&self) -> usize {
        self.shape.height as usize
            * self.shape.width as usize
            * self.shape.channels as usize
            * self.dtype.itemsize()
    }

    fn file_len(&self) -> u64 {
        (HEADER_LEN + 2 * self.frame_len()) as u64
    }

    fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.name)
    }
}

/// Writer end of a frame channel. Owns the backing file and unlinks it on
/// drop, so deleting a node and recreating it under the same name works.
pub struct FrameChannel {
    spec: FrameSpec,
    path: PathBuf,
    map: MmapRaw,
}

impl FrameChannel {
    /// Create (or truncate) the backing file under `dir` and map it.
    pub fn create(dir: &Path, spec: FrameSpec) -> Result<Self> {
        if spec.frame_len() == 0 {
            return Err(FlowError::Frame(format!(
                "frame channel '{}' has zero-sized frames",
                spec.name
            )));
        }
        let path = spec.path_in(dir);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(spec.file_len())?;
        let map = MmapRaw::map_raw(&file)?;

        let channel = Self { spec, path, map };
        // Zeroed buffers, index 0 current.
        channel.latest().store(0, Ordering::Release);
        unsafe {
            (channel.map.as_mut_ptr() as *mut u32).write_unaligned(MAGIC.to_le());
        }
        Ok(channel)
    }

    pub fn spec(&self) -> &FrameSpec {
        &self.spec
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish one frame. Copies `data` into the back buffer and flips the
    /// index; never blocks on readers.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let frame_len = self.spec.frame_len();
        if data.len() != frame_len {
            return Err(FlowError::Frame(format!(
                "frame channel '{}': wrote {} bytes, expected {}",
                self.spec.name,
                data.len(),
                frame_len
            )));
        }
        let back = 1 - self.latest().load(Ordering::Relaxed);
        unsafe {
            let dst = self
                .map
                .as_mut_ptr()
                .add(HEADER_LEN + back as usize * frame_len);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, frame_len);
        }
        self.latest().store(back, Ordering::Release);
        Ok(())
    }

    fn latest(&self) -> &AtomicU32 {
        // Offset 4 is u32-aligned because the mapping is page-aligned.
        unsafe { &*(self.map.as_mut_ptr().add(4) as *const AtomicU32) }
    }
}

impl Drop for FrameChannel {
    fn drop(&mut self) {
        // Readers holding the mapping keep the pages alive; the name is
        // free for reuse immediately.
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Reader end of a frame channel, attached by name.
pub struct FrameReader {
    spec: FrameSpec,
    map: MmapRaw,
}

impl FrameReader {
    /// Attach to an existing channel under `dir` using a broadcast spec.
    pub fn attach(dir: &Path, spec: FrameSpec) -> Result<Self> {
        let path = spec.path_in(dir);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let meta = file.metadata()?;
        if meta.len() != spec.file_len() {
            return Err(FlowError::Frame(format!(
                "frame channel '{}': backing file is {} bytes, expected {}",
                spec.name,
                meta.len(),
                spec.file_len()
            )));
        }
        let map = MmapRaw::map_raw(&file)?;
        let magic = unsafe { (map.as_mut_ptr() as *const u32).read_unaligned() };
        if u32::from_le(magic) != MAGIC {
            return Err(FlowError::Frame(format!(
                "frame channel '{}': bad magic",
                spec.name
            )));
        }
        Ok(Self { spec, map })
    }

    pub fn spec(&self) -> &FrameSpec {
        &self.spec
    }

    /// Copy the latest published frame out of the mapping.
    pub fn read_frame(&self) -> Vec<u8> {
        let frame_len = self.spec.frame_len();
        let latest = self.latest().load(Ordering::Acquire);
        let mut out = vec![0u8; frame_len];
        unsafe {
            let src = self
                .map
                .as_mut_ptr()
                .add(HEADER_LEN + latest as usize * frame_len);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), frame_len);
        }
        out
    }

    fn latest(&self) -> &AtomicU32 {
        unsafe { &*(self.map.as_mut_ptr().add(4) as *const AtomicU32) }
    }
}
