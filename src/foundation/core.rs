use crate::foundation::error::{CadenceError, CadenceResult};

/// Absolute 0-based frame index in capture timeline space.
///
/// Written frames are named by this index (`{index}.png`), so the output
/// ordering is reconstructable from filenames alone.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Owned RGBA8 frame snapshot, immutable once enqueued for persistence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 pixel data, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl FrameImage {
    /// Create a validated snapshot.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> CadenceResult<Self> {
        if width == 0 || height == 0 {
            return Err(CadenceError::validation(
                "FrameImage width/height must be non-zero",
            ));
        }
        let expected = (width as usize) * (height as usize) * 4;
        if data.len() != expected {
            return Err(CadenceError::validation(format!(
                "FrameImage data length {} does not match {}x{} RGBA8 ({expected} bytes)",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Solid-color snapshot, mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> CadenceResult<Self> {
        let px = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(px * 4);
        for _ in 0..px {
            data.extend_from_slice(&rgba);
        }
        Self::new(width, height, data)
    }
}

/// A frame snapshot paired with its capture-time sequence index.
///
/// Ownership transfers to whichever writer thread dequeues it.
#[derive(Clone, Debug)]
pub struct IndexedFrame {
    /// Global frame counter value at capture time.
    pub index: FrameIndex,
    /// The captured snapshot.
    pub image: FrameImage,
}
