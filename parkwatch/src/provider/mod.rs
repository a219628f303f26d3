//! External capability providers: image capture and plate recognition.
//!
//! Both are consumed through narrow async traits. The shipped
//! implementations run operator-configured programs (a camera grabber, a
//! detector + OCR script) as child processes.

mod command;
mod process;

use anyhow::Result;
use async_trait::async_trait;

pub use command::{CommandCapture, CommandRecognizer};

/// An encoded image as produced by the capture provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Source of camera frames.
#[async_trait]
pub trait ImageCapture: Send + Sync {
    /// Grab one frame.
    ///
    /// `Ok(None)` means no frame was taken on purpose (the operator
    /// cancelled); `Err` means the source could not produce one.
    async fn capture(&self) -> Result<Option<Frame>>;
}

/// Turns a frame into a plate string.
#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    /// `Ok(None)` when no plate was found in the frame.
    async fn recognize(&self, frame: &Frame) -> Result<Option<String>>;
}
