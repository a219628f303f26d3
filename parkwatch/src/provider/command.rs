//! Providers that shell out to operator-configured programs.
//!
//! Commands are `sh -c` templates. The capture template must mention
//! `{output}` (where to write the image) and the recognizer template
//! `{image}` (the image to read). The same paths are also exported as
//! `PARKWATCH_OUTPUT` / `PARKWATCH_IMAGE`.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tempfile::Builder;
use tracing::debug;

use super::process::{run_process, ProcessOptions};
use super::{Frame, ImageCapture, PlateRecognizer};

const OUTPUT_PLACEHOLDER: &str = "{output}";
const IMAGE_PLACEHOLDER: &str = "{image}";

/// Exit code a capture command uses to say the operator cancelled.
const CANCEL_EXIT_CODE: i32 = 1;

/// Quote a path for a POSIX shell.
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Capture by running a command that writes an image file.
///
/// Exit 0 with a non-empty file yields a frame. Exit 1 or an empty file
/// means the operator cancelled. Anything else is a capture failure.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    template: String,
    timeout: Duration,
}

impl CommandCapture {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let template = template.into();
        if !template.contains(OUTPUT_PLACEHOLDER) {
            bail!("Capture command must contain {OUTPUT_PLACEHOLDER}: {template}");
        }
        Ok(Self { template, timeout })
    }
}

#[async_trait]
impl ImageCapture for CommandCapture {
    async fn capture(&self) -> Result<Option<Frame>> {
        let output = Builder::new()
            .prefix("parkwatch-frame-")
            .suffix(".jpg")
            .tempfile()
            .context("Failed to create frame file")?
            .into_temp_path();

        let script = self
            .template
            .replace(OUTPUT_PLACEHOLDER, &shell_quote(&output));
        let result = run_process(
            ProcessOptions::shell(script)
                .env("PARKWATCH_OUTPUT", output.to_string_lossy())
                .timeout(self.timeout),
        )
        .await?;

        if result.timed_out {
            bail!("Capture command timed out after {:?}", self.timeout);
        }
        match result.code() {
            Some(0) => {}
            Some(CANCEL_EXIT_CODE) => return Ok(None),
            code => bail!(
                "Capture command failed ({}): {}",
                code.map_or_else(|| "signal".to_string(), |c| format!("exit {c}")),
                result.stderr_string()
            ),
        }

        let frame = match tokio::fs::read(&output).await {
            Ok(bytes) => Frame::new(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read captured frame"),
        };

        if frame.is_empty() {
            return Ok(None);
        }

        debug!(bytes = frame.len(), "frame captured");
        Ok(Some(frame))
    }
}

/// Recognize plates by running a detector/OCR command on an image file.
///
/// The first non-blank stdout line is the plate. No output means no plate;
/// a non-zero exit is a recognizer failure.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    template: String,
    timeout: Duration,
}

impl CommandRecognizer {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let template = template.into();
        if !template.contains(IMAGE_PLACEHOLDER) {
            bail!("Recognizer command must contain {IMAGE_PLACEHOLDER}: {template}");
        }
        Ok(Self { template, timeout })
    }
}

#[async_trait]
impl PlateRecognizer for CommandRecognizer {
    async fn recognize(&self, frame: &Frame) -> Result<Option<String>> {
        let mut image = Builder::new()
            .prefix("parkwatch-plate-")
            .suffix(".jpg")
            .tempfile()
            .context("Failed to create image file")?;
        image
            .write_all(frame.as_bytes())
            .and_then(|()| image.flush())
            .context("Failed to write image file")?;
        let image = image.into_temp_path();

        let script = self
            .template
            .replace(IMAGE_PLACEHOLDER, &shell_quote(&image));
        let result = run_process(
            ProcessOptions::shell(script)
                .env("PARKWATCH_IMAGE", image.to_string_lossy())
                .timeout(self.timeout),
        )
        .await?;

        if result.timed_out {
            bail!("Recognizer timed out after {:?}", self.timeout);
        }
        if !result.success() {
            bail!(
                "Recognizer failed ({:?}): {}",
                result.code(),
                result.stderr_string()
            );
        }

        let plate = result
            .stdout
            .iter()
            .map(|line| line.as_str().trim())
            .find(|line| !line.is_empty())
            .map(String::from);

        debug!(plate = ?plate, "recognizer finished");
        Ok(plate)
    }
}
