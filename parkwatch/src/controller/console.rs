use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use super::{occupancy_lines, Command, ControllerError, ControllerState, Outcome};
use crate::ledger::SessionLedger;
use crate::models::normalize_plate;
use crate::provider::{ImageCapture, PlateRecognizer};
use crate::store::{CsvStore, SessionStore};

const PROMPT: &str = "Enter 'entry', 'exit', or 'quit': ";

/// The gate console.
///
/// Owns the ledger and handles one command to completion before the next.
pub struct Controller<C, R, S = CsvStore> {
    ledger: SessionLedger<S>,
    capture: C,
    recognizer: R,
    state: ControllerState,
}

impl<C, R, S> Controller<C, R, S>
where
    C: ImageCapture,
    R: PlateRecognizer,
    S: SessionStore,
{
    pub fn new(ledger: SessionLedger<S>, capture: C, recognizer: R) -> Self {
        Self {
            ledger,
            capture,
            recognizer,
            state: ControllerState::Idle,
        }
    }

    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    pub const fn ledger(&self) -> &SessionLedger<S> {
        &self.ledger
    }

    /// Read commands from `input` until `quit` or end of input.
    pub async fn run<I, W>(&mut self, input: I, out: &mut W) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        while self.state != ControllerState::Shutdown {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            let Some(line) = lines.next_line().await.context("Failed to read command")? else {
                writeln!(out)?;
                self.transition(ControllerState::Shutdown);
                writeln!(out, "{}", Outcome::Shutdown)?;
                break;
            };

            match self.handle_line(&line).await {
                None | Some(Ok(Outcome::Cancelled)) => {}
                Some(Ok(outcome)) => writeln!(out, "{outcome}")?,
                Some(Err(e)) => writeln!(out, "{e}")?,
            }
        }

        Ok(())
    }

    /// Handle one line of input. Blank lines are ignored.
    pub async fn handle_line(&mut self, line: &str) -> Option<Result<Outcome, ControllerError>> {
        if line.trim().is_empty() {
            return None;
        }

        let result = match line.parse::<Command>() {
            Ok(command) => self.handle(command).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            debug!("command rejected: {e}");
        }
        Some(result)
    }

    /// Handle one command and return to `Idle` (or `Shutdown` on quit).
    pub async fn handle(&mut self, command: Command) -> Result<Outcome, ControllerError> {
        match command {
            Command::Entry => {
                let Some(plate) = self.read_plate().await? else {
                    return Ok(Outcome::Cancelled);
                };
                let result = self.ledger.allocate(&plate);
                self.transition(ControllerState::Idle);
                let slot = result?;
                Ok(Outcome::Entered { plate, slot })
            }
            Command::Exit => {
                let Some(plate) = self.read_plate().await? else {
                    return Ok(Outcome::Cancelled);
                };
                let result = self.ledger.close(&plate);
                self.transition(ControllerState::Idle);
                let slot = result?;
                Ok(Outcome::Exited { plate, slot })
            }
            Command::Status => Ok(Outcome::Status(occupancy_lines(
                self.ledger.max_slots(),
                &self.ledger.open_sessions(),
            ))),
            Command::Help => Ok(Outcome::Help),
            Command::Quit => {
                self.transition(ControllerState::Shutdown);
                Ok(Outcome::Shutdown)
            }
        }
    }

    /// Capture a frame and recognize its plate.
    ///
    /// Leaves the console in `PlateDetected` on success and back in `Idle`
    /// otherwise. `Ok(None)` means the operator cancelled the capture.
    async fn read_plate(&mut self) -> Result<Option<String>, ControllerError> {
        self.transition(ControllerState::AwaitingCapture);

        let frame = match self.capture.capture().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("capture cancelled");
                self.transition(ControllerState::Idle);
                return Ok(None);
            }
            Err(e) => {
                warn!("capture failed: {e:#}");
                self.transition(ControllerState::Idle);
                return Err(ControllerError::CaptureUnavailable(format!("{e:#}")));
            }
        };

        let plate = match self.recognizer.recognize(&frame).await {
            Ok(plate) => plate.map(|p| normalize_plate(&p)).unwrap_or_default(),
            Err(e) => {
                warn!("plate recognition failed: {e:#}");
                String::new()
            }
        };

        if plate.is_empty() {
            self.transition(ControllerState::NoPlateDetected);
            self.transition(ControllerState::Idle);
            return Err(ControllerError::NoPlateDetected);
        }

        info!(plate = %plate, "plate detected");
        self.transition(ControllerState::PlateDetected(plate.clone()));
        Ok(Some(plate))
    }

    fn transition(&mut self, next: ControllerState) {
        debug!(from = ?self.state, to = ?next, "console state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::bail;
    use async_trait::async_trait;
    use tempfile::tempdir;

    use super::*;
    use crate::ledger::AllocationError;
    use crate::provider::Frame;

    /// What the scripted camera does on each capture.
    enum Shot {
        Plate(&'static str),
        Cancel,
        Broken,
    }

    /// Camera that plays back a script; the frame bytes are the plate text.
    struct ScriptedCapture {
        shots: Mutex<VecDeque<Shot>>,
    }

    impl ScriptedCapture {
        fn new(shots: impl IntoIterator<Item = Shot>) -> Self {
            Self {
                shots: Mutex::new(shots.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl ImageCapture for ScriptedCapture {
        async fn capture(&self) -> anyhow::Result<Option<Frame>> {
            match self.shots.lock().unwrap().pop_front() {
                Some(Shot::Plate(text)) => Ok(Some(Frame::new(text.as_bytes().to_vec()))),
                Some(Shot::Cancel) => Ok(None),
                Some(Shot::Broken) | None => bail!("no camera"),
            }
        }
    }

    /// Reads the frame bytes back as the plate; "FAIL" makes it error.
    struct EchoRecognizer;

    #[async_trait]
    impl PlateRecognizer for EchoRecognizer {
        async fn recognize(&self, frame: &Frame) -> anyhow::Result<Option<String>> {
            let text = String::from_utf8_lossy(frame.as_bytes()).to_string();
            match text.as_str() {
                "FAIL" => bail!("model crashed"),
                "" => Ok(None),
                _ => Ok(Some(text)),
            }
        }
    }

    fn controller(
        dir: &tempfile::TempDir,
        max_slots: u32,
        shots: impl IntoIterator<Item = Shot>,
    ) -> Controller<ScriptedCapture, EchoRecognizer> {
        let store = CsvStore::open(dir.path().join("parking_data.csv")).unwrap();
        let ledger = SessionLedger::open(store, max_slots).unwrap();
        Controller::new(ledger, ScriptedCapture::new(shots), EchoRecognizer)
    }

    #[tokio::test]
    async fn entry_then_exit() {
        let dir = tempdir().unwrap();
        let mut console = controller(&dir, 2, [Shot::Plate("abc 123"), Shot::Plate("ABC123")]);

        let outcome = console.handle(Command::Entry).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Entered {
                plate: "ABC123".to_string(),
                slot: 1
            }
        );
        assert_eq!(console.state(), &ControllerState::Idle);

        let outcome = console.handle(Command::Exit).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Exited {
                plate: "ABC123".to_string(),
                slot: 1
            }
        );
        assert!(console.ledger().open_sessions().is_empty());
    }

    #[tokio::test]
    async fn cancelled_capture_changes_nothing() {
        let dir = tempdir().unwrap();
        let mut console = controller(&dir, 2, [Shot::Cancel]);

        assert_eq!(console.handle(Command::Entry).await.unwrap(), Outcome::Cancelled);
        assert_eq!(console.state(), &ControllerState::Idle);
        assert!(console.ledger().sessions().is_empty());
    }

    #[tokio::test]
    async fn provider_failures_are_reported() {
        let dir = tempdir().unwrap();
        let mut console = controller(
            &dir,
            2,
            [Shot::Broken, Shot::Plate(""), Shot::Plate("FAIL"), Shot::Plate("   ")],
        );

        assert!(matches!(
            console.handle(Command::Entry).await,
            Err(ControllerError::CaptureUnavailable(_))
        ));
        for _ in 0..3 {
            assert!(matches!(
                console.handle(Command::Entry).await,
                Err(ControllerError::NoPlateDetected)
            ));
            assert_eq!(console.state(), &ControllerState::Idle);
        }
        assert!(console.ledger().sessions().is_empty());
    }

    #[tokio::test]
    async fn ledger_errors_return_to_idle() {
        let dir = tempdir().unwrap();
        let mut console = controller(
            &dir,
            1,
            [Shot::Plate("ABC123"), Shot::Plate("XYZ999"), Shot::Plate("DEF456")],
        );

        console.handle(Command::Entry).await.unwrap();
        let err = console.handle(Command::Entry).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Allocation(AllocationError::NoSlotsAvailable)
        ));
        assert_eq!(console.state(), &ControllerState::Idle);

        let err = console.handle(Command::Exit).await.unwrap_err();
        assert_eq!(err.to_string(), "car DEF456 not found in any slot");
        assert_eq!(console.state(), &ControllerState::Idle);
    }

    #[tokio::test]
    async fn run_processes_script_until_quit() {
        let dir = tempdir().unwrap();
        let mut console = controller(
            &dir,
            2,
            [Shot::Plate("ABC123"), Shot::Plate("ABC123"), Shot::Plate("XYZ999")],
        );

        let input: &[u8] = b"ENTRY\n\nentry\nfly\nstatus\nquit\nentry\n";
        let mut out = Vec::new();
        console.run(input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Allocated slot 1 for ABC123"));
        assert!(out.contains("car ABC123 is already parked in slot 1"));
        assert!(out.contains("invalid command 'fly'"));
        assert!(out.contains("Slot 2   free"));
        assert!(out.ends_with("System shutdown.\n"));
        assert_eq!(console.state(), &ControllerState::Shutdown);
        // The line after quit is never read.
        assert_eq!(console.ledger().sessions().len(), 1);
    }

    #[tokio::test]
    async fn end_of_input_shuts_down() {
        let dir = tempdir().unwrap();
        let mut console = controller(&dir, 2, [Shot::Plate("ABC123")]);

        let input: &[u8] = b"in\n";
        let mut out = Vec::new();
        console.run(input, &mut out).await.unwrap();

        assert_eq!(console.state(), &ControllerState::Shutdown);
        assert!(String::from_utf8(out).unwrap().contains("System shutdown."));

        let reloaded = SessionLedger::open(
            CsvStore::read_only(dir.path().join("parking_data.csv")),
            2,
        )
        .unwrap();
        assert_eq!(reloaded.sessions().len(), 1);
    }
}
