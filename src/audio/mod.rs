//! Audio capture and output-volume control.

pub mod capture;
pub mod volume;

pub use capture::{AudioCapture, CaptureError};

/// Recording-session boundary consumed by the dictation session.
///
/// `start`/`stop` bracket one recording; `stop` yields the encoded WAV
/// bytes. The session treats the encoding as opaque.
#[cfg_attr(test, mockall::automock)]
pub trait Capture: Send {
    /// Begins capturing from the microphone.
    ///
    /// # Errors
    /// [`CaptureError`] if the stream cannot be resumed.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stops capturing and returns the session as WAV bytes.
    ///
    /// # Errors
    /// [`CaptureError`] if the stream cannot be paused or encoding fails.
    fn stop(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Whether a recording session is in progress.
    fn is_active(&self) -> bool;
}
