//! The status channel.
//!
//! The drive reports the outcome of the last operation as a short text
//! message, `"CC,TEXT,TT,SS\r"`: a two-digit code, its text and a track and
//! sector. Reading the message through to the end resets it to `00, OK`.

use std::fmt;
use std::io::Write;
use std::rc::Rc;

use super::{Backing, CleanupStage, Refill};
use crate::error::Result;
use crate::shared::SharedState;
use crate::slot::SlotBuf;

/// Drive status codes.
///
/// These match the codes a host expects from the status channel.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StatusCode {
    /// No error.
    Ok = 0,
    /// Files were removed; track holds the count.
    FilesScratched = 1,
    /// Backing store read failure.
    ReadError = 20,
    /// Backing store write failure.
    WriteError = 25,
    /// Medium is write protected.
    WriteProtectOn = 26,
    /// Malformed or unsupported request.
    SyntaxError = 30,
    /// No entry matched the name.
    FileNotFound = 62,
    /// An entry with that name exists already.
    FileExists = 63,
    /// No free buffer for a new channel.
    NoChannel = 70,
    /// No space left on the medium.
    DiskFull = 72,
    /// Power-on message carrying the firmware version.
    DosVersion = 73,
    /// No medium present.
    DriveNotReady = 74,
}

impl StatusCode {
    /// Numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Message text. The version message has no fixed text and returns `None`.
    pub fn text(self) -> Option<&'static str> {
        let text = match self {
            StatusCode::Ok => " OK",
            StatusCode::FilesScratched => "FILES SCRATCHED",
            StatusCode::ReadError => "READ ERROR",
            StatusCode::WriteError => "WRITE ERROR",
            StatusCode::WriteProtectOn => "WRITE PROTECT ON",
            StatusCode::SyntaxError => "SYNTAX ERROR",
            StatusCode::FileNotFound => "FILE NOT FOUND",
            StatusCode::FileExists => "FILE EXISTS",
            StatusCode::NoChannel => "NO CHANNEL",
            StatusCode::DiskFull => "DISK FULL",
            StatusCode::DosVersion => return None,
            StatusCode::DriveNotReady => "DRIVE NOT READY",
        };
        Some(text)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.code())
    }
}

/// State of the status channel.
#[derive(Clone, Debug)]
pub struct StatusChannel {
    code: StatusCode,
    track: u8,
    sector: u8,
    version: Rc<str>,
}

impl StatusChannel {
    /// Create the channel showing the version message.
    pub fn new(version: impl Into<Rc<str>>) -> Self {
        Self {
            code: StatusCode::DosVersion,
            track: 0,
            sector: 0,
            version: version.into(),
        }
    }

    /// Current code.
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Replace the current status.
    pub fn set(&mut self, code: StatusCode, track: u8, sector: u8) {
        self.code = code;
        self.track = track;
        self.sector = sector;
    }

    /// Render the current message into `out`, truncating to fit.
    ///
    /// Returns the number of bytes written.
    pub fn render(&self, out: &mut [u8]) -> usize {
        let mut cursor = std::io::Cursor::new(out);
        // A full buffer only truncates the message.
        let _ = write!(cursor, "{}\r", self);
        cursor.position() as usize
    }

    /// Current message as a string, without the trailing carriage return.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StatusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.code.text().unwrap_or(&*self.version);
        write!(f, "{},{},{:02},{:02}", self.code, text, self.track, self.sector)
    }
}

impl Backing for StatusChannel {
    fn refill(&mut self, buf: &mut SlotBuf<'_>, _shared: &mut SharedState) -> Result<Refill> {
        self.set(StatusCode::Ok, 0, 0);
        let len = self.render(buf.space_mut());
        buf.set_end_marker(true);
        Ok(Refill::Ready(len))
    }

    fn cleanup(
        &mut self,
        _buf: &mut SlotBuf<'_>,
        _shared: &mut SharedState,
        _stage: CleanupStage,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let mut status = StatusChannel::new("IEC-RS V0.1");
        assert_eq!(status.message(), "73,IEC-RS V0.1,00,00");

        status.set(StatusCode::FileNotFound, 0, 0);
        assert_eq!(status.message(), "62,FILE NOT FOUND,00,00");

        status.set(StatusCode::FilesScratched, 3, 0);
        assert_eq!(status.message(), "01,FILES SCRATCHED,03,00");

        status.set(StatusCode::Ok, 0, 0);
        assert_eq!(status.message(), "00, OK,00,00");
    }

    #[test]
    fn test_render_truncates() {
        let status = StatusChannel::new("V");
        let mut out = [0u8; 4];
        assert_eq!(status.render(&mut out), 4);
        assert_eq!(&out, b"73,V");
    }

    #[test]
    fn test_long_version_message_is_complete() {
        let version = "X".repeat(60);
        let status = StatusChannel::new(version.as_str());
        let message = status.message();
        assert_eq!(message.len(), 3 + 60 + 6);
        assert_eq!(message, format!("73,{},00,00", version));
    }

    #[test]
    fn test_refill_resets_to_ok() {
        let mut status = StatusChannel::new("V");
        status.set(StatusCode::NoChannel, 0, 0);

        let mut shared = SharedState::new();
        let mut storage = [0u8; 32];
        let mut buf = SlotBuf::new(&mut storage, 0);
        let outcome = status.refill(&mut buf, &mut shared).unwrap();

        assert_eq!(outcome, Refill::Ready(13));
        assert!(buf.end_marker());
        assert_eq!(&storage[..13], b"00, OK,00,00\r");
        assert_eq!(status.code(), StatusCode::Ok);
    }
}
