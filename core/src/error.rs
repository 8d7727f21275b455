use std::fmt;
use std::io;

/// Error kinds per the wire-protocol error design: a small closed set,
/// each with distinct propagation rules enforced by callers (see
/// `session` and the CLI's `main`), not by this type itself.
#[derive(Debug)]
pub enum Error {
    /// Could not acquire or configure the serial device. Aborts before any
    /// command is attempted.
    OpenFailure(String),
    /// A reply read returned fewer bytes than the length prefix promised,
    /// or no length prefix arrived at all.
    ReplyIO(String),
    /// The reply length byte exceeds the local 255-byte buffer, or an
    /// invalid subCmd was requested.
    ProtocolRange(String),
    /// The SVG document was malformed, missing `d`, oversized, or used an
    /// unsupported path opcode.
    InputParse(String),
    /// Zero canvas width/height at cut time. Treated as a programmer
    /// error by callers (session/CLI), which abort the process on seeing
    /// it rather than attempting recovery.
    ScalingUnset,
    Io(io::Error),
    Scroll(scroll::Error),
    Serial(serialport::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OpenFailure(msg) => write!(f, "failed to open serial device: {}", msg),
            Error::ReplyIO(msg) => write!(f, "reply I/O error: {}", msg),
            Error::ProtocolRange(msg) => write!(f, "protocol range error: {}", msg),
            Error::InputParse(msg) => write!(f, "input parse error: {}", msg),
            Error::ScalingUnset => write!(f, "fatal: cut scaling requested with zero canvas dimensions"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Scroll(e) => write!(f, "binary decode error: {}", e),
            Error::Serial(e) => write!(f, "serial port error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Scroll(e) => Some(e),
            Error::Serial(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Error::Serial(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
