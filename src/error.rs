use std::{fmt, io};

/// Where in the stream an error was detected.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Location {
    /// Index of the track being read or written, if the error happened inside a track.
    pub track: Option<u16>,
    /// Absolute byte offset from the start of the stream.
    ///
    /// When writing, this is the offset within the track body being encoded.
    pub offset: u64,
}
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.track {
            Some(track) => write!(f, "track {}, byte {}", track, self.offset),
            None => write!(f, "byte {}", self.offset),
        }
    }
}

/// Represents an error while reading or writing an SMF stream.
///
/// Wraps an [`ErrorKind`] together with the [`Location`] where it was detected, when known.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    location: Option<Location>,
}
impl Error {
    /// Create a new error with the given kind and no location.
    #[inline]
    pub fn new(kind: ErrorKind) -> Error {
        Error {
            kind,
            location: None,
        }
    }

    /// More information about the error itself.
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Consume the error, keeping only its kind.
    #[inline]
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// Where the error was detected, if known.
    #[inline]
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// The index of the track where the error was detected, if any.
    #[inline]
    pub fn track(&self) -> Option<u16> {
        self.location.and_then(|loc| loc.track)
    }

    /// The byte offset where the error was detected, if known.
    #[inline]
    pub fn offset(&self) -> Option<u64> {
        self.location.map(|loc| loc.offset)
    }

    /// Attach a location, unless the error already carries a more precise one.
    pub(crate) fn at(mut self, track: Option<u16>, offset: u64) -> Error {
        if self.location.is_none() {
            self.location = Some(Location { track, offset });
        }
        self
    }
}
impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}
impl From<io::Error> for Error {
    #[inline]
    fn from(err: io::Error) -> Error {
        Error::new(ErrorKind::Stream(err))
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)?;
        if let Some(loc) = self.location {
            write!(f, " (at {})", loc)?;
        }
        Ok(())
    }
}
impl std::error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

/// The type of error that occurred while reading or writing.
///
/// Specific detail about which part of the format was violated is provided as a non-normative
/// string literal where applicable.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input is not a well-formed Standard Midi File: bad magic, invalid variable-length
    /// integer, unknown status byte, truncated data, etc...
    #[error("invalid midi: {0}")]
    Format(&'static str),

    /// The header declared more tracks than the stream contains.
    #[error("header declares {declared} tracks, but only {found} were found")]
    TrackCountMismatch {
        /// The track count in the `MThd` chunk.
        declared: u16,
        /// How many `MTrk` chunks were actually present.
        found: u16,
    },

    /// A track body ended before an end-of-track meta event was found.
    #[error("track ended without an end-of-track event")]
    UnexpectedEndOfTrack,

    /// The events supplied for a track do not end with an end-of-track meta event.
    #[error("track events do not end with an end-of-track event")]
    MissingEndOfTrack,

    /// An event was supplied after the end-of-track meta event.
    #[error("track has events after its end-of-track event")]
    EventAfterEndOfTrack,

    /// No events were supplied for a track.
    #[error("no events were supplied for the track")]
    IncompleteTrackData,

    /// A value does not fit its field.
    #[error("value out of range: {0}")]
    ValueOutOfRange(&'static str),

    /// The underlying byte stream failed.
    #[error("stream error: {0}")]
    Stream(#[from] io::Error),
}

macro_rules! err_format {
    ($msg:expr) => {
        $crate::error::ErrorKind::Format($msg)
    };
}
macro_rules! err_range {
    ($msg:expr) => {
        $crate::error::ErrorKind::ValueOutOfRange($msg)
    };
}

pub(crate) trait ResultExt<T> {
    /// Attach a location to the error, if it does not already have one.
    fn locate(self, track: Option<u16>, offset: u64) -> Result<T>;
}
impl<T> ResultExt<T> for StdResult<T, Error> {
    #[inline]
    fn locate(self, track: Option<u16>, offset: u64) -> Result<T> {
        self.map_err(|err| err.at(track, offset))
    }
}
impl<T> ResultExt<T> for StdResult<T, ErrorKind> {
    #[inline]
    fn locate(self, track: Option<u16>, offset: u64) -> Result<T> {
        self.map_err(|kind| Error::new(kind).at(track, offset))
    }
}

/// The result type used by the codec.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use core::result::Result as StdResult;
