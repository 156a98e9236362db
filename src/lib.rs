//! # Overview
//!
//! `smfcodec` is a streaming Standard Midi File (SMF) reader and writer.
//!
//! Files are read from any `std::io::Read` stream one track at a time, and each decoded event is
//! handed to an [`Observer`](trait.Observer.html) as soon as it is found:
//!
//! ```rust
//! use smfcodec::{num::u7, Context, Observer};
//!
//! #[derive(Default)]
//! struct NoteCounter(usize);
//! impl Observer for NoteCounter {
//!     fn on_note_on(&mut self, _ctx: &Context, _channel: smfcodec::num::u4, _key: u7, _vel: u7) {
//!         self.0 += 1;
//!     }
//! }
//!
//! let bytes: &[u8] = b"MThd\0\0\0\x06\0\0\0\x01\0\x60MTrk\0\0\0\x08\0\x90\x3C\x40\0\xFF\x2F\0";
//! let mut counter = NoteCounter::default();
//! let header = smfcodec::read(bytes, &mut counter).unwrap();
//! assert_eq!(header.track_count, 1);
//! assert_eq!(counter.0, 1);
//! ```
//!
//! Writing pulls the events of every track from a [`Producer`](trait.Producer.html), encoding
//! each track in memory before emitting its chunk:
//!
//! ```rust
//! use smfcodec::{num::u15, Format, Header, Timing, TrackEvent};
//!
//! let header = Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96)), 1);
//! let mut out = Vec::new();
//! let mut producer = |_track: u16| vec![TrackEvent::end_of_track(0)];
//! smfcodec::write(&header, &mut producer, &mut out).unwrap();
//! assert_eq!(out.len(), 14 + 12);
//! ```
//!
//! # Reading whole files
//!
//! The [`Smf`](struct.Smf.html) struct keeps every track in memory, which is the simplest way to
//! inspect or edit a file:
//!
//! ```rust,no_run
//! use smfcodec::Smf;
//!
//! let smf = Smf::open("song.mid").unwrap();
//! for (i, track) in smf.tracks.iter().enumerate() {
//!     println!("track {} has {} events", i, track.len());
//! }
//! smf.save("song-rewritten.mid").unwrap();
//! ```
//!
//! For lazy access without an observer, [`SmfReader`](struct.SmfReader.html) hands out the raw
//! body of each track, which can then be decoded with an [`EventIter`](struct.EventIter.html).
//!
//! # About features
//!
//! - The `strict` feature
//!
//!   By default `smfcodec` reads files that are slightly off the standard: oversized or duplicate
//!   header chunks and trailing bytes after the end of a track are skipped and reported as
//!   [`Warning`](enum.Warning.html)s. By enabling the `strict` feature these files are rejected
//!   with `ErrorKind::Format` errors instead, and `Format::SingleTrack` files must declare exactly
//!   one track.
//!
//! # Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade: header and track sizes at the
//! `debug` level, track boundaries at `trace` and every [`Warning`](enum.Warning.html) at `warn`.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{Error, ErrorKind, Result, ResultExt, StdResult},
        primitive::{u14, u24, u4, u7, IntRead, SplitChecked},
    };
    pub(crate) use std::{
        borrow::Cow,
        convert::TryFrom,
        fmt,
        fs::File,
        io::{self, Read, Write},
        mem,
        path::Path,
    };
}

mod chunk;
mod decode;
mod encode;
mod event;
mod observer;
mod primitive;
mod riff;
mod smf;
pub mod vlq;

pub use crate::{
    decode::{Context, EventIter},
    encode::{encode_track, TrackEncoder},
    error::{Error, ErrorKind, Location, Result},
    event::{MetaMessage, MidiMessage, PitchBend, TextKind, TrackEvent, TrackEventKind},
    observer::{dispatch, Observer, Warning},
    primitive::{Format, Fps, SmpteTime, Tempo, Timing},
    smf::{read, write, Header, Producer, ReadState, Smf, SmfReader, TrackChunk},
};

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u14, u15, u2, u24, u4, u7};
}

#[cfg(test)]
mod test;
