//! All sort of events and their parsers.

use crate::{
    prelude::*,
    primitive::{SmpteTime, Tempo},
    vlq,
};

/// Represents a single event in a track within an SMF file.
///
/// Consists of a delta time (in MIDI ticks relative to the previous event) and the actual track
/// event.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct TrackEvent<'a> {
    /// How many MIDI ticks after the previous event should this event fire.
    ///
    /// Must fit in 28 bits to be written.
    pub delta: u32,
    /// The type of event along with event-specific data.
    pub kind: TrackEventKind<'a>,
}
impl<'a> TrackEvent<'a> {
    #[inline]
    pub fn new(delta: u32, kind: TrackEventKind<'a>) -> TrackEvent<'a> {
        TrackEvent { delta, kind }
    }

    /// Create a channel event, checking that `channel` is in the range `0..=15`.
    pub fn midi(
        delta: u32,
        channel: u8,
        message: MidiMessage,
    ) -> StdResult<TrackEvent<'a>, ErrorKind> {
        Ok(TrackEvent {
            delta,
            kind: TrackEventKind::Midi {
                channel: u4::checked(channel)?,
                message,
            },
        })
    }

    /// Create a meta event.
    #[inline]
    pub fn meta(delta: u32, meta: MetaMessage<'a>) -> TrackEvent<'a> {
        TrackEvent {
            delta,
            kind: TrackEventKind::Meta(meta),
        }
    }

    /// Create the end-of-track meta event that every track must finish with.
    #[inline]
    pub fn end_of_track(delta: u32) -> TrackEvent<'a> {
        TrackEvent::meta(delta, MetaMessage::EndOfTrack)
    }

    /// Read the delta time and the event itself, advancing the slice and updating
    /// `running_status`.
    ///
    /// In case of failure the slice might be left in the middle of an event!
    pub(crate) fn read(
        raw: &mut &'a [u8],
        running_status: &mut Option<u8>,
    ) -> Result<TrackEvent<'a>> {
        let delta = vlq::decode(raw)?;
        let kind = TrackEventKind::read(raw, running_status)?;
        Ok(TrackEvent { delta, kind })
    }

    pub(crate) fn write(
        &self,
        running_status: &mut Option<u8>,
        out: &mut Vec<u8>,
    ) -> StdResult<(), ErrorKind> {
        vlq::write(self.delta, out)?;
        self.kind.write(running_status, out)
    }

    /// Removes any references to external data by cloning any borrowed data, lifting lifetime
    /// restrictions on this event.
    #[inline]
    pub fn into_owned(self) -> TrackEvent<'static> {
        TrackEvent {
            delta: self.delta,
            kind: self.kind.into_owned(),
        }
    }
}

/// Represents the different kinds of SMF events and their associated data.
///
/// It notably does *not* include the timing of the event; the `TrackEvent` struct is responsible
/// for this.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum TrackEventKind<'a> {
    /// A message associated to a MIDI channel carrying musical data.
    ///
    /// Usually, the bulk of MIDI data is these kind of messages.
    Midi {
        /// The MIDI channel that this event is associated with.
        channel: u4,
        /// The MIDI message type and associated data.
        message: MidiMessage,
    },
    /// A System Exclusive message, carrying arbitrary data.
    ///
    /// The data bytes included here do not include the implicit `0xF0` prefix.
    ///
    /// Usually SysEx events end with an `0xF7` byte, which is kept as part of the data.
    /// Each event is a self-contained packet: split SysEx messages are not joined.
    SysEx(Cow<'a, [u8]>),
    /// An escape sequence (`0xF7` marker), intended to send arbitrary data to the MIDI
    /// synthesizer.
    Escape(Cow<'a, [u8]>),
    /// A meta-message, giving extra information for correct playback, like tempo, song name,
    /// lyrics, etc...
    Meta(MetaMessage<'a>),
}
impl<'a> TrackEventKind<'a> {
    fn read(raw: &mut &'a [u8], running_status: &mut Option<u8>) -> Result<TrackEventKind<'a>> {
        //Read status
        let mut status = *raw.first().ok_or(err_format!("failed to read status"))?;
        if status < 0x80 {
            //Running status!
            status = running_status.ok_or(err_format!(
                "event missing status with no running status active"
            ))?;
        } else {
            //Advance slice 1 byte to consume status. Note that because we already did `first()`,
            //we can use panicking index here
            *raw = &raw[1..];
        }
        //Delegate further parsing depending on status
        //Meta, sysex and escape events leave the running status untouched
        let kind = match status {
            0x80..=0xEF => {
                *running_status = Some(status);
                let channel = u4::new(status);
                let message = MidiMessage::read(status, raw)?;
                TrackEventKind::Midi { channel, message }
            }
            0xFF => TrackEventKind::Meta(MetaMessage::read(raw)?),
            0xF0 => TrackEventKind::SysEx(Cow::Borrowed(vlq::read_slice(raw)?)),
            0xF7 => TrackEventKind::Escape(Cow::Borrowed(vlq::read_slice(raw)?)),
            0xF1..=0xF6 => bail!(err_format!(
                "standard midi files cannot contain system common events"
            )),
            0xF8..=0xFE => bail!(err_format!(
                "standard midi files cannot contain system realtime events"
            )),
            0x00..=0x7F => bail!(err_format!("invalid running status without top bit set")),
        };
        Ok(kind)
    }

    /// Writes a single event to the given output buffer.
    ///
    /// `running_status` keeps track of the last MIDI status, in order to make proper use of
    /// running status. It should be shared between consecutive calls, and should initially be set
    /// to `None`.
    fn write(
        &self,
        running_status: &mut Option<u8>,
        out: &mut Vec<u8>,
    ) -> StdResult<(), ErrorKind> {
        //Running Status rules:
        // - MIDI Messages (0x80 ..= 0xEF) alter and use running status
        // - System Exclusive (0xF0), Escape (0xF7) and Meta Messages (0xFF) never use it and
        //   leave it as it was
        match self {
            TrackEventKind::Midi { channel, message } => {
                let status = message.status_nibble() << 4 | channel.as_int();
                if Some(status) != *running_status {
                    //Explicitly write status
                    out.push(status);
                    *running_status = Some(status);
                }
                message.write(out);
            }
            TrackEventKind::SysEx(data) => {
                out.push(0xF0);
                vlq::write_slice(data, out)?;
            }
            TrackEventKind::Escape(data) => {
                out.push(0xF7);
                vlq::write_slice(data, out)?;
            }
            TrackEventKind::Meta(meta) => {
                out.push(0xFF);
                meta.write(out)?;
            }
        }
        Ok(())
    }

    /// Whether this is the `EndOfTrack` meta event.
    #[inline]
    pub fn is_end_of_track(&self) -> bool {
        matches!(self, TrackEventKind::Meta(MetaMessage::EndOfTrack))
    }

    /// Clone any borrowed data, lifting lifetime restrictions on this event.
    pub fn into_owned(self) -> TrackEventKind<'static> {
        use self::TrackEventKind::*;
        match self {
            Midi { channel, message } => Midi { channel, message },
            SysEx(data) => SysEx(Cow::Owned(data.into_owned())),
            Escape(data) => Escape(Cow::Owned(data.into_owned())),
            Meta(meta) => Meta(meta.into_owned()),
        }
    }
}

/// Represents a MIDI message, always associated to a MIDI channel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MidiMessage {
    /// Stop playing a note.
    NoteOff {
        /// The MIDI key to stop playing.
        key: u7,
        /// The velocity with which to stop playing it.
        vel: u7,
    },
    /// Start playing a note.
    NoteOn {
        /// The key to start playing.
        key: u7,
        /// The velocity (strength) with which to press it.
        ///
        /// A velocity of 0 is kept as a `NoteOn`, it is not converted into a `NoteOff`.
        vel: u7,
    },
    /// Modify the pressure of a note after it has been played, also known as polyphonic
    /// aftertouch.
    KeyPressure {
        /// The key for which to modify its pressure.
        key: u7,
        /// The new pressure for the key.
        pressure: u7,
    },
    /// Modify the value of a MIDI controller.
    ControlChange {
        /// The controller to modify.
        ///
        /// See the MIDI spec for the meaning of each index.
        controller: u7,
        /// The value to set it to.
        value: u7,
    },
    /// Change the program (also known as instrument) for a channel.
    ProgramChange {
        /// The new program (instrument) to use for the channel.
        program: u7,
    },
    /// Change the pressure of a whole channel at once, also known as channel aftertouch.
    ChannelPressure {
        /// The new pressure for all notes currently playing in the channel.
        pressure: u7,
    },
    /// Set the pitch bend value for the entire channel.
    PitchBend {
        /// The new pitch-bend value.
        bend: PitchBend,
    },
}
impl MidiMessage {
    /// Midi messages have a known length.
    pub(crate) fn msg_length(status: u8) -> usize {
        const LENGTH_BY_STATUS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 2, 1, 1, 2, 0];
        LENGTH_BY_STATUS[(status >> 4) as usize] as usize
    }

    /// Read the data bytes of a message, given a status in the range `0x80..=0xEF`.
    fn read(status: u8, raw: &mut &[u8]) -> Result<MidiMessage> {
        let a = u7::read_data(raw)?;
        let b = if Self::msg_length(status) == 2 {
            u7::read_data(raw)?
        } else {
            u7::new(0)
        };
        Ok(match status >> 4 {
            0x8 => MidiMessage::NoteOff { key: a, vel: b },
            0x9 => MidiMessage::NoteOn { key: a, vel: b },
            0xA => MidiMessage::KeyPressure {
                key: a,
                pressure: b,
            },
            0xB => MidiMessage::ControlChange {
                controller: a,
                value: b,
            },
            0xC => MidiMessage::ProgramChange { program: a },
            0xD => MidiMessage::ChannelPressure { pressure: a },
            0xE => {
                //Note the little-endian order, contrasting with the default big-endian order of
                //Standard Midi Files
                let lsb = a.as_int() as u16;
                let msb = b.as_int() as u16;
                MidiMessage::PitchBend {
                    bend: PitchBend(u14::new(msb << 7 | lsb)),
                }
            }
            _ => bail!(err_format!("invalid channel message status")),
        })
    }

    /// Get the raw status nibble for this MIDI message type.
    pub(crate) fn status_nibble(&self) -> u8 {
        match self {
            MidiMessage::NoteOff { .. } => 0x8,
            MidiMessage::NoteOn { .. } => 0x9,
            MidiMessage::KeyPressure { .. } => 0xA,
            MidiMessage::ControlChange { .. } => 0xB,
            MidiMessage::ProgramChange { .. } => 0xC,
            MidiMessage::ChannelPressure { .. } => 0xD,
            MidiMessage::PitchBend { .. } => 0xE,
        }
    }

    /// Write the data part of this message, not including the status.
    fn write(&self, out: &mut Vec<u8>) {
        match *self {
            MidiMessage::NoteOff { key, vel }
            | MidiMessage::NoteOn { key, vel }
            | MidiMessage::KeyPressure { key, pressure: vel } => {
                out.extend_from_slice(&[key.as_int(), vel.as_int()])
            }
            MidiMessage::ControlChange { controller, value } => {
                out.extend_from_slice(&[controller.as_int(), value.as_int()])
            }
            MidiMessage::ProgramChange { program } => out.push(program.as_int()),
            MidiMessage::ChannelPressure { pressure } => out.push(pressure.as_int()),
            MidiMessage::PitchBend { bend } => {
                let raw = bend.0.as_int();
                out.extend_from_slice(&[(raw & 0x7F) as u8, (raw >> 7) as u8])
            }
        }
    }
}

/// The value of a pitch bend, represented as 14 bits.
///
/// A value of `0x0000` indicates full bend downwards.
/// A value of `0x2000` indicates no bend.
/// A value of `0x3FFF` indicates full bend upwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PitchBend(pub u14);
impl PitchBend {
    /// The middle value of `0x2000`, indicating no bend.
    #[inline]
    pub const fn mid_raw_value() -> PitchBend {
        PitchBend(u14::new(0x2000))
    }

    /// Create a `PitchBend` value from an int in the range `[-0x2000, 0x1FFF]`.
    ///
    /// Integers outside this range will be clamped.
    #[inline]
    pub fn from_int(int: i16) -> PitchBend {
        PitchBend(u14::new((int.clamp(-0x2000, 0x1FFF) + 0x2000) as u16))
    }

    /// Returns the signed bend, `lsb + msb*128 - 8192`, in the range `[-0x2000, 0x1FFF]`.
    #[inline]
    pub fn as_int(self) -> i16 {
        self.0.as_int() as i16 - 0x2000
    }

    /// Returns an `f32` in the range `[-1.0, 1.0)`.
    #[inline]
    pub fn as_f32(self) -> f32 {
        self.as_int() as f32 * (1.0 / 0x2000 as f32)
    }
}

/// The different kinds of text carried by meta messages `0x01..=0x09`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TextKind {
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    ProgramName,
    DeviceName,
}
impl TextKind {
    /// The meta message type byte for this kind of text.
    pub fn type_byte(self) -> u8 {
        match self {
            TextKind::Text => 0x01,
            TextKind::Copyright => 0x02,
            TextKind::TrackName => 0x03,
            TextKind::InstrumentName => 0x04,
            TextKind::Lyric => 0x05,
            TextKind::Marker => 0x06,
            TextKind::CuePoint => 0x07,
            TextKind::ProgramName => 0x08,
            TextKind::DeviceName => 0x09,
        }
    }
}

/// A "meta message", as defined by the SMF spec.
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
///
/// Text payloads are kept as raw bytes, since files in the wild use all sorts of encodings.
/// See [`MetaMessage::text`] for a decoded view.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum MetaMessage<'a> {
    /// For `Format::Sequential` MIDI file types, `TrackNumber` can be empty, and defaults to
    /// the track index.
    TrackNumber(Option<u16>),
    /// Arbitrary text associated to an instant.
    Text(Cow<'a, [u8]>),
    /// A copyright notice.
    Copyright(Cow<'a, [u8]>),
    /// Information about the name of the track.
    TrackName(Cow<'a, [u8]>),
    /// Information about the name of the current instrument.
    InstrumentName(Cow<'a, [u8]>),
    /// Arbitrary lyric information associated to an instant.
    Lyric(Cow<'a, [u8]>),
    /// Arbitrary marker text associated to an instant.
    Marker(Cow<'a, [u8]>),
    /// Arbitrary cue point text associated to an instant.
    CuePoint(Cow<'a, [u8]>),
    /// Information about the name of the current program.
    ProgramName(Cow<'a, [u8]>),
    /// Name of the device that this file was intended to be played with.
    DeviceName(Cow<'a, [u8]>),
    /// Number of the MIDI channel that this file was intended to be played with.
    MidiChannel(u4),
    /// Number of the MIDI port that this file was intended to be played with.
    MidiPort(u7),
    /// Obligatory at track end.
    EndOfTrack,
    /// Amount of microseconds per beat (quarter note).
    ///
    /// Usually appears at the beginning of a track, before any midi events are sent, but there
    /// are no guarantees.
    Tempo(Tempo),
    /// Offset for the starting point of a MIDI track from the start of a sequence in terms of
    /// SMPTE time.
    SmpteOffset(SmpteTime),
    /// In order of the MIDI specification, numerator, denominator (as a power of two), MIDI
    /// clocks per click, 32nd notes per quarter.
    TimeSignature(u8, u8, u8, u8),
    /// As in the MIDI specification, negative numbers indicate number of flats and positive
    /// numbers indicate number of sharps.
    /// `false` indicates a major scale, `true` indicates a minor scale.
    KeySignature(i8, bool),
    /// Arbitrary data intended for the sequencer.
    /// This data is never sent to a device.
    SequencerSpecific(Cow<'a, [u8]>),
    /// An unknown or malformed meta-message.
    ///
    /// The first `u8` is the raw meta-message identifier byte.
    /// The slice is the actual payload of the meta-message.
    Unknown(u8, Cow<'a, [u8]>),
}
impl<'a> MetaMessage<'a> {
    /// Build a text meta message of the given kind.
    pub fn from_text(kind: TextKind, text: impl Into<Cow<'a, [u8]>>) -> MetaMessage<'a> {
        let text = text.into();
        match kind {
            TextKind::Text => MetaMessage::Text(text),
            TextKind::Copyright => MetaMessage::Copyright(text),
            TextKind::TrackName => MetaMessage::TrackName(text),
            TextKind::InstrumentName => MetaMessage::InstrumentName(text),
            TextKind::Lyric => MetaMessage::Lyric(text),
            TextKind::Marker => MetaMessage::Marker(text),
            TextKind::CuePoint => MetaMessage::CuePoint(text),
            TextKind::ProgramName => MetaMessage::ProgramName(text),
            TextKind::DeviceName => MetaMessage::DeviceName(text),
        }
    }

    /// If this is a text message, get its kind and raw bytes.
    pub fn text_bytes(&self) -> Option<(TextKind, &[u8])> {
        use self::MetaMessage::*;
        let (kind, data) = match self {
            Text(data) => (TextKind::Text, data),
            Copyright(data) => (TextKind::Copyright, data),
            TrackName(data) => (TextKind::TrackName, data),
            InstrumentName(data) => (TextKind::InstrumentName, data),
            Lyric(data) => (TextKind::Lyric, data),
            Marker(data) => (TextKind::Marker, data),
            CuePoint(data) => (TextKind::CuePoint, data),
            ProgramName(data) => (TextKind::ProgramName, data),
            DeviceName(data) => (TextKind::DeviceName, data),
            _ => return None,
        };
        Some((kind, &data[..]))
    }

    /// If this is a text message, get its kind and its payload decoded as UTF-8.
    ///
    /// Invalid sequences are replaced with `U+FFFD`.
    pub fn text(&self) -> Option<(TextKind, Cow<'_, str>)> {
        self.text_bytes()
            .map(|(kind, data)| (kind, String::from_utf8_lossy(data)))
    }

    /// Clone any borrowed data, lifting lifetime restrictions on this message.
    pub fn into_owned(self) -> MetaMessage<'static> {
        use self::MetaMessage::*;
        fn own(data: Cow<[u8]>) -> Cow<'static, [u8]> {
            Cow::Owned(data.into_owned())
        }
        match self {
            TrackNumber(v) => TrackNumber(v),
            Text(data) => Text(own(data)),
            Copyright(data) => Copyright(own(data)),
            TrackName(data) => TrackName(own(data)),
            InstrumentName(data) => InstrumentName(own(data)),
            Lyric(data) => Lyric(own(data)),
            Marker(data) => Marker(own(data)),
            CuePoint(data) => CuePoint(own(data)),
            ProgramName(data) => ProgramName(own(data)),
            DeviceName(data) => DeviceName(own(data)),
            MidiChannel(v) => MidiChannel(v),
            MidiPort(v) => MidiPort(v),
            EndOfTrack => EndOfTrack,
            MetaMessage::Tempo(v) => MetaMessage::Tempo(v),
            SmpteOffset(v) => SmpteOffset(v),
            TimeSignature(v0, v1, v2, v3) => TimeSignature(v0, v1, v2, v3),
            KeySignature(v0, v1) => KeySignature(v0, v1),
            SequencerSpecific(data) => SequencerSpecific(own(data)),
            Unknown(v, data) => Unknown(v, own(data)),
        }
    }

    /// Read a meta message following its `0xFF` marker.
    ///
    /// Messages whose payload is too short for their decoded form are kept as `Unknown`, so that
    /// they are written back untouched.
    fn read(raw: &mut &'a [u8]) -> Result<MetaMessage<'a>> {
        let type_byte =
            u8::read(raw).map_err(|_| err_format!("failed to read meta message type"))?;
        let data = vlq::read_slice(raw)?;
        let text = |kind| MetaMessage::from_text(kind, Cow::Borrowed(data));
        Ok(match (type_byte, data) {
            (0x00, [hi, lo]) => MetaMessage::TrackNumber(Some(u16::from_be_bytes([*hi, *lo]))),
            (0x00, []) => MetaMessage::TrackNumber(None),
            (0x01, _) => text(TextKind::Text),
            (0x02, _) => text(TextKind::Copyright),
            (0x03, _) => text(TextKind::TrackName),
            (0x04, _) => text(TextKind::InstrumentName),
            (0x05, _) => text(TextKind::Lyric),
            (0x06, _) => text(TextKind::Marker),
            (0x07, _) => text(TextKind::CuePoint),
            (0x08, _) => text(TextKind::ProgramName),
            (0x09, _) => text(TextKind::DeviceName),
            (0x20, &[chan]) if chan < 0x10 => MetaMessage::MidiChannel(u4::new(chan)),
            (0x21, &[port]) if port < 0x80 => MetaMessage::MidiPort(u7::new(port)),
            (0x2F, []) => MetaMessage::EndOfTrack,
            (0x51, [a, b, c]) => MetaMessage::Tempo(Tempo::from_micros(u24::new(
                u32::from_be_bytes([0, *a, *b, *c]),
            ))),
            (0x54, &[_, _, _, _, _]) => match SmpteTime::decode(data) {
                Some(time) => MetaMessage::SmpteOffset(time),
                None => MetaMessage::Unknown(type_byte, Cow::Borrowed(data)),
            },
            (0x58, &[num, den, clocks, notes]) => {
                MetaMessage::TimeSignature(num, den, clocks, notes)
            }
            (0x59, &[sharps, mode]) if mode <= 1 => {
                MetaMessage::KeySignature(sharps as i8, mode != 0)
            }
            (0x7F, _) => MetaMessage::SequencerSpecific(Cow::Borrowed(data)),
            _ => MetaMessage::Unknown(type_byte, Cow::Borrowed(data)),
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> StdResult<(), ErrorKind> {
        let mut write_msg = |type_byte: u8, data: &[u8]| {
            out.push(type_byte);
            vlq::write_slice(data, out)
        };
        if let Some((kind, data)) = self.text_bytes() {
            return write_msg(kind.type_byte(), data);
        }
        match self {
            MetaMessage::TrackNumber(track_num) => match track_num {
                None => write_msg(0x00, &[]),
                Some(track_num) => write_msg(0x00, &track_num.to_be_bytes()[..]),
            },
            MetaMessage::MidiChannel(chan) => write_msg(0x20, &[chan.as_int()]),
            MetaMessage::MidiPort(port) => write_msg(0x21, &[port.as_int()]),
            MetaMessage::EndOfTrack => write_msg(0x2F, &[]),
            MetaMessage::Tempo(tempo) => {
                write_msg(0x51, &tempo.micros_per_beat().to_be_bytes()[1..])
            }
            MetaMessage::SmpteOffset(smpte) => write_msg(0x54, &smpte.encode()[..]),
            MetaMessage::TimeSignature(num, den, ticksperclick, thirtysecondsperquarter) => {
                write_msg(
                    0x58,
                    &[*num, *den, *ticksperclick, *thirtysecondsperquarter],
                )
            }
            MetaMessage::KeySignature(sharps, minor) => {
                write_msg(0x59, &[*sharps as u8, *minor as u8])
            }
            MetaMessage::SequencerSpecific(data) => write_msg(0x7F, data),
            MetaMessage::Unknown(type_byte, data) => write_msg(*type_byte, data),
            //Text messages were handled above
            _ => Ok(()),
        }
    }
}
