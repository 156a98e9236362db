//! Callbacks fed while decoding a file.

use crate::{
    decode::Context,
    event::{MetaMessage, MidiMessage, PitchBend, TextKind, TrackEvent, TrackEventKind},
    prelude::*,
    primitive::{SmpteTime, Tempo},
    smf::Header,
};

/// A non-fatal irregularity found while reading.
///
/// Under the `strict` feature all of these are reported as `ErrorKind::Format` errors instead.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[non_exhaustive]
pub enum Warning {
    /// A chunk that is neither `MThd` nor `MTrk` was skipped.
    UnknownChunk {
        tag: [u8; 4],
        len: u32,
        /// Offset of the chunk header.
        offset: u64,
    },
    /// A second `MThd` chunk was skipped.
    DuplicateHeader { offset: u64 },
    /// The header chunk is longer than 6 bytes, the extra bytes were ignored.
    OversizedHeader { len: u32 },
    /// A track chunk continues after its `EndOfTrack` event.
    TrailingData {
        track: u16,
        /// How many bytes were ignored.
        len: usize,
        /// Offset of the first ignored byte.
        offset: u64,
    },
}
impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::UnknownChunk { tag, len, offset } => write!(
                f,
                "skipped unknown chunk {:?} of {} bytes at byte {}",
                String::from_utf8_lossy(tag),
                len,
                offset
            ),
            Warning::DuplicateHeader { offset } => {
                write!(f, "skipped duplicate header chunk at byte {}", offset)
            }
            Warning::OversizedHeader { len } => {
                write!(f, "header chunk has {} bytes, expected 6", len)
            }
            Warning::TrailingData { track, len, offset } => write!(
                f,
                "ignored {} bytes after the end of track {} at byte {}",
                len, track, offset
            ),
        }
    }
}

/// Receives the contents of a file as it is being decoded.
///
/// Every method has an empty default implementation, so implementors only write the callbacks
/// they care about. By default [`on_event`](Observer::on_event) dispatches each event to the
/// callback for its kind; overriding it receives the events undecoded instead.
#[allow(unused_variables)]
pub trait Observer {
    /// Called once, after the header chunk was read.
    fn on_header(&mut self, header: &Header) {}
    /// Called before the first event of every track.
    fn on_track_start(&mut self, ctx: &Context) {}
    /// Called after the `EndOfTrack` event of every track.
    fn on_track_end(&mut self, ctx: &Context) {}

    /// Called for every decoded event, `ctx` holding the absolute tick and offset of the event.
    fn on_event(&mut self, ctx: &Context, ev: &TrackEvent) {
        dispatch(self, ctx, ev)
    }

    fn on_note_off(&mut self, ctx: &Context, channel: u4, key: u7, vel: u7) {}
    fn on_note_on(&mut self, ctx: &Context, channel: u4, key: u7, vel: u7) {}
    fn on_key_pressure(&mut self, ctx: &Context, channel: u4, key: u7, pressure: u7) {}
    fn on_control_change(&mut self, ctx: &Context, channel: u4, controller: u7, value: u7) {}
    fn on_program_change(&mut self, ctx: &Context, channel: u4, program: u7) {}
    fn on_channel_pressure(&mut self, ctx: &Context, channel: u4, pressure: u7) {}
    fn on_pitch_bend(&mut self, ctx: &Context, channel: u4, bend: PitchBend) {}

    /// A sysex packet introduced by `0xF0`, without the marker byte.
    ///
    /// Packets introduced by `0xF7` (continuations and escapes) go to
    /// [`on_escape`](Observer::on_escape) instead, and never reach this callback.
    fn on_sysex(&mut self, ctx: &Context, data: &[u8]) {}
    /// A packet introduced by `0xF7`, without the marker byte. These are sysex continuation
    /// packets or escaped arbitrary bytes, and are not joined with a preceding `on_sysex` packet.
    fn on_escape(&mut self, ctx: &Context, data: &[u8]) {}

    /// Any of the text meta messages, decoded as UTF-8 with invalid sequences replaced.
    fn on_text(&mut self, ctx: &Context, kind: TextKind, text: &str) {}
    fn on_sequence_number(&mut self, ctx: &Context, number: Option<u16>) {}
    fn on_midi_channel(&mut self, ctx: &Context, channel: u4) {}
    fn on_midi_port(&mut self, ctx: &Context, port: u7) {}
    fn on_end_of_track(&mut self, ctx: &Context) {}
    fn on_tempo(&mut self, ctx: &Context, tempo: Tempo) {}
    fn on_smpte_offset(&mut self, ctx: &Context, time: SmpteTime) {}
    /// The denominator is given as a power of two, as stored in the file.
    fn on_time_signature(
        &mut self,
        ctx: &Context,
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        notes_per_quarter: u8,
    ) {
    }
    fn on_key_signature(&mut self, ctx: &Context, sharps: i8, minor: bool) {}
    fn on_sequencer_specific(&mut self, ctx: &Context, data: &[u8]) {}
    fn on_unknown_meta(&mut self, ctx: &Context, type_byte: u8, data: &[u8]) {}

    fn on_warning(&mut self, warning: &Warning) {}
    /// Called with the error that aborted the read, right before it is returned.
    fn on_error(&mut self, error: &Error) {}
}

/// Ignores everything.
impl Observer for () {}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn on_header(&mut self, header: &Header) {
        (**self).on_header(header)
    }
    fn on_track_start(&mut self, ctx: &Context) {
        (**self).on_track_start(ctx)
    }
    fn on_track_end(&mut self, ctx: &Context) {
        (**self).on_track_end(ctx)
    }
    fn on_event(&mut self, ctx: &Context, ev: &TrackEvent) {
        (**self).on_event(ctx, ev)
    }
    fn on_note_off(&mut self, ctx: &Context, channel: u4, key: u7, vel: u7) {
        (**self).on_note_off(ctx, channel, key, vel)
    }
    fn on_note_on(&mut self, ctx: &Context, channel: u4, key: u7, vel: u7) {
        (**self).on_note_on(ctx, channel, key, vel)
    }
    fn on_key_pressure(&mut self, ctx: &Context, channel: u4, key: u7, pressure: u7) {
        (**self).on_key_pressure(ctx, channel, key, pressure)
    }
    fn on_control_change(&mut self, ctx: &Context, channel: u4, controller: u7, value: u7) {
        (**self).on_control_change(ctx, channel, controller, value)
    }
    fn on_program_change(&mut self, ctx: &Context, channel: u4, program: u7) {
        (**self).on_program_change(ctx, channel, program)
    }
    fn on_channel_pressure(&mut self, ctx: &Context, channel: u4, pressure: u7) {
        (**self).on_channel_pressure(ctx, channel, pressure)
    }
    fn on_pitch_bend(&mut self, ctx: &Context, channel: u4, bend: PitchBend) {
        (**self).on_pitch_bend(ctx, channel, bend)
    }
    fn on_sysex(&mut self, ctx: &Context, data: &[u8]) {
        (**self).on_sysex(ctx, data)
    }
    fn on_escape(&mut self, ctx: &Context, data: &[u8]) {
        (**self).on_escape(ctx, data)
    }
    fn on_text(&mut self, ctx: &Context, kind: TextKind, text: &str) {
        (**self).on_text(ctx, kind, text)
    }
    fn on_sequence_number(&mut self, ctx: &Context, number: Option<u16>) {
        (**self).on_sequence_number(ctx, number)
    }
    fn on_midi_channel(&mut self, ctx: &Context, channel: u4) {
        (**self).on_midi_channel(ctx, channel)
    }
    fn on_midi_port(&mut self, ctx: &Context, port: u7) {
        (**self).on_midi_port(ctx, port)
    }
    fn on_end_of_track(&mut self, ctx: &Context) {
        (**self).on_end_of_track(ctx)
    }
    fn on_tempo(&mut self, ctx: &Context, tempo: Tempo) {
        (**self).on_tempo(ctx, tempo)
    }
    fn on_smpte_offset(&mut self, ctx: &Context, time: SmpteTime) {
        (**self).on_smpte_offset(ctx, time)
    }
    fn on_time_signature(
        &mut self,
        ctx: &Context,
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        notes_per_quarter: u8,
    ) {
        (**self).on_time_signature(
            ctx,
            numerator,
            denominator,
            clocks_per_click,
            notes_per_quarter,
        )
    }
    fn on_key_signature(&mut self, ctx: &Context, sharps: i8, minor: bool) {
        (**self).on_key_signature(ctx, sharps, minor)
    }
    fn on_sequencer_specific(&mut self, ctx: &Context, data: &[u8]) {
        (**self).on_sequencer_specific(ctx, data)
    }
    fn on_unknown_meta(&mut self, ctx: &Context, type_byte: u8, data: &[u8]) {
        (**self).on_unknown_meta(ctx, type_byte, data)
    }
    fn on_warning(&mut self, warning: &Warning) {
        (**self).on_warning(warning)
    }
    fn on_error(&mut self, error: &Error) {
        (**self).on_error(error)
    }
}

/// Call the callback that corresponds to the kind of `ev`.
pub fn dispatch<O: Observer + ?Sized>(observer: &mut O, ctx: &Context, ev: &TrackEvent) {
    match &ev.kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = *channel;
            match *message {
                MidiMessage::NoteOff { key, vel } => observer.on_note_off(ctx, channel, key, vel),
                MidiMessage::NoteOn { key, vel } => observer.on_note_on(ctx, channel, key, vel),
                MidiMessage::KeyPressure { key, pressure } => {
                    observer.on_key_pressure(ctx, channel, key, pressure)
                }
                MidiMessage::ControlChange { controller, value } => {
                    observer.on_control_change(ctx, channel, controller, value)
                }
                MidiMessage::ProgramChange { program } => {
                    observer.on_program_change(ctx, channel, program)
                }
                MidiMessage::ChannelPressure { pressure } => {
                    observer.on_channel_pressure(ctx, channel, pressure)
                }
                MidiMessage::PitchBend { bend } => observer.on_pitch_bend(ctx, channel, bend),
            }
        }
        TrackEventKind::SysEx(data) => observer.on_sysex(ctx, data),
        TrackEventKind::Escape(data) => observer.on_escape(ctx, data),
        TrackEventKind::Meta(meta) => dispatch_meta(observer, ctx, meta),
    }
}

fn dispatch_meta<O: Observer + ?Sized>(observer: &mut O, ctx: &Context, meta: &MetaMessage) {
    if let Some((kind, text)) = meta.text() {
        observer.on_text(ctx, kind, &text);
        return;
    }
    match meta {
        MetaMessage::TrackNumber(number) => observer.on_sequence_number(ctx, *number),
        MetaMessage::MidiChannel(channel) => observer.on_midi_channel(ctx, *channel),
        MetaMessage::MidiPort(port) => observer.on_midi_port(ctx, *port),
        MetaMessage::EndOfTrack => observer.on_end_of_track(ctx),
        MetaMessage::Tempo(tempo) => observer.on_tempo(ctx, *tempo),
        MetaMessage::SmpteOffset(time) => observer.on_smpte_offset(ctx, *time),
        MetaMessage::TimeSignature(num, den, clocks, notes) => {
            observer.on_time_signature(ctx, *num, *den, *clocks, *notes)
        }
        MetaMessage::KeySignature(sharps, minor) => {
            observer.on_key_signature(ctx, *sharps, *minor)
        }
        MetaMessage::SequencerSpecific(data) => observer.on_sequencer_specific(ctx, data),
        MetaMessage::Unknown(type_byte, data) => observer.on_unknown_meta(ctx, *type_byte, data),
        //Text messages were dispatched above
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Log(Vec<String>);
    impl Observer for Log {
        fn on_note_on(&mut self, ctx: &Context, channel: u4, key: u7, vel: u7) {
            self.0
                .push(format!("{} on {} {} {}", ctx.tick, channel, key, vel));
        }
        fn on_text(&mut self, _ctx: &Context, kind: TextKind, text: &str) {
            self.0.push(format!("{:?} {}", kind, text));
        }
        fn on_unknown_meta(&mut self, _ctx: &Context, type_byte: u8, data: &[u8]) {
            self.0.push(format!("meta {:#x} {:?}", type_byte, data));
        }
        fn on_sysex(&mut self, _ctx: &Context, data: &[u8]) {
            self.0.push(format!("sysex {:?}", data));
        }
        fn on_escape(&mut self, _ctx: &Context, data: &[u8]) {
            self.0.push(format!("escape {:?}", data));
        }
    }

    #[test]
    fn dispatches_by_kind() {
        let mut log = Log::default();
        let ctx = Context {
            tick: 12,
            ..Context::new(0)
        };
        let events = [
            TrackEvent::midi(
                0,
                9,
                MidiMessage::NoteOn {
                    key: u7::new(36),
                    vel: u7::new(0),
                },
            )
            .unwrap(),
            TrackEvent::meta(0, MetaMessage::Lyric(Cow::Borrowed(&b"la"[..]))),
            TrackEvent::meta(0, MetaMessage::Unknown(0x60, Cow::Borrowed(&[1, 2][..]))),
            TrackEvent::end_of_track(0),
        ];
        for ev in events.iter() {
            log.on_event(&ctx, ev);
        }
        assert_eq!(
            log.0,
            ["12 on 9 36 0", "Lyric la", "meta 0x60 [1, 2]"]
        );
    }

    #[test]
    fn forwards_through_references() {
        let mut log = Log::default();
        let ctx = Context::new(0);
        let note = TrackEvent::midi(
            0,
            1,
            MidiMessage::NoteOn {
                key: u7::new(60),
                vel: u7::new(90),
            },
        )
        .unwrap();
        let meta = TrackEvent::meta(0, MetaMessage::Unknown(0x21, Cow::Borrowed(&[3][..])));
        {
            let mut by_ref = &mut log;
            dispatch(&mut by_ref, &ctx, &note);
            <&mut Log as Observer>::on_text(&mut by_ref, &ctx, TextKind::Marker, "verse");
            <&mut Log as Observer>::on_event(&mut by_ref, &ctx, &meta);
        }
        assert_eq!(log.0, ["0 on 1 60 90", "Marker verse", "meta 0x21 [3]"]);
    }

    #[test]
    fn sysex_markers_are_kept_apart() {
        let mut log = Log::default();
        let ctx = Context::new(0);
        let events = [
            TrackEvent::new(0, TrackEventKind::SysEx(Cow::Borrowed(&[0x43, 0x12][..]))),
            TrackEvent::new(0, TrackEventKind::Escape(Cow::Borrowed(&[0x00, 0xF7][..]))),
        ];
        for ev in events.iter() {
            dispatch(&mut log, &ctx, ev);
        }
        assert_eq!(log.0, ["sysex [67, 18]", "escape [0, 247]"]);
    }

    #[test]
    fn warnings_display() {
        let warning = Warning::UnknownChunk {
            tag: *b"XFIH",
            len: 10,
            offset: 22,
        };
        assert_eq!(
            warning.to_string(),
            "skipped unknown chunk \"XFIH\" of 10 bytes at byte 22"
        );
    }
}
