use crate::{
    num::{u15, u4, u7},
    read, write, Context, Error, ErrorKind, Format, Fps, Header, MetaMessage, MidiMessage,
    Observer, PitchBend, ReadState, Smf, SmfReader, Tempo, TextKind, Timing, TrackEvent,
    TrackEventKind, Warning,
};
use pretty_assertions::assert_eq;
use std::{
    borrow::Cow,
    io::{self, Read},
};

/// A format 0 file with one track at 120 ticks per beat: copyright, tempo, time signature, key
/// signature, a GS reset sysex and an ascending scale.
const FIXTURE: &[u8] = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x78\
MTrk\x00\x00\x00\x99\
\x00\xFF\x02\x2FCopyright (C) 2006-2020 Pedro L\xC3\xB3pez-Cabanillas\
\x00\xFF\x51\x03\x09\x27\xC0\
\x00\xFF\x58\x04\x03\x02\x24\x08\
\x00\xFF\x59\x02\x02\x00\
\x00\xF0\x0A\x41\x10\x42\x12\x40\x00\x7F\x00\x41\xF7\
\x00\x90\x3C\x78\x3C\x80\x3C\x00\
\x00\x90\x3E\x78\x3C\x80\x3E\x00\
\x00\x90\x40\x78\x3C\x80\x40\x00\
\x00\x90\x41\x78\x3C\x80\x41\x00\
\x00\x90\x43\x78\x3C\x80\x43\x00\
\x00\x90\x45\x78\x3C\x80\x45\x00\
\x00\x90\x47\x78\x3C\x80\x47\x00\
\x00\x90\x48\x78\x3C\x80\x48\x00\
\x00\xFF\x2F\x00";

const COPYRIGHT: &str = "Copyright (C) 2006-2020 Pedro López-Cabanillas";
const GS_RESET: [u8; 10] = [0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41, 0xF7];
const PITCHES: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];

/// Index of the last byte of the track length.
const TRACK_LEN_BYTE: usize = 21;
/// Index of the low byte of the declared track count.
const TRACK_COUNT_BYTE: usize = 11;

/// The events of the fixture, built by hand.
fn fixture_events() -> Vec<TrackEvent<'static>> {
    let mut events = vec![
        TrackEvent::meta(0, MetaMessage::Copyright(Cow::Borrowed(COPYRIGHT.as_bytes()))),
        TrackEvent::meta(0, MetaMessage::Tempo(Tempo::from_bpm(100).unwrap())),
        TrackEvent::meta(0, MetaMessage::TimeSignature(3, 2, 36, 8)),
        TrackEvent::meta(0, MetaMessage::KeySignature(2, false)),
        TrackEvent::new(0, TrackEventKind::SysEx(Cow::Borrowed(&GS_RESET[..]))),
    ];
    for &key in PITCHES.iter() {
        let key = u7::new(key);
        let on = MidiMessage::NoteOn {
            key,
            vel: u7::new(120),
        };
        let off = MidiMessage::NoteOff {
            key,
            vel: u7::new(0),
        };
        events.push(TrackEvent::midi(0, 0, on).unwrap());
        events.push(TrackEvent::midi(60, 0, off).unwrap());
    }
    events.push(TrackEvent::end_of_track(0));
    events
}

/// Wrap a track body in a format 0 file with 96 ticks per beat.
fn single_track(body: &[u8]) -> Vec<u8> {
    let mut file = b"MThd\0\0\0\x06\0\0\0\x01\0\x60MTrk".to_vec();
    file.extend_from_slice(&(body.len() as u32).to_be_bytes());
    file.extend_from_slice(body);
    file
}

/// Wrap a file in an RMID container.
fn rmid(smf: &[u8]) -> Vec<u8> {
    let mut riff = b"RMID".to_vec();
    riff.extend_from_slice(b"data");
    riff.extend_from_slice(&(smf.len() as u32).to_le_bytes());
    riff.extend_from_slice(smf);
    if smf.len() % 2 == 1 {
        riff.push(0);
    }
    let mut file = b"RIFF".to_vec();
    file.extend_from_slice(&(riff.len() as u32).to_le_bytes());
    file.extend(riff);
    file
}

/// Keeps a record of every callback.
#[derive(Default, Debug)]
struct Tally {
    headers: Vec<Header>,
    track_starts: Vec<Context>,
    track_ends: Vec<Context>,
    note_on: Vec<(u8, u8, u8)>,
    note_off: Vec<(u8, u8)>,
    tempos: Vec<Tempo>,
    time_signatures: Vec<(u8, u8, u8, u8)>,
    key_signatures: Vec<(i8, bool)>,
    sysex: Vec<Vec<u8>>,
    texts: Vec<(TextKind, String)>,
    bends: Vec<i16>,
    end_of_tracks: usize,
    warnings: Vec<Warning>,
    errors: Vec<String>,
}
impl Observer for Tally {
    fn on_header(&mut self, header: &Header) {
        self.headers.push(*header);
    }
    fn on_track_start(&mut self, ctx: &Context) {
        self.track_starts.push(*ctx);
    }
    fn on_track_end(&mut self, ctx: &Context) {
        self.track_ends.push(*ctx);
    }
    fn on_note_on(&mut self, _ctx: &Context, channel: u4, key: u7, vel: u7) {
        self.note_on
            .push((channel.as_int(), key.as_int(), vel.as_int()));
    }
    fn on_note_off(&mut self, _ctx: &Context, channel: u4, key: u7, _vel: u7) {
        self.note_off.push((channel.as_int(), key.as_int()));
    }
    fn on_pitch_bend(&mut self, _ctx: &Context, _channel: u4, bend: PitchBend) {
        self.bends.push(bend.as_int());
    }
    fn on_tempo(&mut self, _ctx: &Context, tempo: Tempo) {
        self.tempos.push(tempo);
    }
    fn on_time_signature(&mut self, _ctx: &Context, num: u8, den: u8, clocks: u8, notes: u8) {
        self.time_signatures.push((num, den, clocks, notes));
    }
    fn on_key_signature(&mut self, _ctx: &Context, sharps: i8, minor: bool) {
        self.key_signatures.push((sharps, minor));
    }
    fn on_sysex(&mut self, _ctx: &Context, data: &[u8]) {
        self.sysex.push(data.to_vec());
    }
    fn on_text(&mut self, _ctx: &Context, kind: TextKind, text: &str) {
        self.texts.push((kind, text.to_string()));
    }
    fn on_end_of_track(&mut self, _ctx: &Context) {
        self.end_of_tracks += 1;
    }
    fn on_warning(&mut self, warning: &Warning) {
        self.warnings.push(warning.clone());
    }
    fn on_error(&mut self, error: &Error) {
        self.errors.push(error.to_string());
    }
}

fn tally(raw: &[u8]) -> (Result<Header, Error>, Tally) {
    let mut tally = Tally::default();
    let result = read(raw, &mut tally);
    (result, tally)
}

#[test]
fn fixture_size() {
    assert_eq!(FIXTURE.len(), 175);
}

#[test]
fn fixture_dispatch() {
    let (result, tally) = tally(FIXTURE);
    let header = result.unwrap();
    assert_eq!(
        header,
        Header::new(Format::SingleTrack, Timing::Metrical(u15::new(120)), 1)
    );
    assert_eq!(tally.headers, [header]);
    assert_eq!(tally.track_starts.len(), 1);
    assert_eq!(tally.track_ends.len(), 1);
    assert_eq!(tally.note_on.len(), 8);
    assert_eq!(tally.note_off.len(), 8);
    assert_eq!(tally.note_off.last(), Some(&(0, 72)));
    assert_eq!(
        tally.note_on.iter().map(|&(_, key, _)| key).collect::<Vec<_>>(),
        PITCHES
    );
    assert!(tally.note_on.iter().all(|&(ch, _, vel)| ch == 0 && vel == 120));
    assert_eq!(tally.tempos.len(), 1);
    assert_eq!(tally.tempos[0].micros_per_beat(), 600_000);
    assert_eq!(tally.tempos[0].bpm(), 100);
    assert_eq!(tally.time_signatures, [(3, 2, 36, 8)]);
    assert_eq!(tally.key_signatures, [(2, false)]);
    assert_eq!(tally.sysex, [GS_RESET.to_vec()]);
    assert_eq!(
        tally.texts,
        [(TextKind::Copyright, COPYRIGHT.to_string())]
    );
    assert_eq!(tally.end_of_tracks, 1);
    assert!(tally.warnings.is_empty());
    assert!(tally.errors.is_empty());
}

#[test]
fn fixture_track_context() {
    let (result, tally) = tally(FIXTURE);
    result.unwrap();
    assert_eq!(tally.track_starts[0].track, 0);
    assert_eq!(tally.track_starts[0].offset, 22);
    let end = tally.track_ends[0];
    assert_eq!(end.tick, 8 * 60);
    assert_eq!(end.offset, 22 + 149);
    assert_eq!(end.running_status, Some(0x80));
}

#[test]
fn fixture_rewrite() {
    let smf = Smf::read(FIXTURE).unwrap();
    assert_eq!(smf.tracks, [fixture_events()]);
    let mut out = Vec::new();
    smf.write(&mut out).unwrap();
    assert_eq!(out, FIXTURE);
}

#[test]
fn fixture_from_producer() {
    let header = Header::new(Format::SingleTrack, Timing::Metrical(u15::new(120)), 1);
    let mut out = Vec::new();
    write(&header, &mut |_track: u16| fixture_events(), &mut out).unwrap();
    assert_eq!(out, FIXTURE);

    let mut tracks = vec![fixture_events()];
    let mut out = Vec::new();
    write(&header, &mut tracks[..], &mut out).unwrap();
    assert_eq!(out, FIXTURE);
}

#[test]
fn running_status_roundtrip() {
    let note = |key| {
        TrackEvent::midi(
            0,
            7,
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            },
        )
        .unwrap()
    };
    let header = Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96)), 1);
    let mut out = Vec::new();
    write(
        &header,
        &mut |_track: u16| vec![note(60), note(64), TrackEvent::end_of_track(0)],
        &mut out,
    )
    .unwrap();
    assert_eq!(
        &out[22..],
        [0x00, 0x97, 60, 100, 0x00, 64, 100, 0x00, 0xFF, 0x2F, 0x00]
    );
    let (result, tally) = tally(&out);
    result.unwrap();
    assert_eq!(tally.note_on, [(7, 60, 100), (7, 64, 100)]);
}

#[test]
fn truncated_before_end_of_track() {
    let mut raw = FIXTURE.to_vec();
    raw[TRACK_LEN_BYTE] = 149;
    let (result, tally) = tally(&raw);
    let err = result.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnexpectedEndOfTrack));
    assert_eq!(err.track(), Some(0));
    assert_eq!(err.offset(), Some(22 + 149));
    assert_eq!(tally.errors, [err.to_string()]);
    assert!(tally.track_ends.is_empty());
}

#[test]
fn truncated_inside_end_of_track() {
    let mut raw = FIXTURE.to_vec();
    raw[TRACK_LEN_BYTE] = 151;
    let (result, _tally) = tally(&raw);
    assert!(matches!(result.unwrap_err().kind(), ErrorKind::Format(_)));
}

#[test]
fn truncated_stream() {
    let (result, tally) = tally(&FIXTURE[..100]);
    let err = result.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Format(_)));
    assert!(tally.track_starts.is_empty());
}

#[test]
fn unknown_chunk_is_skipped() {
    let mut raw = FIXTURE[..14].to_vec();
    raw.extend_from_slice(b"XFIH\0\0\0\x04abcd");
    raw.extend_from_slice(&FIXTURE[14..]);
    let (result, tally) = tally(&raw);
    result.unwrap();
    assert_eq!(
        tally.warnings,
        [Warning::UnknownChunk {
            tag: *b"XFIH",
            len: 4,
            offset: 14,
        }]
    );
    assert_eq!(tally.note_on.len(), 8);
    assert_eq!(tally.track_starts[0].offset, 22 + 12);
}

#[test]
fn track_count_mismatch() {
    let mut raw = FIXTURE.to_vec();
    raw[TRACK_COUNT_BYTE] = 3;
    let (result, tally) = tally(&raw);
    let err = result.unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::TrackCountMismatch {
            declared: 3,
            found: 1
        }
    ));
    assert_eq!(err.offset(), Some(175));
    assert_eq!(tally.track_ends.len(), 1);
    assert_eq!(tally.errors.len(), 1);
}

#[test]
fn chunks_after_last_track_are_not_read() {
    let mut raw = FIXTURE.to_vec();
    raw.extend_from_slice(b"garbage that is not a chunk");
    let (result, tally) = tally(&raw);
    result.unwrap();
    assert!(tally.warnings.is_empty());
}

#[test]
fn pitch_bend_is_signed() {
    let raw = single_track(b"\0\xE0\x00\x40\0\xE0\x7F\x7F\0\xE0\x00\x00\0\xFF\x2F\0");
    let (result, tally) = tally(&raw);
    result.unwrap();
    assert_eq!(tally.bends, [0, 8191, -8192]);
}

#[test]
fn note_on_without_velocity_stays_note_on() {
    let raw = single_track(b"\0\x90\x3C\x00\0\xFF\x2F\0");
    let (result, tally) = tally(&raw);
    result.unwrap();
    assert_eq!(tally.note_on, [(0, 60, 0)]);
    assert!(tally.note_off.is_empty());
}

#[test]
fn empty_track_is_rejected() {
    let header = Header::new(Format::Parallel, Timing::Metrical(u15::new(96)), 2);
    let mut out = Vec::new();
    let err = write(
        &header,
        &mut |track: u16| {
            if track == 0 {
                vec![TrackEvent::end_of_track(0)]
            } else {
                Vec::new()
            }
        },
        &mut out,
    )
    .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::IncompleteTrackData));
    assert_eq!(err.track(), Some(1));
    // The header and the first track were already written
    assert_eq!(out.len(), 14 + 12);
}

#[test]
fn missing_end_of_track_is_rejected() {
    let header = Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96)), 1);
    let mut tracks = vec![fixture_events()];
    tracks[0].pop();
    let err = write(&header, &mut tracks[..], &mut Vec::new()).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MissingEndOfTrack));

    // Missing tracks produce no events at all
    let header = Header::new(Format::Parallel, Timing::Metrical(u15::new(96)), 2);
    let mut tracks = vec![fixture_events()];
    let err = write(&header, &mut tracks[..], &mut Vec::new()).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::IncompleteTrackData));
}

#[test]
fn rmid_is_unwrapped() {
    let wrapped = rmid(FIXTURE);
    let smf = Smf::read(&wrapped[..]).unwrap();
    assert_eq!(smf, Smf::read(FIXTURE).unwrap());
}

#[test]
fn smpte_division() {
    let header = Header::new(Format::SingleTrack, Timing::Timecode(Fps::Fps25, 40), 1);
    let mut out = Vec::new();
    write(
        &header,
        &mut |_track: u16| vec![TrackEvent::end_of_track(0)],
        &mut out,
    )
    .unwrap();
    assert_eq!(&out[12..14], [0xE7, 0x28]);
    let smf = Smf::read(&out[..]).unwrap();
    assert_eq!(smf.header, header);
}

#[test]
fn oversized_header() {
    let mut raw = b"MThd\0\0\0\x08\0\0\0\x01\0\x60\xAB\xCD".to_vec();
    raw.extend_from_slice(&FIXTURE[14..]);
    let (result, tally) = tally(&raw);
    if cfg!(feature = "strict") {
        assert!(result.is_err());
    } else {
        result.unwrap();
        assert_eq!(tally.warnings, [Warning::OversizedHeader { len: 8 }]);
        assert_eq!(tally.note_on.len(), 8);
    }
}

#[test]
fn duplicate_header() {
    let mut raw = FIXTURE[..14].to_vec();
    raw.extend_from_slice(&FIXTURE[..14]);
    raw.extend_from_slice(&FIXTURE[14..]);
    let (result, tally) = tally(&raw);
    if cfg!(feature = "strict") {
        assert!(result.is_err());
    } else {
        result.unwrap();
        assert_eq!(tally.warnings, [Warning::DuplicateHeader { offset: 14 }]);
    }
}

#[test]
fn trailing_data_after_end_of_track() {
    let raw = single_track(b"\0\xFF\x2F\0\xAA\xBB");
    let (result, tally) = tally(&raw);
    if cfg!(feature = "strict") {
        let err = result.unwrap_err();
        assert_eq!(err.offset(), Some(26));
    } else {
        result.unwrap();
        assert_eq!(
            tally.warnings,
            [Warning::TrailingData {
                track: 0,
                len: 2,
                offset: 26,
            }]
        );
        assert_eq!(tally.track_ends.len(), 1);
    }
}

#[test]
fn lazy_reader() {
    let mut raw = FIXTURE[..14].to_vec();
    raw.extend_from_slice(b"XFIH\0\0\0\0");
    raw.extend_from_slice(&FIXTURE[14..]);
    let mut reader = SmfReader::new(&raw[..]).unwrap();
    assert_eq!(reader.state(), ReadState::HeaderRead);
    let track = reader.next_track().unwrap().unwrap();
    assert_eq!(reader.drain_warnings().count(), 1);
    assert_eq!(track.index(), 0);
    assert_eq!(track.body().len(), 0x99);
    let events = track.events().collect_events().unwrap();
    assert_eq!(events, fixture_events());
    assert!(reader.next_track().unwrap().is_none());
    assert_eq!(reader.state(), ReadState::Done);
}

/// Fails once the wrapped bytes run out.
struct Unplugged<'a>(&'a [u8]);
impl Read for Unplugged<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0.is_empty() {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "unplugged"))
        } else {
            self.0.read(buf)
        }
    }
}

#[test]
fn stream_failure() {
    let mut tally = Tally::default();
    let err = read(Unplugged(&FIXTURE[..100]), &mut tally).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Stream(_)));
    assert_eq!(tally.errors.len(), 1);
}

#[test]
fn lossy_text() {
    let raw = single_track(b"\0\xFF\x03\x03a\xFFb\0\xFF\x2F\0");
    let (result, tally) = tally(&raw);
    result.unwrap();
    assert_eq!(
        tally.texts,
        [(TextKind::TrackName, "a\u{FFFD}b".to_string())]
    );
}

#[test]
fn owned_events_outlive_input() {
    let smf = {
        let bytes = FIXTURE.to_vec();
        Smf::read(&bytes[..]).unwrap()
    };
    let mut out = Vec::new();
    smf.into_owned().write(&mut out).unwrap();
    assert_eq!(out, FIXTURE);
}
