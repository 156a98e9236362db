//! Encoding of the events in a single track body.

use crate::{event::TrackEvent, prelude::*};

/// Accumulates the encoded body of a single track.
///
/// Channel events share status bytes through running status. Events must be pushed in order and
/// the last one must be an `EndOfTrack` meta event, which is never added implicitly.
#[derive(Clone, Debug, Default)]
pub struct TrackEncoder {
    track: u16,
    body: Vec<u8>,
    running_status: Option<u8>,
    event_count: usize,
    ended: bool,
}
impl TrackEncoder {
    /// Create an encoder for track 0.
    #[inline]
    pub fn new() -> TrackEncoder {
        TrackEncoder::default()
    }

    /// Create an encoder for the given track index, reusing `buffer` as storage.
    ///
    /// The buffer is cleared first.
    pub fn for_track(track: u16, mut buffer: Vec<u8>) -> TrackEncoder {
        buffer.clear();
        TrackEncoder {
            track,
            body: buffer,
            ..TrackEncoder::default()
        }
    }

    /// The amount of events pushed so far.
    #[inline]
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// The encoded bytes so far.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// Encode a single event.
    ///
    /// On failure nothing is written and the encoder is left as it was.
    pub fn push(&mut self, ev: &TrackEvent) -> Result<()> {
        let start = self.body.len();
        ensure!(
            !self.ended,
            Error::new(ErrorKind::EventAfterEndOfTrack).at(Some(self.track), start as u64)
        );
        let mut running_status = self.running_status;
        if let Err(err) = ev.write(&mut running_status, &mut self.body) {
            self.body.truncate(start);
            bail!(Error::new(err).at(Some(self.track), start as u64));
        }
        self.running_status = running_status;
        self.event_count += 1;
        self.ended = ev.kind.is_end_of_track();
        Ok(())
    }

    /// Encode several events in order.
    pub fn extend<'e, 't: 'e, I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = &'e TrackEvent<'t>>,
    {
        for ev in events {
            self.push(ev)?;
        }
        Ok(())
    }

    /// Check that the track is complete and get the encoded body out.
    pub fn finish(self) -> Result<Vec<u8>> {
        let offset = self.body.len() as u64;
        ensure!(
            self.event_count > 0,
            Error::new(ErrorKind::IncompleteTrackData).at(Some(self.track), offset)
        );
        ensure!(
            self.ended,
            Error::new(ErrorKind::MissingEndOfTrack).at(Some(self.track), offset)
        );
        Ok(self.body)
    }
}

/// Encode a whole track body in one go.
pub fn encode_track(events: &[TrackEvent]) -> Result<Vec<u8>> {
    let mut encoder = TrackEncoder::new();
    encoder.extend(events)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MetaMessage, MidiMessage, TrackEventKind};
    use pretty_assertions::assert_eq;

    fn note_on(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
        TrackEvent::midi(
            delta,
            channel,
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(0x40),
            },
        )
        .unwrap()
    }

    #[test]
    fn consecutive_notes_share_status() {
        let body = encode_track(&[
            note_on(0, 0, 60),
            note_on(0, 0, 62),
            TrackEvent::end_of_track(0),
        ])
        .unwrap();
        assert_eq!(
            body,
            [0x00, 0x90, 0x3C, 0x40, 0x00, 0x3E, 0x40, 0x00, 0xFF, 0x2F, 0x00]
        );
        assert_eq!(body.iter().filter(|&&b| b == 0x90).count(), 1);
    }

    #[test]
    fn channel_change_rewrites_status() {
        let body = encode_track(&[
            note_on(0, 0, 60),
            note_on(0, 1, 60),
            TrackEvent::end_of_track(0),
        ])
        .unwrap();
        assert_eq!(
            body,
            [0x00, 0x90, 0x3C, 0x40, 0x00, 0x91, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]
        );
    }

    #[test]
    fn meta_and_sysex_do_not_break_running_status() {
        let body = encode_track(&[
            note_on(0, 0, 60),
            TrackEvent::meta(0, MetaMessage::Marker(Cow::Borrowed(&b"x"[..]))),
            TrackEvent::new(0, TrackEventKind::SysEx(Cow::Borrowed(&[0x7E, 0xF7][..]))),
            note_on(0, 0, 62),
            TrackEvent::end_of_track(0),
        ])
        .unwrap();
        assert_eq!(
            body,
            [
                0x00, 0x90, 0x3C, 0x40, //
                0x00, 0xFF, 0x06, 0x01, b'x', //
                0x00, 0xF0, 0x02, 0x7E, 0xF7, //
                0x00, 0x3E, 0x40, //
                0x00, 0xFF, 0x2F, 0x00,
            ]
        );
    }

    #[test]
    fn empty_track() {
        let err = TrackEncoder::for_track(4, Vec::new()).finish().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IncompleteTrackData));
        assert_eq!(err.track(), Some(4));
    }

    #[test]
    fn missing_end_of_track() {
        let err = encode_track(&[note_on(0, 0, 60)]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingEndOfTrack));
    }

    #[test]
    fn event_after_end_of_track() {
        let mut encoder = TrackEncoder::new();
        encoder.push(&TrackEvent::end_of_track(0)).unwrap();
        let err = encoder.push(&note_on(0, 0, 60)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::EventAfterEndOfTrack));
        assert_eq!(encoder.event_count(), 1);
    }

    #[test]
    fn failed_push_leaves_no_bytes() {
        let mut encoder = TrackEncoder::new();
        encoder.push(&note_on(0, 0, 60)).unwrap();
        let err = encoder.push(&TrackEvent::end_of_track(0x1000_0000)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ValueOutOfRange(_)));
        assert_eq!(err.offset(), Some(4));
        assert_eq!(encoder.body(), [0x00, 0x90, 0x3C, 0x40]);
        assert_eq!(encoder.running_status(), Some(0x90));
    }
}
