//! Lazy decoding of the events in a single track body.

use crate::{event::TrackEvent, prelude::*};

/// Decoding state for a single track.
///
/// A fresh context is created for every track: running status is cleared and the tick position
/// starts at zero.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Default)]
pub struct Context {
    /// Index of the track within the file.
    pub track: u16,
    /// Absolute position in ticks of the last decoded event.
    pub tick: u64,
    /// The last channel status byte seen, if any.
    pub running_status: Option<u8>,
    /// Absolute byte offset of the last decoded event within the stream.
    pub offset: u64,
}
impl Context {
    #[inline]
    pub fn new(track: u16) -> Context {
        Context {
            track,
            ..Context::default()
        }
    }
}

/// An iterator of events over a single track body.
///
/// Stops at the first `EndOfTrack` event, leaving any trailing bytes unread. If the body runs
/// out before an `EndOfTrack` event is found, yields a single `UnexpectedEndOfTrack` error.
/// Once an error is yielded the iterator is exhausted.
///
/// This `struct` is very light, so it can be cloned freely.
#[derive(Clone, Debug)]
pub struct EventIter<'a> {
    raw: &'a [u8],
    body_len: usize,
    body_offset: u64,
    ctx: Context,
    finished: bool,
    reached_end: bool,
}
impl<'a> EventIter<'a> {
    /// Iterate over a raw track body, not including the chunk header.
    ///
    /// Error offsets are relative to the start of the body and refer to track 0.
    #[inline]
    pub fn new(raw: &'a [u8]) -> EventIter<'a> {
        EventIter::located(raw, 0, 0)
    }

    /// Iterate over a track body that starts at `body_offset` within a larger stream.
    pub fn located(raw: &'a [u8], track: u16, body_offset: u64) -> EventIter<'a> {
        EventIter {
            raw,
            body_len: raw.len(),
            body_offset,
            ctx: Context::new(track),
            finished: false,
            reached_end: false,
        }
    }

    /// Get the remaining unread bytes.
    ///
    /// After the `EndOfTrack` event these are the trailing bytes of the chunk, if any.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        self.raw
    }

    /// The state after the last decoded event.
    #[inline]
    pub fn context(&self) -> Context {
        self.ctx
    }

    /// Whether the `EndOfTrack` event has been decoded.
    #[inline]
    pub fn reached_end_of_track(&self) -> bool {
        self.reached_end
    }

    fn offset(&self) -> u64 {
        self.body_offset + (self.body_len - self.raw.len()) as u64
    }

    /// Decode the next event along with the context it was found in.
    pub fn next_event(&mut self) -> Option<Result<(Context, TrackEvent<'a>)>> {
        if self.finished {
            return None;
        }
        let start = self.offset();
        if self.raw.is_empty() {
            self.finished = true;
            return Some(Err(
                Error::new(ErrorKind::UnexpectedEndOfTrack).at(Some(self.ctx.track), start)
            ));
        }
        match TrackEvent::read(&mut self.raw, &mut self.ctx.running_status) {
            Ok(ev) => {
                self.ctx.tick += ev.delta as u64;
                self.ctx.offset = start;
                if ev.kind.is_end_of_track() {
                    self.finished = true;
                    self.reached_end = true;
                }
                Some(Ok((self.ctx, ev)))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err.at(Some(self.ctx.track), start)))
            }
        }
    }

    /// Decode every remaining event, up to and including the `EndOfTrack` event.
    pub fn collect_events(self) -> Result<Vec<TrackEvent<'a>>> {
        let mut events = Vec::with_capacity(self.raw.len() / 3);
        for ev in self {
            events.push(ev?);
        }
        Ok(events)
    }
}
impl<'a> Iterator for EventIter<'a> {
    type Item = Result<TrackEvent<'a>>;
    #[inline]
    fn next(&mut self) -> Option<Result<TrackEvent<'a>>> {
        self.next_event().map(|res| res.map(|(_ctx, ev)| ev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MidiMessage, TrackEventKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn ticks_accumulate() {
        let body = [
            0x00, 0x90, 0x3C, 0x78, //
            0x3C, 0x80, 0x3C, 0x00, //
            0x81, 0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut iter = EventIter::new(&body);
        let (ctx, _) = iter.next_event().unwrap().unwrap();
        assert_eq!(ctx.tick, 0);
        let (ctx, _) = iter.next_event().unwrap().unwrap();
        assert_eq!(ctx.tick, 60);
        assert_eq!(ctx.offset, 4);
        assert_eq!(ctx.running_status, Some(0x80));
        let (ctx, ev) = iter.next_event().unwrap().unwrap();
        assert_eq!(ctx.tick, 60 + 128);
        assert!(ev.kind.is_end_of_track());
        assert!(iter.reached_end_of_track());
        assert!(iter.next().is_none());
    }

    #[test]
    fn running_status_events_keep_channel() {
        let body = [0x00, 0x92, 0x3C, 0x40, 0x00, 0x3E, 0x40, 0x00, 0xFF, 0x2F, 0x00];
        let events = EventIter::new(&body).collect_events().unwrap();
        assert_eq!(events.len(), 3);
        for ev in &events[..2] {
            assert!(matches!(
                ev.kind,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { .. },
                } if channel == 2
            ));
        }
    }

    #[test]
    fn missing_end_of_track() {
        let body = [0x00, 0x90, 0x3C, 0x40];
        let mut iter = EventIter::located(&body, 3, 22);
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedEndOfTrack));
        assert_eq!(err.track(), Some(3));
        assert_eq!(err.offset(), Some(26));
        assert!(iter.next().is_none());
    }

    #[test]
    fn errors_are_located_at_event_start() {
        let body = [0x00, 0xFF, 0x01, 0x00, 0x00, 0xF3, 0x01];
        let mut iter = EventIter::located(&body, 1, 100);
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Format(_)));
        assert_eq!(err.offset(), Some(104));
        assert!(iter.next().is_none());
    }

    #[test]
    fn trailing_bytes_stay_unread() {
        let body = [0x00, 0xFF, 0x2F, 0x00, 0xAA, 0xBB];
        let mut iter = EventIter::new(&body);
        assert!(iter.next().unwrap().unwrap().kind.is_end_of_track());
        assert!(iter.next().is_none());
        assert_eq!(iter.unread(), [0xAA, 0xBB]);
    }
}
