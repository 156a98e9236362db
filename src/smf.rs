//! Reading and writing whole Standard Midi Files.

use crate::{
    chunk::{self, ChunkHeader, Source, HEADER_TAG, TRACK_TAG},
    decode::{Context, EventIter},
    encode::TrackEncoder,
    event::TrackEvent,
    observer::{Observer, Warning},
    prelude::*,
    primitive::{Format, Timing},
    riff,
};
use log::{debug, trace, warn};

/// A MIDI file header, as found in the `MThd` chunk.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Header {
    pub format: Format,
    pub timing: Timing,
    /// How many `MTrk` chunks the file holds.
    pub track_count: u16,
}
impl Header {
    #[inline]
    pub fn new(format: Format, timing: Timing, track_count: u16) -> Header {
        Header {
            format,
            timing,
            track_count,
        }
    }

    /// Read the first 6 bytes of a header chunk body.
    fn read(mut raw: &[u8]) -> Result<Header> {
        let format = Format::read(&mut raw)?;
        let track_count = u16::read(&mut raw)?;
        let timing = Timing::read(&mut raw)?;
        Ok(Header::new(format, timing, track_count))
    }

    fn encode(&self) -> [u8; 6] {
        let mut bytes = [0; 6];
        bytes[0..2].copy_from_slice(&self.format.encode()[..]);
        bytes[2..4].copy_from_slice(&self.track_count.to_be_bytes()[..]);
        bytes[4..6].copy_from_slice(&self.timing.encode()[..]);
        bytes
    }
}

/// Where a [`SmfReader`] is in the file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ReadState {
    /// The header was read, no track was read yet.
    HeaderRead,
    /// The chunk of the given track was handed out.
    TrackOpen(u16),
    /// The given track was fully decoded.
    TrackClosed(u16),
    /// Every declared track was read, or reading failed.
    Done,
}

/// The raw body of a single `MTrk` chunk.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TrackChunk {
    index: u16,
    offset: u64,
    body: Vec<u8>,
}
impl TrackChunk {
    /// Index of the track within the file.
    #[inline]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Offset of the first body byte within the stream.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Lazily decode the events in this track.
    #[inline]
    pub fn events(&self) -> EventIter<'_> {
        EventIter::located(&self.body, self.index, self.offset)
    }
}

/// Reads a Standard Midi File from a byte stream, one track at a time.
///
/// Only the tracks declared in the header are read: any chunk after the last declared track is
/// left in the stream.
pub struct SmfReader<R> {
    src: Source<R>,
    header: Header,
    state: ReadState,
    next_track: u16,
    warnings: Vec<Warning>,
}
impl<R: Read> SmfReader<R> {
    /// Read and validate the header chunk.
    ///
    /// RMID files are unwrapped transparently.
    pub fn new(input: R) -> Result<SmfReader<R>> {
        let mut src = Source::new(input);
        let mut warnings = Vec::new();
        let mut head = ChunkHeader::read(&mut src)?;
        if matches!(head, Some(ChunkHeader { tag: riff::RIFF_TAG, .. })) {
            head = riff::unwrap(&mut src)?;
        }
        let head = head.ok_or_else(|| Error::new(err_format!("no header chunk")).at(None, 0))?;
        let head_offset = head.body_offset - 8;
        ensure!(
            head.tag == HEADER_TAG,
            Error::new(err_format!("expected header chunk")).at(None, head_offset)
        );
        ensure!(
            head.len >= 6,
            Error::new(err_format!("header chunk too short")).at(None, head_offset)
        );
        let body = src.read_body(head.len)?;
        if head.len > 6 {
            ensure!(
                !cfg!(feature = "strict"),
                Error::new(err_format!("header chunk longer than 6 bytes")).at(None, head_offset)
            );
            let warning = Warning::OversizedHeader { len: head.len };
            warn!("{}", warning);
            warnings.push(warning);
        }
        let header = Header::read(&body[..6]).locate(None, head.body_offset)?;
        if cfg!(feature = "strict") {
            ensure!(
                header.format != Format::SingleTrack || header.track_count == 1,
                Error::new(err_format!("singletrack format file must have exactly one track"))
                    .at(None, head.body_offset)
            );
        }
        debug!(
            "read header: {:?}, {} tracks, division {:#06x}",
            header.format,
            header.track_count,
            header.timing.division()
        );
        Ok(SmfReader {
            src,
            header,
            state: ReadState::HeaderRead,
            next_track: 0,
            warnings,
        })
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Bytes consumed from the stream so far.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.src.offset()
    }

    /// Take the warnings collected since the last call.
    pub fn drain_warnings(&mut self) -> impl Iterator<Item = Warning> + '_ {
        self.warnings.drain(..)
    }

    /// Record a warning, or fail if the `strict` feature rejects it.
    ///
    /// Unknown chunks are always skipped, even in strict mode.
    fn push_warning(&mut self, warning: Warning) -> Result<()> {
        if cfg!(feature = "strict") {
            let rejected = match warning {
                Warning::UnknownChunk { .. } => None,
                Warning::DuplicateHeader { offset } => {
                    Some((err_format!("duplicate header chunk"), None, offset))
                }
                Warning::OversizedHeader { .. } => {
                    Some((err_format!("header chunk longer than 6 bytes"), None, 0))
                }
                Warning::TrailingData { track, offset, .. } => Some((
                    err_format!("trailing bytes after end of track"),
                    Some(track),
                    offset,
                )),
            };
            if let Some((kind, track, offset)) = rejected {
                bail!(Error::new(kind).at(track, offset));
            }
        }
        warn!("{}", warning);
        self.warnings.push(warning);
        Ok(())
    }

    fn flush_warnings<O: Observer + ?Sized>(&mut self, observer: &mut O) {
        for warning in self.warnings.drain(..) {
            observer.on_warning(&warning);
        }
    }

    /// Read the body of the next declared track.
    ///
    /// Unknown chunks before it are skipped. Returns `None` once every declared track was read,
    /// without touching the rest of the stream.
    pub fn next_track(&mut self) -> Result<Option<TrackChunk>> {
        let result = self.next_track_impl();
        if result.is_err() {
            self.state = ReadState::Done;
        }
        result
    }

    fn next_track_impl(&mut self) -> Result<Option<TrackChunk>> {
        if self.state == ReadState::Done {
            return Ok(None);
        }
        if self.next_track >= self.header.track_count {
            self.state = ReadState::Done;
            return Ok(None);
        }
        loop {
            let head = match ChunkHeader::read(&mut self.src)? {
                Some(head) => head,
                None => bail!(Error::new(ErrorKind::TrackCountMismatch {
                    declared: self.header.track_count,
                    found: self.next_track,
                })
                .at(None, self.src.offset())),
            };
            let head_offset = head.body_offset - 8;
            match head.tag {
                TRACK_TAG => {
                    let index = self.next_track;
                    let body = self.src.read_body(head.len).locate(Some(index), head_offset)?;
                    debug!("track {}: {} bytes at byte {}", index, head.len, head_offset);
                    self.next_track += 1;
                    self.state = ReadState::TrackOpen(index);
                    return Ok(Some(TrackChunk {
                        index,
                        offset: head.body_offset,
                        body,
                    }));
                }
                HEADER_TAG => {
                    self.push_warning(Warning::DuplicateHeader {
                        offset: head_offset,
                    })?;
                    self.src.skip(head.len)?;
                }
                _ => {
                    self.push_warning(Warning::UnknownChunk {
                        tag: head.tag,
                        len: head.len,
                        offset: head_offset,
                    })?;
                    self.src.skip(head.len)?;
                }
            }
        }
    }

    /// Read the next declared track, feeding its events to `observer`.
    ///
    /// Returns `false` once every declared track was read.
    pub fn read_track<O: Observer + ?Sized>(&mut self, observer: &mut O) -> Result<bool> {
        let result = self.read_track_impl(observer);
        if result.is_err() {
            self.state = ReadState::Done;
        }
        result
    }

    fn read_track_impl<O: Observer + ?Sized>(&mut self, observer: &mut O) -> Result<bool> {
        let next = self.next_track();
        self.flush_warnings(observer);
        let chunk = match next? {
            Some(chunk) => chunk,
            None => return Ok(false),
        };
        let index = chunk.index();
        let mut ctx = Context::new(index);
        ctx.offset = chunk.offset();
        observer.on_track_start(&ctx);
        trace!("track {} started", index);

        let mut events = chunk.events();
        let mut count = 0usize;
        while let Some(ev) = events.next_event() {
            let (ctx, ev) = ev?;
            observer.on_event(&ctx, &ev);
            count += 1;
        }
        let trailing = events.unread();
        if !trailing.is_empty() {
            let offset = chunk.offset() + (chunk.body().len() - trailing.len()) as u64;
            self.push_warning(Warning::TrailingData {
                track: index,
                len: trailing.len(),
                offset,
            })?;
            self.flush_warnings(observer);
        }
        observer.on_track_end(&events.context());
        self.state = ReadState::TrackClosed(index);
        trace!("track {} ended after {} events", index, count);
        Ok(true)
    }
}

/// Read a whole file, feeding its contents to `observer`.
///
/// The observer receives the header, then for every declared track a track start, each event and
/// a track end. If reading fails the error is given to [`Observer::on_error`] before being
/// returned.
pub fn read<R: Read, O: Observer + ?Sized>(input: R, observer: &mut O) -> Result<Header> {
    let result = read_impl(input, observer);
    if let Err(err) = &result {
        observer.on_error(err);
    }
    result
}

fn read_impl<R: Read, O: Observer + ?Sized>(input: R, observer: &mut O) -> Result<Header> {
    let mut reader = SmfReader::new(input)?;
    reader.flush_warnings(observer);
    observer.on_header(reader.header());
    while reader.read_track(observer)? {}
    Ok(*reader.header())
}

/// Supplies the events of each track when writing a file.
pub trait Producer {
    /// The events of the given track, in order and ending with an `EndOfTrack` event.
    fn produce(&mut self, track: u16) -> Cow<'_, [TrackEvent<'_>]>;
}

impl<F> Producer for F
where
    F: FnMut(u16) -> Vec<TrackEvent<'static>>,
{
    #[inline]
    fn produce(&mut self, track: u16) -> Cow<'_, [TrackEvent<'_>]> {
        Cow::Owned(self(track))
    }
}

fn track_events<'s>(tracks: &'s [Vec<TrackEvent>], track: u16) -> Cow<'s, [TrackEvent<'s>]> {
    match tracks.get(track as usize) {
        Some(events) => Cow::Borrowed(&events[..]),
        None => Cow::Borrowed(&[]),
    }
}

impl<'a> Producer for [Vec<TrackEvent<'a>>] {
    #[inline]
    fn produce(&mut self, track: u16) -> Cow<'_, [TrackEvent<'_>]> {
        track_events(self, track)
    }
}

impl<'a> Producer for Smf<'a> {
    #[inline]
    fn produce(&mut self, track: u16) -> Cow<'_, [TrackEvent<'_>]> {
        track_events(&self.tracks, track)
    }
}

/// Write a whole file, pulling the events of every declared track from `producer`.
///
/// Each track is encoded in memory before its chunk is written, since the chunk length comes
/// first. If a track fails to encode, the chunks written before it stay in `out`.
pub fn write<P, W>(header: &Header, producer: &mut P, out: &mut W) -> Result<()>
where
    P: Producer + ?Sized,
    W: Write,
{
    write_header(header, out)?;
    //Reuse a single buffer for every track
    let mut buffer = Vec::with_capacity(8 * 1024);
    for track in 0..header.track_count {
        let events = producer.produce(track);
        buffer = write_track(track, &events, buffer, out)?;
    }
    Ok(())
}

fn write_header<W: Write>(header: &Header, out: &mut W) -> Result<()> {
    chunk::write_chunk(HEADER_TAG, &header.encode(), out)?;
    debug!(
        "wrote header: {:?}, {} tracks, division {:#06x}",
        header.format,
        header.track_count,
        header.timing.division()
    );
    Ok(())
}

/// Encode a track into `buffer` and write it as a chunk, handing the buffer back.
fn write_track<W: Write>(
    track: u16,
    events: &[TrackEvent],
    buffer: Vec<u8>,
    out: &mut W,
) -> Result<Vec<u8>> {
    let mut encoder = TrackEncoder::for_track(track, buffer);
    encoder.extend(events)?;
    let body = encoder.finish()?;
    chunk::write_chunk(TRACK_TAG, &body, out).locate(Some(track), 0)?;
    debug!("track {}: wrote {} events in {} bytes", track, events.len(), body.len());
    Ok(body)
}

/// A Standard Midi File held in memory.
///
/// This is the simplest way to work with whole files, at the cost of keeping every event alive.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Smf<'a> {
    /// The header of this file. Its track count is ignored when writing.
    pub header: Header,
    /// A list of tracks, each one a list of events ending with `EndOfTrack`.
    pub tracks: Vec<Vec<TrackEvent<'a>>>,
}
impl<'a> Smf<'a> {
    /// Create a new empty `Smf` with zero tracks.
    #[inline]
    pub fn new(format: Format, timing: Timing) -> Smf<'a> {
        Smf {
            header: Header::new(format, timing, 0),
            tracks: Vec::new(),
        }
    }

    /// Read a whole file from a byte stream.
    pub fn read<R: Read>(input: R) -> Result<Smf<'static>> {
        let mut collect = Collect::default();
        let header = read(input, &mut collect)?;
        Ok(Smf {
            header,
            tracks: collect.tracks,
        })
    }

    /// Read a whole file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Smf<'static>> {
        fn open_impl(path: &Path) -> Result<Smf<'static>> {
            let file = File::open(path)?;
            Smf::read(io::BufReader::new(file))
        }
        open_impl(path.as_ref())
    }

    /// The header to write, with the actual track count.
    fn header_for_write(&self) -> Result<Header> {
        let track_count = u16::try_from(self.tracks.len())
            .map_err(|_| err_range!("track count exceeds 16 bit range"))?;
        Ok(Header {
            track_count,
            ..self.header
        })
    }

    /// Encode and write the file into the given generic writer.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        let header = self.header_for_write()?;
        write_header(&header, out)?;
        let mut buffer = Vec::with_capacity(8 * 1024);
        for (track, events) in (0..header.track_count).zip(self.tracks.iter()) {
            buffer = write_track(track, events, buffer, out)?;
        }
        Ok(())
    }

    /// Encode and write the file to disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fn save_impl(smf: &Smf, path: &Path) -> Result<()> {
            let mut out = io::BufWriter::new(File::create(path)?);
            smf.write(&mut out)?;
            out.flush()?;
            Ok(())
        }
        save_impl(self, path.as_ref())
    }

    /// Clone any borrowed data, lifting lifetime restrictions on this file.
    pub fn into_owned(self) -> Smf<'static> {
        Smf {
            header: self.header,
            tracks: self
                .tracks
                .into_iter()
                .map(|track| track.into_iter().map(TrackEvent::into_owned).collect())
                .collect(),
        }
    }
}

/// Gathers every event into owned tracks.
#[derive(Default)]
struct Collect {
    tracks: Vec<Vec<TrackEvent<'static>>>,
}
impl Observer for Collect {
    fn on_header(&mut self, header: &Header) {
        self.tracks.reserve(header.track_count as usize);
    }

    fn on_track_start(&mut self, _ctx: &Context) {
        self.tracks.push(Vec::new());
    }

    fn on_event(&mut self, _ctx: &Context, ev: &TrackEvent) {
        if let Some(track) = self.tracks.last_mut() {
            track.push(ev.clone().into_owned());
        }
    }
}
