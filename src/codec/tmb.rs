//! Timeline documents (TMB), the per-animation event tree stored inside animation files.
//!
//! A timeline is a flat list of chunks. The tree (actor list → actors → tracks → entries) is
//! expressed by ids: actors list the ids of their tracks, and tracks list the ids of their entries.
//! [`Timeline`] keeps the same shape in memory. `tracks` and `entries` are the document-wide flat
//! index, and the tree refers into it by id, so the two can only disagree if an id fails to
//! resolve, which [`Timeline::validate`] checks.

use std::{
    collections::HashSet,
    io::{Cursor, Read, Write},
};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use eyre::{bail, ensure, eyre, Context, Result};

use super::{align_up, to_u16, to_u32, write_padding};

pub const TIMELINE: &[u8; 4] = b"TMLB";
pub const HEADER: &[u8; 4] = b"TMDH";
pub const ACTOR_LIST: &[u8; 4] = b"TMAL";
pub const ACTOR: &[u8; 4] = b"TMAC";
pub const TRACK: &[u8; 4] = b"TMTR";
pub const SOUND_TRIGGER: &[u8; 4] = b"C063";

/// Magic, size, id and time.
const CHUNK_PREFIX_LEN: usize = 12;
const TIMELINE_HEADER_LEN: usize = 12;

/// Typed access to the fields of a sound trigger entry.
pub trait SoundTriggerFields {
    /// Number of times the sound loops; `-1` loops forever.
    fn loop_count(&self) -> i32;
    fn set_loop_count(&mut self, value: i32);

    /// Whether the sound stops when the animation is interrupted.
    fn interrupt(&self) -> bool;
    fn set_interrupt(&mut self, value: bool);

    /// Resource path of the container to play.
    fn resource_path(&self) -> &str;
    fn set_resource_path(&mut self, value: &str);

    /// Index of the sound within the container.
    fn sound_index(&self) -> i32;
    fn set_sound_index(&mut self, value: i32);

    /// Mixer position (bus) the sound plays on.
    fn mix_position(&self) -> i32;
    fn set_mix_position(&mut self, value: i32);
}

/// An entry that plays a sound when the timeline reaches it.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SoundTrigger {
    loop_count: i32,
    interrupt: i32,
    sound_index: i32,
    mix_position: i32,
    path: String,
}

impl SoundTriggerFields for SoundTrigger {
    fn loop_count(&self) -> i32 {
        self.loop_count
    }

    fn set_loop_count(&mut self, value: i32) {
        self.loop_count = value;
    }

    fn interrupt(&self) -> bool {
        self.interrupt != 0
    }

    fn set_interrupt(&mut self, value: bool) {
        self.interrupt = value as i32;
    }

    fn resource_path(&self) -> &str {
        &self.path
    }

    fn set_resource_path(&mut self, value: &str) {
        self.path = value.to_string();
    }

    fn sound_index(&self) -> i32 {
        self.sound_index
    }

    fn set_sound_index(&mut self, value: i32) {
        self.sound_index = value;
    }

    fn mix_position(&self) -> i32 {
        self.mix_position
    }

    fn set_mix_position(&mut self, value: i32) {
        self.mix_position = value;
    }
}

impl SoundTrigger {
    fn read(body: &[u8]) -> Result<SoundTrigger> {
        let mut reader = Cursor::new(body);

        let loop_count = reader.read_i32::<LE>().wrap_err("loop count")?;
        let interrupt = reader.read_i32::<LE>().wrap_err("interrupt")?;
        let sound_index = reader.read_i32::<LE>().wrap_err("sound index")?;
        let mix_position = reader.read_i32::<LE>().wrap_err("mix position")?;

        let path = String::from_utf8({
            let path_len = reader.read_u16::<LE>().wrap_err("path length")?;

            let mut path_bytes = vec![0u8; path_len as usize];
            reader.read_exact(&mut path_bytes).wrap_err("path")?;

            path_bytes
        })
        .wrap_err("path is not UTF-8")?;

        Ok(SoundTrigger {
            loop_count,
            interrupt,
            sound_index,
            mix_position,
            path,
        })
    }

    fn write(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_i32::<LE>(self.loop_count)?;
        writer.write_i32::<LE>(self.interrupt)?;
        writer.write_i32::<LE>(self.sound_index)?;
        writer.write_i32::<LE>(self.mix_position)?;
        writer.write_u16::<LE>(to_u16(self.path.len(), "sound path length")?)?;
        writer.write_all(self.path.as_bytes())
    }
}

/// What an entry does.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EntryBody {
    SoundTrigger(SoundTrigger),

    /// Any entry type we don't edit, carried through byte for byte.
    Opaque { magic: [u8; 4], body: Vec<u8> },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Entry {
    pub id: u16,

    /// Time relative to the owning track, in ticks.
    pub time: u16,

    pub body: EntryBody,
}

impl Entry {
    pub fn as_sound_trigger(&self) -> Option<&SoundTrigger> {
        match &self.body {
            EntryBody::SoundTrigger(trigger) => Some(trigger),
            EntryBody::Opaque { .. } => None,
        }
    }

    pub fn as_sound_trigger_mut(&mut self) -> Option<&mut SoundTrigger> {
        match &mut self.body {
            EntryBody::SoundTrigger(trigger) => Some(trigger),
            EntryBody::Opaque { .. } => None,
        }
    }

    pub fn is_sound_trigger(&self) -> bool {
        self.as_sound_trigger().is_some()
    }

    fn magic(&self) -> &[u8; 4] {
        match &self.body {
            EntryBody::SoundTrigger(_) => SOUND_TRIGGER,
            EntryBody::Opaque { magic, .. } => magic,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Track {
    pub id: u16,
    pub time: u16,
    pub params: u32,
    pub entry_ids: Vec<u16>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Actor {
    pub id: u16,
    pub time: u16,
    pub params: u32,
    pub track_ids: Vec<u16>,
}

/// The `TMDH` chunk.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Header {
    id: u16,
    flags: u16,
    duration: u16,
    extra_flags: u16,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Timeline {
    header: Header,
    actor_list_id: u16,
    actors: Vec<Actor>,
    tracks: Vec<Track>,
    entries: Vec<Entry>,
}

/// A chunk as it sits in the file, before its body is interpreted.
struct RawChunk<'a> {
    magic: [u8; 4],
    id: u16,
    time: u16,
    body: &'a [u8],
}

impl<'a> RawChunk<'a> {
    fn read(reader: &mut Cursor<&'a [u8]>) -> Result<RawChunk<'a>> {
        let offset = reader.position() as usize;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).wrap_err("magic")?;

        let size = reader.read_u32::<LE>().wrap_err("size")? as usize;
        ensure!(size >= CHUNK_PREFIX_LEN, "chunk size {} is too small", size);

        let id = reader.read_u16::<LE>().wrap_err("id")?;
        let time = reader.read_u16::<LE>().wrap_err("time")?;

        let document: &'a [u8] = *reader.get_ref();
        let body = document
            .get(offset + CHUNK_PREFIX_LEN..offset + size)
            .ok_or_else(|| eyre!("chunk of {} bytes runs past the end of the document", size))?;

        reader.set_position((offset + size) as u64);

        Ok(RawChunk {
            magic,
            id,
            time,
            body,
        })
    }
}

/// Reads `count` ids from `reader`.
fn read_ids(reader: &mut impl Read, count: usize) -> Result<Vec<u16>> {
    (0..count)
        .map(|index| reader.read_u16::<LE>().wrap_err_with(|| format!("id {}", index)))
        .collect()
}

fn write_chunk(
    out: &mut Vec<u8>,
    magic: &[u8; 4],
    id: u16,
    time: u16,
    body: &[u8],
    pad: bool,
) -> std::io::Result<()> {
    let len = CHUNK_PREFIX_LEN + body.len();
    let size = if pad { align_up(len, 4) } else { len };

    out.write_all(magic)?;
    out.write_u32::<LE>(to_u32(size, "chunk size")?)?;
    out.write_u16::<LE>(id)?;
    out.write_u16::<LE>(time)?;
    out.write_all(body)?;

    if pad {
        write_padding(out, len, 4)?;
    }

    Ok(())
}

fn list_body(params: u32, ids: &[u16]) -> std::io::Result<Vec<u8>> {
    let mut body = vec![];
    body.write_u32::<LE>(params)?;
    body.write_u32::<LE>(to_u32(ids.len(), "id count")?)?;

    for id in ids {
        body.write_u16::<LE>(*id)?;
    }

    Ok(body)
}

impl Timeline {
    /// An empty timeline with no actors.
    pub fn new(duration: u16) -> Timeline {
        Timeline {
            header: Header {
                id: 1,
                flags: 0,
                duration,
                extra_flags: 0,
            },
            actor_list_id: 2,
            actors: vec![],
            tracks: vec![],
            entries: vec![],
        }
    }

    pub fn duration(&self) -> u16 {
        self.header.duration
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// The flat index of every track in the document.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The flat index of every entry in the document.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn track(&self, id: u16) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn entry(&self, id: u16) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn entry_mut(&mut self, id: u16) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    /// Returns the tracks of the actor at `actor_index`, in the actor's order.
    pub fn tracks_of(&self, actor_index: usize) -> impl Iterator<Item = &Track> + '_ {
        self.actors
            .get(actor_index)
            .into_iter()
            .flat_map(|actor| actor.track_ids.iter())
            .filter_map(move |id| self.track(*id))
    }

    /// Returns the entries of the track with id `track_id`, in the track's order.
    pub fn entries_of(&self, track_id: u16) -> impl Iterator<Item = &Entry> + '_ {
        self.track(track_id)
            .into_iter()
            .flat_map(|track| track.entry_ids.iter())
            .filter_map(move |id| self.entry(*id))
    }

    /// Every sound trigger reachable through the tree, with the actor that owns it.
    pub fn sound_triggers(&self) -> impl Iterator<Item = (&Actor, &Entry, &SoundTrigger)> + '_ {
        self.actors.iter().enumerate().flat_map(move |(index, actor)| {
            self.tracks_of(index).flat_map(move |track| {
                self.entries_of(track.id).filter_map(move |entry| {
                    entry
                        .as_sound_trigger()
                        .map(|trigger| (actor, entry, trigger))
                })
            })
        })
    }

    fn highest_id(&self) -> u16 {
        [self.header.id, self.actor_list_id]
            .into_iter()
            .chain(self.actors.iter().map(|actor| actor.id))
            .chain(self.tracks.iter().map(|track| track.id))
            .chain(self.entries.iter().map(|entry| entry.id))
            .max()
            .unwrap_or(0)
    }

    /// How many more nodes can be added before the ids run out.
    pub fn ids_left(&self) -> u16 {
        u16::MAX - self.highest_id()
    }

    /// An id that no node in the document uses yet, or `None` once the highest id is taken.
    fn next_id(&self) -> Option<u16> {
        self.highest_id().checked_add(1)
    }

    /// Adds an actor with no tracks, returning its index, or `None` if no id is free.
    pub fn add_actor(&mut self, time: u16, params: u32) -> Option<usize> {
        let id = self.next_id()?;

        self.actors.push(Actor {
            id,
            time,
            params,
            track_ids: vec![],
        });

        Some(self.actors.len() - 1)
    }

    /// Creates an empty track, appending it to the actor at `actor_index` and to the flat track
    /// index. Returns the new track's id, or `None` if there is no such actor or no id is free.
    pub fn add_track(&mut self, actor_index: usize, time: u16) -> Option<u16> {
        let id = self.next_id()?;
        let actor = self.actors.get_mut(actor_index)?;

        actor.track_ids.push(id);

        self.tracks.push(Track {
            id,
            time,
            params: 0,
            entry_ids: vec![],
        });

        Some(id)
    }

    /// Creates an entry, appending it to the track with id `track_id` and to the flat entry index.
    /// Returns the new entry's id, or `None` if there is no such track or no id is free.
    pub fn add_entry(&mut self, track_id: u16, time: u16, body: EntryBody) -> Option<u16> {
        let id = self.next_id()?;
        let track = self.tracks.iter_mut().find(|track| track.id == track_id)?;

        track.entry_ids.push(id);
        self.entries.push(Entry { id, time, body });

        Some(id)
    }

    /// Checks that ids are unique and that every id the tree refers to resolves in the flat
    /// index.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        let ids = [self.header.id, self.actor_list_id]
            .into_iter()
            .chain(self.actors.iter().map(|actor| actor.id))
            .chain(self.tracks.iter().map(|track| track.id))
            .chain(self.entries.iter().map(|entry| entry.id));

        for id in ids {
            ensure!(seen.insert(id), "id {} is used by more than one node", id);
        }

        for actor in &self.actors {
            for id in &actor.track_ids {
                ensure!(
                    self.track(*id).is_some(),
                    "actor {} refers to missing track {}",
                    actor.id,
                    id
                );
            }
        }

        for track in &self.tracks {
            for id in &track.entry_ids {
                ensure!(
                    self.entry(*id).is_some(),
                    "track {} refers to missing entry {}",
                    track.id,
                    id
                );
            }
        }

        Ok(())
    }

    pub fn parse(bytes: &[u8]) -> Result<Timeline> {
        let mut reader = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).wrap_err("magic")?;
        ensure!(&magic == TIMELINE, "bad magic {:02x?}", magic);

        let size = reader.read_u32::<LE>().wrap_err("document size")? as usize;
        ensure!(
            size == bytes.len(),
            "document size field says {} bytes but the document is {} bytes",
            size,
            bytes.len()
        );

        let chunk_count = reader.read_u32::<LE>().wrap_err("chunk count")?;

        let mut header = None;
        let mut actor_list = None;
        let mut actors = vec![];
        let mut tracks = vec![];
        let mut entries = vec![];

        for index in 0..chunk_count {
            let offset = reader.position();

            let chunk = RawChunk::read(&mut reader)
                .wrap_err_with(|| format!("chunk {} at {:#x}", index, offset))?;

            Timeline::read_chunk(
                chunk,
                &mut header,
                &mut actor_list,
                &mut actors,
                &mut tracks,
                &mut entries,
            )
            .wrap_err_with(|| format!("chunk {} at {:#x}", index, offset))?;
        }

        let header = header.ok_or_else(|| eyre!("document has no {} chunk", "TMDH"))?;
        let (actor_list_id, actor_order) =
            actor_list.ok_or_else(|| eyre!("document has no {} chunk", "TMAL"))?;

        ensure!(
            actor_order.len() == actors.len(),
            "actor list names {} actors but the document has {}",
            actor_order.len(),
            actors.len()
        );

        // Actors are kept in actor list order.
        let actors = actor_order
            .iter()
            .map(|id| {
                actors
                    .iter()
                    .find(|actor: &&Actor| actor.id == *id)
                    .cloned()
                    .ok_or_else(|| eyre!("actor list refers to missing actor {}", id))
            })
            .collect::<Result<Vec<_>>>()?;

        let timeline = Timeline {
            header,
            actor_list_id,
            actors,
            tracks,
            entries,
        };

        timeline.validate()?;

        Ok(timeline)
    }

    fn read_chunk(
        chunk: RawChunk,
        header: &mut Option<Header>,
        actor_list: &mut Option<(u16, Vec<u16>)>,
        actors: &mut Vec<Actor>,
        tracks: &mut Vec<Track>,
        entries: &mut Vec<Entry>,
    ) -> Result<()> {
        let mut body = Cursor::new(chunk.body);

        match &chunk.magic {
            HEADER => {
                ensure!(header.is_none(), "second TMDH chunk");

                *header = Some(Header {
                    id: chunk.id,
                    flags: chunk.time,
                    duration: body.read_u16::<LE>().wrap_err("duration")?,
                    extra_flags: body.read_u16::<LE>().wrap_err("flags")?,
                });
            }

            ACTOR_LIST => {
                ensure!(actor_list.is_none(), "second TMAL chunk");

                // The time slot holds the number of actors.
                let ids = read_ids(&mut body, chunk.time as usize).wrap_err("actor ids")?;
                *actor_list = Some((chunk.id, ids));
            }

            ACTOR => {
                let params = body.read_u32::<LE>().wrap_err("params")?;
                let count = body.read_u32::<LE>().wrap_err("track count")? as usize;

                actors.push(Actor {
                    id: chunk.id,
                    time: chunk.time,
                    params,
                    track_ids: read_ids(&mut body, count).wrap_err("track ids")?,
                });
            }

            TRACK => {
                let params = body.read_u32::<LE>().wrap_err("params")?;
                let count = body.read_u32::<LE>().wrap_err("entry count")? as usize;

                tracks.push(Track {
                    id: chunk.id,
                    time: chunk.time,
                    params,
                    entry_ids: read_ids(&mut body, count).wrap_err("entry ids")?,
                });
            }

            SOUND_TRIGGER => {
                entries.push(Entry {
                    id: chunk.id,
                    time: chunk.time,
                    body: EntryBody::SoundTrigger(SoundTrigger::read(chunk.body)?),
                });
            }

            TIMELINE => bail!("nested TMLB chunk"),

            magic => {
                entries.push(Entry {
                    id: chunk.id,
                    time: chunk.time,
                    body: EntryBody::Opaque {
                        magic: *magic,
                        body: chunk.body.to_vec(),
                    },
                });
            }
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut chunks = vec![];

        let mut header_body = vec![];
        header_body.write_u16::<LE>(self.header.duration)?;
        header_body.write_u16::<LE>(self.header.extra_flags)?;
        write_chunk(
            &mut chunks,
            HEADER,
            self.header.id,
            self.header.flags,
            &header_body,
            true,
        )?;

        let mut actor_list_body = vec![];
        for actor in &self.actors {
            actor_list_body.write_u16::<LE>(actor.id)?;
        }
        write_chunk(
            &mut chunks,
            ACTOR_LIST,
            self.actor_list_id,
            to_u16(self.actors.len(), "actor count")?,
            &actor_list_body,
            true,
        )?;

        for actor in &self.actors {
            let body = list_body(actor.params, &actor.track_ids)?;
            write_chunk(&mut chunks, ACTOR, actor.id, actor.time, &body, true)?;
        }

        for track in &self.tracks {
            let body = list_body(track.params, &track.entry_ids)?;
            write_chunk(&mut chunks, TRACK, track.id, track.time, &body, true)?;
        }

        for entry in &self.entries {
            match &entry.body {
                EntryBody::SoundTrigger(trigger) => {
                    let mut body = vec![];
                    trigger.write(&mut body)?;
                    write_chunk(&mut chunks, entry.magic(), entry.id, entry.time, &body, true)?;
                }

                EntryBody::Opaque { body, .. } => {
                    write_chunk(&mut chunks, entry.magic(), entry.id, entry.time, body, false)?;
                }
            }
        }

        let chunk_count = 2 + self.actors.len() + self.tracks.len() + self.entries.len();

        let mut out = Vec::with_capacity(TIMELINE_HEADER_LEN + chunks.len());
        out.write_all(TIMELINE)?;
        out.write_u32::<LE>(to_u32(TIMELINE_HEADER_LEN + chunks.len(), "document size")?)?;
        out.write_u32::<LE>(to_u32(chunk_count, "chunk count")?)?;
        out.write_all(&chunks)?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque(magic: &[u8; 4], len: usize) -> EntryBody {
        EntryBody::Opaque {
            magic: *magic,
            body: (0..len as u8).collect(),
        }
    }

    fn sample() -> Timeline {
        let mut timeline = Timeline::new(120);

        let actor = timeline.add_actor(0, 0x10).unwrap();
        let track = timeline.add_track(actor, 0).unwrap();
        timeline.add_entry(track, 5, opaque(b"C010", 7)).unwrap();

        let sound_track = timeline.add_track(actor, 0).unwrap();
        let mut trigger = SoundTrigger::default();
        trigger.set_resource_path("sound/battle/hit.scd");
        trigger.set_loop_count(-1);
        trigger.set_mix_position(99);
        timeline
            .add_entry(sound_track, 1, EntryBody::SoundTrigger(trigger))
            .unwrap();

        timeline.add_actor(3, 0).unwrap();
        timeline
    }

    #[test]
    fn reserialization_is_byte_exact() {
        let bytes = sample().to_bytes().unwrap();
        let parsed = Timeline::parse(&bytes).unwrap();

        assert_eq!(parsed, sample());
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn new_nodes_get_fresh_ids_and_join_both_indexes() {
        let timeline = sample();

        let ids = timeline
            .actors()
            .iter()
            .map(|actor| actor.id)
            .chain(timeline.tracks().iter().map(|track| track.id))
            .chain(timeline.entries().iter().map(|entry| entry.id))
            .collect::<HashSet<_>>();

        assert_eq!(ids.len(), 2 + 2 + 2);
        assert!(!ids.contains(&1) && !ids.contains(&2));

        assert_eq!(timeline.tracks_of(0).count(), 2);
        assert_eq!(timeline.tracks_of(1).count(), 0);
        assert_eq!(timeline.tracks_of(7).count(), 0);
        timeline.validate().unwrap();
    }

    #[test]
    fn sound_triggers_are_found_through_the_tree() {
        let timeline = sample();
        let found = timeline.sound_triggers().collect::<Vec<_>>();

        assert_eq!(found.len(), 1);

        let (actor, entry, trigger) = found[0];
        assert_eq!(actor.id, timeline.actors()[0].id);
        assert_eq!(entry.time, 1);
        assert_eq!(trigger.resource_path(), "sound/battle/hit.scd");
        assert_eq!(trigger.loop_count(), -1);
        assert!(!trigger.interrupt());
    }

    #[test]
    fn accessors_round_trip_through_bytes() {
        let mut trigger = SoundTrigger::default();
        trigger.set_interrupt(true);
        trigger.set_sound_index(3);

        let mut timeline = Timeline::new(10);
        let actor = timeline.add_actor(0, 0).unwrap();
        let track = timeline.add_track(actor, 0).unwrap();
        let id = timeline
            .add_entry(track, 1, EntryBody::SoundTrigger(trigger))
            .unwrap();

        let parsed = Timeline::parse(&timeline.to_bytes().unwrap()).unwrap();
        let trigger = parsed.entry(id).and_then(Entry::as_sound_trigger).unwrap();

        assert!(trigger.interrupt());
        assert_eq!(trigger.sound_index(), 3);
        assert_eq!(trigger.resource_path(), "");
    }

    #[test]
    fn dangling_track_reference_is_rejected() {
        let mut timeline = sample();
        timeline.actors[0].track_ids.push(999);

        let err = timeline.validate().unwrap_err().to_string();
        assert!(err.contains("missing track 999"), "{}", err);

        let bytes = timeline.to_bytes().unwrap();
        assert!(Timeline::parse(&bytes).is_err());
    }

    #[test]
    fn exhausted_ids_are_not_reused() {
        let mut timeline = sample();
        timeline.entries[0].id = u16::MAX;
        let track = timeline.tracks()[0].id;
        timeline.tracks[0].entry_ids[0] = u16::MAX;

        assert_eq!(timeline.ids_left(), 0);
        assert_eq!(timeline.add_actor(0, 0), None);
        assert_eq!(timeline.add_track(0, 0), None);
        assert_eq!(timeline.add_entry(track, 0, opaque(b"C010", 1)), None);

        assert_eq!(timeline.actors().len(), 2);
        assert_eq!(timeline.tracks_of(0).count(), 2);
        timeline.validate().unwrap();
    }

    #[test]
    fn missing_actor_list_is_rejected() {
        let mut bytes = vec![];
        let mut chunks = vec![];
        write_chunk(&mut chunks, HEADER, 1, 0, &[0, 0, 0, 0], true).unwrap();

        bytes.write_all(TIMELINE).unwrap();
        bytes
            .write_u32::<LE>((TIMELINE_HEADER_LEN + chunks.len()) as u32)
            .unwrap();
        bytes.write_u32::<LE>(1).unwrap();
        bytes.extend_from_slice(&chunks);

        let err = Timeline::parse(&bytes).unwrap_err().to_string();
        assert!(err.contains("TMAL"), "{}", err);
    }

    #[test]
    fn truncated_chunk_names_its_position() {
        let bytes = sample().to_bytes().unwrap();
        let mut truncated = bytes[..bytes.len() - 4].to_vec();
        let len = truncated.len() as u32;
        (&mut truncated[4..8]).write_u32::<LE>(len).unwrap();

        let err = format!("{:#}", Timeline::parse(&truncated).unwrap_err());
        assert!(err.contains("runs past the end"), "{}", err);
    }
}
