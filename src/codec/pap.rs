//! Animation documents (`.pap`): a set of named animations, the skeletal animation data they share,
//! and an optional timeline per animation.

use std::io::{Cursor, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use eyre::{ensure, eyre, Context, Result};

use super::{align_up, skip_padding, tmb::Timeline, to_u16, to_u32, write_padding};

pub const MAGIC: &[u8; 4] = b"pap ";

const HEADER_LEN: usize = 0x20;
const INFO_LEN: usize = 0x28;
const NAME_LEN: usize = 32;

/// One animation in the document.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Animation {
    pub name: String,
    pub kind: u16,
    pub havok_index: i16,
    pub face: u8,
    reserved: u16,

    /// The animation's timeline, if it has one.
    pub timeline: Option<Timeline>,
}

impl Animation {
    pub fn new(name: impl Into<String>, timeline: Option<Timeline>) -> Animation {
        Animation {
            name: name.into(),
            kind: 0,
            havok_index: 0,
            face: 0,
            reserved: 0,
            timeline,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AnimationDocument {
    version: u32,
    model_id: u16,
    model_type: u8,
    variant: u8,
    header_reserved: u16,
    trailer_reserved: u32,

    /// Skeletal animation data. We never look inside it.
    havok: Vec<u8>,

    pub animations: Vec<Animation>,
}

/// Animation info as stored, before the timelines are attached.
struct Info {
    name: String,
    kind: u16,
    havok_index: i16,
    face: u8,
    has_timeline: bool,
    reserved: u16,
}

impl Info {
    fn read(reader: &mut impl Read) -> Result<Info> {
        let name = {
            let mut buf = [0u8; NAME_LEN];
            reader.read_exact(&mut buf).wrap_err("name")?;

            let len = buf.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
            String::from_utf8(buf[..len].to_vec()).wrap_err("name is not UTF-8")?
        };

        Ok(Info {
            name,
            kind: reader.read_u16::<LE>().wrap_err("type")?,
            havok_index: reader.read_i16::<LE>().wrap_err("havok index")?,
            face: reader.read_u8().wrap_err("face flag")?,
            has_timeline: reader.read_u8().wrap_err("timeline flag")? != 0,
            reserved: reader.read_u16::<LE>()?,
        })
    }
}

impl AnimationDocument {
    pub fn new(havok: Vec<u8>, animations: Vec<Animation>) -> AnimationDocument {
        AnimationDocument {
            version: 0x0002_0001,
            model_id: 0,
            model_type: 0,
            variant: 0,
            header_reserved: 0,
            trailer_reserved: 0,
            havok,
            animations,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<AnimationDocument> {
        let mut reader = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).wrap_err("magic")?;
        ensure!(&magic == MAGIC, "bad magic {:02x?}", magic);

        let version = reader.read_u32::<LE>().wrap_err("version")?;
        let animation_count = reader.read_u16::<LE>().wrap_err("animation count")?;
        let model_id = reader.read_u16::<LE>().wrap_err("model id")?;
        let model_type = reader.read_u8().wrap_err("model type")?;
        let variant = reader.read_u8().wrap_err("variant")?;
        let header_reserved = reader.read_u16::<LE>()?;
        let info_offset = reader.read_u32::<LE>().wrap_err("info offset")?;
        let havok_offset = reader.read_u32::<LE>().wrap_err("havok offset")? as usize;
        let timeline_offset = reader.read_u32::<LE>().wrap_err("timeline offset")? as usize;
        let trailer_reserved = reader.read_u32::<LE>()?;

        reader.set_position(info_offset as u64);

        let infos = (0..animation_count)
            .map(|index| Info::read(&mut reader).wrap_err_with(|| format!("animation info {}", index)))
            .collect::<Result<Vec<_>>>()?;

        let havok = bytes
            .get(havok_offset..timeline_offset)
            .ok_or_else(|| {
                eyre!(
                    "havok block {:#x}..{:#x} is out of range",
                    havok_offset,
                    timeline_offset
                )
            })?
            .to_vec();

        reader.set_position(timeline_offset as u64);

        let animations = infos
            .into_iter()
            .enumerate()
            .map(|(index, info)| -> Result<Animation> {
                let timeline = if info.has_timeline {
                    Some(
                        read_timeline(&mut reader)
                            .wrap_err_with(|| format!("timeline of animation {} ({})", index, info.name))?,
                    )
                } else {
                    None
                };

                Ok(Animation {
                    name: info.name,
                    kind: info.kind,
                    havok_index: info.havok_index,
                    face: info.face,
                    reserved: info.reserved,
                    timeline,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AnimationDocument {
            version,
            model_id,
            model_type,
            variant,
            header_reserved,
            trailer_reserved,
            havok,
            animations,
        })
    }

    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let info_offset = HEADER_LEN;
        let havok_offset = info_offset + INFO_LEN * self.animations.len();
        let timeline_offset = align_up(havok_offset + self.havok.len(), 4);

        let mut out = vec![];

        out.write_all(MAGIC)?;
        out.write_u32::<LE>(self.version)?;
        out.write_u16::<LE>(to_u16(self.animations.len(), "animation count")?)?;
        out.write_u16::<LE>(self.model_id)?;
        out.write_u8(self.model_type)?;
        out.write_u8(self.variant)?;
        out.write_u16::<LE>(self.header_reserved)?;
        out.write_u32::<LE>(to_u32(info_offset, "info offset")?)?;
        out.write_u32::<LE>(to_u32(havok_offset, "havok offset")?)?;
        out.write_u32::<LE>(to_u32(timeline_offset, "timeline offset")?)?;
        out.write_u32::<LE>(self.trailer_reserved)?;

        for animation in &self.animations {
            let name = animation.name.as_bytes();

            if name.len() > NAME_LEN {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("animation name '{}' is longer than {} bytes", animation.name, NAME_LEN),
                ));
            }

            out.write_all(name)?;
            out.write_all(&[0u8; NAME_LEN][name.len()..])?;
            out.write_u16::<LE>(animation.kind)?;
            out.write_i16::<LE>(animation.havok_index)?;
            out.write_u8(animation.face)?;
            out.write_u8(animation.timeline.is_some() as u8)?;
            out.write_u16::<LE>(animation.reserved)?;
        }

        out.write_all(&self.havok)?;

        let written = out.len();
        write_padding(&mut out, written, 4)?;

        for timeline in self.animations.iter().filter_map(|a| a.timeline.as_ref()) {
            out.write_all(&timeline.to_bytes()?)?;

            let written = out.len();
            write_padding(&mut out, written, 4)?;
        }

        Ok(out)
    }
}

/// Reads the timeline at the reader's position, leaving the reader at the next aligned offset.
fn read_timeline(reader: &mut Cursor<&[u8]>) -> Result<Timeline> {
    let start = reader.position() as usize;
    let document = *reader.get_ref();

    let size = document
        .get(start + 4..start + 8)
        .and_then(|mut field| field.read_u32::<LE>().ok())
        .ok_or_else(|| eyre!("no timeline at {:#x}", start))? as usize;

    let bytes = document
        .get(start..start + size)
        .ok_or_else(|| eyre!("timeline of {} bytes at {:#x} runs past the end", size, start))?;

    let timeline = Timeline::parse(bytes)?;

    reader.set_position((start + size) as u64);

    // The last timeline may end the file without padding.
    if start + size < document.len() {
        skip_padding(reader, start + size, 4).wrap_err("timeline padding")?;
    }

    Ok(timeline)
}
