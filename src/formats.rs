//! Formats module
//!
//! Reads the ID3v2 tag prepended to an audio file and locates the first embedded
//! picture (`APIC`) frame. Only what is needed to pull the cover out is decoded:
//! the 10-byte tag header, an optional extended header, and the frame stream.
//!
//! Layout handled here:
//!
//! | Offset | Size | Field    | Decoding                          |
//! |--------|------|----------|-----------------------------------|
//! | 0      | 3    | Magic    | `b"ID3"`                          |
//! | 3      | 2    | Version  | major, revision                   |
//! | 5      | 1    | Flags    | bit 6 = extended header present   |
//! | 6      | 4    | Tag size | sync-safe 28-bit, MSB first       |
//! | 10     | ..   | Frames   | until `10 + tag size`             |

use bytes::Bytes;
use std::ops::Range;
use thiserror::Error;

/// Marker at offset 0 of every ID3v2 tag.
pub const TAG_MAGIC: [u8; 3] = *b"ID3";
/// Identifier of the attached-picture frame.
pub const PICTURE_FRAME_ID: [u8; 4] = *b"APIC";
pub const TAG_HEADER_LEN: usize = 10;
pub const FRAME_HEADER_LEN: usize = 10;
/// Media type reported when the picture frame leaves it empty.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

const FLAG_UNSYNCHRONISATION: u8 = 0x80;
const FLAG_EXTENDED_HEADER: u8 = 0x40;

/// Errors that can occur while reading a tag.
///
/// None of these reach the best-effort entry points; they exist so callers that
/// want to know why no cover came back can ask.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Truncated {0}")]
    Truncated(&'static str),
    #[error("Unsupported ID3v2 major version {0}")]
    UnsupportedVersion(u8),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// How a frame header's size field is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeEncoding {
    /// Plain 32-bit big-endian (ID3v2.3).
    BigEndian,
    /// 7 significant bits per byte (ID3v2.4).
    SyncSafe,
}

impl SizeEncoding {
    fn decode(self, bytes: [u8; 4]) -> u32 {
        match self {
            SizeEncoding::BigEndian => u32::from_be_bytes(bytes),
            SizeEncoding::SyncSafe => sync_safe_u32(bytes),
        }
    }
}

/// Decode a 28-bit sync-safe integer: low 7 bits of each byte, most significant first.
pub fn sync_safe_u32(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

fn four(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

/// The fixed 10-byte header at the start of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub major_version: u8,
    pub revision: u8,
    pub flags: u8,
    /// Size of everything after the header, as declared.
    pub tag_size: u32,
}

impl TagHeader {
    /// Parse the tag header.
    ///
    /// Returns `Ok(None)` when the buffer does not start with the `ID3` marker,
    /// which is the ordinary "no tag" case rather than an error.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, FormatError> {
        if buf.len() < TAG_MAGIC.len() || buf[..TAG_MAGIC.len()] != TAG_MAGIC {
            return Ok(None);
        }
        if buf.len() < TAG_HEADER_LEN {
            return Err(FormatError::Truncated("tag header"));
        }
        Ok(Some(Self {
            major_version: buf[3],
            revision: buf[4],
            flags: buf[5],
            tag_size: sync_safe_u32(four(&buf[6..10])),
        }))
    }

    pub fn has_extended_header(&self) -> bool {
        self.flags & FLAG_EXTENDED_HEADER != 0
    }

    pub fn is_unsynchronised(&self) -> bool {
        self.flags & FLAG_UNSYNCHRONISATION != 0
    }

    /// Frame sizes are only sync-safe from v2.4 on.
    pub fn frame_size_encoding(&self) -> SizeEncoding {
        if self.major_version >= 4 {
            SizeEncoding::SyncSafe
        } else {
            SizeEncoding::BigEndian
        }
    }

    /// Offset one past the last byte of the tag region.
    pub fn tag_end(&self) -> usize {
        TAG_HEADER_LEN + self.tag_size as usize
    }

    /// Offset of the first frame, skipping the extended header if the flag says there is one.
    fn frames_start(&self, buf: &[u8]) -> Result<usize, FormatError> {
        if !self.has_extended_header() {
            return Ok(TAG_HEADER_LEN);
        }
        let size_field = buf
            .get(TAG_HEADER_LEN..TAG_HEADER_LEN + 4)
            .ok_or(FormatError::Truncated("extended header"))?;
        let start = match self.frame_size_encoding() {
            // v2.4 counts the size field itself
            SizeEncoding::SyncSafe => TAG_HEADER_LEN + sync_safe_u32(four(size_field)) as usize,
            SizeEncoding::BigEndian => {
                TAG_HEADER_LEN + 4 + u32::from_be_bytes(four(size_field)) as usize
            }
        };
        if start < TAG_HEADER_LEN + 4 {
            return Err(FormatError::InvalidFormat(
                "extended header smaller than its size field".to_string(),
            ));
        }
        Ok(start)
    }
}

/// Header of one frame inside the tag region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: [u8; 4],
    pub size: u32,
    pub flags: u16,
}

impl FrameHeader {
    /// `bytes` must hold at least `FRAME_HEADER_LEN` bytes.
    fn parse(bytes: &[u8], encoding: SizeEncoding) -> Self {
        Self {
            id: four(&bytes[0..4]),
            size: encoding.decode(four(&bytes[4..8])),
            flags: u16::from_be_bytes([bytes[8], bytes[9]]),
        }
    }

    /// Padding after the last frame shows up as an all-zero (or blank) identifier.
    pub fn is_padding(&self) -> bool {
        self.id.iter().all(|&b| b == 0 || b.is_ascii_whitespace())
    }

    pub fn id_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }
}

/// Cover art pulled from a picture frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCover {
    /// Raw image bytes, exactly as stored in the frame.
    pub bytes: Bytes,
    /// Declared media type, e.g. `image/png`.
    pub media_type: String,
    /// ID3 picture type byte (3 = front cover).
    pub picture_type: u8,
}

impl ExtractedCover {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_front_cover(&self) -> bool {
        self.picture_type == 3
    }

    /// File extension matching the media type, `bin` when it is not recognised.
    pub fn file_extension(&self) -> &'static str {
        let subtype = self
            .media_type
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match subtype.as_str() {
            "jpeg" | "jpg" | "pjpeg" => "jpg",
            "png" => "png",
            "gif" => "gif",
            "webp" => "webp",
            "bmp" => "bmp",
            _ => "bin",
        }
    }
}

/// Where the picture sits inside the scanned buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CoverSpan {
    image: Range<usize>,
    media_type: String,
    picture_type: u8,
}

fn find_nul(bytes: &[u8], from: usize) -> Option<usize> {
    bytes.get(from..)?.iter().position(|&b| b == 0).map(|p| from + p)
}

fn find_double_nul(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .chunks_exact(2)
        .position(|c| c == [0, 0])
        .map(|p| from + p * 2)
}

/// Parse an `APIC` payload; returned ranges are relative to `payload`.
///
/// Payload layout: encoding byte, NUL-terminated media type, picture type byte,
/// description terminated by one NUL (Latin-1/UTF-8) or two (UTF-16), image bytes.
fn parse_picture_payload(payload: &[u8]) -> Result<CoverSpan, FormatError> {
    let encoding = *payload.first().ok_or(FormatError::Truncated("picture frame"))?;

    let mime_end = find_nul(payload, 1).ok_or(FormatError::Truncated("media type"))?;
    let media_type: String = payload[1..mime_end].iter().map(|&b| char::from(b)).collect();
    let media_type = if media_type.is_empty() {
        DEFAULT_MEDIA_TYPE.to_string()
    } else {
        media_type
    };

    let picture_type = *payload
        .get(mime_end + 1)
        .ok_or(FormatError::Truncated("picture type"))?;

    let desc_start = mime_end + 2;
    let image_start = match encoding {
        // UTF-8 (3) ends on one NUL like Latin-1; only UTF-16 uses the NUL pair
        0 | 3 => find_nul(payload, desc_start).map(|p| p + 1),
        _ => find_double_nul(payload, desc_start).map(|p| p + 2),
    }
    .ok_or(FormatError::Truncated("description"))?;

    Ok(CoverSpan {
        image: image_start..payload.len(),
        media_type,
        picture_type,
    })
}

/// Scan the frame stream for the first picture frame.
fn locate_cover(buf: &[u8]) -> Result<Option<CoverSpan>, FormatError> {
    let Some(header) = TagHeader::parse(buf)? else {
        return Ok(None);
    };
    if header.major_version == 2 {
        // v2.2 uses 6-byte frame headers with 3-character ids
        return Err(FormatError::UnsupportedVersion(header.major_version));
    }
    if header.is_unsynchronised() {
        tracing::debug!("tag is unsynchronised, reading frames as-is");
    }

    let encoding = header.frame_size_encoding();
    let tag_end = header.tag_end();
    let mut cursor = header.frames_start(buf)?;

    while cursor < tag_end {
        if cursor + FRAME_HEADER_LEN > buf.len() {
            tracing::debug!(cursor, len = buf.len(), "buffer ends inside frame header");
            break;
        }
        let frame = FrameHeader::parse(&buf[cursor..cursor + FRAME_HEADER_LEN], encoding);
        if frame.is_padding() {
            break;
        }
        let start = cursor + FRAME_HEADER_LEN;
        let end = start.saturating_add(frame.size as usize);

        if frame.id == PICTURE_FRAME_ID {
            if end > buf.len() {
                return Err(FormatError::Truncated("picture frame"));
            }
            let span = parse_picture_payload(&buf[start..end])?;
            return Ok(Some(CoverSpan {
                image: start + span.image.start..start + span.image.end,
                ..span
            }));
        }

        tracing::trace!(id = %frame.id_str(), size = frame.size, "skipping frame");
        cursor = end;
    }
    Ok(None)
}

/// Find the first embedded picture in `buf`, copying the image bytes out.
pub fn find_cover(buf: &[u8]) -> Result<Option<ExtractedCover>, FormatError> {
    Ok(locate_cover(buf)?.map(|span| ExtractedCover {
        bytes: Bytes::copy_from_slice(&buf[span.image]),
        media_type: span.media_type,
        picture_type: span.picture_type,
    }))
}

/// Best-effort extraction: every failure collapses to `None`.
pub fn extract_cover_from_bytes(buf: &[u8]) -> Option<ExtractedCover> {
    match find_cover(buf) {
        Ok(cover) => cover,
        Err(e) => {
            tracing::debug!(error = %e, "no usable cover in tag");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testlib::{encode_sync_safe, TagBuilder};
    use proptest::prelude::*;

    #[test]
    fn test_sync_safe_decoding() {
        assert_eq!(sync_safe_u32([0x00, 0x00, 0x02, 0x01]), 257);
        assert_eq!(sync_safe_u32([0x7F, 0x7F, 0x7F, 0x7F]), (1 << 28) - 1);
        // high bits are ignored
        assert_eq!(sync_safe_u32([0x80, 0x80, 0x82, 0x81]), 257);
    }

    #[test]
    fn test_header_without_magic() {
        assert_eq!(TagHeader::parse(b"RIFF\0\0\0\0\0\0"), Ok(None));
        assert_eq!(TagHeader::parse(b""), Ok(None));
        assert_eq!(TagHeader::parse(b"ID"), Ok(None));
    }

    #[test]
    fn test_header_truncated_after_magic() {
        assert_eq!(
            TagHeader::parse(b"ID3\x03\x00"),
            Err(FormatError::Truncated("tag header"))
        );
    }

    #[test]
    fn test_header_fields() {
        let header = TagHeader::parse(&[b'I', b'D', b'3', 4, 0, 0x40, 0, 0, 2, 1])
            .unwrap()
            .unwrap();
        assert_eq!(header.major_version, 4);
        assert_eq!(header.tag_size, 257);
        assert_eq!(header.tag_end(), 267);
        assert!(header.has_extended_header());
        assert_eq!(header.frame_size_encoding(), SizeEncoding::SyncSafe);
    }

    #[test]
    fn test_picture_end_to_end() {
        let image = [0x89, b'P', b'N', b'G', 1, 2, 3, 4, 5];
        let tag = TagBuilder::v3().picture("image/png", 3, "", &image).build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(&cover.bytes[..], &image);
        assert_eq!(cover.media_type, "image/png");
        assert_eq!(cover.picture_type, 3);
        assert!(cover.is_front_cover());
    }

    #[test]
    fn test_skips_non_picture_frame() {
        let tag = TagBuilder::v3()
            .text_frame(b"TIT2", "A Song Title")
            .picture("image/jpeg", 0, "front", &[0xFF, 0xD8, 0xFF])
            .build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(&cover.bytes[..], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(cover.media_type, "image/jpeg");
    }

    #[test]
    fn test_first_picture_wins() {
        let tag = TagBuilder::v3()
            .picture("image/png", 3, "", &[1, 1])
            .picture("image/jpeg", 4, "", &[2, 2])
            .build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(&cover.bytes[..], &[1, 1]);
        assert_eq!(cover.media_type, "image/png");
    }

    #[test]
    fn test_zero_size_tag() {
        let tag = TagBuilder::v3().build();
        assert_eq!(find_cover(&tag), Ok(None));
    }

    #[test]
    fn test_padding_ends_scan() {
        let mut tag = TagBuilder::v3()
            .text_frame(b"TIT2", "x")
            .padding(32)
            .build();
        // a picture frame after the padding must not be found
        let trailing = TagBuilder::v3().picture("image/png", 3, "", &[9]).build();
        tag.extend_from_slice(&trailing[TAG_HEADER_LEN..]);
        assert_eq!(find_cover(&tag), Ok(None));
    }

    #[test]
    fn test_truncated_frame_header() {
        let mut tag = TagBuilder::v3().text_frame(b"TIT2", "abc").declared_size(100).build();
        tag.extend_from_slice(b"APIC\0\0");
        assert_eq!(find_cover(&tag), Ok(None));
        assert!(extract_cover_from_bytes(&tag).is_none());
    }

    #[test]
    fn test_text_frame_overrun_ends_scan() {
        let mut tag = TagBuilder::v3().text_frame(b"TIT2", "abc").declared_size(10_000).build();
        // TIT2 claims 4096 bytes; the buffer ends right after its payload
        tag[TAG_HEADER_LEN + 4..TAG_HEADER_LEN + 8].copy_from_slice(&[0, 0, 0x10, 0]);
        assert_eq!(find_cover(&tag), Ok(None));
        assert!(extract_cover_from_bytes(&tag).is_none());
    }

    #[test]
    fn test_picture_overrun_is_error() {
        let mut tag = TagBuilder::v3().picture("image/png", 3, "", &[1, 2, 3, 4]).build();
        tag.truncate(tag.len() - 2);
        assert_eq!(find_cover(&tag), Err(FormatError::Truncated("picture frame")));
        assert!(extract_cover_from_bytes(&tag).is_none());
    }

    #[test]
    fn test_v4_sync_safe_frame_sizes() {
        // 200 bytes needs the sync-safe encoding to differ from big-endian
        let image = vec![0xAB; 200];
        let tag = TagBuilder::v4()
            .text_frame(b"TIT2", &"t".repeat(150))
            .picture("image/png", 3, "", &image)
            .build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(cover.bytes.len(), 200);
        assert!(cover.bytes.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_utf16_description_is_skipped() {
        let tag = TagBuilder::v3()
            .picture_utf16("image/png", "Cover", &[0x00, 0x10, 0x20])
            .build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(&cover.bytes[..], &[0x00, 0x10, 0x20]);
    }

    #[test]
    fn test_utf8_description_uses_single_nul() {
        let payload = crate::testlib::picture_payload(3, "image/png", 3, "caf\u{e9}".as_bytes(), &[7, 8]);
        let tag = TagBuilder::v3().frame(b"APIC", &payload).build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(&cover.bytes[..], &[7, 8]);
    }

    #[test]
    fn test_empty_media_type_defaults_to_jpeg() {
        let tag = TagBuilder::v3().picture("", 3, "", &[1]).build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(cover.media_type, DEFAULT_MEDIA_TYPE);
        assert_eq!(cover.file_extension(), "jpg");
    }

    #[test]
    fn test_blank_media_type_is_kept() {
        let tag = TagBuilder::v3().picture(" ", 3, "", &[1]).build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(cover.media_type, " ");
    }

    #[test]
    fn test_extended_header_v3() {
        let tag = TagBuilder::v3()
            .extended_header(&[0, 0, 0, 0, 0, 0])
            .picture("image/gif", 3, "", &[4, 2])
            .build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(&cover.bytes[..], &[4, 2]);
    }

    #[test]
    fn test_extended_header_v4() {
        let tag = TagBuilder::v4()
            .extended_header(&[1, 0])
            .picture("image/webp", 3, "", &[5])
            .build();
        let cover = find_cover(&tag).unwrap().unwrap();
        assert_eq!(cover.file_extension(), "webp");
    }

    #[test]
    fn test_v22_unsupported() {
        let tag = TagBuilder::new(2).build();
        assert_eq!(find_cover(&tag), Err(FormatError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_unterminated_media_type() {
        let tag = TagBuilder::v3().frame(b"APIC", b"\x00image/png").build();
        assert_eq!(find_cover(&tag), Err(FormatError::Truncated("media type")));
    }

    #[test]
    fn test_idempotent() {
        let tag = TagBuilder::v3().picture("image/png", 3, "d", &[1, 2, 3]).build();
        assert_eq!(find_cover(&tag), find_cover(&tag));
    }

    proptest! {
        #[test]
        fn fuzz_without_magic_is_absent(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut data = data;
            if data.len() >= 3 && data[..3] == TAG_MAGIC {
                data[0] = b'X';
            }
            prop_assert_eq!(find_cover(&data), Ok(None));
        }

        #[test]
        fn fuzz_tag_body_never_panics(body in proptest::collection::vec(any::<u8>(), 0..512), major in 3u8..5) {
            let mut data = vec![b'I', b'D', b'3', major, 0, 0];
            data.extend_from_slice(&encode_sync_safe(body.len() as u32));
            data.extend_from_slice(&body);
            let _ = find_cover(&data);
        }

        #[test]
        fn fuzz_sync_safe_roundtrip(n in 0u32..(1 << 28)) {
            prop_assert_eq!(sync_safe_u32(encode_sync_safe(n)), n);
        }
    }
}
