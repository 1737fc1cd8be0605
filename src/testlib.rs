//! Test utilities for coverart-rs
// Builds synthetic ID3v2 tags so tests and benches don't need real audio files.

/// Encode `n` (< 2^28) as a sync-safe integer.
pub fn encode_sync_safe(n: u32) -> [u8; 4] {
    [
        ((n >> 21) & 0x7F) as u8,
        ((n >> 14) & 0x7F) as u8,
        ((n >> 7) & 0x7F) as u8,
        (n & 0x7F) as u8,
    ]
}

/// Build an `APIC` payload. `description` is written as-is followed by the
/// terminator the encoding calls for (one NUL for 0/3, two otherwise).
pub fn picture_payload(
    encoding: u8,
    media_type: &str,
    picture_type: u8,
    description: &[u8],
    data: &[u8],
) -> Vec<u8> {
    let mut payload = vec![encoding];
    payload.extend_from_slice(media_type.as_bytes());
    payload.push(0);
    payload.push(picture_type);
    payload.extend_from_slice(description);
    match encoding {
        0 | 3 => payload.push(0),
        _ => payload.extend_from_slice(&[0, 0]),
    }
    payload.extend_from_slice(data);
    payload
}

/// Assembles a tag frame by frame.
///
/// The declared tag size covers the extended header, frames and padding unless
/// overridden with [`TagBuilder::declared_size`].
#[derive(Debug, Clone)]
pub struct TagBuilder {
    major: u8,
    extended_header: Option<Vec<u8>>,
    frames: Vec<u8>,
    padding: usize,
    declared_size: Option<u32>,
}

impl TagBuilder {
    pub fn new(major: u8) -> Self {
        Self {
            major,
            extended_header: None,
            frames: Vec::new(),
            padding: 0,
            declared_size: None,
        }
    }

    pub fn v3() -> Self {
        Self::new(3)
    }

    pub fn v4() -> Self {
        Self::new(4)
    }

    /// Append a raw frame with the size field encoded for this tag version.
    pub fn frame(mut self, id: &[u8; 4], payload: &[u8]) -> Self {
        let size = payload.len() as u32;
        self.frames.extend_from_slice(id);
        if self.major >= 4 {
            self.frames.extend_from_slice(&encode_sync_safe(size));
        } else {
            self.frames.extend_from_slice(&size.to_be_bytes());
        }
        self.frames.extend_from_slice(&[0, 0]);
        self.frames.extend_from_slice(payload);
        self
    }

    /// Latin-1 text frame.
    pub fn text_frame(self, id: &[u8; 4], text: &str) -> Self {
        let mut payload = vec![0u8];
        payload.extend_from_slice(text.as_bytes());
        self.frame(id, &payload)
    }

    /// Latin-1 picture frame.
    pub fn picture(self, media_type: &str, picture_type: u8, description: &str, data: &[u8]) -> Self {
        let payload = picture_payload(0, media_type, picture_type, description.as_bytes(), data);
        self.frame(b"APIC", &payload)
    }

    /// UTF-16 (with BOM) picture frame, front cover.
    pub fn picture_utf16(self, media_type: &str, description: &str, data: &[u8]) -> Self {
        let mut desc = vec![0xFF, 0xFE];
        for unit in description.encode_utf16() {
            desc.extend_from_slice(&unit.to_le_bytes());
        }
        let payload = picture_payload(1, media_type, 3, &desc, data);
        self.frame(b"APIC", &payload)
    }

    /// Extended header body (everything after its size field).
    pub fn extended_header(mut self, body: &[u8]) -> Self {
        self.extended_header = Some(body.to_vec());
        self
    }

    pub fn padding(mut self, len: usize) -> Self {
        self.padding = len;
        self
    }

    pub fn declared_size(mut self, size: u32) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut flags = 0u8;
        if let Some(ext) = &self.extended_header {
            flags |= 0x40;
            if self.major >= 4 {
                body.extend_from_slice(&encode_sync_safe(4 + ext.len() as u32));
            } else {
                body.extend_from_slice(&(ext.len() as u32).to_be_bytes());
            }
            body.extend_from_slice(ext);
        }
        body.extend_from_slice(&self.frames);
        body.resize(body.len() + self.padding, 0);

        let size = self.declared_size.unwrap_or(body.len() as u32);
        let mut tag = vec![b'I', b'D', b'3', self.major, 0, flags];
        tag.extend_from_slice(&encode_sync_safe(size));
        tag.extend_from_slice(&body);
        tag
    }
}

/// A tag followed by some fake MPEG audio, the way a real file looks.
pub fn tagged_audio(tag: Vec<u8>) -> Vec<u8> {
    let mut file = tag;
    for _ in 0..64 {
        file.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
    }
    file
}
