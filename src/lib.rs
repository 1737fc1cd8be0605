//! coverart-rs — embedded cover art extraction for ID3v2-tagged audio, plus a C ABI
use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr;

pub mod api;
pub mod cache;
pub mod formats;
pub mod manifest;
pub mod player;
pub mod transport;
#[doc(hidden)]
pub mod testlib;

pub use api::{BlockingCoverExtractor, CoverExtractor, CoverExtractorBuilder, ExtractError};
pub use cache::CoverCache;
pub use formats::{extract_cover_from_bytes, find_cover, ExtractedCover, FormatError};
pub use manifest::{CoverShift, CoverSource, Manifest, Track};
pub use player::{PlayerContext, PlayerEvent, PlayerSettings};
pub use transport::{AutoTransport, FileTransport, HttpTransport, MemoryTransport, Transport, TransportError};

/// Error codes reported through `CE_get_last_error_code`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverErrorCode {
    Ok = 0,
    NoCover = 1,
    Transport = 2,
    Format = 3,
    InvalidArgument = 4,
    Runtime = 5,
}

#[repr(C)]
pub struct CoverExtractHandle {
    extractor: Option<BlockingCoverExtractor>,
    last_error_code: CoverErrorCode,
    last_error_text: CString,
    last_cover: Option<ExtractedCover>,
    last_media_type: CString,
}

impl CoverExtractHandle {
    fn new() -> Self {
        let mut handle = Self {
            extractor: None,
            last_error_code: CoverErrorCode::Ok,
            last_error_text: c"OK".to_owned(),
            last_cover: None,
            last_media_type: CString::default(),
        };
        match BlockingCoverExtractor::new() {
            Ok(extractor) => handle.extractor = Some(extractor),
            Err(e) => handle.set_error(CoverErrorCode::Runtime, &e.to_string()),
        }
        handle
    }

    fn set_error(&mut self, code: CoverErrorCode, text: &str) {
        self.last_error_code = code;
        self.last_error_text = to_cstring(text);
    }

    fn set_cover(&mut self, cover: Option<ExtractedCover>) {
        self.last_media_type = cover
            .as_ref()
            .map(|c| to_cstring(&c.media_type))
            .unwrap_or_default();
        self.last_cover = cover;
    }
}

fn to_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

static PLUGIN_NAME: &CStr = c"coverart-rs";
static PLUGIN_VERSION: &CStr = c"0.1.0";

#[no_mangle]
pub extern "C" fn CE_create() -> *mut CoverExtractHandle {
    Box::into_raw(Box::new(CoverExtractHandle::new()))
}

#[no_mangle]
pub extern "C" fn CE_destroy(handle: *mut CoverExtractHandle) {
    if !handle.is_null() {
        unsafe { drop(Box::from_raw(handle)); }
    }
}

#[no_mangle]
pub extern "C" fn CE_get_name(_handle: *mut CoverExtractHandle) -> *const c_char {
    PLUGIN_NAME.as_ptr()
}

#[no_mangle]
pub extern "C" fn CE_get_version(_handle: *mut CoverExtractHandle) -> *const c_char {
    PLUGIN_VERSION.as_ptr()
}

#[no_mangle]
pub extern "C" fn CE_get_last_error_code(handle: *mut CoverExtractHandle) -> c_int {
    if handle.is_null() { return -1; }
    unsafe { (*handle).last_error_code as c_int }
}

#[no_mangle]
pub extern "C" fn CE_get_last_error_text(handle: *mut CoverExtractHandle) -> *const c_char {
    if handle.is_null() { return c"Invalid handle".as_ptr(); }
    unsafe { (*handle).last_error_text.as_ptr() }
}

/// Extract the cover of the file or URL at `locator`.
/// Returns true when a cover is available through `CE_get_bytes`.
#[no_mangle]
pub extern "C" fn CE_extract(handle: *mut CoverExtractHandle, locator: *const c_char) -> bool {
    if handle.is_null() {
        return false;
    }
    let h = unsafe { &mut *handle };
    h.set_cover(None);
    if locator.is_null() {
        h.set_error(CoverErrorCode::InvalidArgument, "Null locator");
        return false;
    }
    let locator = unsafe { CStr::from_ptr(locator).to_string_lossy().into_owned() };
    let Some(extractor) = h.extractor.as_ref() else {
        h.set_error(CoverErrorCode::Runtime, "Extractor not available");
        return false;
    };

    let (code, text, cover) = match extractor.try_extract_cover(&locator) {
        Ok(Some(cover)) => (CoverErrorCode::Ok, "OK".to_string(), Some(cover)),
        Ok(None) => (CoverErrorCode::NoCover, "No embedded cover".to_string(), None),
        Err(ExtractError::Format(e)) => (CoverErrorCode::Format, e.to_string(), None),
        Err(e) => (CoverErrorCode::Transport, e.to_string(), None),
    };
    h.set_error(code, &text);
    let found = cover.is_some();
    h.set_cover(cover);
    found
}

/// Image bytes of the last successful extraction; valid until the next call on this handle.
#[no_mangle]
pub extern "C" fn CE_get_bytes(handle: *mut CoverExtractHandle, out_len: *mut usize) -> *const u8 {
    if handle.is_null() || out_len.is_null() {
        return ptr::null();
    }
    unsafe {
        match &(*handle).last_cover {
            Some(cover) => {
                *out_len = cover.bytes.len();
                cover.bytes.as_ptr()
            }
            None => {
                *out_len = 0;
                ptr::null()
            }
        }
    }
}

#[no_mangle]
pub extern "C" fn CE_get_media_type(handle: *mut CoverExtractHandle) -> *const c_char {
    if handle.is_null() { return ptr::null(); }
    unsafe {
        if (*handle).last_cover.is_none() {
            return ptr::null();
        }
        (*handle).last_media_type.as_ptr()
    }
}

/// Returns the crate semantic version string.
pub fn version() -> &'static str { env!("CARGO_PKG_VERSION") }
