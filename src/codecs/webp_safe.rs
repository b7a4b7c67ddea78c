// src/codecs/webp_safe.rs
//
// Safe abstractions for libwebp encoder FFI operations.
// RAII wrappers own the picture and memory-writer allocations so every exit
// path (including early error returns) releases them.
#![deny(unsafe_op_in_unsafe_fn)]

use crate::error::SnapshotError;
use libwebp_sys::*;
use std::os::raw::c_int;
#[cfg(test)]
use std::{cell::Cell, thread_local};

#[cfg(test)]
thread_local! {
    static TRACK_DROPS: Cell<bool> = const { Cell::new(false) };
    static LIVE_PICTURES: Cell<usize> = const { Cell::new(0) };
    static LIVE_WRITERS: Cell<usize> = const { Cell::new(0) };
}

#[cfg(test)]
fn track(counter: &'static std::thread::LocalKey<Cell<usize>>, delta: isize) {
    TRACK_DROPS.with(|flag| {
        if flag.get() {
            counter.with(|c| c.set(c.get().saturating_add_signed(delta)));
        }
    });
}

/// Human-readable name for a libwebp `WebPEncodingError` code.
fn encoding_error_name(code: i32) -> &'static str {
    match code {
        0 => "ok",
        1 => "out of memory",
        2 => "bitstream out of memory",
        3 => "null parameter",
        4 => "invalid configuration",
        5 => "bad dimension",
        6 => "partition0 overflow",
        7 => "partition overflow",
        8 => "bad write",
        9 => "file too big",
        10 => "user abort",
        _ => "unknown error",
    }
}

/// Run libwebp's own range checks on a configuration.
pub fn validate_config(config: &WebPConfig) -> Result<(), SnapshotError> {
    if unsafe { WebPValidateConfig(config) } == 0 {
        return Err(SnapshotError::invalid_config(format!(
            "libwebp rejected configuration (lossless={}, quality={}, method={}, alpha_quality={}, pass={})",
            config.lossless, config.quality, config.method, config.alpha_quality, config.pass
        )));
    }
    Ok(())
}

/// Growable in-memory output sink for the encoder.
///
/// Boxed so the address handed to libwebp stays stable.
pub struct SafeMemoryWriter {
    writer: Box<WebPMemoryWriter>,
}

impl SafeMemoryWriter {
    pub fn new() -> Self {
        // SAFETY: WebPMemoryWriter is a plain C struct; all-zero is a valid
        // pre-init state and WebPMemoryWriterInit fills it in.
        let mut writer: Box<WebPMemoryWriter> = Box::new(unsafe { std::mem::zeroed() });
        unsafe { WebPMemoryWriterInit(&mut *writer) };
        #[cfg(test)]
        track(&LIVE_WRITERS, 1);
        Self { writer }
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        if self.writer.mem.is_null() || self.writer.size == 0 {
            return &[];
        }
        // SAFETY: libwebp guarantees `mem` holds `size` initialized bytes.
        unsafe { std::slice::from_raw_parts(self.writer.mem, self.writer.size) }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Default for SafeMemoryWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SafeMemoryWriter {
    fn drop(&mut self) {
        unsafe { WebPMemoryWriterClear(&mut *self.writer) };
        #[cfg(test)]
        track(&LIVE_WRITERS, -1);
    }
}

/// Owned `WebPPicture` configured for ARGB input.
pub struct SafeWebPPicture {
    picture: WebPPicture,
}

impl SafeWebPPicture {
    /// Initialize a picture descriptor sized to the image.
    pub fn new(width: u32, height: u32) -> Result<Self, SnapshotError> {
        if width == 0 || height == 0 {
            return Err(SnapshotError::encode_failed(format!(
                "picture dimensions must be greater than 0 ({width}x{height})"
            )));
        }
        let mut picture = WebPPicture::new()
            .map_err(|_| SnapshotError::encode_failed("failed to initialize WebPPicture"))?;
        picture.width = width as c_int;
        picture.height = height as c_int;
        picture.use_argb = 1;
        #[cfg(test)]
        track(&LIVE_PICTURES, 1);
        Ok(Self { picture })
    }

    /// Import straight-alpha RGBA rows. `stride` may exceed `width * 4`.
    pub fn import_rgba(&mut self, pixels: &[u8], stride: usize) -> Result<(), SnapshotError> {
        let width = self.picture.width as usize;
        let height = self.picture.height as usize;
        if stride < width * 4 {
            return Err(SnapshotError::encode_failed(format!(
                "stride {stride} is smaller than width * 4 ({})",
                width * 4
            )));
        }
        let needed = (height - 1) * stride + width * 4;
        if pixels.len() < needed {
            return Err(SnapshotError::encode_failed(format!(
                "pixel buffer holds {} bytes, picture needs {needed}",
                pixels.len()
            )));
        }
        let stride = c_int::try_from(stride)
            .map_err(|_| SnapshotError::encode_failed(format!("stride {stride} overflows c_int")))?;
        // SAFETY: the buffer covers `height` rows of `stride` bytes (checked above)
        // and libwebp copies it into its own ARGB plane.
        let ok = unsafe { WebPPictureImportRGBA(&mut self.picture, pixels.as_ptr(), stride) };
        if ok == 0 {
            return Err(SnapshotError::encode_failed(format!(
                "picture import failed: {}",
                encoding_error_name(self.picture.error_code as i32)
            )));
        }
        Ok(())
    }

    /// Compress into `writer`. No partial output is kept on failure.
    pub fn encode(
        &mut self,
        config: &WebPConfig,
        writer: &mut SafeMemoryWriter,
    ) -> Result<(), SnapshotError> {
        self.picture.writer = Some(WebPMemoryWrite);
        self.picture.custom_ptr = (&mut *writer.writer as *mut WebPMemoryWriter).cast();
        let ok = unsafe { WebPEncode(config, &mut self.picture) };
        // The writer may be dropped before the picture; never leave a dangling sink.
        self.picture.writer = None;
        self.picture.custom_ptr = std::ptr::null_mut();
        if ok == 0 {
            return Err(SnapshotError::encode_failed(format!(
                "WebPEncode failed: {}",
                encoding_error_name(self.picture.error_code as i32)
            )));
        }
        Ok(())
    }
}

impl Drop for SafeWebPPicture {
    fn drop(&mut self) {
        unsafe { WebPPictureFree(&mut self.picture) };
        #[cfg(test)]
        track(&LIVE_PICTURES, -1);
    }
}
