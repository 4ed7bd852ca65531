// Copyright 2024, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pixel buffers shared with the VM's graphics backend.

use crate::error::DisplayError;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::os::raw::c_void;
use std::ptr;

/// Pixel formats from `system/graphics.h`.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[repr(i32)]
pub enum PixelFormat {
    /// HAL_PIXEL_FORMAT_RGBA_8888
    Rgba8888 = 1,
    /// HAL_PIXEL_FORMAT_RGBX_8888
    Rgbx8888 = 2,
    /// HAL_PIXEL_FORMAT_RGB_888
    Rgb888 = 3,
    /// HAL_PIXEL_FORMAT_RGB_565
    Rgb565 = 4,
    /// HAL_PIXEL_FORMAT_BGRA_8888
    Bgra8888 = 5,
}

impl PixelFormat {
    /// Decodes a raw HAL pixel format value.
    pub fn from_raw(format: i32) -> Option<Self> {
        Self::from_i32(format)
    }
}

// crosvm always scans out BGRA8888 or BGRX8888 (see the SetScanoutBlob handling in its virtio-gpu
// device). BGRA is used for both surfaces so the cursor can be alpha blended.
/// The only pixel format used by display surfaces.
pub const DISPLAY_FORMAT: PixelFormat = PixelFormat::Bgra8888;

/// Size of one `DISPLAY_FORMAT` pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// CPU view of a locked buffer. Same layout as the NDK's `ANativeWindow_Buffer`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NativeWindowBuffer {
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    /// Number of pixels between the starts of two consecutive rows.
    pub stride: i32,
    /// Raw `PixelFormat` value.
    pub format: i32,
    /// First byte of the pixel data.
    pub bits: *mut c_void,
    /// Reserved by the NDK.
    pub reserved: [u32; 6],
}

impl Default for NativeWindowBuffer {
    fn default() -> Self {
        Self { width: 0, height: 0, stride: 0, format: 0, bits: ptr::null_mut(), reserved: [0; 6] }
    }
}

impl NativeWindowBuffer {
    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn row_len(&self) -> usize {
        non_negative(self.stride) * BYTES_PER_PIXEL
    }

    /// Total number of bytes addressable through `bits`, padding included.
    pub fn len(&self) -> usize {
        self.row_len() * non_negative(self.height)
    }

    /// Returns true if the buffer has no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the pixel data as a byte slice.
    ///
    /// # Safety
    ///
    /// `bits` must be valid for reads and writes of `len()` bytes for the whole lifetime `'a`,
    /// and nothing else may access that memory during `'a`.
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        if self.bits.is_null() || self.is_empty() {
            return &mut [];
        }
        // SAFETY: The caller guarantees that `bits` is valid for `len()` bytes during `'a` and
        // is not aliased.
        unsafe { std::slice::from_raw_parts_mut(self.bits.cast::<u8>(), self.len()) }
    }
}

fn non_negative(value: i32) -> usize {
    usize::try_from(value).unwrap_or(0)
}

/// Copies the pixels of `from` into `to`, row by row, honoring the stride of each.
///
/// Fails without touching `to` if the two buffers don't have the same dimensions.
///
/// # Safety
///
/// The `bits` of both buffers must be valid for `len()` bytes, readable for `from` and writable
/// for `to`.
pub unsafe fn copy_buffer(
    from: &NativeWindowBuffer,
    to: &NativeWindowBuffer,
) -> Result<(), DisplayError> {
    if from.dimensions() != to.dimensions() {
        return Err(DisplayError::DimensionMismatch {
            from: from.dimensions(),
            to: to.dimensions(),
        });
    }
    let bytes_on_line = non_negative(to.width) * BYTES_PER_PIXEL;
    if bytes_on_line == 0 {
        return Ok(());
    }
    let src = from.bits.cast::<u8>().cast_const();
    let dst = to.bits.cast::<u8>();
    for h in 0..non_negative(to.height) {
        // SAFETY: Both buffers are valid for `stride * height` pixels, and a row is never longer
        // than the stride. `ptr::copy` tolerates overlapping regions.
        unsafe {
            ptr::copy(src.add(h * from.row_len()), dst.add(h * to.row_len()), bytes_on_line);
        }
    }
    Ok(())
}

/// Pixel buffer owned by this library, tightly packed in `DISPLAY_FORMAT`.
#[derive(Debug, Default)]
pub struct SinkBuffer {
    bits: Vec<u8>,
    width: u32,
    height: u32,
}

impl SinkBuffer {
    /// Resizes the buffer to `width` x `height` pixels of `format`.
    ///
    /// The buffer is left as is if `format` is not `DISPLAY_FORMAT` or the size overflows.
    pub fn configure(&mut self, width: u32, height: u32, format: i32) -> Result<(), DisplayError> {
        if PixelFormat::from_raw(format) != Some(DISPLAY_FORMAT) {
            return Err(DisplayError::UnsupportedPixelFormat(format));
        }
        let len = Self::byte_len(width, height)
            .ok_or(DisplayError::DimensionOverflow { width, height })?;

        self.bits.resize(len, 0);
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn byte_len(width: u32, height: u32) -> Option<usize> {
        // Dimensions must be representable in NativeWindowBuffer.
        i32::try_from(width).ok()?;
        i32::try_from(height).ok()?;
        usize::try_from(width)
            .ok()?
            .checked_mul(usize::try_from(height).ok()?)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    /// Returns the `(width, height)` of the last successful `configure`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns a descriptor pointing to this buffer's pixels. It remains valid until the next
    /// `configure` or until the `SinkBuffer` is dropped.
    pub fn buffer(&mut self) -> NativeWindowBuffer {
        NativeWindowBuffer {
            // Both fit in i32, as checked by `configure`.
            width: self.width as i32,
            height: self.height as i32,
            stride: self.width as i32,
            format: DISPLAY_FORMAT as i32,
            bits: self.bits.as_mut_ptr().cast(),
            reserved: [0; 6],
        }
    }

    /// Pixel data.
    pub fn bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Mutable pixel data.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BGRA: i32 = DISPLAY_FORMAT as i32;

    fn filled(width: u32, height: u32, value: u8) -> SinkBuffer {
        let mut sink = SinkBuffer::default();
        sink.configure(width, height, BGRA).unwrap();
        sink.bytes_mut().fill(value);
        sink
    }

    #[test]
    fn pixel_format_from_raw() {
        assert_eq!(PixelFormat::from_raw(5), Some(PixelFormat::Bgra8888));
        assert_eq!(PixelFormat::from_raw(1), Some(PixelFormat::Rgba8888));
        assert_eq!(PixelFormat::from_raw(0), None);
        assert_eq!(PixelFormat::from_raw(0x100), None);
    }

    #[test]
    fn configured_sink_is_tightly_packed() {
        for (width, height) in [(1, 1), (3, 7), (640, 480), (1920, 1080)] {
            let mut sink = SinkBuffer::default();
            sink.configure(width, height, BGRA).unwrap();
            let buffer = sink.buffer();
            assert_eq!(buffer.width, width as i32);
            assert_eq!(buffer.height, height as i32);
            assert_eq!(buffer.stride, width as i32);
            assert_eq!(buffer.format, BGRA);
            assert_eq!(buffer.len(), (width * height * 4) as usize);
            assert_eq!(sink.bytes().len(), (width * height * 4) as usize);
        }
    }

    #[test]
    fn other_formats_are_rejected_and_buffer_kept() {
        let mut sink = filled(4, 2, 0xab);
        for format in [0, 1, 2, 3, 4, 6, -1] {
            assert_eq!(
                sink.configure(8, 8, format),
                Err(DisplayError::UnsupportedPixelFormat(format))
            );
            assert_eq!(sink.dimensions(), (4, 2));
            assert_eq!(sink.bytes(), &[0xab; 4 * 2 * 4][..]);
        }
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let mut sink = SinkBuffer::default();
        assert_eq!(
            sink.configure(u32::MAX, 2, BGRA),
            Err(DisplayError::DimensionOverflow { width: u32::MAX, height: 2 })
        );
        assert_eq!(sink.dimensions(), (0, 0));
    }

    #[test]
    fn copy_between_same_sized_buffers() {
        let mut from = filled(3, 2, 0x11);
        from.bytes_mut()[5] = 0x42;
        let mut to = filled(3, 2, 0);

        // SAFETY: Both descriptors point to live sink buffers.
        unsafe { copy_buffer(&from.buffer(), &to.buffer()) }.unwrap();
        assert_eq!(from.bytes(), to.bytes());
    }

    #[test]
    fn copy_honors_stride() {
        let mut from = filled(2, 2, 0);
        from.bytes_mut().copy_from_slice(&[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]);

        // Destination with one pixel of padding at the end of each row.
        let mut padded = vec![0xffu8; 3 * 2 * 4];
        let to = NativeWindowBuffer {
            width: 2,
            height: 2,
            stride: 3,
            format: BGRA,
            bits: padded.as_mut_ptr().cast(),
            reserved: [0; 6],
        };

        // SAFETY: `padded` holds stride * height pixels and outlives the copy.
        unsafe { copy_buffer(&from.buffer(), &to) }.unwrap();
        assert_eq!(&padded[0..8], &[1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(&padded[8..12], &[0xff; 4]);
        assert_eq!(&padded[12..20], &[3, 3, 3, 3, 4, 4, 4, 4]);
        assert_eq!(&padded[20..24], &[0xff; 4]);
    }

    #[test]
    fn copy_with_mismatched_dimensions_leaves_destination() {
        let mut from = filled(4, 4, 0x11);
        for (width, height) in [(4, 3), (3, 4), (5, 5)] {
            let mut to = filled(width, height, 0x22);
            // SAFETY: Both descriptors point to live sink buffers.
            let res = unsafe { copy_buffer(&from.buffer(), &to.buffer()) };
            assert_eq!(
                res,
                Err(DisplayError::DimensionMismatch {
                    from: (4, 4),
                    to: (width as i32, height as i32)
                })
            );
            assert!(to.bytes().iter().all(|b| *b == 0x22));
        }
    }
}
