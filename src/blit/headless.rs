//! CPU-only blit backend.

use crate::error::RenderError;
use crate::layout::PixelRect;

use super::{BlitBackend, BlitStats, UploadPlan, plan_upload};

/// Backend that mirrors the destination texture in memory.
///
/// Upload semantics match [`super::WgpuBlit`] exactly, so tests can assert
/// on the presented pixels and on the upload accounting without a GPU.
#[derive(Debug, Clone)]
pub struct HeadlessBlit {
    width: u32,
    height: u32,
    texture: Vec<u8>,
    needs_full_upload: bool,
    frames_presented: usize,
}

impl HeadlessBlit {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texture: vec![0; width as usize * height as usize * 4],
            needs_full_upload: true,
            frames_presented: 0,
        }
    }

    /// The mirrored destination texture, RGBA8 rows top to bottom.
    pub fn texture(&self) -> &[u8] {
        &self.texture
    }

    pub fn frames_presented(&self) -> usize {
        self.frames_presented
    }

    fn copy_region(&mut self, frame: &[u8], rect: PixelRect) {
        let stride = self.width as usize * 4;
        for row in 0..rect.height as usize {
            let start = (rect.y as usize + row) * stride + rect.x as usize * 4;
            let len = rect.width as usize * 4;
            self.texture[start..start + len].copy_from_slice(&frame[start..start + len]);
        }
    }
}

impl BlitBackend for HeadlessBlit {
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width != self.width || height != self.height {
            self.width = width;
            self.height = height;
            self.texture = vec![0; width as usize * height as usize * 4];
        }
        self.needs_full_upload = true;
        Ok(())
    }

    fn present(
        &mut self,
        frame: &[u8],
        regions: Option<&[PixelRect]>,
    ) -> Result<BlitStats, RenderError> {
        let expected = self.width as usize * self.height as usize * 4;
        if frame.len() != expected {
            return Err(RenderError::InvalidFrameData {
                expected,
                actual: frame.len(),
            });
        }

        let plan = plan_upload(self.width, self.height, regions, self.needs_full_upload);
        let stats = match plan {
            UploadPlan::Full => {
                self.texture.copy_from_slice(frame);
                BlitStats {
                    bytes_uploaded: expected,
                    upload_rects: 1,
                    draw_calls: 1,
                    full_upload: true,
                }
            }
            UploadPlan::Regions(rects) => {
                let mut bytes = 0;
                for rect in &rects {
                    self.copy_region(frame, *rect);
                    bytes += rect.byte_count();
                }
                BlitStats {
                    bytes_uploaded: bytes,
                    upload_rects: rects.len(),
                    draw_calls: 1,
                    full_upload: false,
                }
            }
        };

        self.needs_full_upload = false;
        self.frames_presented += 1;
        Ok(stats)
    }
}
