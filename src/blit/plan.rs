//! Upload planning shared by every backend.

use crate::layout::PixelRect;

/// What a backend should upload for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPlan {
    /// The whole bitmap in one transfer.
    Full,
    /// One transfer per rect, already clipped to the surface.
    Regions(Vec<PixelRect>),
}

/// Decide between a full and a per-region upload.
///
/// The first frame after (re-)creating the destination texture always
/// uploads fully, as does any frame without a region list. Regions are
/// clipped to the surface; out-of-bounds rects are dropped rather than
/// wrapped.
pub fn plan_upload(
    width: u32,
    height: u32,
    regions: Option<&[PixelRect]>,
    force_full: bool,
) -> UploadPlan {
    if force_full {
        return UploadPlan::Full;
    }
    let Some(regions) = regions else {
        return UploadPlan::Full;
    };

    let surface = PixelRect {
        x: 0,
        y: 0,
        width,
        height,
    };
    let clipped: Vec<PixelRect> = regions
        .iter()
        .filter_map(|rect| rect.intersect(&surface))
        .collect();
    UploadPlan::Regions(clipped)
}
