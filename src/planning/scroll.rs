//! Scroll offsets needed to cover a page

/// Compute the scroll offsets (CSS px) whose viewport windows cover
/// `[0, total_height)`.
///
/// Offsets step by one viewport; when the last full step falls short of the
/// page end, a final offset of `total_height - viewport_height` is appended so
/// the last window ends exactly at the bottom of the page. That final window
/// usually overlaps its predecessor, which the stitcher crops away.
///
/// `viewport_height` must be positive.
pub fn plan_scroll_positions(total_height: u32, viewport_height: u32) -> Vec<u32> {
    assert!(viewport_height > 0, "viewport height must be positive");

    if total_height <= viewport_height {
        return vec![0];
    }

    let mut offsets = Vec::with_capacity((total_height / viewport_height) as usize + 1);
    let mut offset = 0u32;
    while offset + viewport_height <= total_height {
        offsets.push(offset);
        offset += viewport_height;
    }

    let last = offsets.last().copied().unwrap_or(0);
    if last + viewport_height < total_height {
        offsets.push(total_height - viewport_height);
    }

    offsets.sort_unstable();
    offsets.dedup();
    offsets
}
