use anyhow::{anyhow, Result};

/// Convert NV12 (full-resolution Y plane, then one interleaved UV pair per 2x2
/// block) to RGB24 using full-range BT.601 in 16.16 fixed point.
pub(crate) fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(anyhow!("NV12 dimensions must be non-zero"));
    }
    let w = width as usize;
    let h = height as usize;
    let uv_stride = w.div_ceil(2) * 2;
    let (y_len, uv_len) = w
        .checked_mul(h)
        .zip(uv_stride.checked_mul(h.div_ceil(2)))
        .ok_or_else(|| anyhow!("NV12 dimensions {}x{} overflow", width, height))?;
    if pixels.len() != y_len + uv_len {
        return Err(anyhow!(
            "NV12 buffer is {} bytes, {}x{} needs {}",
            pixels.len(),
            width,
            height,
            y_len + uv_len
        ));
    }
    let (luma, chroma) = pixels.split_at(y_len);

    let mut rgb = Vec::with_capacity(y_len * 3);
    for (row, y_row) in luma.chunks_exact(w).enumerate() {
        let uv_row = &chroma[(row / 2) * uv_stride..][..uv_stride];
        for (col, &y) in y_row.iter().enumerate() {
            let u = uv_row[col & !1] as i32 - 128;
            let v = uv_row[(col & !1) + 1] as i32 - 128;
            let y = y as i32;
            rgb.push(clamp_u8(y + fixed(91_881 * v)));
            rgb.push(clamp_u8(y - fixed(22_554 * u + 46_802 * v)));
            rgb.push(clamp_u8(y + fixed(116_130 * u)));
        }
    }
    Ok(rgb)
}

fn fixed(scaled: i32) -> i32 {
    (scaled + (1 << 15)) >> 16
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Copy `rows` rows of `row_bytes` each out of a buffer with a wider stride.
pub(crate) fn strip_stride(
    data: &[u8],
    row_bytes: usize,
    stride: usize,
    rows: usize,
) -> Result<Vec<u8>> {
    if stride == row_bytes {
        return data
            .get(..row_bytes * rows)
            .map(|d| d.to_vec())
            .ok_or_else(|| anyhow!("frame buffer shorter than {} rows", rows));
    }
    let mut pixels = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .ok_or_else(|| anyhow!("frame row {} is out of bounds", row))?,
        );
    }
    Ok(pixels)
}
