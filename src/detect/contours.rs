use image::GrayImage;

/// One connected region of changed pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Number of set pixels in the region.
    pub area: u32,
}

/// Find the 8-connected regions of non-zero pixels in a binary mask, in
/// raster order of their top-left-most pixel.
pub fn find_regions(mask: &GrayImage) -> Vec<MotionRegion> {
    let (w, h) = mask.dimensions();
    let (w, h) = (w as usize, h as usize);
    let data = mask.as_raw();
    let mut visited = vec![false; w * h];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for start in 0..w * h {
        if data[start] == 0 || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        let mut area = 0u32;

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            area += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = ny * w + nx;
                    if data[n] != 0 && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        regions.push(MotionRegion {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
            area,
        });
    }
    regions
}
