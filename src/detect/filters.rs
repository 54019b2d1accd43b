//! Grayscale image filters used by the motion detector.
//!
//! All filters take and return `GrayImage`s of identical dimensions.

use image::GrayImage;

/// Gaussian sigma for a kernel size when no sigma is given, following the usual
/// `0.3 * ((k - 1) / 2 - 1) + 0.8` rule.
pub fn sigma_for_kernel(kernel_size: usize) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalised 1-D Gaussian kernel of odd length.
pub fn gaussian_kernel(kernel_size: usize) -> Vec<f32> {
    let sigma = sigma_for_kernel(kernel_size);
    let half = (kernel_size / 2) as isize;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Separable Gaussian blur with reflect-101 borders.
pub fn gaussian_blur(image: &GrayImage, kernel: &[f32]) -> GrayImage {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    let src = image.as_raw();
    let half = (kernel.len() / 2) as isize;

    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect101(x as isize + k as isize - half, w);
                acc += row[sx] as f32 * weight;
            }
            horizontal[y * w + x] = acc;
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect101(y as isize + k as isize - half, h);
                acc += horizontal[sy * w + x] * weight;
            }
            out[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    from_raw(w, h, out)
}

/// Per-pixel absolute difference.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (w, h) = a.dimensions();
    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&p, &q)| p.abs_diff(q))
        .collect();
    from_raw(w as usize, h as usize, data)
}

/// Binary threshold: pixels strictly above `threshold` become 255, the rest 0.
pub fn threshold(image: &GrayImage, threshold: u8) -> GrayImage {
    let (w, h) = image.dimensions();
    let data = image
        .as_raw()
        .iter()
        .map(|&v| if v > threshold { 255 } else { 0 })
        .collect();
    from_raw(w as usize, h as usize, data)
}

/// Dilate with a 3x3 square element, `iterations` times.
pub fn dilate(image: &GrayImage, iterations: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    let mut current = image.as_raw().clone();
    let mut scratch = vec![0u8; w * h];
    for _ in 0..iterations {
        for y in 0..h {
            for x in 0..w {
                let lo = x.saturating_sub(1);
                let hi = (x + 1).min(w - 1);
                scratch[y * w + x] = current[y * w + lo..=y * w + hi]
                    .iter()
                    .copied()
                    .max()
                    .unwrap_or(0);
            }
        }
        for y in 0..h {
            let lo = y.saturating_sub(1);
            let hi = (y + 1).min(h - 1);
            for x in 0..w {
                current[y * w + x] = (lo..=hi).map(|sy| scratch[sy * w + x]).max().unwrap_or(0);
            }
        }
    }
    from_raw(w, h, current)
}

fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
    }
    i as usize
}

fn from_raw(w: usize, h: usize, data: Vec<u8>) -> GrayImage {
    GrayImage::from_raw(w as u32, h as u32, data)
        .unwrap_or_else(|| GrayImage::new(w as u32, h as u32))
}
