use anyhow::{anyhow, Result};

use crate::frame::{Frame, PixelFormat};

/// Convert a frame of any supported layout into packed RGB24.
pub(crate) fn normalize_to_rgb(frame: &Frame) -> Result<Vec<u8>> {
    let pixels = frame.pixels();
    match frame.format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Gray8 => Ok(pixels.iter().flat_map(|&p| [p, p, p]).collect()),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, frame.width, frame.height),
    }
}

/// Nearest-neighbour resize of a packed RGB24 buffer.
pub(crate) fn resize_rgb(
    rgb: &[u8],
    width: u32,
    height: u32,
    out_width: u32,
    out_height: u32,
) -> Result<Vec<u8>> {
    let expected = PixelFormat::Rgb24
        .frame_len(width, height)
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
    if rgb.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            rgb.len()
        ));
    }
    if out_width == 0 || out_height == 0 {
        return Err(anyhow!("resize target must be non-zero"));
    }
    if (width, height) == (out_width, out_height) {
        return Ok(rgb.to_vec());
    }

    let (w, h) = (width as usize, height as usize);
    let (ow, oh) = (out_width as usize, out_height as usize);
    let mut out = vec![0u8; ow * oh * 3];
    for y in 0..oh {
        let sy = (y * h / oh).min(h - 1);
        for x in 0..ow {
            let sx = (x * w / ow).min(w - 1);
            let src = (sy * w + sx) * 3;
            let dst = (y * ow + x) * 3;
            out[dst..dst + 3].copy_from_slice(&rgb[src..src + 3]);
        }
    }
    Ok(out)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if w % 2 != 0 || h % 2 != 0 || pixels.len() < y_plane + y_plane / 2 {
        return Err(anyhow!(
            "NV12 frame {}x{} needs even dimensions and {} bytes, got {}",
            width,
            height,
            y_plane + y_plane / 2,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let frame = Frame::new(nv12, 2, 2, PixelFormat::Nv12)?;

        let rgb = normalize_to_rgb(&frame)?;
        assert_eq!(rgb, vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn nv12_conversion_checks_layout() {
        assert!(nv12_to_rgb(&[128u8; 3], 2, 1).is_err());
        assert!(nv12_to_rgb(&[128u8; 5], 2, 2).is_err());
        assert!(nv12_to_rgb(&[128u8; 6], 2, 2).is_ok());
    }

    #[test]
    fn gray_expands_to_three_channels() -> Result<()> {
        let frame = Frame::new(vec![10, 200], 2, 1, PixelFormat::Gray8)?;
        let rgb = normalize_to_rgb(&frame)?;
        assert_eq!(rgb, vec![10, 10, 10, 200, 200, 200]);
        Ok(())
    }

    #[test]
    fn resize_halves_by_sampling() -> Result<()> {
        // 4x2 image, each pixel's red channel is its column index.
        let mut rgb = Vec::new();
        for _y in 0..2 {
            for x in 0..4u8 {
                rgb.extend_from_slice(&[x, 0, 0]);
            }
        }
        let out = resize_rgb(&rgb, 4, 2, 2, 1)?;
        assert_eq!(out, vec![0, 0, 0, 2, 0, 0]);
        Ok(())
    }

    #[test]
    fn resize_validates_length() {
        assert!(resize_rgb(&[0u8; 5], 1, 2, 1, 1).is_err());
    }
}
