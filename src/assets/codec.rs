use std::io::Cursor;

use anyhow::Context;

use crate::foundation::error::{GenError, GenResult};

/// Decoded raster in premultiplied RGBA8, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Vec<u8>,
}

impl PixelBuffer {
    /// Fully transparent canvas.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba8_premul: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Premultiplied pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let p = &self.rgba8_premul[i..i + 4];
        [p[0], p[1], p[2], p[3]]
    }
}

/// Everything the generator needs from an image library.
pub trait ImageCodec: Send + Sync {
    /// File extension of encoded output, without the dot.
    fn extension(&self) -> &'static str;

    /// MIME type of encoded output.
    fn mime_type(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> GenResult<PixelBuffer>;

    /// Nearest-neighbor resample to `width` x `height`.
    fn scale(&self, buf: &PixelBuffer, width: u32, height: u32) -> GenResult<PixelBuffer>;

    /// Source-over blend `overlay` onto `base` with its top-left corner at `origin`.
    /// Pixels falling outside `base` are clipped.
    fn composite(
        &self,
        base: &mut PixelBuffer,
        overlay: &PixelBuffer,
        origin: (u32, u32),
    ) -> GenResult<()>;

    fn encode(&self, buf: &PixelBuffer) -> GenResult<Vec<u8>>;
}

/// PNG codec backed by the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn mime_type(&self) -> &'static str {
        "image/png"
    }

    fn decode(&self, bytes: &[u8]) -> GenResult<PixelBuffer> {
        let dyn_img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|e| GenError::codec(format!("decode png: {e}")))?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut rgba8_premul = rgba.into_raw();
        premultiply_rgba8_in_place(&mut rgba8_premul);

        Ok(PixelBuffer {
            width,
            height,
            rgba8_premul,
        })
    }

    fn scale(&self, buf: &PixelBuffer, width: u32, height: u32) -> GenResult<PixelBuffer> {
        if buf.width == width && buf.height == height {
            return Ok(buf.clone());
        }
        if buf.width == 0 || buf.height == 0 {
            return Ok(PixelBuffer::transparent(width, height));
        }
        // Nearest-neighbor never mixes samples, so premultiplied data survives untouched.
        let src = image::RgbaImage::from_raw(buf.width, buf.height, buf.rgba8_premul.clone())
            .ok_or_else(|| GenError::codec("pixel buffer length does not match dimensions"))?;
        let scaled =
            image::imageops::resize(&src, width, height, image::imageops::FilterType::Nearest);
        Ok(PixelBuffer {
            width,
            height,
            rgba8_premul: scaled.into_raw(),
        })
    }

    fn composite(
        &self,
        base: &mut PixelBuffer,
        overlay: &PixelBuffer,
        origin: (u32, u32),
    ) -> GenResult<()> {
        let expected = |b: &PixelBuffer| b.width as usize * b.height as usize * 4;
        if base.rgba8_premul.len() != expected(base)
            || overlay.rgba8_premul.len() != expected(overlay)
        {
            return Err(GenError::codec("composite expects buffers matching width*height*4"));
        }

        let (ox, oy) = origin;
        let cols = overlay.width.min(base.width.saturating_sub(ox)) as usize;
        let rows = overlay.height.min(base.height.saturating_sub(oy));
        if cols == 0 {
            return Ok(());
        }
        for row in 0..rows {
            let src_start = row as usize * overlay.width as usize * 4;
            let dst_start = ((oy + row) as usize * base.width as usize + ox as usize) * 4;
            let src = &overlay.rgba8_premul[src_start..src_start + cols * 4];
            let dst = &mut base.rgba8_premul[dst_start..dst_start + cols * 4];
            for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
                d.copy_from_slice(&out);
            }
        }
        Ok(())
    }

    fn encode(&self, buf: &PixelBuffer) -> GenResult<Vec<u8>> {
        let mut straight = buf.rgba8_premul.clone();
        unpremultiply_rgba8_in_place(&mut straight);
        let img = image::RgbaImage::from_raw(buf.width, buf.height, straight)
            .ok_or_else(|| GenError::codec("pixel buffer length does not match dimensions"))?;

        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .context("encode png")
            .map_err(|e| GenError::codec(format!("{e:#}")))?;
        Ok(out)
    }
}

/// Premultiplied source-over.
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = add_sat_u8(u16::from(src[i]), mul_div255(u16::from(dst[i]), inv));
    }
    out
}

fn mul_div255(a: u16, b: u16) -> u16 {
    (a * b + 127) / 255
}

fn add_sat_u8(a: u16, b: u16) -> u8 {
    (a + b).min(255) as u8
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = mul_div255(px[0] as u16, a) as u8;
        px[1] = mul_div255(px[1] as u16, a) as u8;
        px[2] = mul_div255(px[2] as u16, a) as u8;
    }
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u16 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/codec.rs"]
mod tests;
