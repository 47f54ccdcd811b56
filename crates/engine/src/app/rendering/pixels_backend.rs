use pixels::{Pixels, SurfaceTexture};
use winit::window::Window;

use crate::graphics::Texture;
use crate::types::{Color, ScreenRect, Size};

use super::backend::{RenderBackend, RenderError};

/// Software rasteriser over a `pixels` frame buffer.
pub struct PixelsBackend {
    window: &'static Window,
    pixels: Pixels<'static>,
    width: u32,
    height: u32,
}

impl PixelsBackend {
    pub fn new(window: &'static Window) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(window, size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            width: size.width,
            height: size.height,
        })
    }

    pub fn window(&self) -> &'static Window {
        self.window
    }

    fn build_pixels(
        window: &'static Window,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, RenderError> {
        let surface = SurfaceTexture::new(width, height, window);
        Ok(Pixels::new(width, height, surface)?)
    }
}

impl RenderBackend for PixelsBackend {
    fn window_size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(self.window, width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn clear(&mut self, color: Color) {
        let color = color.to_array();
        for pixel in self.pixels.frame_mut().chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    fn draw_textured(
        &mut self,
        texture: &Texture,
        src: ScreenRect,
        dst: ScreenRect,
        flip: bool,
        color_mod: Color,
    ) {
        let (width, height) = (self.width, self.height);
        blit(self.pixels.frame_mut(), width, height, texture, src, dst, flip, color_mod);
    }

    fn draw_rect(&mut self, rect: ScreenRect, color: Color, filled: bool) {
        let width = self.width as usize;
        let frame = self.pixels.frame_mut();
        if filled {
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    blend_pixel_clipped(frame, width, x, y, color.to_array());
                }
            }
            return;
        }
        let color = color.to_array();
        for x in rect.x..rect.right() {
            write_pixel_rgba_clipped(frame, width, x, rect.y, color);
            write_pixel_rgba_clipped(frame, width, x, rect.bottom() - 1, color);
        }
        for y in rect.y..rect.bottom() {
            write_pixel_rgba_clipped(frame, width, rect.x, y, color);
            write_pixel_rgba_clipped(frame, width, rect.right() - 1, y, color);
        }
    }

    fn draw_circle(&mut self, center_x: i32, center_y: i32, radius: i32, color: Color) {
        if radius <= 0 {
            return;
        }
        let width = self.width as usize;
        let frame = self.pixels.frame_mut();
        let color = color.to_array();
        // Midpoint circle.
        let (mut x, mut y, mut err) = (radius, 0, 1 - radius);
        while x >= y {
            for (dx, dy) in [
                (x, y),
                (y, x),
                (-y, x),
                (-x, y),
                (-x, -y),
                (-y, -x),
                (y, -x),
                (x, -y),
            ] {
                write_pixel_rgba_clipped(frame, width, center_x + dx, center_y + dy, color);
            }
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
    }

    fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Color) {
        let width = self.width as usize;
        let frame = self.pixels.frame_mut();
        let color = color.to_array();
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let step_x = if x < to.0 { 1 } else { -1 };
        let step_y = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            write_pixel_rgba_clipped(frame, width, x, y, color);
            if (x, y) == to {
                break;
            }
            let doubled = 2 * err;
            if doubled >= dy {
                err += dy;
                x += step_x;
            }
            if doubled <= dx {
                err += dx;
                y += step_y;
            }
        }
    }

    fn present(&mut self) -> Result<(), RenderError> {
        Ok(self.pixels.render()?)
    }
}

/// Nearest-neighbour scaled copy with alpha blending. Fully transparent
/// source pixels are skipped.
#[allow(clippy::too_many_arguments)]
fn blit(
    frame: &mut [u8],
    width: u32,
    height: u32,
    texture: &Texture,
    src: ScreenRect,
    dst: ScreenRect,
    flip: bool,
    color_mod: Color,
) {
    if !src.has_area() || !dst.has_area() || width == 0 || height == 0 {
        return;
    }
    let bounds = texture.bounds();
    if src.x < 0 || src.y < 0 || src.right() > bounds.w || src.bottom() > bounds.h {
        return;
    }

    let draw_left = dst.x.max(0);
    let draw_top = dst.y.max(0);
    let draw_right = dst.right().min(width as i32);
    let draw_bottom = dst.bottom().min(height as i32);
    if draw_left >= draw_right || draw_top >= draw_bottom {
        return;
    }

    let scale_x = src.w as f32 / dst.w as f32;
    let scale_y = src.h as f32 / dst.h as f32;
    let texture_width = texture.width as usize;
    let frame_width = width as usize;

    for out_y in draw_top..draw_bottom {
        let dy = out_y - dst.y;
        let src_y = ((dy as f32 * scale_y).floor() as i32).min(src.h - 1) + src.y;
        let src_row = src_y as usize * texture_width * 4;
        let dst_row = out_y as usize * frame_width * 4;
        for out_x in draw_left..draw_right {
            let dx = out_x - dst.x;
            let mut sx = ((dx as f32 * scale_x).floor() as i32).min(src.w - 1);
            if flip {
                sx = src.w - 1 - sx;
            }
            let src_offset = src_row + (src.x + sx) as usize * 4;
            let Some(texel) = texture.rgba.get(src_offset..src_offset + 4) else {
                continue;
            };
            let color = modulate([texel[0], texel[1], texel[2], texel[3]], color_mod);
            if color[3] == 0 {
                continue;
            }
            let dst_offset = dst_row + out_x as usize * 4;
            if let Some(target) = frame.get_mut(dst_offset..dst_offset + 4) {
                blend(target, color);
            }
        }
    }
}

fn modulate(texel: [u8; 4], color_mod: Color) -> [u8; 4] {
    let scale = |channel: u8, factor: u8| ((channel as u16 * factor as u16) / 255) as u8;
    [
        scale(texel[0], color_mod.r),
        scale(texel[1], color_mod.g),
        scale(texel[2], color_mod.b),
        scale(texel[3], color_mod.a),
    ]
}

fn blend(target: &mut [u8], color: [u8; 4]) {
    let alpha = color[3] as u16;
    if alpha == 255 {
        target.copy_from_slice(&color);
        return;
    }
    for channel in 0..3 {
        let blended = (color[channel] as u16 * alpha + target[channel] as u16 * (255 - alpha)) / 255;
        target[channel] = blended as u8;
    }
    target[3] = 255;
}

fn blend_pixel_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let offset = (y as usize * width + x as usize) * 4;
    if let Some(target) = frame.get_mut(offset..offset + 4) {
        blend(target, color);
    }
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Texture {
        let mut texture = Texture::new(2, 1);
        texture.set_pixel(0, 0, [255, 0, 0, 255]);
        texture.set_pixel(1, 0, [0, 0, 255, 255]);
        texture
    }

    fn pixel(frame: &[u8], width: u32, x: usize, y: usize) -> [u8; 4] {
        let offset = (y * width as usize + x) * 4;
        [frame[offset], frame[offset + 1], frame[offset + 2], frame[offset + 3]]
    }

    #[test]
    fn blit_scales_and_flips() {
        let mut frame = vec![0; 4 * 4 * 4];
        let texture = checker();
        blit(
            &mut frame,
            4,
            4,
            &texture,
            ScreenRect::new(0, 0, 2, 1),
            ScreenRect::new(0, 0, 4, 2),
            true,
            Color::WHITE,
        );
        assert_eq!(pixel(&frame, 4, 0, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&frame, 4, 1, 1), [0, 0, 255, 255]);
        assert_eq!(pixel(&frame, 4, 3, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&frame, 4, 0, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn blit_clips_to_the_frame_and_applies_color_mod() {
        let mut frame = vec![0; 2 * 2 * 4];
        let texture = checker();
        blit(
            &mut frame,
            2,
            2,
            &texture,
            ScreenRect::new(0, 0, 2, 1),
            ScreenRect::new(-1, 1, 2, 1),
            false,
            Color::rgba(255, 255, 255, 255),
        );
        assert_eq!(pixel(&frame, 2, 0, 1), [0, 0, 255, 255]);
        assert_eq!(pixel(&frame, 2, 1, 1), [0, 0, 0, 0]);

        let mut frame = vec![0; 4];
        blit(
            &mut frame,
            1,
            1,
            &texture,
            ScreenRect::new(0, 0, 1, 1),
            ScreenRect::new(0, 0, 1, 1),
            false,
            Color::rgba(128, 255, 255, 255),
        );
        assert_eq!(pixel(&frame, 1, 0, 0), [128, 0, 0, 255]);
    }

    #[test]
    fn source_rect_outside_texture_draws_nothing() {
        let mut frame = vec![0; 4 * 4];
        blit(
            &mut frame,
            2,
            2,
            &checker(),
            ScreenRect::new(1, 0, 2, 1),
            ScreenRect::new(0, 0, 2, 2),
            false,
            Color::WHITE,
        );
        assert!(frame.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn translucent_pixels_blend_with_the_frame() {
        let mut target = [0, 0, 200, 255];
        blend(&mut target, [200, 0, 0, 128]);
        assert_eq!(target, [100, 0, 99, 255]);
    }

    #[test]
    fn out_of_range_writes_are_ignored() {
        let mut frame = vec![0; 4];
        write_pixel_rgba_clipped(&mut frame, 1, 1, 0, [9, 9, 9, 9]);
        write_pixel_rgba_clipped(&mut frame, 1, 0, 1, [9, 9, 9, 9]);
        write_pixel_rgba_clipped(&mut frame, 1, -1, 0, [9, 9, 9, 9]);
        assert_eq!(frame, vec![0; 4]);
    }
}
