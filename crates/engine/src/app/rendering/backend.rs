use thiserror::Error;

use crate::graphics::Texture;
use crate::types::{Color, ScreenRect, Size};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pixel surface error: {0}")]
    Surface(#[from] pixels::Error),
}

/// Drawing surface the renderer submits to. Coordinates are window pixels.
pub trait RenderBackend {
    fn window_size(&self) -> Size;

    /// Ignores zero sizes.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    fn clear(&mut self, color: Color);

    /// Copies `src` of `texture` into `dst`, scaling to fit, mirrored when
    /// `flip` is set and multiplied channel-wise by `color_mod`.
    fn draw_textured(
        &mut self,
        texture: &Texture,
        src: ScreenRect,
        dst: ScreenRect,
        flip: bool,
        color_mod: Color,
    );

    fn draw_rect(&mut self, rect: ScreenRect, color: Color, filled: bool);

    fn draw_circle(&mut self, center_x: i32, center_y: i32, radius: i32, color: Color);

    fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Color);

    fn present(&mut self) -> Result<(), RenderError>;
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum DrawCall {
        Clear,
        Textured {
            texture_size: (u32, u32),
            dst: ScreenRect,
            flip: bool,
            color_mod: Color,
        },
        Rect {
            rect: ScreenRect,
            filled: bool,
        },
        Circle {
            center: (i32, i32),
            radius: i32,
        },
        Line {
            from: (i32, i32),
            to: (i32, i32),
        },
        Present,
    }

    /// Remembers every call in submission order.
    #[derive(Debug)]
    pub struct RecordingBackend {
        pub size: Size,
        pub calls: Vec<DrawCall>,
    }

    impl RecordingBackend {
        pub fn new(width: i32, height: i32) -> Self {
            Self {
                size: Size::new(width, height),
                calls: Vec::new(),
            }
        }

        pub fn textured(&self) -> Vec<ScreenRect> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    DrawCall::Textured { dst, .. } => Some(*dst),
                    _ => None,
                })
                .collect()
        }
    }

    impl RenderBackend for RecordingBackend {
        fn window_size(&self) -> Size {
            self.size
        }

        fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
            if width > 0 && height > 0 {
                self.size = Size::new(width as i32, height as i32);
            }
            Ok(())
        }

        fn clear(&mut self, _color: Color) {
            self.calls.clear();
            self.calls.push(DrawCall::Clear);
        }

        fn draw_textured(
            &mut self,
            texture: &Texture,
            _src: ScreenRect,
            dst: ScreenRect,
            flip: bool,
            color_mod: Color,
        ) {
            self.calls.push(DrawCall::Textured {
                texture_size: (texture.width, texture.height),
                dst,
                flip,
                color_mod,
            });
        }

        fn draw_rect(&mut self, rect: ScreenRect, _color: Color, filled: bool) {
            self.calls.push(DrawCall::Rect { rect, filled });
        }

        fn draw_circle(&mut self, center_x: i32, center_y: i32, radius: i32, _color: Color) {
            self.calls.push(DrawCall::Circle {
                center: (center_x, center_y),
                radius,
            });
        }

        fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), _color: Color) {
            self.calls.push(DrawCall::Line { from, to });
        }

        fn present(&mut self) -> Result<(), RenderError> {
            self.calls.push(DrawCall::Present);
            Ok(())
        }
    }
}
