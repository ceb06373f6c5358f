//! String textures.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use fontdue::{Font, FontSettings};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::decoded::DecodedImage;
use crate::error::{Result, TextureError};
use crate::format::PixelFormat;

/// Horizontal placement of the text inside a fixed canvas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TextAlignment {
    /// Flush with the left edge.
    #[default]
    Left,
    /// Centered.
    Center,
    /// Flush with the right edge.
    Right,
}

/// Everything needed to render a string again after a context loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontDefinition {
    /// Font file (TTF/OTF).
    pub face: PathBuf,
    /// Pixel size.
    pub size: f32,
    /// Placement inside `dimensions`.
    #[serde(default)]
    pub alignment: TextAlignment,
    /// Fixed canvas; the text's own extent is used when absent.
    #[serde(default)]
    pub dimensions: Option<(u32, u32)>,
    /// RGB fill for renderers that produce color pixels. Coverage-only
    /// renderers such as [`GlyphRasterizer`] ignore it and leave tinting to
    /// the shader.
    #[serde(default = "default_fill")]
    pub fill_color: [u8; 3],
}

fn default_fill() -> [u8; 3] {
    [255, 255, 255]
}

impl FontDefinition {
    /// Left-aligned white text at `size` pixels, sized to fit.
    pub fn new(face: impl Into<PathBuf>, size: f32) -> Self {
        Self {
            face: face.into(),
            size,
            alignment: TextAlignment::default(),
            dimensions: None,
            fill_color: default_fill(),
        }
    }
}

/// Rasterizes a string into pixels.
pub trait TextRenderer {
    /// Render `text` with `font`. Empty strings are an error.
    fn render(&self, text: &str, font: &FontDefinition)
    -> Result<DecodedImage>;
}

/// Single-line glyph rasterizer producing `A8` coverage images.
///
/// Output is coverage only, so [`FontDefinition::fill_color`] has no effect
/// on the pixels.
#[derive(Default)]
pub struct GlyphRasterizer {
    fonts: Mutex<HashMap<PathBuf, Arc<Font>>>,
}

impl GlyphRasterizer {
    /// Rasterizer with an empty font cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn font(&self, face: &Path) -> Result<Arc<Font>> {
        if let Some(font) = self.fonts.lock().get(face) {
            return Ok(Arc::clone(font));
        }

        let bytes =
            std::fs::read(face).map_err(|e| TextureError::from_io(face, e))?;
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(
            |e| TextureError::TextRender(format!("{}: {e}", face.display())),
        )?;
        let font = Arc::new(font);
        self.fonts.lock().insert(face.to_path_buf(), Arc::clone(&font));
        Ok(font)
    }
}

impl std::fmt::Debug for GlyphRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphRasterizer")
            .field("loaded_fonts", &self.fonts.lock().len())
            .finish()
    }
}

fn blank_canvas(width: u32, height: u32) -> Result<Vec<u8>> {
    let len = PixelFormat::A8.byte_len(width, height).ok_or_else(|| {
        TextureError::InvalidData(format!(
            "text canvas {width}x{height} is too large"
        ))
    })?;
    Ok(vec![0u8; len])
}

impl TextRenderer for GlyphRasterizer {
    fn render(
        &self,
        text: &str,
        def: &FontDefinition,
    ) -> Result<DecodedImage> {
        if text.is_empty() {
            return Err(TextureError::TextRender("empty string".into()));
        }
        if !def.size.is_finite() || def.size <= 0.0 {
            return Err(TextureError::TextRender(format!(
                "invalid font size {}",
                def.size
            )));
        }

        let font = self.font(&def.face)?;
        let (ascent, descent) = font
            .horizontal_line_metrics(def.size)
            .map(|m| (m.ascent, m.descent))
            .unwrap_or((def.size, 0.0));

        let glyphs: Vec<_> =
            text.chars().map(|c| font.rasterize(c, def.size)).collect();
        let text_width = glyphs
            .iter()
            .map(|(m, _)| m.advance_width)
            .sum::<f32>()
            .ceil()
            .max(1.0) as u32;
        let text_height = (ascent - descent).ceil().max(1.0) as u32;

        let (width, height) = def.dimensions.unwrap_or((text_width, text_height));
        let mut canvas = blank_canvas(width, height)?;

        let mut pen_x = match def.alignment {
            TextAlignment::Left => 0.0,
            TextAlignment::Center => {
                (width as f32 - text_width as f32).max(0.0) / 2.0
            }
            TextAlignment::Right => {
                (width as f32 - text_width as f32).max(0.0)
            }
        };
        let baseline = ascent.round() as i32;

        for (metrics, coverage) in &glyphs {
            let origin_x = pen_x.round() as i32 + metrics.xmin;
            let origin_y = baseline - metrics.ymin - metrics.height as i32;
            for row in 0..metrics.height {
                let y = origin_y + row as i32;
                if y < 0 || y >= height as i32 {
                    continue;
                }
                for col in 0..metrics.width {
                    let x = origin_x + col as i32;
                    if x < 0 || x >= width as i32 {
                        continue;
                    }
                    let dst = y as usize * width as usize + x as usize;
                    let src = coverage[row * metrics.width + col];
                    canvas[dst] = canvas[dst].max(src);
                }
            }
            pen_x += metrics.advance_width;
        }

        DecodedImage::new(width, height, PixelFormat::A8, canvas)
    }
}
