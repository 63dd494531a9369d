//! Region reads from slide rasters.
//!
//! Regions follow the OpenSlide convention: the origin is given in level-0
//! pixel coordinates and the size in pixels of the requested level. Pixels
//! outside the slide come back transparent.
//!
//! [`RasterSlide`] decodes the full level-0 raster up front, so it suits slides
//! that fit in memory (single-image TIFF `.svs` exports, PNG, JPEG). Pyramidal
//! slides too large to decode whole need another [`SlideReader`].

use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::path::Path;

use crate::error::{PrepError, Result};

/// A rectangular read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub level: usize,
    pub width: u32,
    pub height: u32,
}

/// Source of pixel regions from a (possibly multi-resolution) slide
pub trait SlideReader {
    /// Level-0 width and height
    fn dimensions(&self) -> (u32, u32);

    fn level_count(&self) -> usize;

    /// Scale factor between level 0 and `level`
    fn level_downsample(&self, level: usize) -> Option<f64>;

    fn read_region(&self, region: &Region) -> Result<RgbaImage>;
}

/// A slide backed by a single decoded raster; coarser levels are derived by
/// halving the resolution on demand.
pub struct RasterSlide {
    base: RgbaImage,
    levels: usize,
}

impl RasterSlide {
    /// Decode any raster format the `image` crate understands. The format is
    /// sniffed from the file content, so `.svs` and other TIFF containers open
    /// regardless of their extension.
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| PrepError::io_at(path, e))?
            .decode()?;
        log::info!(
            "Opened slide {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        Ok(Self::from_image(decoded.into_rgba8()))
    }

    pub fn from_image(base: RgbaImage) -> Self {
        let (width, height) = base.dimensions();
        let mut levels = 1;
        while (width >> levels) >= 1 && (height >> levels) >= 1 && levels < 32 {
            levels += 1;
        }
        Self { base, levels }
    }

    // Copy the level-0 window into a transparent canvas
    fn read_level0(&self, x: i64, y: i64, width: u32, height: u32) -> RgbaImage {
        let mut canvas = RgbaImage::new(width, height);
        let (slide_width, slide_height) = self.base.dimensions();

        let left = x.max(0);
        let top = y.max(0);
        let right = (x + width as i64).min(slide_width as i64);
        let bottom = (y + height as i64).min(slide_height as i64);
        if left >= right || top >= bottom {
            return canvas;
        }

        let overlap = imageops::crop_imm(
            &self.base,
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
        .to_image();
        imageops::replace(&mut canvas, &overlap, left - x, top - y);
        canvas
    }
}

impl SlideReader for RasterSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.base.dimensions()
    }

    fn level_count(&self) -> usize {
        self.levels
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        (level < self.levels).then(|| (1u64 << level) as f64)
    }

    fn read_region(&self, region: &Region) -> Result<RgbaImage> {
        if region.width == 0 || region.height == 0 {
            return Err(PrepError::InvalidRegion(format!(
                "empty region {}x{} at ({}, {})",
                region.width, region.height, region.x, region.y
            )));
        }
        if region.level >= self.levels {
            return Err(PrepError::InvalidRegion(format!(
                "level {} out of range (slide has {} levels)",
                region.level, self.levels
            )));
        }

        if region.level == 0 {
            return Ok(self.read_level0(region.x, region.y, region.width, region.height));
        }

        let factor = 1u32 << region.level;
        let window = self.read_level0(
            region.x,
            region.y,
            region.width.saturating_mul(factor),
            region.height.saturating_mul(factor),
        );
        Ok(imageops::resize(
            &window,
            region.width,
            region.height,
            FilterType::Triangle,
        ))
    }
}
