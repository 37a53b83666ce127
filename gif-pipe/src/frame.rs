use image::RgbImage;

use crate::error::{PipeError, PipeResult};

/// Quantization speed for `gif::Frame::from_rgb_speed`, in the crate's
/// 1 (slowest, best palette) to 30 (fastest) range.
const QUANTIZE_SPEED: i32 = 10;

/// Decodes one fetched still (whatever format the service returned) into
/// RGB. `seq` only tags the error.
pub fn decode_still(seq: usize, bytes: &[u8]) -> PipeResult<RgbImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| PipeError::decode(seq, e.to_string()))?;
    Ok(image.to_rgb8())
}

/// One palette-indexed still with its own local palette, sized for the gif
/// container.
#[derive(Debug)]
pub struct PalettedImage {
    frame: gif::Frame<'static>,
}

impl PalettedImage {
    /// Quantizes an RGB still down to 256 indexed colors. Lossy.
    pub fn from_rgb(image: &RgbImage) -> PipeResult<Self> {
        let (width, height) = image.dimensions();
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(PipeError::encode(format!(
                "still is {width}x{height}, gif frames cap at {}",
                u16::MAX
            )));
        }
        let frame = gif::Frame::from_rgb_speed(
            width as u16,
            height as u16,
            image.as_raw(),
            QUANTIZE_SPEED,
        );
        Ok(Self { frame })
    }

    pub fn width(&self) -> u16 {
        self.frame.width
    }

    pub fn height(&self) -> u16 {
        self.frame.height
    }

    pub(crate) fn into_inner(self) -> gif::Frame<'static> {
        self.frame
    }
}

/// A paletted still tagged with its input position, the downloader-to-
/// collector hand-off unit.
pub struct Frame {
    pub seq: usize,
    pub image: PalettedImage,
}
