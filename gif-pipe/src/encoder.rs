use std::fs::File;
use std::io::Write;
use std::path::Path;

use gif::{Encoder, Repeat};

use crate::error::{PipeError, PipeResult};
use crate::frame::PalettedImage;

/// Writes the ordered frames, their parallel centisecond delays and the
/// repeat count (`0` = loop forever) into one animated gif. Every frame
/// carries its own palette, the container keeps no global one.
pub fn encode_gif<W: Write>(
    writer: W,
    frames: Vec<PalettedImage>,
    delays: &[u16],
    loop_count: u16,
) -> PipeResult<()> {
    if frames.is_empty() {
        return Err(PipeError::encode("no frames"));
    }
    if frames.len() != delays.len() {
        return Err(PipeError::encode(format!(
            "{} frames but {} delays",
            frames.len(),
            delays.len()
        )));
    }

    // The first frame fixes the canvas
    let width = frames[0].width();
    let height = frames[0].height();
    for (idx, frame) in frames.iter().enumerate() {
        if frame.width() != width || frame.height() != height {
            return Err(PipeError::encode(format!(
                "frame {idx} is {}x{}, the canvas is {width}x{height}",
                frame.width(),
                frame.height()
            )));
        }
    }

    let mut encoder = Encoder::new(writer, width, height, &[])?;
    encoder.set_repeat(match loop_count {
        0 => Repeat::Infinite,
        n => Repeat::Finite(n),
    })?;

    for (image, delay) in frames.into_iter().zip(delays) {
        let mut frame = image.into_inner();
        frame.delay = *delay;
        encoder.write_frame(&frame)?;
    }

    Ok(())
}

/// [`encode_gif`] straight into `path`, created or truncated.
pub fn write_gif_file(
    path: &Path,
    frames: Vec<PalettedImage>,
    delays: &[u16],
    loop_count: u16,
) -> PipeResult<()> {
    let file = File::create(path)?;
    encode_gif(file, frames, delays, loop_count)
}
