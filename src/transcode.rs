//! Interleaving transcoder.
//!
//! Converts between the driver's buffer layout — one memory region per
//! channel, double-buffered — and a single interleaved byte stream suitable
//! for file I/O. Both directions are pure transformations over fixed-size
//! buffers, completing in time proportional to `frames * channels` and
//! allocating nothing beyond the output vector.
//!
//! Size mismatches here indicate a logic defect rather than bad input: they
//! are logged and then terminate the process instead of surfacing as an
//! ordinary run failure.

use tracing::error;

use crate::driver::{BufferDescriptor, BufferHalf, Direction};

/// Gathers the selected half of every input-direction buffer into one
/// interleaved byte stream.
///
/// Buffers flagged as input are selected in their original order. Frames are
/// emitted frame-major: one sample from each selected channel, then the
/// next frame, with each channel's source advancing `sample_width` bytes per
/// frame. The output length is exactly `frames * channels * sample_width`.
///
/// Aborts the process if any selected channel's region cannot supply
/// `frames` samples.
pub fn to_interleaved(
    buffers: &[BufferDescriptor],
    sample_width: usize,
    frames: usize,
    half: BufferHalf,
) -> Vec<u8> {
    let sources: Vec<&BufferDescriptor> = buffers
        .iter()
        .filter(|buffer| buffer.direction() == Direction::Input)
        .collect();

    let stride = sources.len() * sample_width;
    let mut interleaved = vec![0; frames * stride];

    for (slot, source) in sources.iter().enumerate() {
        let region = source.half(half);
        let needed = frames * sample_width;
        if region.len() < needed {
            error!(
                channel = source.channel(),
                available = region.len(),
                needed,
                "channel buffer too small for requested frame count"
            );
            std::process::abort();
        }
        for frame in 0..frames {
            let src = frame * sample_width;
            let dst = frame * stride + slot * sample_width;
            interleaved[dst..dst + sample_width].copy_from_slice(&region[src..src + sample_width]);
        }
    }

    interleaved
}

/// Scatters an interleaved byte stream into the selected half of every
/// output-direction buffer.
///
/// The inverse of [`to_interleaved`]: buffers flagged as output are selected
/// in their original order and receive one sample per frame each.
///
/// Aborts the process if `interleaved` is not an exact multiple of
/// `channels * sample_width`, or if any selected channel's region cannot
/// hold the scattered frames.
pub fn from_interleaved(
    interleaved: &[u8],
    buffers: &[BufferDescriptor],
    sample_width: usize,
    half: BufferHalf,
) {
    let sinks: Vec<&BufferDescriptor> = buffers
        .iter()
        .filter(|buffer| buffer.direction() == Direction::Output)
        .collect();

    let stride = sinks.len() * sample_width;
    if stride == 0 {
        if !interleaved.is_empty() {
            error!(
                bytes = interleaved.len(),
                "interleaved data supplied with no output channels"
            );
            std::process::abort();
        }
        return;
    }
    if interleaved.len() % stride != 0 {
        error!(
            bytes = interleaved.len(),
            stride, "interleaved length is not a whole number of frames"
        );
        std::process::abort();
    }

    let frames = interleaved.len() / stride;
    for (slot, sink) in sinks.iter().enumerate() {
        let mut region = sink.half(half);
        let needed = frames * sample_width;
        if region.len() < needed {
            error!(
                channel = sink.channel(),
                available = region.len(),
                needed,
                "channel buffer too small for interleaved data"
            );
            std::process::abort();
        }
        for frame in 0..frames {
            let src = frame * stride + slot * sample_width;
            let dst = frame * sample_width;
            region[dst..dst + sample_width].copy_from_slice(&interleaved[src..src + sample_width]);
        }
    }
}
