//! Sample-rate normalization using rubato
//!
//! The graph, the fallback element, and the output stream all run at one
//! fixed rate; the asset is converted once at load time.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

use crate::error::{Error, Result};

/// Standard playback sample rate.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Resample interleaved stereo audio to [`TARGET_SAMPLE_RATE`].
///
/// Returns a copy unchanged when the input is already at the target rate.
pub fn to_target_rate(input: &[f32], input_rate: u32) -> Result<Vec<f32>> {
    if input_rate == TARGET_SAMPLE_RATE {
        debug!("asset already at {TARGET_SAMPLE_RATE}Hz, skipping resample");
        return Ok(input.to_vec());
    }

    debug!("resampling asset from {input_rate}Hz to {TARGET_SAMPLE_RATE}Hz");

    let planar_input = deinterleave(input);
    let input_frames = planar_input[0].len();
    if input_frames == 0 {
        return Err(Error::Decode("cannot resample empty audio".to_string()));
    }

    let mut resampler = FastFixedIn::<f32>::new(
        TARGET_SAMPLE_RATE as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        2,
    )
    .map_err(|e| Error::Decode(format!("failed to create resampler: {e}")))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| Error::Decode(format!("resampling failed: {e}")))?;

    Ok(interleave(&planar_output))
}

fn deinterleave(input: &[f32]) -> Vec<Vec<f32>> {
    let frames = input.len() / 2;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for pair in input.chunks_exact(2) {
        left.push(pair[0]);
        right.push(pair[1]);
    }
    vec![left, right]
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar[0].len();
    let mut out = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        out.push(planar[0][i]);
        out.push(planar[1][i]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_at_target_rate() {
        let input = vec![0.5, -0.5, 0.25, -0.25];
        let output = to_target_rate(&input, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_upsample_length_ratio() {
        // 0.1s of 22.05kHz stereo
        let frames = 2205;
        let input = vec![0.1f32; frames * 2];
        let output = to_target_rate(&input, 22_050).unwrap();
        let out_frames = output.len() / 2;
        // Expect roughly 2x the frames
        let expected = frames * 2;
        assert!(
            (out_frames as i64 - expected as i64).unsigned_abs() < 64,
            "got {out_frames}, expected ~{expected}"
        );
    }

    #[test]
    fn test_deinterleave_roundtrip() {
        let input = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(interleave(&deinterleave(&input)), input);
    }
}
