//! Audio decoding using symphonia
//!
//! Decodes the fetched asset bytes in one pass to interleaved stereo f32 at
//! the payload's native rate. Mono is duplicated to stereo, multi-channel is
//! downmixed. The engine plays exactly one fixed source, so there is no
//! streaming decode path: the whole asset lives in memory.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Decode an in-memory payload to interleaved stereo f32.
///
/// Returns the samples and their native sample rate. Fails with
/// [`Error::Decode`] on malformed or unsupported payloads.
pub fn decode_to_stereo(bytes: Vec<u8>, hint_ext: Option<&str>) -> Result<(Vec<f32>, u32)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("unrecognized container: {e}")))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| Error::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("payload reports no sample rate".to_string()))?;
    let channels = codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| Error::Decode("payload reports no channel layout".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("unsupported codec: {e}")))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(Error::Decode(format!("packet read failed: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(buf.samples());
                }
            }
            // Corrupt frames are skippable; the loop hides a dropout far
            // better than a failed load would.
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("skipping corrupt packet: {e}");
            }
            Err(e) => return Err(Error::Decode(format!("decode failed: {e}"))),
        }
    }

    if interleaved.is_empty() {
        return Err(Error::Decode("payload produced no audio".to_string()));
    }

    let stereo = to_stereo(&interleaved, channels);
    debug!(
        frames = stereo.len() / 2,
        sample_rate, channels, "decoded asset"
    );

    Ok((stereo, sample_rate))
}

/// Normalize interleaved samples of any channel count to stereo.
fn to_stereo(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => interleaved.to_vec(),
        1 => {
            let mut stereo = Vec::with_capacity(interleaved.len() * 2);
            for &sample in interleaved {
                stereo.push(sample);
                stereo.push(sample);
            }
            stereo
        }
        n => {
            // Downmix: even channels left, odd channels right
            let frames = interleaved.len() / n;
            let half = (n as f32 / 2.0).max(1.0);
            let mut stereo = Vec::with_capacity(frames * 2);
            for frame in interleaved.chunks_exact(n) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for (ch, &sample) in frame.iter().enumerate() {
                    if ch % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                stereo.push(left / half);
                stereo.push(right / half);
            }
            stereo
        }
    }
}
