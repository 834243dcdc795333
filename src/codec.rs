//! PCM and base64 conversions for the Live API wire format.
//!
//! Outbound audio is 16-bit little-endian PCM wrapped in base64; inbound
//! audio uses the same layout at the playback rate. Everything here is pure.

use crate::defaults;
use crate::error::{ParleyError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Encode raw bytes as standard padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode standard base64 text.
///
/// # Errors
/// Returns `ParleyError::Decode` for characters outside the alphabet or bad padding.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    BASE64.decode(text).map_err(|e| ParleyError::Decode {
        message: format!("invalid base64: {}", e),
    })
}

/// Quantize `f32` samples to 16-bit little-endian PCM.
///
/// Each sample maps to `round(s * 32768)`. Values outside [-1, 1] saturate
/// at the i16 range instead of wrapping, so `1.0` becomes `32767`.
pub fn float_frame_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let scaled = (s * defaults::PCM16_SCALE).round();
        let value = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert 16-bit little-endian PCM back to `f32`, one vector per channel.
///
/// Interleaved sample `i` goes to channel `i % channel_count`.
///
/// # Errors
/// Returns `ParleyError::Decode` for an odd byte count or zero channels.
pub fn pcm16_to_float_frame(bytes: &[u8], channel_count: usize) -> Result<Vec<Vec<f32>>> {
    if channel_count == 0 {
        return Err(ParleyError::Decode {
            message: "channel count must be at least 1".to_string(),
        });
    }
    if bytes.len() % 2 != 0 {
        return Err(ParleyError::Decode {
            message: format!("PCM16 payload has odd length {}", bytes.len()),
        });
    }

    let frames = bytes.len() / 2 / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        channels[i % channel_count].push(sample as f32 / defaults::PCM16_SCALE);
    }
    Ok(channels)
}

/// One unit of base64-wrapped PCM audio plus its MIME descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    pub data: String,
    pub mime_type: String,
}

impl EncodedAudioChunk {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Encode one captured frame as an outbound 16 kHz chunk.
    pub fn from_frame(samples: &[f32]) -> Self {
        Self::new(
            encode_base64(&float_frame_to_pcm16(samples)),
            defaults::CAPTURE_MIME_TYPE,
        )
    }

    /// Decode to mono `f32` samples.
    ///
    /// # Errors
    /// Returns `ParleyError::Decode` for malformed base64 or odd-length PCM.
    pub fn decode_mono(&self) -> Result<Vec<f32>> {
        let bytes = decode_base64(&self.data)?;
        let mut channels = pcm16_to_float_frame(&bytes, 1)?;
        Ok(channels.pop().unwrap_or_default())
    }

    /// Number of PCM samples carried, without decoding the sample values.
    pub fn sample_count(&self) -> Result<usize> {
        Ok(decode_base64(&self.data)?.len() / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_base64_known_vector() {
        assert_eq!(encode_base64(b"hello"), "aGVsbG8=");
        assert_eq!(encode_base64(&[]), "");
    }

    #[test]
    fn test_decode_base64_rejects_non_alphabet_characters() {
        let result = decode_base64("aGVs*bG8=");
        match result {
            Err(ParleyError::Decode { message }) => {
                assert!(message.contains("invalid base64"), "got: {}", message);
            }
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_float_to_pcm16_rounds_and_is_little_endian() {
        let bytes = float_frame_to_pcm16(&[0.0, 0.5, -0.5, -1.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 16384);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -16384);
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), -32768);
    }

    #[test]
    fn test_float_to_pcm16_saturates_out_of_range_input() {
        let bytes = float_frame_to_pcm16(&[1.0, 1.5, -2.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), i16::MIN);
    }

    #[test]
    fn test_pcm16_to_float_deinterleaves_channels() {
        let mut bytes = Vec::new();
        for v in [16384i16, -16384, 8192, -8192] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let channels = pcm16_to_float_frame(&bytes, 2).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0], vec![0.5, 0.25]);
        assert_eq!(channels[1], vec![-0.5, -0.25]);
    }

    #[test]
    fn test_pcm16_to_float_rejects_odd_length() {
        assert!(matches!(
            pcm16_to_float_frame(&[1, 2, 3], 1),
            Err(ParleyError::Decode { .. })
        ));
    }

    #[test]
    fn test_pcm16_to_float_rejects_zero_channels() {
        assert!(matches!(
            pcm16_to_float_frame(&[0, 0], 0),
            Err(ParleyError::Decode { .. })
        ));
    }

    #[test]
    fn test_chunk_from_frame_uses_capture_mime() {
        let chunk = EncodedAudioChunk::from_frame(&[0.0; 4]);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(chunk.sample_count().unwrap(), 4);
    }

    #[test]
    fn test_chunk_decode_mono_reports_malformed_payload() {
        let chunk = EncodedAudioChunk::new("!!!", "audio/pcm;rate=24000");
        assert!(chunk.decode_mono().is_err());

        // "AA==" is a single byte: valid base64, invalid PCM16
        let odd = EncodedAudioChunk::new("AA==", "audio/pcm;rate=24000");
        assert!(matches!(odd.decode_mono(), Err(ParleyError::Decode { .. })));
    }

    proptest! {
        #[test]
        fn test_base64_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let text = encode_base64(&bytes);
            prop_assert_eq!(decode_base64(&text).unwrap(), bytes);
        }

        #[test]
        fn test_pcm16_round_trip_within_one_step(samples in proptest::collection::vec(-1.0f32..=1.0, 0..256)) {
            let bytes = float_frame_to_pcm16(&samples);
            prop_assert_eq!(bytes.len(), samples.len() * 2);
            let decoded = pcm16_to_float_frame(&bytes, 1).unwrap().pop().unwrap();
            prop_assert_eq!(decoded.len(), samples.len());
            for (original, restored) in samples.iter().zip(decoded.iter()) {
                prop_assert!((original - restored).abs() <= 1.0 / 32768.0 + f32::EPSILON);
            }
        }
    }
}
