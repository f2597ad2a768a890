/// RMS amplitude computation and G.711 decode, used by the endpointer
/// to gate voice-activity detection regardless of uplink codec.
use tracing::warn;

/// Audio codec tag for an uplink stream. Determines how RMS volume is
/// computed and the default silence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Pcm16Le,
    G711ULaw,
    G711ALaw,
}

impl AudioCodec {
    /// Default silence threshold for this codec (spec §4.C).
    pub fn default_silence_threshold(self) -> f64 {
        match self {
            AudioCodec::Pcm16Le => 500.0,
            AudioCodec::G711ULaw | AudioCodec::G711ALaw => 1000.0,
        }
    }

    /// RMS amplitude of a raw uplink payload for this codec.
    pub fn rms(self, buf: &[u8]) -> f64 {
        match self {
            AudioCodec::Pcm16Le => rms_pcm16le(buf),
            AudioCodec::G711ULaw => rms_g711(buf, G711Codec::ULaw),
            AudioCodec::G711ALaw => rms_g711(buf, G711Codec::ALaw),
        }
    }
}

/// RMS amplitude of a PCM16LE buffer. Returns 0 (and logs) if the
/// buffer length is not a multiple of 2, matching the original's
/// `calculateVolumePCM16` guard.
pub fn rms_pcm16le(buf: &[u8]) -> f64 {
    if buf.len() % 2 != 0 {
        warn!(len = buf.len(), "PCM16 buffer length is not a multiple of 2");
        return 0.0;
    }
    if buf.is_empty() {
        return 0.0;
    }

    let n = buf.len() / 2;
    let mut sum_sq = 0.0f64;
    for i in 0..n {
        let sample = i16::from_le_bytes([buf[i * 2], buf[i * 2 + 1]]) as f64;
        sum_sq += sample * sample;
    }
    (sum_sq / (n as f64)).sqrt()
}

/// Which G.711 companding law to decode a byte stream with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711Codec {
    ULaw,
    ALaw,
}

/// Decode a single G.711 µ-law byte to 16-bit signed linear PCM.
///
/// Ported bit-for-bit from `packages/audiosocket/g711.go`'s
/// `ulawToLinear`, which matches the standard ITU-T decode.
pub fn ulaw_to_linear(ulaw: u8) -> i16 {
    let ulaw = ulaw ^ 0xff;
    let sign = (ulaw & 0x80) as i16;
    let exponent = ((ulaw >> 4) & 0x07) as i16;
    let mantissa = (ulaw & 0x0f) as i16;

    let mut value = (mantissa << 4) + 0x08;
    if exponent != 0 {
        value += 0x100;
        value <<= exponent - 1;
    }
    if sign != 0 { -value } else { value }
}

/// Decode a single G.711 A-law byte to 16-bit signed linear PCM.
///
/// Ported bit-for-bit from `packages/audiosocket/g711.go`'s
/// `alawToLinear` (bias 0x84, sign/segment/mantissa fields, XOR 0x55).
pub fn alaw_to_linear(alaw: u8) -> i16 {
    const QUANT_MASK: u8 = 0x0f;
    const SEG_MASK: u8 = 0x70;
    const SEG_SHIFT: u8 = 4;
    const BIAS: i16 = 0x84;

    let alaw = alaw ^ 0x55;

    let segment = (alaw & SEG_MASK) >> SEG_SHIFT;
    let mantissa = alaw & QUANT_MASK;
    let mut linear = ((mantissa as i16) << 4) + BIAS;

    if segment != 0 {
        linear += 0x100i16 << (segment - 1);
    }

    if alaw & 0x80 != 0 { -linear } else { linear }
}

/// RMS amplitude of a raw G.711-encoded buffer, decoding each byte via
/// the selected companding law before squaring.
pub fn rms_g711(buf: &[u8], codec: G711Codec) -> f64 {
    if buf.is_empty() {
        return 0.0;
    }

    let decode = match codec {
        G711Codec::ULaw => ulaw_to_linear,
        G711Codec::ALaw => alaw_to_linear,
    };

    let mut sum_sq = 0.0f64;
    for &b in buf {
        let sample = decode(b) as f64;
        sum_sq += sample * sample;
    }
    (sum_sq / (buf.len() as f64)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16_from_i16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn rms_of_zero_buffer_is_zero() {
        assert_eq!(rms_pcm16le(&[0u8; 64]), 0.0);
    }

    #[test]
    fn rms_of_odd_length_buffer_is_zero() {
        assert_eq!(rms_pcm16le(&[1, 2, 3]), 0.0);
    }

    #[test]
    fn rms_of_constant_sample_equals_its_magnitude() {
        let buf = pcm16_from_i16(&[1000; 50]);
        let rms = rms_pcm16le(&buf);
        assert!((rms - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn rms_of_constant_negative_sample_equals_its_magnitude() {
        let buf = pcm16_from_i16(&[-1000; 50]);
        let rms = rms_pcm16le(&buf);
        assert!((rms - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn rms_is_never_negative() {
        let buf = pcm16_from_i16(&[-32768, 32767, 0, -1, 1]);
        assert!(rms_pcm16le(&buf) >= 0.0);
    }

    // ITU-T reference vectors: encode(decode(x)) should be idempotent for
    // the canonical code points, and silence must decode to (near) zero.
    #[test]
    fn ulaw_silence_decodes_near_zero() {
        // 0xFF is µ-law's "positive zero" code.
        let v = ulaw_to_linear(0xff);
        assert!(v.abs() <= 8, "expected near-zero, got {v}");
    }

    #[test]
    fn ulaw_max_negative_decodes_to_large_magnitude() {
        // 0x00 is µ-law's most negative code.
        let v = ulaw_to_linear(0x00);
        assert!(v < -7000, "expected large negative magnitude, got {v}");
    }

    #[test]
    fn ulaw_decode_is_symmetric_for_sign_bit() {
        for b in 0..=255u8 {
            let pos = ulaw_to_linear(b & 0x7f);
            let neg = ulaw_to_linear(b | 0x80);
            assert_eq!(neg, -pos, "byte {b:#x} should be the sign-flip of its complement");
        }
    }

    #[test]
    fn ulaw_magnitude_increases_with_exponent() {
        // Within a fixed sign and mantissa, a larger exponent field must
        // decode to a larger magnitude (monotonic segment growth).
        let mut last = 0i16;
        for exponent in 0..8u8 {
            let ulaw = (exponent << 4) ^ 0xff;
            let v = ulaw_to_linear(ulaw).abs();
            assert!(v >= last, "exponent {exponent} should not decrease magnitude");
            last = v;
        }
    }

    #[test]
    fn alaw_silence_decodes_to_minimum_magnitude() {
        // A-law has no exact-zero code point; the smallest-magnitude
        // decode (segment 0, mantissa 0, bias only) is as close as it gets.
        let v = alaw_to_linear(0x55).abs();
        let max = alaw_to_linear(0x2a).abs();
        assert!(v < max / 50, "expected near-zero relative to full scale, got {v} vs max {max}");
    }

    #[test]
    fn alaw_decode_is_symmetric_for_sign_bit() {
        for b in 0..=255u8 {
            let pos = alaw_to_linear(b | 0x80);
            let neg = alaw_to_linear(b & 0x7f);
            assert_eq!(pos, -neg, "byte {b:#x} should be the sign-flip of its complement");
        }
    }

    // Bit-exact reference vectors hand-derived from the bit operations in
    // `packages/audiosocket/g711.go` (sign/exponent-or-segment/mantissa
    // fields, XOR complement, bias): one code per exponent/segment plus
    // the boundary bytes, so an unrelated arithmetic slip in the port
    // would be caught even though it would still pass the symmetry and
    // monotonicity checks above.
    #[test]
    fn ulaw_matches_itu_reference_vectors() {
        const VECTORS: &[(u8, i16)] = &[
            (0x00, -32256),
            (0x7f, -8),
            (0x80, 32256),
            (0xff, 8),
            (0xef, 264),
            (0xdf, 528),
            (0xcf, 1056),
            (0xbf, 2112),
            (0xaf, 4224),
            (0x9f, 8448),
            (0x8f, 16896),
            (0xca, 1376),
        ];
        for &(byte, expected) in VECTORS {
            assert_eq!(ulaw_to_linear(byte), expected, "byte {byte:#x}");
        }
    }

    #[test]
    fn alaw_matches_itu_reference_vectors() {
        const VECTORS: &[(u8, i16)] = &[
            (0x55, 132),
            (0x45, 388),
            (0x75, 644),
            (0x65, 1156),
            (0x15, 2180),
            (0x05, 4228),
            (0x35, 8324),
            (0x25, 16516),
            (0x2a, 16756),
            (0xaa, -16756),
        ];
        for &(byte, expected) in VECTORS {
            assert_eq!(alaw_to_linear(byte), expected, "byte {byte:#x}");
        }
    }

    #[test]
    fn rms_g711_matches_manual_decode() {
        let buf = vec![0x00u8, 0xffu8];
        let expected = {
            let a = ulaw_to_linear(0x00) as f64;
            let b = ulaw_to_linear(0xff) as f64;
            ((a * a + b * b) / 2.0).sqrt()
        };
        assert!((rms_g711(&buf, G711Codec::ULaw) - expected).abs() < 1e-9);
    }

    #[test]
    fn codec_default_thresholds_match_spec() {
        assert_eq!(AudioCodec::Pcm16Le.default_silence_threshold(), 500.0);
        assert_eq!(AudioCodec::G711ULaw.default_silence_threshold(), 1000.0);
        assert_eq!(AudioCodec::G711ALaw.default_silence_threshold(), 1000.0);
    }
}
