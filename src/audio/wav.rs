//! 16-bit PCM WAV encoding of captured float samples.

use byteorder::{ByteOrder, LittleEndian};

/// Size of the canonical RIFF/WAVE header written by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Encode float samples in `[-1, 1]` as a self-contained 16-bit PCM WAV buffer.
///
/// Samples are interleaved when `channels > 1`. Out-of-range samples are clamped.
/// An empty input yields a valid header declaring zero data bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * block_align as u32;
    let data_len = samples.len() * 2;

    let mut buf = vec![0u8; WAV_HEADER_LEN + data_len];

    buf[0..4].copy_from_slice(b"RIFF");
    LittleEndian::write_u32(&mut buf[4..8], (36 + data_len) as u32);
    buf[8..12].copy_from_slice(b"WAVE");

    buf[12..16].copy_from_slice(b"fmt ");
    LittleEndian::write_u32(&mut buf[16..20], 16);
    LittleEndian::write_u16(&mut buf[20..22], PCM_FORMAT_TAG);
    LittleEndian::write_u16(&mut buf[22..24], channels);
    LittleEndian::write_u32(&mut buf[24..28], sample_rate);
    LittleEndian::write_u32(&mut buf[28..32], byte_rate);
    LittleEndian::write_u16(&mut buf[32..34], block_align);
    LittleEndian::write_u16(&mut buf[34..36], BITS_PER_SAMPLE);

    buf[36..40].copy_from_slice(b"data");
    LittleEndian::write_u32(&mut buf[40..44], data_len as u32);

    let pcm: Vec<i16> = samples.iter().copied().map(quantize).collect();
    LittleEndian::write_i16_into(&pcm, &mut buf[WAV_HEADER_LEN..]);

    buf
}

/// Clamp and scale one sample to i16: negatives by 32768, the rest by 32767.
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}
