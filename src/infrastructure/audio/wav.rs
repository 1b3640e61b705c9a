use crate::domain::AudioConfig;

pub(super) const WAV_HEADER_LEN: usize = 44;

/// Wraps raw little-endian 16-bit mono PCM in a RIFF/WAVE container.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = u32::try_from(pcm.len()).unwrap_or(u32::MAX);

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&data_len.saturating_add(36).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

/// Upload payload, file name and mime type for the negotiated encoding.
pub fn upload_payload(audio: &[u8], config: &AudioConfig) -> (Vec<u8>, &'static str, &'static str) {
    match config.encoding.to_ascii_uppercase().as_str() {
        "LINEAR16" => (
            pcm16_to_wav(audio, config.sample_rate),
            "audio.wav",
            "audio/wav",
        ),
        "OGG_OPUS" => (audio.to_vec(), "audio.ogg", "audio/ogg"),
        "MP3" => (audio.to_vec(), "audio.mp3", "audio/mpeg"),
        "FLAC" => (audio.to_vec(), "audio.flac", "audio/flac"),
        _ => (audio.to_vec(), "audio.wav", "audio/wav"),
    }
}
