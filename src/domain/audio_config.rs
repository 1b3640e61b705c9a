pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_ENCODING: &str = "LINEAR16";
pub const DEFAULT_LANGUAGE: &str = "id-ID";

/// Encoding negotiated for the binary frames of one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub encoding: String,
    pub language: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            encoding: DEFAULT_ENCODING.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}
