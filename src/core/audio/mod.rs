mod reframe;

pub use reframe::{
    AudioReframer, CHUNK_PAYLOAD_LEN, SYNTH_BITS_PER_SAMPLE, SYNTH_CHANNELS, SYNTH_SAMPLE_RATE,
    WAV_HEADER_LEN, wav_chunk,
};
