pub mod audio;
pub mod llm;
pub mod stt;
pub mod tts;
