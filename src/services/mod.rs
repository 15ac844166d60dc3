pub mod llm;
pub mod retrieval;
pub mod stt;
pub mod tts;
