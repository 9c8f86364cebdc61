pub mod gemini;
pub mod telegram;
