//! OpenAI-compatible wire translation, shared by the generic, Gemini-shaped and enterprise adapters.

mod input;
mod output;
mod stream;

pub(crate) use stream::OpenAIStreamProcessor;
