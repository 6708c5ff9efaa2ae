pub mod codewhisperer;
pub mod openai;
pub mod unified;
