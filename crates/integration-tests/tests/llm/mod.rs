mod auth;
mod codewhisperer;
mod error_handling;
mod gemini;
mod streaming;
