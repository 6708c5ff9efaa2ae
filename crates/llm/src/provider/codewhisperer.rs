//! The assistant endpoint with the proprietary request shape and embedded-JSON response body.

mod input;
mod output;
mod parser;

pub(crate) use input::to_codewhisperer;
pub(crate) use output::{CodeWhispererStreamProcessor, parse_response};
