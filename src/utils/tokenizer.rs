//! Token counting for AI context budgeting.
//!
//! Uses tiktoken encodings as an approximation. The completion capability
//! behind `CompletionClient` may tokenize differently; these estimates are
//! for cost control, not correctness.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tiktoken_rs::{cl100k_base, CoreBPE};

static CL100K: OnceLock<CoreBPE> = OnceLock::new();

fn get_cl100k() -> &'static CoreBPE {
    CL100K.get_or_init(|| cl100k_base().expect("Failed to load cl100k_base tokenizer"))
}

/// Encoding strategy for token estimation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEncoding {
    #[default]
    Cl100kBase,
    /// Fast chars-per-token approximation, no tokenizer involved.
    Heuristic,
}

/// Estimates token count using the specified encoding.
pub fn estimate_tokens_with_encoding(
    text: &str,
    encoding: TokenEncoding,
    heuristic_chars_per_token: usize,
) -> usize {
    match encoding {
        TokenEncoding::Cl100kBase => get_cl100k().encode_with_special_tokens(text).len(),
        TokenEncoding::Heuristic => heuristic_estimate(text, heuristic_chars_per_token),
    }
}

fn heuristic_estimate(text: &str, chars_per_token: usize) -> usize {
    let chars_per_token = chars_per_token.max(1);
    text.len().div_ceil(chars_per_token)
}

/// Default token estimation using cl100k_base.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_with_encoding(text, TokenEncoding::Cl100kBase, 4)
}
