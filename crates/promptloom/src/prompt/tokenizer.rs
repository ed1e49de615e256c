//! Model-keyed token counting with a process-wide tokenizer cache.
//!
//! Tokenizer construction is expensive (BPE tables), so resolved tokenizers
//! are memoized per model identifier. The cache is read-only after first use
//! for a given key; concurrent first-use populations race benignly and the
//! first writer wins, since the constructed tokenizer is idempotent per key.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tiktoken_rs::CoreBPE;
use tracing::info;

/// Model used for counting when the requested model has no tokenizer.
pub const DEFAULT_COUNT_MODEL: &str = "gpt-4";

/// Chars-per-token estimate used when no tokenizer can be built at all.
/// Most BPE tokenizers average 3-4 chars per token on English text.
const FALLBACK_CHARS_PER_TOKEN: f64 = 3.5;

static TOKENIZERS: Lazy<RwLock<HashMap<String, Option<Arc<CoreBPE>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Resolve (and memoize) the tokenizer for a model identifier.
///
/// Unknown models fall back to the [`DEFAULT_COUNT_MODEL`] encoding. Returns
/// `None` only if no tokenizer can be constructed at all; failures are cached
/// too, so the fallback path stays cheap.
fn tokenizer_for(model: &str) -> Option<Arc<CoreBPE>> {
    if let Some(cached) = TOKENIZERS
        .read()
        .expect("tokenizer cache poisoned")
        .get(model)
    {
        return cached.clone();
    }

    let built = tiktoken_rs::get_bpe_from_model(model)
        .or_else(|_| {
            info!("no tokenizer for model {model}, counting with {DEFAULT_COUNT_MODEL}");
            tiktoken_rs::get_bpe_from_model(DEFAULT_COUNT_MODEL)
        })
        .ok()
        .map(Arc::new);

    let mut cache = TOKENIZERS.write().expect("tokenizer cache poisoned");
    // First writer wins: keep an entry inserted by a racing thread.
    cache.entry(model.to_string()).or_insert(built).clone()
}

/// Count the tokens `text` occupies under the named model's tokenizer.
///
/// Always returns a value: if no tokenizer can be built for the model or the
/// default, falls back to a chars-per-token estimate.
pub fn count_tokens(text: &str, model: &str) -> usize {
    match tokenizer_for(model) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => (text.len() as f64 / FALLBACK_CHARS_PER_TOKEN).ceil() as usize,
    }
}
