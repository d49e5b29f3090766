use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-RoBERTa `<pad>` id.
pub const PAD_TOKEN_ID: u32 = 1;

/// Tokenizes a batch, truncating to `max_len` and right-padding to the longest
/// sequence in the batch. Returns `(input_ids, attention_mask)`, both `[B, T]`.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let mut rows: Vec<(Vec<u32>, Vec<u32>)> = Vec::with_capacity(texts.len());
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        if ids.len() > max_len { ids.truncate(max_len); mask.truncate(max_len); }
        rows.push((ids, mask));
    }
    let seq_len = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).max(1);
    let mut flat_ids = Vec::with_capacity(rows.len() * seq_len);
    let mut flat_mask = Vec::with_capacity(rows.len() * seq_len);
    for (mut ids, mut mask) in rows {
        let pad = seq_len - ids.len();
        ids.extend(std::iter::repeat(PAD_TOKEN_ID).take(pad));
        mask.extend(std::iter::repeat(0).take(pad));
        flat_ids.extend(ids);
        flat_mask.extend(mask);
    }
    let batch = texts.len();
    let input_ids = Tensor::from_vec(flat_ids, (batch, seq_len), device)?;
    let attention_mask = Tensor::from_vec(flat_mask, (batch, seq_len), device)?;
    Ok((input_ids, attention_mask))
}
