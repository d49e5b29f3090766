use anyhow::{ensure, Context, Result};
use candle_core::{DType, Tensor};

/// Mean over unmasked tokens followed by L2 normalisation.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; returns `[B, H]` unit vectors.
/// A row with no unmasked tokens pools to the zero vector.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _, hidden_dim) = hidden.dims3().context("hidden states must be [batch, tokens, hidden]")?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    // Dividing by the token count is redundant once rows are normalised.
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let eps = if hidden.dtype() == DType::F16 { 1e-6 } else { 1e-12 };
    let norms = (summed.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    let pooled = summed.broadcast_div(&norms)?;
    ensure!(pooled.dims() == [batch, hidden_dim], "pooled shape mismatch: {:?}", pooled.dims());
    Ok(pooled)
}
