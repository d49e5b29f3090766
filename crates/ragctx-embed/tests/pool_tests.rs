use candle_core::{DType, Device, Tensor};
use ragctx_embed::masked_mean_l2;

fn close(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}

#[test]
fn padding_tokens_do_not_contribute() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[2.0f32, 0.0, 0.0, 9.0, 9.0, 9.0], (1, 2, 3), &dev).unwrap();
    let mask = Tensor::from_slice(&[1i64, 0], (1, 2), &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!(close(&v[0], &[1.0, 0.0, 0.0]));
}

#[test]
fn rows_pool_independently_to_unit_vectors() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[3.0f32, 4.0, 0.0, 0.0, 0.0, 2.0, 0.0, 2.0], (2, 2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0, 1, 1], (2, 2), &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!(close(&v[0], &[0.6, 0.8]));
    assert!(close(&v[1], &[0.0, 1.0]));
}

#[test]
fn fully_masked_row_is_zero() {
    let dev = Device::Cpu;
    let h = Tensor::ones((1, 3, 2), DType::F32, &dev).unwrap();
    let mask = Tensor::zeros((1, 3), DType::F32, &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!(close(&v[0], &[0.0, 0.0]));
}

#[test]
fn rejects_non_3d_hidden() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((2, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((2, 1), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}
