use std::fs;

use depnn::math::Matrix;
use depnn::network::{read_blob, write_blob, BlobLayout, Network, SoftmaxMode};
use depnn::DepnnError;

/// 4 inputs, 3 hidden units, 2 outputs: 12 + 3 + 6 + 2 = 23 values.
fn handcrafted_blob() -> Vec<f32> {
    vec![
        // W_h as HIDDEN x INPUT, one row per hidden unit
        0.1, 0.2, 0.3, 0.4, //
        0.5, 0.6, 0.7, 0.8, //
        -0.9, 1.0, -1.1, 1.2, //
        // b_h
        0.1, -0.2, 0.5, //
        // W_out as OUTPUT x HIDDEN
        0.2, 0.4, 0.6, //
        -0.2, 0.3, 1.0, //
        // b_out
        0.1, -0.1,
    ]
}

fn handcrafted_network() -> Network {
    let layout = BlobLayout::new(4, 3, 2).unwrap();
    assert_eq!(layout.len(), 23);
    Network::from_blob(&handcrafted_blob(), layout).unwrap()
}

#[test]
fn forward_matches_hand_computation() {
    // hidden pre-activations for [1, 0, 1, 0]: 0.4 + 0.1, 1.2 - 0.2, -2.0 + 0.5
    // after ReLU: [0.5, 1.0, 0.0]
    // logits: [0.1 + 0.4 + 0.1, -0.1 + 0.3 - 0.1] = [0.6, 0.1]
    let net = handcrafted_network();
    let out = net
        .forward(&Matrix::row_vector(vec![1.0, 0.0, 1.0, 0.0]))
        .unwrap();
    let p0 = 1.0 / (1.0 + (-0.5f32).exp());
    assert_eq!((out.rows, out.cols), (1, 2));
    assert!((out.get(0, 0) - p0).abs() < 1e-5);
    assert!((out.get(0, 1) - (1.0 - p0)).abs() < 1e-5);
}

#[test]
fn forward_is_pure_and_rows_are_distributions() {
    let net = handcrafted_network();
    let input = Matrix::from_vec(
        3,
        4,
        vec![
            1.0, 0.0, 1.0, 0.0, //
            -2.0, 0.5, 3.0, 1.0, //
            0.0, 0.0, 0.0, 0.0,
        ],
    );
    let a = net.forward(&input).unwrap();
    let b = net.forward(&input).unwrap();
    assert_eq!(a, b);
    for row in a.rows_iter() {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}

#[test]
fn blob_length_must_match_layout() {
    let layout = BlobLayout::new(4, 3, 2).unwrap();
    let mut blob = handcrafted_blob();
    blob.pop();
    assert!(matches!(
        Network::from_blob(&blob, layout),
        Err(DepnnError::Format(_))
    ));
    blob.extend([0.0, 0.0]);
    assert!(Network::from_blob(&blob, layout).is_err());
}

#[test]
fn zero_layer_size_is_config_error() {
    assert!(matches!(BlobLayout::new(0, 3, 2), Err(DepnnError::Config(_))));
    assert!(BlobLayout::new(4, 0, 2).is_err());
}

#[test]
fn to_blob_inverts_from_blob() {
    let net = handcrafted_network();
    assert_eq!(net.to_blob(), handcrafted_blob());
}

#[test]
fn blob_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coefficients.bin");
    write_blob(&path, &handcrafted_blob()).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 23 * 4);
    assert_eq!(read_blob(&path).unwrap(), handcrafted_blob());

    let net = Network::from_file(&path, BlobLayout::new(4, 3, 2).unwrap()).unwrap();
    assert_eq!(net.to_blob(), handcrafted_blob());
}

#[test]
fn truncated_blob_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.bin");
    fs::write(&path, [0u8; 5]).unwrap();
    assert!(read_blob(&path).unwrap_err().is_format());
}

#[test]
fn precomputed_path_matches_full_forward() {
    let net = handcrafted_network();
    let input = [1.0, -0.5, 2.0, 0.25];
    let left = net.precompute_slot(0, &input[..2]).unwrap();
    let right = net.precompute_slot(1, &input[2..]).unwrap();
    let partial: Vec<f32> = left.iter().zip(&right).map(|(a, b)| a + b).collect();

    let full = net.forward(&Matrix::row_vector(input.to_vec())).unwrap();
    let cached = net
        .forward_precomputed(Matrix::row_vector(partial))
        .unwrap();
    for (a, b) in full.data.iter().zip(&cached.data) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn hidden_weight_block_selects_input_rows() {
    let net = handcrafted_network();
    let block = net.hidden_weight_block(1, 2).unwrap();
    // inputs 2 and 3 of every hidden unit
    assert_eq!(block.row(0), &[0.3, 0.7, -1.1]);
    assert_eq!(block.row(1), &[0.4, 0.8, 1.2]);
    assert!(net.hidden_weight_block(2, 2).is_err());
    assert!(matches!(
        net.hidden_weight_block(usize::MAX, 2),
        Err(DepnnError::Config(_))
    ));
    assert!(net.hidden_weight_block(1, usize::MAX).is_err());
    assert!(net.precompute_slot(usize::MAX / 2, &[1.0, 2.0, 3.0]).is_err());
}

#[test]
fn shape_mismatch_is_rejected() {
    let net = handcrafted_network();
    assert!(net.forward(&Matrix::row_vector(vec![1.0; 3])).is_err());
    assert!(net.forward_precomputed(Matrix::row_vector(vec![1.0; 4])).is_err());
}

#[test]
fn predict_class_breaks_ties_low() {
    let layout = BlobLayout::new(4, 3, 2).unwrap();
    let net = Network::from_blob(&vec![0.0; layout.len()], layout).unwrap();
    let classes = net
        .predict_class(&Matrix::from_vec(2, 4, vec![1.0; 8]))
        .unwrap();
    assert_eq!(classes, vec![0, 0]);
    let best = handcrafted_network()
        .predict_class(&Matrix::row_vector(vec![1.0, 0.0, 1.0, 0.0]))
        .unwrap();
    assert_eq!(best, vec![0]);
}

#[test]
fn stabilized_softmax_survives_large_logits() {
    let layout = BlobLayout::new(4, 3, 2).unwrap();
    let mut blob = vec![0.0; layout.len()];
    let n = blob.len();
    blob[n - 2] = 1000.0;
    let input = Matrix::row_vector(vec![0.0; 4]);

    let exact = Network::from_blob(&blob, layout).unwrap();
    assert!(exact.forward(&input).unwrap().data[0].is_nan());

    let stable = exact.with_softmax(SoftmaxMode::Stabilized);
    let out = stable.forward(&input).unwrap();
    assert!((out.data[0] - 1.0).abs() < 1e-6);
    assert!(out.data[1].abs() < 1e-6);
}
