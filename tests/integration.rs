//! End-to-end tests of the HARHN forecaster

use approx::assert_abs_diff_eq;
use harhn::data::{synthetic_series, WindowConfig};
use harhn::model::RecurrentHighwayNetwork;
use harhn::{HarhnConfig, HarhnError, HarhnModel, RecurrentHighwayCell, RhnConfig};
use ndarray::{s, Array2, Array3, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn small_config() -> HarhnConfig {
    HarhnConfig::new(1, 5, 3, 1)
        .with_units(8, 8)
        .with_rec_depth(2)
        .with_filters(4, 3)
        .with_enc_input_size(6)
        .with_seed(1)
}

fn random_batch(batch: usize, lookback: usize, in_feats: usize, seed: u64) -> (Array3<f64>, Array3<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array3::random_using((batch, lookback, in_feats), Uniform::new(-1.0, 1.0), &mut rng);
    let y = Array3::random_using((batch, lookback, 1), Uniform::new(-1.0, 1.0), &mut rng);
    (x, y)
}

#[test]
fn test_end_to_end_small_model() {
    let model = HarhnModel::new(small_config()).unwrap();
    let (x, y) = random_batch(2, 5, 3, 10);

    let prediction = model.forward(&x, &y).unwrap();

    assert_eq!(prediction.shape(), &[2, 1]);
    assert!(prediction.iter().all(|v| v.is_finite()));
}

#[test]
fn test_default_model_runs() {
    let model = HarhnModel::new(HarhnConfig::default().with_seed(3)).unwrap();
    let (x, y) = random_batch(3, 15, 7, 11);

    let prediction = model.forward(&x, &y).unwrap();

    assert_eq!(prediction.shape(), &[3, 1]);
    assert!(model.num_params() > 0);
}

#[test]
fn test_attention_is_a_distribution_at_every_step_and_depth() {
    let model = HarhnModel::new(small_config()).unwrap();
    let (x, y) = random_batch(4, 5, 3, 12);

    let forecast = model.forward_with_attention(&x, &y).unwrap();

    assert_eq!(forecast.attention.shape(), &[5, 2, 4, 5]);
    for weights in forecast.attention.lanes(Axis(3)) {
        assert_abs_diff_eq!(weights.sum(), 1.0, epsilon = 1e-10);
        assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }
    assert_eq!(forecast.prediction, model.forward(&x, &y).unwrap());
}

#[test]
fn test_gates_stay_in_unit_interval() {
    let mut rng = StdRng::seed_from_u64(13);
    let config = RhnConfig::new(4, 6, 3).decoupled().with_hsg();
    let cell = RecurrentHighwayCell::new(&config, &mut rng).unwrap();
    let x = Array2::random_using((16, 4), Uniform::new(-50.0, 50.0), &mut rng);
    let s = Array2::random_using((16, 6), Uniform::new(-50.0, 50.0), &mut rng);

    let (_, trace) = cell.forward_traced(x.view(), s.view()).unwrap();

    for gate in trace.transform.iter().chain(trace.carry.iter()) {
        assert!(gate.iter().all(|&g| (0.0..=1.0).contains(&g)));
    }
}

#[test]
fn test_closed_gates_for_zero_input_and_state() {
    let mut rng = StdRng::seed_from_u64(14);
    let config = RhnConfig::new(3, 5, 2).with_closed_gates();
    let cell = RecurrentHighwayCell::new(&config, &mut rng).unwrap();
    let x = Array2::zeros((2, 3));

    let (_, trace) = cell.forward_traced(x.view(), cell.init_state(2).view()).unwrap();

    let expected = 1.0 / (1.0 + 2.5f64.exp());
    for &t in trace.transform[0].iter() {
        assert_abs_diff_eq!(t, expected, epsilon = 1e-12);
    }
}

#[test]
fn test_encoder_depth_state_shape() {
    let mut rng = StdRng::seed_from_u64(15);
    let encoder = RecurrentHighwayNetwork::new(RhnConfig::new(32, 32, 3), &mut rng).unwrap();
    let x = Array3::random_using((4, 15, 32), Uniform::new(-1.0, 1.0), &mut rng);

    let out = encoder.forward(x.view()).unwrap();

    assert_eq!(out.depth_states.shape(), &[4, 32, 15, 3]);
}

#[test]
fn test_model_encoder_depth_states() {
    let model = HarhnModel::new(small_config().with_hsg(true)).unwrap();
    let (x, _) = random_batch(2, 5, 3, 16);

    let encoded = model.encode(&x).unwrap();

    assert_eq!(encoded.depth_states.shape(), &[2, 8, 5, 2]);
    let last = encoded.depth_states.index_axis(Axis(3), 1);
    for t in 0..5 {
        assert_eq!(last.slice(s![.., .., t]), encoded.states.slice(s![.., t, ..]));
    }
}

#[test]
fn test_samples_are_forecast_independently() {
    let model = HarhnModel::new(small_config()).unwrap();
    let (x, y) = random_batch(3, 5, 3, 17);

    let full = model.forward(&x, &y).unwrap();
    let single = model
        .forward(
            &x.slice(s![2..3, .., ..]).to_owned(),
            &y.slice(s![2..3, .., ..]).to_owned(),
        )
        .unwrap();

    assert_abs_diff_eq!(full[[2, 0]], single[[0, 0]], epsilon = 1e-10);
}

#[test]
fn test_all_variants_build_and_run() {
    let (x, y) = random_batch(4, 5, 3, 18);

    for coupled in [true, false] {
        for hsg in [true, false] {
            for closed in [true, false] {
                for batch_norm in [true, false] {
                    let config = small_config()
                        .with_coupled_gates(coupled)
                        .with_hsg(hsg)
                        .with_closed_gates(closed)
                        .with_batch_norm(batch_norm);
                    let model = HarhnModel::new(config).unwrap();
                    let prediction = model.forward(&x, &y).unwrap();
                    assert!(prediction.iter().all(|v| v.is_finite()));
                }
            }
        }
    }
}

#[test]
fn test_invalid_configurations_are_rejected() {
    let err = HarhnModel::new(small_config().with_rec_depth(0)).unwrap_err();
    assert!(err.is_config_error());

    let mut config = small_config();
    config.n_conv_layers = 0;
    assert!(HarhnModel::new(config).unwrap_err().is_config_error());

    let mut config = small_config();
    config.n_units_dec = 0;
    assert!(HarhnModel::new(config).is_err());
}

#[test]
fn test_shape_mismatch_is_reported() {
    let model = HarhnModel::new(small_config()).unwrap();
    let (_, y) = random_batch(2, 5, 3, 19);
    let x = Array3::zeros((2, 5, 4));

    let err = model.forward(&x, &y).unwrap_err();
    assert!(matches!(err, HarhnError::ShapeMismatch { .. }));
    assert!(err.to_string().contains("[2, 5, 3]"));
}

#[test]
fn test_windows_feed_the_model() {
    let mut rng = StdRng::seed_from_u64(20);
    let table = synthetic_series(40, 3, 0.1, &mut rng).unwrap();
    let windows = WindowConfig::default().windows(&table, 5).unwrap();
    let model = HarhnModel::new(small_config()).unwrap();

    let prediction = model.forward(&windows.x, &windows.y).unwrap();

    assert_eq!(windows.len(), 35);
    assert_eq!(prediction.shape(), &[35, 1]);
}

#[test]
fn test_checkpoint_roundtrip() {
    let model = HarhnModel::new(small_config().with_coupled_gates(false).with_batch_norm(true)).unwrap();
    let (x, y) = random_batch(3, 5, 3, 21);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");

    model.save(&path).unwrap();
    let restored = HarhnModel::load(&path).unwrap();

    assert_eq!(restored.num_params(), model.num_params());
    assert_eq!(restored.forward(&x, &y).unwrap(), model.forward(&x, &y).unwrap());
}

#[test]
fn test_loading_garbage_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.bin");
    std::fs::write(&path, b"not a model").unwrap();

    assert!(HarhnModel::load(&path).is_err());
    assert!(HarhnModel::load(dir.path().join("missing.bin")).is_err());
}
