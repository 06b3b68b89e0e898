//! HARHN forecaster
//!
//! raw input -> convolution blocks -> projection -> RHN encoder
//! -> attention decoder -> prediction

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array2, Array3, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::attention::TemporalAttentionDecoder;
use super::config::HarhnConfig;
use super::conv::ConvFeatureExtractor;
use super::encoder::{EncoderOutput, RecurrentHighwayNetwork};
use crate::error::{HarhnError, Result};

/// Prediction together with the attention distributions that produced it
#[derive(Debug, Clone)]
pub struct Forecast {
    /// Prediction [batch, target_feats]
    pub prediction: Array2<f64>,
    /// Attention weights [decoder_step, depth, batch, encoder_step]
    pub attention: Array4<f64>,
}

/// Hierarchical attention-based recurrent highway network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarhnModel {
    config: HarhnConfig,
    features: ConvFeatureExtractor,
    encoder: RecurrentHighwayNetwork,
    decoder: TemporalAttentionDecoder,
}

impl HarhnModel {
    /// Create a new model
    ///
    /// The configuration is validated before any parameter is allocated.
    pub fn new(config: HarhnConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let features = ConvFeatureExtractor::new(
            config.n_conv_layers,
            config.lookback,
            config.in_feats,
            config.n_filters,
            config.filter_size,
            config.enc_input_size,
            &mut rng,
        )?;
        let encoder = RecurrentHighwayNetwork::new(config.encoder_config(), &mut rng)?;
        let decoder = TemporalAttentionDecoder::new(&config, &mut rng)?;

        let model = Self {
            config,
            features,
            encoder,
            decoder,
        };

        info!(
            lookback = model.config.lookback,
            rec_depth = model.config.rec_depth,
            conv_layers = model.config.n_conv_layers,
            params = model.num_params(),
            "Created HARHN model"
        );

        Ok(model)
    }

    /// Model configuration
    pub fn config(&self) -> &HarhnConfig {
        &self.config
    }

    /// Convolution front end
    pub fn features(&self) -> &ConvFeatureExtractor {
        &self.features
    }

    /// Encoder network
    pub fn encoder(&self) -> &RecurrentHighwayNetwork {
        &self.encoder
    }

    /// Decoder network
    pub fn decoder(&self) -> &TemporalAttentionDecoder {
        &self.decoder
    }

    /// Run the convolution front end and the encoder
    ///
    /// # Arguments
    /// * `x` - Raw input [batch, lookback, in_feats]
    pub fn encode(&self, x: &Array3<f64>) -> Result<EncoderOutput> {
        let expected = [x.shape()[0], self.config.lookback, self.config.in_feats];
        if x.shape() != expected {
            return Err(HarhnError::shape("model input", &expected, x.shape()));
        }

        let features = self.features.forward(x.view())?;
        self.encoder.forward(features.view())
    }

    /// Predict the next horizon step
    ///
    /// # Arguments
    /// * `x` - Raw input [batch, lookback, in_feats]
    /// * `y` - Observed target history [batch, lookback, target_feats]
    ///
    /// # Returns
    /// Prediction [batch, target_feats]
    pub fn forward(&self, x: &Array3<f64>, y: &Array3<f64>) -> Result<Array2<f64>> {
        self.check_batches(x, y)?;
        let encoded = self.encode(x)?;
        let prediction = self.decoder.forward(encoded.depth_states.view(), y.view())?;
        debug!(batch = x.shape()[0], "Forward pass complete");
        Ok(prediction)
    }

    /// Predict and return the attention distributions of every decoder step
    pub fn forward_with_attention(&self, x: &Array3<f64>, y: &Array3<f64>) -> Result<Forecast> {
        self.check_batches(x, y)?;
        let encoded = self.encode(x)?;
        let out = self
            .decoder
            .forward_with_attention(encoded.depth_states.view(), y.view())?;

        Ok(Forecast {
            prediction: out.prediction,
            attention: out.attention,
        })
    }

    fn check_batches(&self, x: &Array3<f64>, y: &Array3<f64>) -> Result<()> {
        if x.shape()[0] != y.shape()[0] {
            return Err(HarhnError::shape(
                "target history batch size",
                &[x.shape()[0]],
                &[y.shape()[0]],
            ));
        }
        Ok(())
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.features.num_params() + self.encoder.num_params() + self.decoder.num_params()
    }

    /// Save the model parameters
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(writer, self)?;
        info!("Saved model to {}", path.as_ref().display());
        Ok(())
    }

    /// Load model parameters saved with [`HarhnModel::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let model: Self = bincode::deserialize_from(reader)?;
        model.config.validate()?;
        info!("Loaded model from {}", path.as_ref().display());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn tiny_config() -> HarhnConfig {
        HarhnConfig::new(1, 5, 3, 1)
            .with_units(8, 6)
            .with_rec_depth(2)
            .with_filters(4, 3)
            .with_enc_input_size(5)
            .with_seed(7)
    }

    fn inputs(batch: usize) -> (Array3<f64>, Array3<f64>) {
        let mut rng = StdRng::seed_from_u64(99);
        let x = Array3::random_using((batch, 5, 3), Uniform::new(-1.0, 1.0), &mut rng);
        let y = Array3::random_using((batch, 5, 1), Uniform::new(-1.0, 1.0), &mut rng);
        (x, y)
    }

    #[test]
    fn test_forward_shape() {
        let model = HarhnModel::new(tiny_config()).unwrap();
        let (x, y) = inputs(2);

        let prediction = model.forward(&x, &y).unwrap();

        assert_eq!(prediction.shape(), &[2, 1]);
        assert!(prediction.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_seed_makes_models_identical() {
        let a = HarhnModel::new(tiny_config()).unwrap();
        let b = HarhnModel::new(tiny_config()).unwrap();
        let (x, y) = inputs(3);

        assert_eq!(a.forward(&x, &y).unwrap(), b.forward(&x, &y).unwrap());
    }

    #[test]
    fn test_forward_is_stateless() {
        let model = HarhnModel::new(tiny_config()).unwrap();
        let (x, y) = inputs(2);

        let first = model.forward(&x, &y).unwrap();
        let second = model.forward(&x, &y).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(HarhnModel::new(tiny_config().with_rec_depth(0)).is_err());
        assert!(HarhnModel::new(HarhnConfig::new(0, 5, 3, 1)).is_err());
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let model = HarhnModel::new(tiny_config()).unwrap();
        let (x, y) = inputs(2);
        let (_, y3) = inputs(3);

        let err = model.forward(&x, &y3).unwrap_err();
        assert!(err.to_string().contains("batch size: expected [2], got [3]"));
        assert!(model.forward(&Array3::zeros((2, 4, 3)), &y).is_err());
        assert!(model.forward(&Array3::zeros((2, 5, 2)), &y).is_err());
    }

    #[test]
    fn test_attention_comes_from_the_decoder() {
        let model = HarhnModel::new(tiny_config()).unwrap();
        let (x, y) = inputs(2);

        let forecast = model.forward_with_attention(&x, &y).unwrap();

        assert_eq!(forecast.attention.shape(), &[5, 2, 2, 5]);
        for weights in forecast.attention.lanes(ndarray::Axis(3)) {
            assert!((weights.sum() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_batch_norm_model_rejects_single_sample() {
        let model = HarhnModel::new(tiny_config().with_batch_norm(true)).unwrap();
        let (x, y) = inputs(1);

        assert!(matches!(
            model.forward(&x, &y),
            Err(HarhnError::InsufficientData(_))
        ));
        assert!(model.forward_with_attention(&x, &y).is_err());
    }

    #[test]
    fn test_batch_norm_model_depends_on_input() {
        let model = HarhnModel::new(tiny_config().with_batch_norm(true)).unwrap();
        let (x, y) = inputs(4);
        let mut rng = StdRng::seed_from_u64(5);
        let other = Array3::random_using((4, 5, 3), Uniform::new(-5.0, 5.0), &mut rng);

        assert_ne!(model.forward(&x, &y).unwrap(), model.forward(&other, &y).unwrap());
    }

    #[test]
    fn test_save_and_load() {
        let model = HarhnModel::new(tiny_config()).unwrap();
        let (x, y) = inputs(2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harhn.bin");

        model.save(&path).unwrap();
        let loaded = HarhnModel::load(&path).unwrap();

        assert_eq!(loaded.config(), model.config());
        assert_eq!(loaded.forward(&x, &y).unwrap(), model.forward(&x, &y).unwrap());
    }
}
