//! Training hyperparameters.

use serde::Serialize;

use crate::error::{Error, Result};

/// fastText model type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Model {
    Cbow,
    SkipGram,
    Supervised,
}

impl Model {
    /// Decode the model type from its on-disk representation.
    pub(crate) fn from_u32(model: u32) -> Option<Self> {
        match model {
            1 => Some(Model::Cbow),
            2 => Some(Model::SkipGram),
            3 => Some(Model::Supervised),
            _ => None,
        }
    }

    /// The subcommand the fastText binary uses for this model type.
    pub fn cli_name(self) -> &'static str {
        match self {
            Model::Cbow => "cbow",
            Model::SkipGram => "skipgram",
            Model::Supervised => "supervised",
        }
    }
}

/// fastText loss type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Loss {
    HierarchicalSoftmax,
    NegativeSampling,
    Softmax,
}

impl Loss {
    /// Decode the loss type from its on-disk representation.
    pub(crate) fn from_u32(loss: u32) -> Option<Self> {
        match loss {
            1 => Some(Loss::HierarchicalSoftmax),
            2 => Some(Loss::NegativeSampling),
            3 => Some(Loss::Softmax),
            _ => None,
        }
    }

    /// The value the fastText binary accepts for its `-loss` flag.
    pub fn cli_name(self) -> &'static str {
        match self {
            Loss::HierarchicalSoftmax => "hs",
            Loss::NegativeSampling => "ns",
            Loss::Softmax => "softmax",
        }
    }
}

/// Hyperparameters for training a fastText model.
///
/// The defaults match the defaults of the fastText command-line tool.
/// Parameters map 1:1 to fastText's flags, so a `TrainParams` value
/// fully describes a trainer invocation.
///
/// ```
/// use ftvec::config::{Model, TrainParams};
///
/// let params = TrainParams {
///     model: Model::SkipGram,
///     dims: 32,
///     epochs: 10,
///     ..TrainParams::default()
/// };
/// assert!(params.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TrainParams {
    /// Model type (`cbow`, `skipgram`, or `supervised`).
    pub model: Model,
    /// Loss function.
    pub loss: Loss,
    /// Embedding dimensionality (`-dim`).
    pub dims: u32,
    /// Context window size (`-ws`).
    pub window_size: u32,
    /// Number of training epochs (`-epoch`).
    pub epochs: u32,
    /// Minimal number of word occurrences (`-minCount`).
    pub min_count: u32,
    /// Number of negative samples (`-neg`).
    pub neg: u32,
    /// Maximum length of word n-grams (`-wordNgrams`).
    pub word_ngrams: u32,
    /// Number of subword buckets (`-bucket`).
    pub buckets: u32,
    /// Minimal character n-gram length (`-minn`).
    pub min_n: u32,
    /// Maximal character n-gram length (`-maxn`).
    pub max_n: u32,
    /// Learning rate (`-lr`).
    pub lr: f64,
    /// Rate of learning rate updates (`-lrUpdateRate`).
    pub lr_update_rate: u32,
    /// Subsampling threshold (`-t`).
    pub sampling_threshold: f64,
    /// Number of trainer threads (`-thread`).
    pub threads: u32,
}

impl Default for TrainParams {
    fn default() -> Self {
        TrainParams {
            model: Model::SkipGram,
            loss: Loss::NegativeSampling,
            dims: 100,
            window_size: 5,
            epochs: 5,
            min_count: 5,
            neg: 5,
            word_ngrams: 1,
            buckets: 2_000_000,
            min_n: 3,
            max_n: 6,
            lr: 0.05,
            lr_update_rate: 100,
            sampling_threshold: 1e-4,
            threads: 12,
        }
    }
}

impl TrainParams {
    /// Check that the parameters describe a valid trainer invocation.
    pub fn validate(&self) -> Result<()> {
        if self.dims == 0 {
            return Err(Error::Config(String::from(
                "The embedding dimensionality cannot be zero",
            )));
        }

        if self.min_n == 0 {
            return Err(Error::Config(String::from(
                "The minimum n-gram length cannot be zero",
            )));
        }

        if self.min_n > self.max_n {
            return Err(Error::Config(format!(
                "The minimum n-gram length ({}) cannot exceed the maximum length ({})",
                self.min_n, self.max_n
            )));
        }

        if self.buckets == 0 {
            return Err(Error::Config(String::from(
                "The number of subword buckets cannot be zero",
            )));
        }

        Ok(())
    }

    /// Render the parameters as fastText command-line flags.
    ///
    /// The model subcommand and the input/output flags are not
    /// included, they are positional to the trainer invocation.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(28);

        let mut push_flag = |flag: &str, value: String| {
            args.push(flag.to_owned());
            args.push(value);
        };

        push_flag("-dim", self.dims.to_string());
        push_flag("-ws", self.window_size.to_string());
        push_flag("-epoch", self.epochs.to_string());
        push_flag("-minCount", self.min_count.to_string());
        push_flag("-neg", self.neg.to_string());
        push_flag("-wordNgrams", self.word_ngrams.to_string());
        push_flag("-bucket", self.buckets.to_string());
        push_flag("-minn", self.min_n.to_string());
        push_flag("-maxn", self.max_n.to_string());
        push_flag("-lr", self.lr.to_string());
        push_flag("-lrUpdateRate", self.lr_update_rate.to_string());
        push_flag("-t", self.sampling_threshold.to_string());
        push_flag("-loss", self.loss.cli_name().to_owned());
        push_flag("-thread", self.threads.to_string());

        args
    }
}
