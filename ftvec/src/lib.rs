//! A library for training and using fastText word embeddings.
//!
//! ftvec does not implement embedding training itself. Training is
//! delegated to the external `fasttext` command-line tool, which is
//! run as a subprocess by [`train::FastTextCli`]. The model files the
//! trainer produces are then parsed into in-memory vector tables that
//! provide dictionary-like lookups, similarity queries, and analogy
//! queries:
//!
//! ```no_run
//! use ftvec::config::TrainParams;
//! use ftvec::similarity::WordSimilarity;
//! use ftvec::train::FastTextCli;
//!
//! let trainer = FastTextCli::from_env();
//! let model = trainer
//!     .train(
//!         &TrainParams { dims: 32, ..TrainParams::default() },
//!         "corpus.txt".as_ref(),
//!         "toy-model".as_ref(),
//!     )
//!     .unwrap();
//!
//! let embeddings = model.load().unwrap();
//! for similar in embeddings.word_similarity("koning", 5, None).unwrap() {
//!     println!("{}\t{}", similar.word(), similar.cosine_similarity());
//! }
//! ```
//!
//! Binary models can represent out-of-vocabulary words through
//! subword n-grams; the `.vec` text output and other text formats are
//! supported through the traits in [`compat::text`]. Loaded models
//! can be persisted in a compact native format, see [`io`].

pub mod compat;

pub mod config;

pub mod embeddings;

pub mod error;

pub mod io;

pub mod metadata;

pub mod norms;

pub mod prelude;

pub mod similarity;

pub mod storage;

pub mod subword;

pub mod train;

pub(crate) mod util;

pub mod vocab;
