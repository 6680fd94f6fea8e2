//! Training through the external fastText binary.
//!
//! Training is not implemented in this crate. Instead, the
//! [`FastTextCli`] wrapper invokes the `fasttext` command-line tool as
//! a subprocess and loads the model files it produces:
//!
//! ```no_run
//! use ftvec::config::TrainParams;
//! use ftvec::train::FastTextCli;
//!
//! let trainer = FastTextCli::from_env();
//! let model = trainer
//!     .train(
//!         &TrainParams::default(),
//!         "corpus.txt".as_ref(),
//!         "toy-model".as_ref(),
//!     )
//!     .unwrap();
//! let embeddings = model.load().unwrap();
//! println!("{} words", embeddings.len());
//! ```

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::compat::fasttext::ReadFastText;
use crate::compat::text::ReadTextDims;
use crate::config::TrainParams;
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use crate::storage::NdArray;
use crate::vocab::{SimpleVocab, SubwordVocab};

/// Environment variable pointing at the fastText binary.
pub const FASTTEXT_BIN_VAR: &str = "FASTTEXT_BIN";

// Stderr is kept short in errors, fastText repeats its progress line
// thousands of times.
const STDERR_TAIL_LINES: usize = 20;

/// Wrapper around the fastText command-line tool.
pub struct FastTextCli {
    binary: PathBuf,
}

impl FastTextCli {
    /// Construct a wrapper that invokes the given binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        FastTextCli {
            binary: binary.into(),
        }
    }

    /// Construct a wrapper from the environment.
    ///
    /// The binary named by `FASTTEXT_BIN` is used when the variable is
    /// set, otherwise `fasttext` is resolved through `PATH`.
    pub fn from_env() -> Self {
        let binary = env::var_os(FASTTEXT_BIN_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("fasttext"));

        FastTextCli { binary }
    }

    /// Get the path of the trainer binary.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Train a model on the given corpus.
    ///
    /// Invokes `fasttext <model> -input <corpus> -output <output_base>`
    /// with the flags rendered from `params` and waits for the trainer
    /// to finish. The trainer writes `<output_base>.bin` and
    /// `<output_base>.vec`; both paths are returned as a
    /// [`TrainedModel`].
    pub fn train(
        &self,
        params: &TrainParams,
        corpus: &Path,
        output_base: &Path,
    ) -> Result<TrainedModel> {
        params.validate()?;

        if !corpus.is_file() {
            return Err(Error::Config(format!(
                "Corpus file does not exist: {}",
                corpus.display()
            )));
        }

        // fastText does not create the output directory.
        if let Some(dir) = output_base.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(Error::Config(format!(
                    "Output directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        let mut command = Command::new(&self.binary);
        command
            .arg(params.model.cli_name())
            .arg("-input")
            .arg(corpus)
            .arg("-output")
            .arg(output_base)
            .args(params.to_args());

        debug!("Running trainer: {:?}", command);

        let output = command.output().map_err(|e| Error::Process {
            desc: format!("Cannot run fastText binary: {}", self.binary.display()),
            error: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::TrainingFailed {
                status: output.status,
                stderr: stderr_tail(&stderr),
            });
        }

        info!(
            "Trained fastText model: {}.bin, {}.vec",
            output_base.display(),
            output_base.display()
        );

        Ok(TrainedModel::from_base(output_base))
    }
}

/// The model files produced by a trainer invocation.
pub struct TrainedModel {
    bin: PathBuf,
    vec: PathBuf,
}

impl TrainedModel {
    /// Construct from an output base path.
    ///
    /// This is also useful for loading models trained in an earlier
    /// run.
    pub fn from_base(output_base: impl Into<PathBuf>) -> Self {
        let output_base = output_base.into();

        TrainedModel {
            bin: output_base.with_extension("bin"),
            vec: output_base.with_extension("vec"),
        }
    }

    /// Get the path of the binary model file.
    pub fn bin_path(&self) -> &Path {
        &self.bin
    }

    /// Get the path of the text vectors file.
    pub fn vec_path(&self) -> &Path {
        &self.vec
    }

    /// Load the binary model.
    ///
    /// The binary model carries the subword buckets, so the resulting
    /// embeddings can represent out-of-vocabulary words.
    pub fn load(&self) -> Result<Embeddings<SubwordVocab, NdArray>> {
        let f = File::open(&self.bin)
            .map_err(|e| Error::read_error(format!("Cannot open {}", self.bin.display()), e))?;
        let mut reader = BufReader::new(f);

        Embeddings::read_fasttext(&mut reader)
    }

    /// Load the text vectors.
    ///
    /// The `.vec` file only contains the in-vocabulary words, without
    /// subword information.
    pub fn load_text(&self) -> Result<Embeddings<SimpleVocab, NdArray>> {
        let f = File::open(&self.vec)
            .map_err(|e| Error::read_error(format!("Cannot open {}", self.vec.display()), e))?;
        let mut reader = BufReader::new(f);

        Embeddings::read_text_dims(&mut reader)
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<_> = stderr.lines().collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("\n")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;

    use super::{FastTextCli, TrainedModel};
    use crate::config::TrainParams;
    use crate::error::Error;
    use crate::vocab::Vocab;

    fn write_corpus(dir: &std::path::Path) -> PathBuf {
        let corpus = dir.join("corpus.txt");
        let mut f = fs::File::create(&corpus).unwrap();
        writeln!(f, "the quick brown fox jumps over the lazy dog").unwrap();
        corpus
    }

    #[cfg(unix)]
    fn write_stub_trainer(dir: &std::path::Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fasttext-stub");
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn missing_binary_is_a_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_corpus(dir.path());

        let trainer = FastTextCli::new("/nonexistent/fasttext");
        let result = trainer.train(
            &TrainParams::default(),
            &corpus,
            &dir.path().join("model"),
        );

        assert!(matches!(result, Err(Error::Process { .. })));
    }

    #[test]
    fn missing_corpus_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let trainer = FastTextCli::new("fasttext");
        let result = trainer.train(
            &TrainParams::default(),
            &dir.path().join("no-such-corpus.txt"),
            &dir.path().join("model"),
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn missing_output_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_corpus(dir.path());

        let trainer = FastTextCli::new("fasttext");
        let result = trainer.train(
            &TrainParams::default(),
            &corpus,
            &dir.path().join("no-such-dir").join("model"),
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn invalid_params_are_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_corpus(dir.path());

        let params = TrainParams {
            min_n: 6,
            max_n: 3,
            ..TrainParams::default()
        };

        // The binary does not exist, so reaching the spawn would fail
        // with a process error rather than a config error.
        let trainer = FastTextCli::new("/nonexistent/fasttext");
        let result = trainer.train(&params, &corpus, &dir.path().join("model"));

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn failing_trainer_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_corpus(dir.path());
        let stub = write_stub_trainer(
            dir.path(),
            "#!/bin/sh\necho 'Invalid argument' >&2\nexit 1\n",
        );

        let trainer = FastTextCli::new(stub);
        let result = trainer.train(
            &TrainParams::default(),
            &corpus,
            &dir.path().join("model"),
        );

        match result {
            Err(Error::TrainingFailed { stderr, .. }) => {
                assert!(stderr.contains("Invalid argument"))
            }
            other => panic!(
                "Expected training failure, got: {:?}",
                other.map(|_| "model")
            ),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stub_trainer_output_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_corpus(dir.path());

        // Pretend to be fastText: consume the arguments and write a
        // tiny .vec file for the -output base.
        let stub = write_stub_trainer(
            dir.path(),
            concat!(
                "#!/bin/sh\n",
                "out=\"\"\n",
                "while [ $# -gt 0 ]; do\n",
                "  if [ \"$1\" = \"-output\" ]; then out=\"$2\"; fi\n",
                "  shift\n",
                "done\n",
                "printf '2 3\\nhello 1 0 0\\nworld 0 1 0\\n' > \"$out.vec\"\n",
            ),
        );

        let trainer = FastTextCli::new(stub);
        let model = trainer
            .train(
                &TrainParams::default(),
                &corpus,
                &dir.path().join("model"),
            )
            .unwrap();

        let embeddings = model.load_text().unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings.dims(), 3);
        assert_eq!(embeddings.vocab().words(), &["hello", "world"]);
    }

    #[test]
    fn trained_model_paths_derive_from_base() {
        let model = TrainedModel::from_base("models/toy");
        assert_eq!(model.bin_path(), std::path::Path::new("models/toy.bin"));
        assert_eq!(model.vec_path(), std::path::Path::new("models/toy.vec"));
    }
}
