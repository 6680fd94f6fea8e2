//! Traits and trait implementations for similarity queries.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::f32;

use ndarray::{s, Array1, ArrayView1, Axis, CowArray, Ix1};
use ordered_float::NotNan;

use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use crate::storage::{Storage, StorageView};
use crate::util::l2_normalize;
use crate::vocab::Vocab;

/// A word with its similarity.
///
/// This data structure is used to store a pair consisting of a word and
/// its similarity to a query word.
#[derive(Debug, Eq, PartialEq)]
pub struct WordSimilarityResult<'a> {
    similarity: NotNan<f32>,
    word: &'a str,
}

impl<'a> WordSimilarityResult<'a> {
    /// Get the word's similarity in angular similarity.
    pub fn angular_similarity(&self) -> f32 {
        1f32 - (self.similarity.acos() / f32::consts::PI)
    }

    /// Get the word's similarity in cosine similarity.
    pub fn cosine_similarity(&self) -> f32 {
        *self.similarity
    }

    pub fn word(&self) -> &str {
        self.word
    }
}

impl<'a> Ord for WordSimilarityResult<'a> {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.similarity.cmp(&self.similarity) {
            Ordering::Equal => self.word.cmp(other.word),
            ordering => ordering,
        }
    }
}

impl<'a> PartialOrd for WordSimilarityResult<'a> {
    fn partial_cmp(&self, other: &WordSimilarityResult) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Trait for analogy queries.
pub trait Analogy {
    /// Perform an analogy query.
    ///
    /// This method returns words that are close in vector space for the
    /// analogy query `word1` is to `word2` as `word3` is to `?`. More
    /// concretely, it searches embeddings that are similar to:
    ///
    /// *embedding(word2) - embedding(word1) + embedding(word3)*
    ///
    /// At most, `limit` results are returned. `Result::Err` is returned
    /// when no embedding could be computed for one or more of the tokens,
    /// indicating which of the tokens were present.
    ///
    /// If `batch_size` is `None`, the query will be performed on all
    /// word embeddings at once. This is typically the most efficient, but
    /// can require a large amount of memory. The query is performed on batches
    /// of size `n` when `batch_size` is `Some(n)`. Setting this to a smaller
    /// value than the number of word embeddings reduces memory use at the
    /// cost of computational efficiency.
    fn analogy(
        &self,
        query: [&str; 3],
        limit: usize,
        batch_size: Option<usize>,
    ) -> std::result::Result<Vec<WordSimilarityResult>, [bool; 3]> {
        self.analogy_masked(query, [true, true, true], limit, batch_size)
    }

    /// Perform an analogy query, controlling which query words are
    /// excluded from the results.
    ///
    /// `remove` specifies which parts of the query are excluded from the
    /// output candidates. If `remove[0]` is `true`, `word1` cannot be
    /// returned as an answer to the query.
    fn analogy_masked(
        &self,
        query: [&str; 3],
        remove: [bool; 3],
        limit: usize,
        batch_size: Option<usize>,
    ) -> std::result::Result<Vec<WordSimilarityResult>, [bool; 3]>;
}

impl<V, S> Analogy for Embeddings<V, S>
where
    V: Vocab,
    S: StorageView,
{
    fn analogy_masked(
        &self,
        query: [&str; 3],
        remove: [bool; 3],
        limit: usize,
        batch_size: Option<usize>,
    ) -> std::result::Result<Vec<WordSimilarityResult>, [bool; 3]> {
        let [embedding1, embedding2, embedding3] = lookup_words3(self, query)?;

        let mut embedding = (&embedding2.view() - &embedding1.view()) + &embedding3.view();
        l2_normalize(embedding.view_mut());

        let skip = query
            .iter()
            .zip(remove.iter())
            .filter(|(_, &exclude)| exclude)
            .map(|(&word, _)| word)
            .collect();

        Ok(self.similarity_(embedding.view(), &skip, limit, batch_size))
    }
}

/// Trait for word similarity queries.
pub trait WordSimilarity {
    /// Find words that are similar to the query word.
    ///
    /// The similarity between two words is defined by the dot product of
    /// the embeddings. Since the embeddings are normalized to unit
    /// vectors at load time, this is the cosine similarity. At most,
    /// `limit` results are returned.
    fn word_similarity(
        &self,
        word: &str,
        limit: usize,
        batch_size: Option<usize>,
    ) -> Option<Vec<WordSimilarityResult>>;
}

impl<V, S> WordSimilarity for Embeddings<V, S>
where
    V: Vocab,
    S: StorageView,
{
    fn word_similarity(
        &self,
        word: &str,
        limit: usize,
        batch_size: Option<usize>,
    ) -> Option<Vec<WordSimilarityResult>> {
        let embed = self.embedding(word)?;
        let mut skip = HashSet::new();
        skip.insert(word);

        Some(self.similarity_(embed.view(), &skip, limit, batch_size))
    }
}

/// Trait for embedding similarity queries.
pub trait EmbeddingSimilarity {
    /// Find words that are similar to the query embedding.
    ///
    /// The query embedding is l2-normalized, so the dot product with
    /// the stored unit vectors is the cosine similarity.
    fn embedding_similarity(
        &self,
        query: ArrayView1<f32>,
        limit: usize,
        batch_size: Option<usize>,
    ) -> Option<Vec<WordSimilarityResult>> {
        self.embedding_similarity_masked(query, limit, &HashSet::new(), batch_size)
    }

    /// Find words that are similar to the query embedding while skipping
    /// certain words.
    fn embedding_similarity_masked(
        &self,
        query: ArrayView1<f32>,
        limit: usize,
        skips: &HashSet<&str>,
        batch_size: Option<usize>,
    ) -> Option<Vec<WordSimilarityResult>>;
}

impl<V, S> EmbeddingSimilarity for Embeddings<V, S>
where
    V: Vocab,
    S: StorageView,
{
    fn embedding_similarity_masked(
        &self,
        query: ArrayView1<f32>,
        limit: usize,
        skip: &HashSet<&str>,
        batch_size: Option<usize>,
    ) -> Option<Vec<WordSimilarityResult>> {
        let mut query = query.to_owned();
        l2_normalize(query.view_mut());
        Some(self.similarity_(query.view(), skip, limit, batch_size))
    }
}

/// Trait for pairwise word similarity.
pub trait PairSimilarity {
    /// Get the cosine similarity of two words.
    ///
    /// Returns `None` if no embedding can be computed for either word.
    fn pair_similarity(&self, word1: &str, word2: &str) -> Option<f32>;
}

impl<V, S> PairSimilarity for Embeddings<V, S>
where
    V: Vocab,
    S: Storage,
{
    fn pair_similarity(&self, word1: &str, word2: &str) -> Option<f32> {
        let embedding1 = self.embedding(word1)?;
        let embedding2 = self.embedding(word2)?;

        Some(embedding1.view().dot(&embedding2.view()))
    }
}

/// Trait for odd-one-out queries.
pub trait OddOneOut {
    /// Find the word that least belongs in a list of words.
    ///
    /// The words are averaged into a single vector; the word with the
    /// lowest cosine similarity to that average is returned.
    ///
    /// `Error::MissingWords` is returned when one or more of the words
    /// have no embedding.
    ///
    /// Panics when fewer than two words are given.
    fn odd_one_out<'a>(&self, words: &[&'a str]) -> Result<&'a str>;
}

impl<V, S> OddOneOut for Embeddings<V, S>
where
    V: Vocab,
    S: Storage,
{
    fn odd_one_out<'a>(&self, words: &[&'a str]) -> Result<&'a str> {
        assert!(
            words.len() >= 2,
            "An odd-one-out query requires at least two words."
        );

        let mut embeddings = Vec::with_capacity(words.len());
        let mut missing = Vec::new();
        for &word in words {
            match self.embedding(word) {
                Some(embedding) => embeddings.push(embedding),
                None => missing.push(word.to_owned()),
            }
        }

        if !missing.is_empty() {
            return Err(Error::MissingWords { words: missing });
        }

        let mut mean: Array1<f32> = Array1::zeros(self.dims());
        for embedding in &embeddings {
            mean += &embedding.view();
        }
        mean /= words.len() as f32;
        l2_normalize(mean.view_mut());

        let mut odd = 0;
        let mut lowest = f32::INFINITY;
        for (idx, embedding) in embeddings.iter().enumerate() {
            let similarity = embedding.view().dot(&mean.view());
            if similarity < lowest {
                lowest = similarity;
                odd = idx;
            }
        }

        Ok(words[odd])
    }
}

trait SimilarityPrivate {
    fn similarity_(
        &self,
        embed: ArrayView1<f32>,
        skip: &HashSet<&str>,
        limit: usize,
        batch_size: Option<usize>,
    ) -> Vec<WordSimilarityResult>;
}

impl<V, S> SimilarityPrivate for Embeddings<V, S>
where
    V: Vocab,
    S: StorageView,
{
    fn similarity_(
        &self,
        embed: ArrayView1<f32>,
        skip: &HashSet<&str>,
        limit: usize,
        batch_size: Option<usize>,
    ) -> Vec<WordSimilarityResult> {
        let batch_size = batch_size.unwrap_or_else(|| self.vocab().words_len());

        let mut results = BinaryHeap::with_capacity(limit);

        for (batch_idx, batch) in self
            .storage()
            .view()
            .slice(s![0..self.vocab().words_len(), ..])
            .axis_chunks_iter(Axis(0), batch_size)
            .enumerate()
        {
            let sims = batch.dot(&embed);

            for (idx, &sim) in sims.iter().enumerate() {
                let word = &self.vocab().words()[(batch_idx * batch_size) + idx];

                // Don't add words that we are explicitly asked to skip.
                if skip.contains(word.as_str()) {
                    continue;
                }

                let word_similarity = WordSimilarityResult {
                    word,
                    similarity: NotNan::new(sim).expect("Encountered NaN"),
                };

                if results.len() < limit {
                    results.push(word_similarity);
                } else {
                    let mut peek = results.peek_mut().expect("Cannot peek non-empty heap");
                    if word_similarity < *peek {
                        *peek = word_similarity
                    }
                }
            }
        }

        results.into_sorted_vec()
    }
}

fn lookup_words3<'a, V, S>(
    embeddings: &'a Embeddings<V, S>,
    query: [&str; 3],
) -> std::result::Result<[CowArray<'a, f32, Ix1>; 3], [bool; 3]>
where
    V: Vocab,
    S: Storage,
{
    let embedding1 = embeddings.embedding(query[0]);
    let embedding2 = embeddings.embedding(query[1]);
    let embedding3 = embeddings.embedding(query[2]);

    let present = [
        embedding1.is_some(),
        embedding2.is_some(),
        embedding3.is_some(),
    ];

    if !present.iter().all(|&present| present) {
        return Err(present);
    }

    Ok([
        embedding1.unwrap(),
        embedding2.unwrap(),
        embedding3.unwrap(),
    ])
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, Array2};
    use ordered_float::NotNan;

    use super::{
        Analogy, EmbeddingSimilarity, OddOneOut, PairSimilarity, WordSimilarity,
        WordSimilarityResult,
    };
    use crate::embeddings::Embeddings;
    use crate::error::Error;
    use crate::norms::NdNorms;
    use crate::storage::NdArray;
    use crate::util::l2_normalize_array;
    use crate::vocab::SimpleVocab;

    // A small hand-constructed space:
    //
    // - "noord" and "zuid" point in nearly the same direction.
    // - "oost" is orthogonal to both.
    // - "appel" points away from all of the above.
    // - "peer" is close to "appel".
    //
    // "man" - "koning" + "vrouw" style offsets are covered by the
    // parallelogram test below.
    fn test_embeddings() -> Embeddings<SimpleVocab, NdArray> {
        let vocab = SimpleVocab::new(vec![
            "noord".to_owned(),
            "zuid".to_owned(),
            "oost".to_owned(),
            "appel".to_owned(),
            "peer".to_owned(),
        ]);

        let mut matrix = Array2::from_shape_vec(
            (5, 3),
            vec![
                1.0, 0.1, 0.0, // noord
                1.0, 0.0, 0.1, // zuid
                0.0, 1.0, 0.0, // oost
                -1.0, -1.0, 0.5, // appel
                -1.0, -0.9, 0.4, // peer
            ],
        )
        .unwrap();
        let norms = NdNorms(l2_normalize_array(matrix.view_mut()));

        Embeddings::new(None, vocab, NdArray::new(matrix), norms)
    }

    // A parallelogram in 4-d space, so that b - a + c lands exactly on
    // the fourth corner.
    fn parallelogram_embeddings() -> Embeddings<SimpleVocab, NdArray> {
        let vocab = SimpleVocab::new(vec![
            "a".to_owned(),
            "b".to_owned(),
            "c".to_owned(),
            "d".to_owned(),
            "ruis".to_owned(),
        ]);

        let mut matrix = Array2::from_shape_vec(
            (5, 4),
            vec![
                1.0, 0.0, 0.0, 0.0, // a
                0.0, 1.0, 0.0, 0.0, // b
                0.0, 0.0, 1.0, 0.0, // c
                -1.0, 1.0, 1.0, 0.0, // d ~ b - a + c
                0.0, 0.0, 0.0, 1.0, // ruis
            ],
        )
        .unwrap();
        let norms = NdNorms(l2_normalize_array(matrix.view_mut()));

        Embeddings::new(None, vocab, NdArray::new(matrix), norms)
    }

    #[test]
    fn cosine_similarity_is_correctly_converted_to_angular_similarity() {
        let result = WordSimilarityResult {
            word: "test",
            similarity: NotNan::new(1f32).unwrap(),
        };
        assert_abs_diff_eq!(result.angular_similarity(), 1f32, epsilon = 1e-5);

        let result = WordSimilarityResult {
            word: "test",
            similarity: NotNan::new(0.70710678f32).unwrap(),
        };
        assert_abs_diff_eq!(result.angular_similarity(), 0.75f32, epsilon = 1e-5);

        let result = WordSimilarityResult {
            word: "test",
            similarity: NotNan::new(0f32).unwrap(),
        };
        assert_abs_diff_eq!(result.angular_similarity(), 0.5f32, epsilon = 1e-5);

        let result = WordSimilarityResult {
            word: "test",
            similarity: NotNan::new(-1f32).unwrap(),
        };
        assert_abs_diff_eq!(result.angular_similarity(), 0f32, epsilon = 1e-5);
    }

    #[test]
    fn word_similarity_orders_neighbors() {
        let embeddings = test_embeddings();

        let result = embeddings.word_similarity("noord", 4, None).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result[0].word(), "zuid");

        // The query word itself is skipped.
        assert!(result.iter().all(|r| r.word() != "noord"));

        // Similarities are monotonically non-increasing.
        for window in result.windows(2) {
            assert!(window[0].cosine_similarity() >= window[1].cosine_similarity());
        }
    }

    #[test]
    fn word_similarity_respects_limit() {
        let embeddings = test_embeddings();
        let result = embeddings.word_similarity("appel", 1, None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].word(), "peer");
    }

    #[test]
    fn word_similarity_is_invariant_to_batch_size() {
        let embeddings = test_embeddings();
        let all = embeddings.word_similarity("noord", 4, None).unwrap();
        let batched = embeddings.word_similarity("noord", 4, Some(2)).unwrap();

        let all_words: Vec<_> = all.iter().map(|r| r.word()).collect();
        let batched_words: Vec<_> = batched.iter().map(|r| r.word()).collect();
        assert_eq!(all_words, batched_words);
    }

    #[test]
    fn word_similarity_of_unknown_word_is_none() {
        let embeddings = test_embeddings();
        assert!(embeddings.word_similarity("west", 5, None).is_none());
    }

    #[test]
    fn embedding_similarity_includes_query_neighborhood() {
        let embeddings = test_embeddings();
        let query = embeddings.embedding("noord").unwrap();
        let result = embeddings
            .embedding_similarity(query.view(), 2, None)
            .unwrap();
        assert_eq!(result[0].word(), "noord");
        assert_eq!(result[1].word(), "zuid");
    }

    #[test]
    fn analogy_finds_parallelogram_corner() {
        let embeddings = parallelogram_embeddings();
        let result = embeddings.analogy(["a", "b", "c"], 1, None).unwrap();
        assert_eq!(result[0].word(), "d");
    }

    #[test]
    fn analogy_batched_matches_unbatched() {
        let embeddings = parallelogram_embeddings();
        let unbatched = embeddings.analogy(["a", "b", "c"], 2, None).unwrap();
        let batched = embeddings.analogy(["a", "b", "c"], 2, Some(2)).unwrap();
        let unbatched: Vec<_> = unbatched.iter().map(|r| r.word()).collect();
        let batched: Vec<_> = batched.iter().map(|r| r.word()).collect();
        assert_eq!(unbatched, batched);
    }

    #[test]
    fn analogy_reports_missing_words() {
        let embeddings = parallelogram_embeddings();
        assert_eq!(
            embeddings.analogy(["x", "b", "c"], 1, None).unwrap_err(),
            [false, true, true]
        );
        assert_eq!(
            embeddings.analogy(["a", "x", "c"], 1, None).unwrap_err(),
            [true, false, true]
        );
        assert_eq!(
            embeddings.analogy(["a", "b", "x"], 1, None).unwrap_err(),
            [true, true, false]
        );
    }

    #[test]
    fn analogy_masked_keeps_unmasked_query_words() {
        let embeddings = parallelogram_embeddings();
        let result = embeddings
            .analogy_masked(["a", "b", "c"], [true, false, false], 5, None)
            .unwrap();
        assert!(result.iter().any(|r| r.word() == "b"));
        assert!(result.iter().all(|r| r.word() != "a"));
    }

    #[test]
    fn pair_similarity_is_cosine() {
        let embeddings = test_embeddings();

        let noord_zuid = embeddings.pair_similarity("noord", "zuid").unwrap();
        let noord_appel = embeddings.pair_similarity("noord", "appel").unwrap();
        assert!(noord_zuid > noord_appel);

        let check = embeddings
            .embedding("noord")
            .unwrap()
            .view()
            .dot(&embeddings.embedding("zuid").unwrap().view());
        assert_abs_diff_eq!(noord_zuid, check, epsilon = 1e-6);

        assert!(embeddings.pair_similarity("noord", "west").is_none());
    }

    #[test]
    fn odd_one_out_finds_outlier() {
        let embeddings = test_embeddings();
        assert_eq!(
            embeddings
                .odd_one_out(&["noord", "zuid", "appel"])
                .unwrap(),
            "appel"
        );
    }

    #[test]
    fn odd_one_out_reports_missing_words() {
        let embeddings = test_embeddings();
        match embeddings.odd_one_out(&["noord", "west", "appel"]) {
            Err(Error::MissingWords { words }) => assert_eq!(words, vec!["west".to_owned()]),
            other => panic!("Expected missing words, got: {:?}", other.map(|w| w.to_owned())),
        }
    }

    #[test]
    fn embedding_arithmetic_matches_expectation() {
        let embeddings = parallelogram_embeddings();
        let b = embeddings.embedding("b").unwrap();
        let c = embeddings.embedding("c").unwrap();
        let a = embeddings.embedding("a").unwrap();
        let offset = (&b.view() - &a.view()) + &c.view();
        assert_abs_diff_eq!(
            offset.view().dot(&arr1(&[0f32, 1., 1., 0.]).view()),
            2f32,
            epsilon = 1e-6
        );
    }
}
