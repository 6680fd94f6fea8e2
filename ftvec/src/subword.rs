//! Subword n-grams and fastText-compatible bucket hashing.

use std::cmp;

/// Iterator over the n-grams of a word.
///
/// `NGrams` iterates over all n-grams between a minimum and maximum
/// length (in characters). N-grams are sliced on UTF-8 character
/// boundaries, so multi-byte characters count as one unit.
///
/// **Warning:** no guarantee is provided with regard to the iteration
/// order. The iterator only guarantees that all n-grams are produced.
pub struct NGrams<'a> {
    word: &'a str,
    // Byte offset of every character start, with `word.len()` as a
    // final sentinel.
    offsets: Vec<usize>,
    start: usize,
    len: usize,
    min_n: usize,
    max_n: usize,
}

impl<'a> NGrams<'a> {
    /// Create an iterator over n-grams of length *[min_n, max_n]*.
    pub fn new(word: &'a str, min_n: usize, max_n: usize) -> Self {
        assert!(min_n != 0, "The minimum n-gram length cannot be zero.");
        assert!(
            min_n <= max_n,
            "The maximum length should be equal to or greater than the minimum length."
        );

        let mut offsets: Vec<usize> = word.char_indices().map(|(idx, _)| idx).collect();
        offsets.push(word.len());

        let n_chars = offsets.len() - 1;

        NGrams {
            word,
            offsets,
            start: 0,
            len: cmp::min(max_n, n_chars),
            min_n,
            max_n,
        }
    }

    fn n_chars(&self) -> usize {
        self.offsets.len() - 1
    }
}

impl<'a> Iterator for NGrams<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.start + self.min_n > self.n_chars() {
                return None;
            }

            if self.len < self.min_n {
                self.start += 1;
                self.len = cmp::min(self.max_n, self.n_chars() - self.start);
                continue;
            }

            let ngram = &self.word[self.offsets[self.start]..self.offsets[self.start + self.len]];
            self.len -= 1;

            return Some(ngram);
        }
    }
}

/// fastText-compatible subword indexer.
///
/// Subword indexing assigns an identifier to each n-gram of a word by
/// hashing the n-gram and mapping the hash to a bucket. Since a
/// non-perfect hash function is used, multiple n-grams can map to the
/// same bucket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubwordIndexer {
    // fastText is inconsistent with types when it comes to buckets,
    // the data types are:
    //
    // - buckets: int
    // - hash: uint32_t
    // - bucket: int32_t
    //
    // We will make the following assumptions: (1) the range of
    // buckets is determined by int32_t; (2) the maximum number of
    // buckets is the maximum value of int32_t. We will verify
    // the maximum value in the constructor.
    buckets: u32,
}

impl SubwordIndexer {
    /// Construct a `SubwordIndexer`.
    ///
    /// `buckets` is the (exact) number of buckets to use.
    pub fn new(buckets: usize) -> Self {
        assert!(
            buckets <= i32::MAX as usize,
            "The largest possible number of buckets is: {}",
            i32::MAX
        );

        SubwordIndexer {
            buckets: buckets as u32,
        }
    }

    /// Get the number of buckets.
    pub fn buckets(&self) -> usize {
        self.buckets as usize
    }

    /// Map an n-gram to its bucket.
    pub fn index_ngram(&self, ngram: &str) -> u64 {
        u64::from(fasttext_hash(ngram) % self.buckets)
    }
}

/// fastText FNV-1a implementation.
///
/// The fastText implementation of FNV-1a has a bug caused
/// by sign extension on compilers where char is signed:
///
/// https://github.com/facebookresearch/fastText/issues/539
///
/// This implementation 'emulates' the bug for compatibility
/// with pretrained fastText embeddings.
fn fasttext_hash(ngram: &str) -> u32 {
    let mut h = 2_166_136_261;

    for byte in ngram.bytes() {
        // Cast bytes to i8, so that sign-extension is applied when
        // widening to u32.
        h ^= (byte as i8) as u32;
        h = h.wrapping_mul(16_777_619);
    }

    h
}

/// Extension trait for computing subword indices.
pub trait SubwordIndices {
    /// Return the subword indices of the n-grams of a string.
    ///
    /// The n-grams that are used are of length *[min_n, max_n]*. They
    /// are mapped to bucket indices using the given indexer.
    fn subword_indices(&self, min_n: usize, max_n: usize, indexer: &SubwordIndexer) -> Vec<u64>;

    /// Return the n-grams of a string together with their indices.
    fn ngram_indices(
        &self,
        min_n: usize,
        max_n: usize,
        indexer: &SubwordIndexer,
    ) -> Vec<(String, u64)>;
}

impl SubwordIndices for str {
    fn subword_indices(&self, min_n: usize, max_n: usize, indexer: &SubwordIndexer) -> Vec<u64> {
        NGrams::new(self, min_n, max_n)
            .map(|ngram| indexer.index_ngram(ngram))
            .collect()
    }

    fn ngram_indices(
        &self,
        min_n: usize,
        max_n: usize,
        indexer: &SubwordIndexer,
    ) -> Vec<(String, u64)> {
        NGrams::new(self, min_n, max_n)
            .map(|ngram| (ngram.to_owned(), indexer.index_ngram(ngram)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use lazy_static::lazy_static;
    use maplit::hashmap;

    use super::{NGrams, SubwordIndexer, SubwordIndices};

    #[test]
    fn ngrams_1_3() {
        let mut check = vec![
            "k", "ko", "koe", "o", "oe", "oei", "e", "ei", "eie", "i", "ie", "ien", "e", "en", "n",
        ];
        check.sort_unstable();

        let mut ngrams: Vec<_> = NGrams::new("koeien", 1, 3).collect();
        ngrams.sort_unstable();

        assert_eq!(check, ngrams);
    }

    #[test]
    fn ngrams_2_3() {
        let mut check = vec!["ko", "koe", "oe", "oei", "ei", "eie", "ie", "ien", "en"];
        check.sort_unstable();

        let mut ngrams: Vec<_> = NGrams::new("koeien", 2, 3).collect();
        ngrams.sort_unstable();

        assert_eq!(check, ngrams);
    }

    #[test]
    fn ngrams_multibyte() {
        let mut check = vec!["zeeë", "eeën", "zeeën"];
        check.sort_unstable();

        let mut ngrams: Vec<_> = NGrams::new("zeeën", 4, 6).collect();
        ngrams.sort_unstable();

        assert_eq!(check, ngrams);
    }

    #[test]
    fn ngrams_shorter_than_min_n() {
        assert_eq!(NGrams::new("ab", 3, 6).count(), 0);
        assert_eq!(NGrams::new("", 1, 3).count(), 0);
    }

    #[test]
    #[should_panic]
    fn ngrams_rejects_zero_min_n() {
        NGrams::new("word", 0, 3);
    }

    #[test]
    #[should_panic]
    fn ngrams_rejects_min_n_above_max_n() {
        NGrams::new("word", 2, 1);
    }

    lazy_static! {
        // Bucket indices were verified against fastText output.
        static ref SUBWORD_TESTS: HashMap<&'static str, Vec<u64>> = hashmap! {
            "<Daniël>" =>
                vec![69886, 84537, 338340, 441697, 448390, 468430, 504093, 573175, 749365, 804851,
                     811506, 991985, 1022467, 1105725, 1249224, 1418443, 1493412, 1880616],
            "<überspringen>" =>
                vec![79599, 119685, 255527, 263610, 352266, 385524, 403356, 421853, 485366, 488156,
                     586161, 619228, 629649, 642367, 716781, 751724, 754367, 771707, 799583, 887882,
                     894109, 904527, 908492, 978563, 991164, 992241, 1142035, 1230973, 1278156,
                     1350653, 1414694, 1513262, 1533308, 1607098, 1607788, 1664269, 1712300,
                     1749574, 1793082, 1891605, 1934955, 1992797],
        };

        // Bucket indices were verified against fastText output.
        static ref SUBWORD_TESTS_5_5: HashMap<&'static str, Vec<u64>> = hashmap! {
            "<Daniël>" => vec![441697, 749365, 1105725, 1880616],
            "<überspringen>" =>
                vec![79599, 352266, 385524, 629649, 716781, 978563, 991164, 1230973, 1350653,
                     1992797],
        };
    }

    #[test]
    fn subword_indices_match_fasttext() {
        let indexer = SubwordIndexer::new(2_000_000);
        for (word, check) in SUBWORD_TESTS.iter() {
            let mut indices = word.subword_indices(3, 6, &indexer);
            indices.sort_unstable();
            assert_eq!(check, &indices);
        }
    }

    #[test]
    fn subword_indices_match_fasttext_5_5() {
        let indexer = SubwordIndexer::new(2_000_000);
        for (word, check) in SUBWORD_TESTS_5_5.iter() {
            let mut indices = word.subword_indices(5, 5, &indexer);
            indices.sort_unstable();
            assert_eq!(check, &indices);
        }
    }

    #[test]
    fn subword_indices_within_buckets() {
        let indexer = SubwordIndexer::new(16);
        for idx in "<departementsgebouw>".subword_indices(3, 6, &indexer) {
            assert!(idx < 16);
        }
    }

    #[test]
    fn ngram_indices_are_consistent() {
        let indexer = SubwordIndexer::new(2_000_000);
        let ngram_indices = "<hallo>".ngram_indices(3, 6, &indexer);
        assert_eq!(ngram_indices.len(), "<hallo>".subword_indices(3, 6, &indexer).len());
        for (ngram, idx) in ngram_indices {
            assert_eq!(indexer.index_ngram(&ngram), idx);
        }
    }
}
