use crate::traits::Embedder;
use crate::ModelError;
use async_trait::async_trait;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;
// Whole-word features hash from a separate seed so they do not share buckets
// with the trigram of the same spelling.
const WORD_SEED: u64 = FNV_OFFSET ^ 0x9e37_79b9_7f4a_7c15;

/// Offline embedder for local runs and tests.
///
/// Each word is lowercased and padded as `<word>`, then every character
/// trigram of the padded form and the word itself are hashed into buckets.
/// Padding gives one- and two-letter words ("a", "ok") real features, so
/// short questions never collapse to the zero vector. Text with no
/// alphanumeric content does.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let buckets = vector.len() as u64;

        for word in words(text) {
            let padded: Vec<char> = std::iter::once('<')
                .chain(word.chars())
                .chain(std::iter::once('>'))
                .collect();

            let mut gram = String::with_capacity(12);
            for window in padded.windows(3) {
                gram.clear();
                gram.extend(window);
                vector[(fnv1a(FNV_OFFSET, gram.as_bytes()) % buckets) as usize] += 1.0;
            }
            vector[(fnv1a(WORD_SEED, word.as_bytes()) % buckets) as usize] += 1.0;
        }

        normalize(&mut vector);
        vector
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    bytes.iter().fold(seed, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vector.iter_mut().for_each(|value| *value /= magnitude);
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "ngram"
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
