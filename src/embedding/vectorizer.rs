use std::collections::HashMap;

/// Builds TF-IDF vectors over a fixed vocabulary of word n-grams
/// (1 to `ngram_max`), capped at `vocab_max` terms by document
/// frequency. Pure, deterministic given a fixed corpus.
pub struct TfIdfVectorizer {
    vocab: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    /// Fits the vocabulary and IDF weights over `documents`.
    pub fn fit(documents: &[String], vocab_max: usize, ngram_max: usize) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let doc_count = documents.len().max(1);

        for doc in documents {
            let terms = ngrams(doc, ngram_max);
            let mut seen = std::collections::HashSet::new();
            for term in terms {
                if seen.insert(term.clone()) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        let mut terms: Vec<(String, usize)> = doc_freq.into_iter().collect();
        // Highest document frequency first -- the most broadly useful
        // terms survive the vocab cap.
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.truncate(vocab_max);

        let mut vocab = HashMap::new();
        let mut idf = vec![0.0; terms.len()];
        for (i, (term, df)) in terms.into_iter().enumerate() {
            vocab.insert(term, i);
            idf[i] = ((doc_count as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0;
        }

        TfIdfVectorizer { vocab, idf }
    }

    pub fn dim(&self) -> usize {
        self.vocab.len()
    }

    pub fn transform(&self, document: &str, ngram_max: usize) -> Vec<f64> {
        let mut vector = vec![0.0; self.vocab.len()];
        let terms = ngrams(document, ngram_max);
        if terms.is_empty() {
            return vector;
        }
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for term in &terms {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }
        let total = terms.len() as f64;
        for (term, count) in counts {
            if let Some(&idx) = self.vocab.get(term) {
                let tf = count as f64 / total;
                vector[idx] = tf * self.idf[idx];
            }
        }
        vector
    }
}

/// Word n-grams (not character n-grams) from 1 up to `max_n`, joined
/// with a separator so `"vitamin e"` as a bigram is distinguishable
/// from the unigrams `"vitamin"` and `"e"`.
fn ngrams(text: &str, max_n: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out = Vec::new();
    for n in 1..=max_n.max(1) {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            out.push(window.join("_"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocab_capped_at_max() {
        let docs = vec!["a b c".to_string(), "a b d".to_string(), "a e f".to_string()];
        let v = TfIdfVectorizer::fit(&docs, 2, 1);
        assert_eq!(v.dim(), 2);
    }

    #[test]
    fn transform_produces_fixed_dimension_vector() {
        let docs = vec!["vitamin e safe".to_string(), "vitamin c active".to_string()];
        let v = TfIdfVectorizer::fit(&docs, 10, 2);
        let vec1 = v.transform("vitamin e safe", 2);
        assert_eq!(vec1.len(), v.dim());
    }
}
