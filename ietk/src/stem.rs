use rust_stemmers::{Algorithm, Stemmer};

/// Returns the lowercased Porter stem of a word.
pub fn stem_word(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    Stemmer::create(Algorithm::English)
        .stem(&lower)
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_word() {
        assert_eq!("run", stem_word("Running"));
        assert_eq!("connect", stem_word("connections"));
        assert_eq!("mit", stem_word("MIT"));
    }
}
