//! CoNLL-2003 style corpora and chunk tag schemes.
//!
//! A file holds one token per line with whitespace-separated columns `token pos chunk ner`.
//! Blank lines separate sentences. Only the first and the last column are used.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

use crate::errors::{IetkError, Result};

/// A sentence read from a CoNLL file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConllSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
}

/// A labeled token range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub range: Range<usize>,
    pub label: String,
}

impl ConllSentence {
    /// Decodes the tags into labeled chunks.
    pub fn chunks(&self) -> Vec<Chunk> {
        tags_to_chunks(&self.tags)
    }
}

/// Reads sentences from a CoNLL formatted source.
///
/// # Errors
///
/// If a non-blank line has fewer than two columns, an error variant will be returned.
pub fn read_conll<R>(rdr: R) -> Result<Vec<ConllSentence>>
where
    R: BufRead,
{
    let mut sentences = vec![];
    let mut current = ConllSentence::default();
    for (i, line) in rdr.lines().enumerate() {
        let line = line?;
        let mut cols = line.split_whitespace();
        let Some(token) = cols.next() else {
            if !current.tokens.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        };
        if token == "-DOCSTART-" {
            continue;
        }
        let tag = cols.last().ok_or_else(|| {
            IetkError::invalid_argument("rdr", format!("line {}: missing tag column", i + 1))
        })?;
        current.tokens.push(token.to_string());
        current.tags.push(tag.to_string());
    }
    if !current.tokens.is_empty() {
        sentences.push(current);
    }
    Ok(sentences)
}

/// Reads sentences from a CoNLL file.
pub fn read_conll_file<P>(path: P) -> Result<Vec<ConllSentence>>
where
    P: AsRef<Path>,
{
    read_conll(BufReader::new(File::open(path)?))
}

fn split_tag(tag: &str) -> (char, &str) {
    if tag == "O" || tag.is_empty() {
        return ('O', "");
    }
    match tag.split_once('-') {
        Some((p, label)) if p.len() == 1 => {
            let p = p.chars().next().unwrap_or('I');
            match p {
                'B' | 'I' | 'L' | 'U' | 'E' | 'S' => (p, label),
                _ => ('I', tag),
            }
        }
        _ => ('I', tag),
    }
}

/// Decodes BIO, IOB1, or BILOU tags into chunks.
///
/// `I-X` continues an open chunk of type `X` and otherwise opens one, so both IOB variants are
/// accepted. `L-X` closes an open chunk of type `X` and otherwise forms a unit chunk.
pub fn tags_to_chunks<S>(tags: &[S]) -> Vec<Chunk>
where
    S: AsRef<str>,
{
    let mut chunks = vec![];
    let mut open: Option<Chunk> = None;
    for (i, tag) in tags.iter().enumerate() {
        let (prefix, label) = split_tag(tag.as_ref());
        let continues = matches!(&open, Some(c) if c.label == label);
        match prefix {
            'O' => chunks.extend(open.take()),
            'B' => {
                chunks.extend(open.take());
                open = Some(Chunk {
                    range: i..i + 1,
                    label: label.to_string(),
                });
            }
            'U' | 'S' => {
                chunks.extend(open.take());
                chunks.push(Chunk {
                    range: i..i + 1,
                    label: label.to_string(),
                });
            }
            'L' | 'E' => {
                if continues {
                    if let Some(mut c) = open.take() {
                        c.range.end = i + 1;
                        chunks.push(c);
                    }
                } else {
                    chunks.extend(open.take());
                    chunks.push(Chunk {
                        range: i..i + 1,
                        label: label.to_string(),
                    });
                }
            }
            _ => {
                if continues {
                    if let Some(c) = open.as_mut() {
                        c.range.end = i + 1;
                    }
                } else {
                    chunks.extend(open.take());
                    open = Some(Chunk {
                        range: i..i + 1,
                        label: label.to_string(),
                    });
                }
            }
        }
    }
    chunks.extend(open);
    chunks
}

/// Encodes chunks as BIO tags where every chunk starts with `B-`.
pub fn chunks_to_bio(len: usize, chunks: &[Chunk]) -> Vec<String> {
    let mut tags = vec!["O".to_string(); len];
    for c in chunks {
        for i in c.range.clone() {
            let prefix = if i == c.range.start { "B" } else { "I" };
            tags[i] = format!("{}-{}", prefix, c.label);
        }
    }
    tags
}

/// Encodes chunks as BILOU tags.
pub fn chunks_to_bilou(len: usize, chunks: &[Chunk]) -> Vec<String> {
    let mut tags = vec!["O".to_string(); len];
    for c in chunks {
        if c.range.len() == 1 {
            tags[c.range.start] = format!("U-{}", c.label);
            continue;
        }
        for i in c.range.clone() {
            let prefix = if i == c.range.start {
                "B"
            } else if i + 1 == c.range.end {
                "L"
            } else {
                "I"
            };
            tags[i] = format!("{}-{}", prefix, c.label);
        }
    }
    tags
}

/// Converts BIO or IOB1 tags to BILOU tags.
pub fn bio_to_bilou<S>(tags: &[S]) -> Vec<String>
where
    S: AsRef<str>,
{
    chunks_to_bilou(tags.len(), &tags_to_chunks(tags))
}

/// Converts BILOU tags to BIO tags.
pub fn bilou_to_bio<S>(tags: &[S]) -> Vec<String>
where
    S: AsRef<str>,
{
    chunks_to_bio(tags.len(), &tags_to_chunks(tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = "\
-DOCSTART- -X- -X- O

EU NNP B-NP I-ORG
rejects VBZ B-VP O
German JJ B-NP I-MISC
call NN I-NP O
. . O O

Peter NNP B-NP I-PER
Blackburn NNP I-NP I-PER
";

    #[test]
    fn test_read_conll() {
        let sents = read_conll(DATA.as_bytes()).unwrap();
        assert_eq!(2, sents.len());
        assert_eq!(vec!["EU", "rejects", "German", "call", "."], sents[0].tokens);
        assert_eq!(vec!["I-ORG", "O", "I-MISC", "O", "O"], sents[0].tags);
        assert_eq!(
            vec![Chunk {
                range: 0..2,
                label: "PER".to_string()
            }],
            sents[1].chunks()
        );
    }

    #[test]
    fn test_read_conll_missing_column() {
        assert!(read_conll("EU\n".as_bytes()).is_err());
    }

    #[test]
    fn test_iob1_adjacent_chunks() {
        let chunks = tags_to_chunks(&["I-PER", "I-PER", "B-PER", "I-LOC", "O"]);
        assert_eq!(
            vec![(0..2, "PER"), (2..3, "PER"), (3..4, "LOC")],
            chunks
                .iter()
                .map(|c| (c.range.clone(), c.label.as_str()))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_bio_to_bilou() {
        assert_eq!(
            vec!["B-PER", "L-PER", "U-PER", "O", "B-ORG", "I-ORG", "L-ORG"],
            bio_to_bilou(&["B-PER", "I-PER", "B-PER", "O", "B-ORG", "I-ORG", "I-ORG"])
        );
    }

    #[test]
    fn test_bilou_to_bio() {
        assert_eq!(
            vec!["B-PER", "I-PER", "B-PER", "O", "B-LOC"],
            bilou_to_bio(&["B-PER", "L-PER", "U-PER", "O", "U-LOC"])
        );
    }

    #[test]
    fn test_inside_tag_after_outside() {
        assert_eq!(
            vec!["O", "B-PER", "L-PER", "O", "U-ORG"],
            bio_to_bilou(&["O", "I-PER", "I-PER", "O", "I-ORG"])
        );
        assert_eq!(
            vec!["U-PER", "B-ORG", "L-ORG"],
            bio_to_bilou(&["B-PER", "I-ORG", "L-ORG"])
        );
    }

    #[test]
    fn test_dangling_last_tag_mid_sentence() {
        assert_eq!(
            vec!["U-PER", "U-ORG", "O", "U-PER"],
            bio_to_bilou(&["B-PER", "L-ORG", "O", "L-PER"])
        );
        assert_eq!(
            vec!["O", "B-PER", "B-PER"],
            bilou_to_bio(&["O", "L-PER", "I-PER"])
        );
    }

    #[test]
    fn test_dangling_last_tag() {
        assert_eq!(
            vec!["U-PER", "U-LOC"],
            bio_to_bilou(&["L-PER", "L-LOC"])
        );
    }
}
