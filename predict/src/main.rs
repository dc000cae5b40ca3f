use std::fs::File;
use std::io::{prelude::*, stdin, stdout, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use ietk::{
    entities_overlap, tokenize, BinaryRelationDetector, NamedEntityExtractor, TextCategorizer,
};

#[derive(Parser, Debug)]
#[command(about = "A program to extract information from text read from standard input.")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tags entity mentions, printing `[LABEL tokens]` for each of them
    Ner {
        /// The named entity extractor
        #[arg(long)]
        model: PathBuf,

        /// Prints the score of each entity after its label
        #[arg(long)]
        scores: bool,
    },

    /// Prints every ordered pair of entity mentions that a detector accepts
    Relation {
        /// The named entity extractor
        #[arg(long)]
        ner: PathBuf,

        /// Binary relation detectors
        #[arg(long, required = true)]
        detector: Vec<PathBuf>,

        /// Pairs scoring below this value are not printed
        #[arg(long, default_value = "0")]
        threshold: f64,
    },

    /// Prints the category of each line
    Categorize {
        /// The text categorizer
        #[arg(long)]
        model: PathBuf,

        /// The named entity extractor whose word features a categorizer written without them uses
        #[arg(long)]
        ner: Option<PathBuf>,
    },
}

type Decoder = zstd::Decoder<'static, BufReader<File>>;

fn open(path: &Path) -> Result<Decoder, Box<dyn std::error::Error>> {
    eprintln!("Loading {path:?} ...");
    Ok(zstd::Decoder::new(File::open(path)?)?)
}

fn tag_lines<W>(
    ner: &NamedEntityExtractor,
    scores: bool,
    out: &mut W,
) -> Result<usize, Box<dyn std::error::Error>>
where
    W: Write,
{
    let tags = ner.tag_name_strings();
    let mut n_entities = 0;
    for line in stdin().lock().lines() {
        let tokens = tokenize(&line?);
        let entities = ner.predict(&tokens)?;
        n_entities += entities.len();
        let mut entities = entities.into_iter().peekable();
        let mut words = vec![];
        let mut i = 0;
        while i < tokens.len() {
            match entities.next_if(|e| e.range.start == i) {
                Some(e) => {
                    let label = if scores {
                        format!("{}/{:.3}", tags[e.tag], e.score)
                    } else {
                        tags[e.tag].clone()
                    };
                    words.push(format!("[{} {}]", label, tokens[e.range.clone()].join(" ")));
                    i = e.range.end;
                }
                None => {
                    words.push(tokens[i].clone());
                    i += 1;
                }
            }
        }
        writeln!(out, "{}", words.join(" "))?;
    }
    Ok(n_entities)
}

fn detect_relations<W>(
    ner: &NamedEntityExtractor,
    detectors: &[BinaryRelationDetector],
    threshold: f64,
    out: &mut W,
) -> Result<usize, Box<dyn std::error::Error>>
where
    W: Write,
{
    let tags = ner.tag_name_strings();
    let mut n_relations = 0;
    for line in stdin().lock().lines() {
        let tokens = tokenize(&line?);
        let entities = ner.predict(&tokens)?;
        for e1 in &entities {
            for e2 in &entities {
                if entities_overlap(&e1.range, &e2.range) {
                    continue;
                }
                let rel =
                    ner.extract_binary_relation(&tokens, e1.range.clone(), e2.range.clone())?;
                for detector in detectors {
                    let score = detector.score(&rel)?;
                    if score < threshold {
                        continue;
                    }
                    writeln!(
                        out,
                        "{}\t{:.3}\t{} {}\t{} {}",
                        detector.name(),
                        score,
                        tags[e1.tag],
                        tokens[e1.range.clone()].join(" "),
                        tags[e2.tag],
                        tokens[e2.range.clone()].join(" "),
                    )?;
                    n_relations += 1;
                }
            }
        }
    }
    Ok(n_relations)
}

fn categorize_lines<W>(
    categorizer: &TextCategorizer,
    out: &mut W,
) -> Result<usize, Box<dyn std::error::Error>>
where
    W: Write,
{
    let mut n_docs = 0;
    for line in stdin().lock().lines() {
        let tokens = tokenize(&line?);
        if tokens.is_empty() {
            writeln!(out)?;
            continue;
        }
        let (label, score) = categorizer.predict(&tokens)?;
        writeln!(out, "{}\t{:.3}", label, score)?;
        n_docs += 1;
    }
    Ok(n_docs)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut out = BufWriter::new(stdout().lock());
    let start = Instant::now();
    match args.command {
        Command::Ner { model, scores } => {
            let ner = NamedEntityExtractor::read(open(&model)?)?;
            let n = tag_lines(&ner, scores, &mut out)?;
            eprintln!("# of entities: {}", n);
        }
        Command::Relation {
            ner,
            detector,
            threshold,
        } => {
            let ner = NamedEntityExtractor::read(open(&ner)?)?;
            let detectors = detector
                .iter()
                .map(|path| Ok(BinaryRelationDetector::read(open(path)?)?))
                .collect::<Result<Vec<_>, Box<dyn std::error::Error>>>()?;
            let n = detect_relations(&ner, &detectors, threshold, &mut out)?;
            eprintln!("# of relations: {}", n);
        }
        Command::Categorize { model, ner } => {
            let categorizer = match ner {
                Some(ner) => {
                    let ner = NamedEntityExtractor::read(open(&ner)?)?;
                    TextCategorizer::read_with_extractor(
                        open(&model)?,
                        ner.word_feature_extractor().clone(),
                    )?
                }
                None => TextCategorizer::read(open(&model)?)?,
            };
            let n = categorize_lines(&categorizer, &mut out)?;
            eprintln!("# of documents: {}", n);
        }
    }
    out.flush()?;
    eprintln!("Elapsed: {} [sec]", start.elapsed().as_secs_f64());

    Ok(())
}
