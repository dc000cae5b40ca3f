use std::fs::File;
use std::path::PathBuf;

use clap::Parser;
use ietk::{read_conll_file, Counts, NamedEntityExtractor};

#[derive(Parser, Debug)]
#[command(about = "A program to evaluate the accuracy of a named entity extractor.")]
struct Args {
    /// The named entity extractor
    #[arg(long)]
    model: PathBuf,

    /// CoNLL files of labeled sentences
    #[arg(long, required = true)]
    conll: Vec<PathBuf>,

    /// Also reports how well the segmenter alone finds the mentions
    #[arg(long)]
    segmenter: bool,
}

fn print_counts(name: &str, counts: &Counts) {
    println!(
        "{:<12} Precision: {:.4}  Recall: {:.4}  F1: {:.4}  (correct: {}, predicted: {}, gold: {})",
        name,
        counts.precision(),
        counts.recall(),
        counts.f1(),
        counts.correct,
        counts.predicted,
        counts.gold,
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    eprintln!("Loading model file...");
    let ner = NamedEntityExtractor::read(zstd::Decoder::new(File::open(&args.model)?)?)?;

    let mut sentences = vec![];
    for path in &args.conll {
        eprintln!("Loading {path:?} ...");
        sentences.extend(read_conll_file(path)?);
    }
    eprintln!("# of sentences: {}", sentences.len());

    eprintln!("Start evaluation...");
    let result = ner.evaluate(&sentences)?;
    for label in &result.labels {
        print_counts(&label.label, &label.counts);
    }
    print_counts("TOTAL", &result.total);

    if args.segmenter {
        let counts = ner.test_segmenter(&sentences)?;
        print_counts("SEGMENTER", &counts);
    }

    Ok(())
}
