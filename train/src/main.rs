use std::fs::{self, File};
use std::io::{prelude::*, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgGroup, Args, Parser, Subcommand};
use ietk::tokenizer::GroupTokenizer;
use ietk::{
    read_conll_file, tokenize, BinaryRelationDetectorTrainer, LogLevel, NamedEntityExtractor,
    NerTrainer, TextCategorizerTrainer, TotalWordFeatureExtractor, WordFeatureParams,
    WordFeatureTrainer,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "A program to train models of ietk.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// How much progress is reported: {silent, progress, verbose}
    #[arg(long, default_value = "progress", global = true)]
    log_level: LogLevel,

    /// The number of worker threads
    #[arg(long, default_value = "4", global = true)]
    threads: usize,

    /// The number of workers for zstd (0 means multithreaded will be disabled)
    #[arg(long, default_value = "0", global = true)]
    zstd_workers: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trains a named entity extractor from CoNLL files
    Ner(NerArgs),

    /// Trains a binary relation detector
    Relation(RelationArgs),

    /// Trains a text categorizer
    Categorizer(CategorizerArgs),

    /// Trains a word feature extractor from raw text
    WordFeatures(WordFeatureArgs),
}

#[derive(Args, Debug)]
struct NerArgs {
    /// The word feature extractor
    #[arg(long)]
    word_features: PathBuf,

    /// CoNLL training files
    #[arg(long, required = true)]
    conll: Vec<PathBuf>,

    /// The file to write the trained model to
    #[arg(long)]
    model: PathBuf,

    /// Weight of recall relative to precision when tuning the chunk classifier
    #[arg(long, default_value = "0.5")]
    beta: f64,

    /// The longest entity mention the segmenter can find, in tokens
    #[arg(long, default_value = "3")]
    max_segment_len: usize,
}

#[derive(Args, Debug)]
struct RelationArgs {
    /// A named entity extractor whose word features are used
    #[arg(long)]
    ner: PathBuf,

    /// Training examples, one per line:
    /// `{+|-} <TAB> arg1_begin arg1_end <TAB> arg2_begin arg2_end <TAB> tokens`
    #[arg(long, required = true)]
    data: Vec<PathBuf>,

    /// The name of the relation
    #[arg(long)]
    name: String,

    /// The file to write the trained model to
    #[arg(long)]
    model: PathBuf,

    /// Weight of recall relative to precision when tuning
    #[arg(long, default_value = "0.1")]
    beta: f64,

    /// The number of cross-validation folds
    #[arg(long, default_value = "2")]
    folds: usize,
}

#[derive(Args, Debug)]
#[command(group = ArgGroup::new("features").multiple(false))]
struct CategorizerArgs {
    /// A word feature extractor; bag-of-words features only if neither this nor --ner is given
    #[arg(long, group = "features")]
    word_features: Option<PathBuf>,

    /// A named entity extractor whose word features are shared
    #[arg(long, group = "features")]
    ner: Option<PathBuf>,

    /// Training documents, one per line: `label <TAB> text`
    #[arg(long, required = true)]
    data: Vec<PathBuf>,

    /// The file to write the trained model to
    #[arg(long)]
    model: PathBuf,

    /// Weight of recall relative to precision when tuning
    #[arg(long, default_value = "0.5")]
    beta: f64,

    /// Writes the model without the word feature extractor
    #[arg(long)]
    no_extractor: bool,
}

#[derive(Args, Debug)]
struct WordFeatureArgs {
    /// Raw text files or directories containing them
    #[arg(long, required = true)]
    corpus: Vec<PathBuf>,

    /// The file to write the trained extractor to
    #[arg(long)]
    model: PathBuf,

    /// The number of words that get distributional vectors
    #[arg(long, default_value = "200000")]
    vocab_size: usize,

    /// The width of the context window
    #[arg(long, default_value = "9")]
    window_size: usize,

    /// The maximum number of sampled context windows
    #[arg(long, default_value = "50000000")]
    num_contexts: usize,

    /// Dimensions of each half of the distributional vectors
    #[arg(long, default_value = "90")]
    num_correlations: usize,

    /// The number of substrings used by the morphology features
    #[arg(long, default_value = "20000")]
    num_substrings: usize,

    /// Dimensions of the morphology vectors
    #[arg(long, default_value = "90")]
    num_morph_correlations: usize,

    /// Seed of the random sampling
    #[arg(long, default_value = "0")]
    seed: u64,
}

fn init_logging(log_level: LogLevel) {
    let default = match log_level {
        LogLevel::Silent => "warn",
        LogLevel::Progress => "info",
        LogLevel::Verbose => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn read_word_features(path: &Path) -> Result<TotalWordFeatureExtractor, Box<dyn std::error::Error>> {
    eprintln!("Loading {path:?} ...");
    let f = zstd::Decoder::new(File::open(path)?)?;
    Ok(TotalWordFeatureExtractor::read(f)?)
}

fn read_ner(path: &Path) -> Result<NamedEntityExtractor, Box<dyn std::error::Error>> {
    eprintln!("Loading {path:?} ...");
    let f = zstd::Decoder::new(File::open(path)?)?;
    Ok(NamedEntityExtractor::read(f)?)
}

fn create_encoder(
    path: &Path,
    workers: u32,
) -> Result<zstd::Encoder<'static, File>, Box<dyn std::error::Error>> {
    let mut f = zstd::Encoder::new(File::create(path)?, 19)?;
    f.multithread(workers)?;
    Ok(f)
}

fn parse_range(s: &str) -> Result<std::ops::Range<usize>, Box<dyn std::error::Error>> {
    let mut it = s.split_whitespace();
    match (it.next(), it.next(), it.next()) {
        (Some(b), Some(e), None) => Ok(b.parse()?..e.parse()?),
        _ => Err(format!("invalid range: {:?}", s).into()),
    }
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)?
            .map(|e| e.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        entries.sort();
        for entry in entries {
            collect_files(&entry, files)?;
        }
    } else {
        files.push(path.to_path_buf());
    }
    Ok(())
}

fn train_ner(cli: &Cli, args: &NerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let fe = Arc::new(read_word_features(&args.word_features)?);
    let mut trainer = NerTrainer::new(fe);
    trainer.set_beta(args.beta);
    trainer.set_max_segment_len(args.max_segment_len);
    trainer.set_num_threads(cli.threads);
    trainer.set_log_level(cli.log_level);
    for path in &args.conll {
        eprintln!("Loading {path:?} ...");
        for sentence in read_conll_file(path)? {
            let (chunks, labels) = sentence
                .chunks()
                .into_iter()
                .map(|c| (c.range, c.label))
                .unzip();
            trainer.add(sentence.tokens, chunks, labels)?;
        }
        eprintln!("# of sentences: {}", trainer.size());
    }

    eprintln!("Start training...");
    let ner = trainer.train()?;
    eprintln!("Finish training.");

    let mut f = create_encoder(&args.model, cli.zstd_workers)?;
    ner.write(&mut f)?;
    f.finish()?;
    Ok(())
}

fn train_relation(cli: &Cli, args: &RelationArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ner = read_ner(&args.ner)?;
    let mut trainer = BinaryRelationDetectorTrainer::new(
        args.name.clone(),
        Arc::clone(ner.word_feature_extractor()),
    );
    trainer.set_beta(args.beta);
    trainer.set_num_folds(args.folds);
    trainer.set_num_threads(cli.threads);
    trainer.set_log_level(cli.log_level);
    for path in &args.data {
        eprintln!("Loading {path:?} ...");
        let f = BufReader::new(File::open(path)?);
        for (i, line) in f.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.splitn(4, '\t').collect();
            if cols.len() != 4 {
                return Err(format!("{:?}:{}: expected 4 columns", path, i + 1).into());
            }
            let arg1 = parse_range(cols[1])?;
            let arg2 = parse_range(cols[2])?;
            let tokens: Vec<String> = cols[3].split_whitespace().map(String::from).collect();
            match cols[0] {
                "+" => trainer.add_positive_binary_relation(&tokens, arg1, arg2)?,
                "-" => trainer.add_negative_binary_relation(&tokens, arg1, arg2)?,
                p => return Err(format!("{:?}:{}: invalid polarity {:?}", path, i + 1, p).into()),
            }
        }
    }
    eprintln!(
        "# of examples: {} positive, {} negative",
        trainer.num_positive_examples(),
        trainer.num_negative_examples()
    );

    eprintln!("Start training...");
    let detector = trainer.train()?;
    eprintln!("Finish training.");

    let mut f = create_encoder(&args.model, cli.zstd_workers)?;
    detector.write(&mut f)?;
    f.finish()?;
    Ok(())
}

fn train_categorizer(cli: &Cli, args: &CategorizerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut trainer = if let Some(path) = &args.word_features {
        TextCategorizerTrainer::new(Arc::new(read_word_features(path)?))
    } else if let Some(path) = &args.ner {
        TextCategorizerTrainer::new(Arc::clone(read_ner(path)?.word_feature_extractor()))
    } else {
        TextCategorizerTrainer::bag_of_words()
    };
    trainer.set_beta(args.beta);
    trainer.set_num_threads(cli.threads);
    trainer.set_log_level(cli.log_level);
    for path in &args.data {
        eprintln!("Loading {path:?} ...");
        let f = BufReader::new(File::open(path)?);
        for (i, line) in f.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (label, text) = line
                .split_once('\t')
                .ok_or_else(|| format!("{:?}:{}: expected `label <TAB> text`", path, i + 1))?;
            trainer.add(&tokenize(text), label)?;
        }
        eprintln!("# of documents: {}", trainer.size());
    }

    eprintln!("Start training...");
    let categorizer = trainer.train()?;
    eprintln!("Finish training.");

    let mut f = create_encoder(&args.model, cli.zstd_workers)?;
    if args.no_extractor {
        categorizer.write_without_extractor(&mut f)?;
    } else {
        categorizer.write(&mut f)?;
    }
    f.finish()?;
    Ok(())
}

fn train_word_features(cli: &Cli, args: &WordFeatureArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut files = vec![];
    for path in &args.corpus {
        collect_files(path, &mut files)?;
    }
    eprintln!("# of corpus files: {}", files.len());
    let mut tok = GroupTokenizer::new(files);

    let params = WordFeatureParams {
        vocab_size: args.vocab_size,
        window_size: args.window_size,
        num_contexts: args.num_contexts,
        num_correlations: args.num_correlations,
        num_substrings: args.num_substrings,
        num_morph_correlations: args.num_morph_correlations,
        seed: args.seed,
        ..WordFeatureParams::default()
    };
    let mut trainer = WordFeatureTrainer::new(params);
    trainer.set_log_level(cli.log_level);

    eprintln!("Start training...");
    let fe = trainer.train(&mut tok)?;
    eprintln!("Finish training.");

    let mut f = create_encoder(&args.model, cli.zstd_workers)?;
    fe.write(&mut f)?;
    f.finish()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match &cli.command {
        Command::Ner(args) => train_ner(&cli, args),
        Command::Relation(args) => train_relation(&cli, args),
        Command::Categorizer(args) => train_categorizer(&cli, args),
        Command::WordFeatures(args) => train_word_features(&cli, args),
    }
}
