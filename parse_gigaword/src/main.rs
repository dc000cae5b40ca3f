use std::fs::File;
use std::io::{prelude::*, stdin, stdout, BufReader, BufWriter};
use std::path::PathBuf;

use clap::Parser;
use ietk::{GigawordDocument, GigawordReader};

#[derive(Parser, Debug)]
#[command(
    name = "parse_gigaword",
    about = "A program to convert gigaword SGML files into one document per line."
)]
struct Args {
    /// Prepends the headline to the text of each document.
    #[arg(long)]
    headline: bool,

    /// Only keeps documents of this type, such as `story`.
    #[arg(long)]
    doc_type: Option<String>,

    /// SGML files to be parsed. Standard input is read if none is given.
    sgml_files: Vec<PathBuf>,
}

fn write_documents<R, W>(
    rdr: R,
    out: &mut W,
    args: &Args,
) -> Result<usize, Box<dyn std::error::Error>>
where
    R: BufRead,
    W: Write,
{
    let mut n_docs = 0;
    for doc in GigawordReader::new(rdr) {
        let GigawordDocument {
            doc_type,
            headline,
            text,
            ..
        } = doc?;
        if args.doc_type.as_ref().map_or(false, |t| *t != doc_type) {
            continue;
        }
        let mut line = String::new();
        if args.headline && !headline.is_empty() {
            line.push_str(&headline);
            line.push(' ');
        }
        line.push_str(&text);
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            continue;
        }
        writeln!(out, "{}", line)?;
        n_docs += 1;
    }
    Ok(n_docs)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut out = BufWriter::new(stdout().lock());
    let mut n_docs = 0;
    if args.sgml_files.is_empty() {
        n_docs += write_documents(stdin().lock(), &mut out, &args)?;
    }
    for path in &args.sgml_files {
        eprintln!("Parsing {path:?} ...");
        let rdr = BufReader::new(File::open(path)?);
        n_docs += write_documents(rdr, &mut out, &args)?;
    }
    out.flush()?;
    eprintln!("# of documents: {}", n_docs);

    Ok(())
}
