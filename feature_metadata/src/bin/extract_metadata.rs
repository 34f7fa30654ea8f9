//! Extract per-feature metadata (aggregated length, classification,
//! owning gene/transcript) from a GFF3 or GTF annotation file into a
//! tab-separated table.

use anyhow::{bail, Result};
use feature_metadata::{extract_metadata_to_file, ExtractConfig};
use std::path::Path;

pub fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        println!("Extract features metadata from a GFF3/GTF annotation file and write a TSV table");
        println!("If an error occurs, the process will return 1 and write a message to stderr");
        println!("usage: extract_metadata <annotation-file> <output-tsv> [name=value]...");
        println!(
            "recognized parameters: genomic.type attribute.id mitochondrial.tag \
             spike.tag features.file.format"
        );
        std::process::exit(1);
    }

    if let Err(e) = run(&args) {
        // write message and cause chain, exit code = 1
        eprintln!("{e}");
        for c in e.chain().skip(1) {
            eprintln!("\tCaused by: {c}");
        }
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let annotation = Path::new(&args[1]);
    let output = Path::new(&args[2]);

    let mut params = Vec::new();
    for arg in &args[3..] {
        let Some(pair) = arg.split_once('=') else {
            bail!("invalid parameter '{arg}', expected name=value");
        };
        params.push(pair);
    }
    let config = ExtractConfig::from_params(params)?;

    extract_metadata_to_file(annotation, output, &config)?;
    Ok(())
}
