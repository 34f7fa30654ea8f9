//! Merge per-sample expression count files into one matrix file.

use matrix_merge::merge_count_files;
use std::path::{Path, PathBuf};

pub fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 4 {
        println!("Merge per-sample expression count files into one expression matrix");
        println!("If an error occurs, the process will return 1 and write a message to stderr");
        println!("usage: merge_matrix <output-tsv> <input-tsv> <input-tsv>...");
        std::process::exit(1);
    }

    let output = Path::new(&args[1]);
    let inputs: Vec<PathBuf> = args[2..].iter().map(PathBuf::from).collect();

    if let Err(e) = merge_count_files(&inputs, output) {
        // write message and cause chain, exit code = 1
        eprintln!("{e}");
        for c in e.chain().skip(1) {
            eprintln!("\tCaused by: {c}");
        }
        std::process::exit(1);
    }
}
