use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::decoder::{DecodeConfig, TableScorer};
use crate::error::AppError;
use crate::eval::{corpus_bleu, read_id_lines, translate_corpus, EvalError, EvalExample, Vocab};

const ENV_PREFIX: &str = "LAINT_";

#[derive(Parser, Debug)]
#[command(name = "laint", version, about = "Beam-search translation and BLEU scoring")]
struct Cli {
    /// JSON decode configuration; environment and flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a source file with a table scorer and score it against references.
    Translate {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        vocab: PathBuf,
        /// One line of space-separated source ids per example.
        #[arg(long)]
        source: PathBuf,
        /// One line of space-separated reference ids per example.
        #[arg(long)]
        target: PathBuf,
        #[arg(long)]
        beam_size: Option<usize>,
        #[arg(long)]
        alpha: Option<f32>,
        #[arg(long)]
        max_decode_len: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Write predictions here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Corpus BLEU of a hypothesis file against a reference file.
    Bleu {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        hypothesis: PathBuf,
    },
}

pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DecodeConfig::from_json_file(path)?,
        None => DecodeConfig::default(),
    };
    config.apply_env_overrides(ENV_PREFIX);

    match cli.command {
        Command::Translate {
            model,
            vocab,
            source,
            target,
            beam_size,
            alpha,
            max_decode_len,
            batch_size,
            output,
        } => {
            if let Some(v) = beam_size {
                config.beam_size = v;
            }
            if let Some(v) = alpha {
                config.alpha = v;
            }
            if let Some(v) = max_decode_len {
                config.max_decode_len = v;
            }
            if let Some(v) = batch_size {
                config.batch_size = v.max(1);
            }
            config.validate()?;
            log::info!("Decode config: {config:?}");

            let mut scorer = TableScorer::from_json_file(&model)?;
            let vocab = Vocab::load(&vocab, vec![config.pad_id, config.eos_id])?;
            let examples = load_examples(&source, &target)?;

            let report = translate_corpus(&mut scorer, &examples, &vocab, &config)?;
            write_lines(output.as_deref(), &report.predictions)?;
            println!("BLEU: {:.2}", report.bleu);
        }
        Command::Bleu {
            reference,
            hypothesis,
        } => {
            let references = read_lines(&reference)?;
            let hypotheses = read_lines(&hypothesis)?;
            let bleu = corpus_bleu(&references, &hypotheses)?;
            log::info!(
                "Scored {} hypotheses against {}",
                hypotheses.len(),
                reference.display()
            );
            println!("BLEU: {bleu:.2}");
        }
    }
    Ok(())
}

fn load_examples(source: &Path, target: &Path) -> Result<Vec<EvalExample>, EvalError> {
    let sources = read_id_lines(source)?;
    let targets = read_id_lines(target)?;
    if sources.len() != targets.len() {
        return Err(EvalError::LineCount {
            references: targets.len(),
            hypotheses: sources.len(),
        });
    }
    Ok(sources
        .into_iter()
        .zip(targets)
        .map(|(source, target)| EvalExample { source, target })
        .collect())
}

fn read_lines(path: &Path) -> Result<Vec<String>, std::io::Error> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(String::from)
        .collect())
}

fn write_lines(path: Option<&Path>, lines: &[String]) -> Result<(), std::io::Error> {
    match path {
        Some(path) => {
            let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
            for line in lines {
                writeln!(file, "{line}")?;
            }
            file.flush()?;
            log::info!("Wrote {} predictions to {}", lines.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for line in lines {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}
