use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use depnn::config::{Config, ModelPaths};
use depnn::data::DependencyDataset;
use depnn::features::DependencyRecord;
use depnn::model::DependencyModel;
use depnn::rng::rng_from_seed;
use depnn::training::init_tables;
use depnn::{DepnnError, Result};

#[derive(Parser)]
#[command(name = "depnn", version, about = "Score dependency arcs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score records read from a file or stdin, one per line.
    Predict {
        #[arg(long)]
        config: PathBuf,
        /// Defaults to stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Discover lexicons in a training directory and write random embeddings.
    InitEmbeddings {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Predict { config, input } => predict(&config, input.as_deref()),
        Command::InitEmbeddings { config, data, out } => init_embeddings(&config, &data, &out),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn predict(config_path: &Path, input: Option<&Path>) -> Result<()> {
    let config = Config::from_path(config_path)?;
    let model = DependencyModel::load(config.model_paths()?, &config.network)?;

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut out = BufWriter::new(io::stdout().lock());
    let mut scored = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DepnnError::line_read(e, source_name(input), idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DependencyRecord = line.parse().map_err(|e| match e {
            DepnnError::Format(msg) => DepnnError::parse(source_name(input), idx + 1, msg),
            other => other,
        })?;
        let probs = model.probabilities(&record)?;
        let class = depnn::math::argmax(&probs);
        write!(out, "{class}")?;
        for p in &probs {
            write!(out, "\t{p}")?;
        }
        writeln!(out)?;
        scored += 1;
    }
    out.flush()?;
    info!("scored {scored} records");
    Ok(())
}

fn source_name(input: Option<&Path>) -> PathBuf {
    input.map_or_else(|| PathBuf::from("<stdin>"), Path::to_path_buf)
}

fn init_embeddings(config_path: &Path, data: &Path, out: &Path) -> Result<()> {
    let config = Config::from_path(config_path)?;
    let dataset = DependencyDataset::open(data)?;
    let mut rng = rng_from_seed(config.training.seed);
    let tables = init_tables(
        dataset.lexicons(),
        config.network.embedding_dim,
        config.training.embed_random_range,
        &mut rng,
    )?;
    fs::create_dir_all(out)?;
    let paths = ModelPaths::in_dir(out);
    tables.category.serialize(&paths.category)?;
    tables.slot.serialize(&paths.slot)?;
    tables.distance.serialize(&paths.distance)?;
    tables.pos.serialize(&paths.pos)?;
    info!(
        "initialised {} symbols from {} records",
        tables.symbol_count(),
        dataset.len()
    );
    Ok(())
}
