use anyhow::Context;
use clap::Parser;
use ingress_compiler::{
    compile, observability::init_logging, Config, DefaultHttpFilterAdapter, IngressModel,
    APP_NAME, VERSION,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "ingress-compiler")]
#[command(about = "Compile an ingress model into Envoy listener configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Ingress model file (YAML, or JSON with a .json extension)
    #[arg(long)]
    model: PathBuf,

    /// Write the listeners as length-delimited protobuf records to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print a JSON summary of the compiled listeners
    #[arg(long)]
    summary: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if it exists; a missing file is not an error
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config = Config::from_env().context("reading configuration from the environment")?;
    if cli.verbose {
        config.log.level = "debug".to_string();
    }
    init_logging(&config.log)?;

    info!(app_name = APP_NAME, version = VERSION, model = %cli.model.display(), "Compiling ingress model");

    let model = IngressModel::from_file(&cli.model)
        .with_context(|| format!("loading model {}", cli.model.display()))?;
    let compiled = compile(&model, &config, &DefaultHttpFilterAdapter)
        .with_context(|| format!("compiling model {}", cli.model.display()))?;

    if let Some(output) = &cli.output {
        std::fs::write(output, compiled.encode_length_delimited())
            .with_context(|| format!("writing listeners to {}", output.display()))?;
        info!(path = %output.display(), listeners = compiled.listeners.len(), "Listeners written");
    }

    if cli.summary || cli.output.is_none() {
        let summary = compiled.summary()?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}
