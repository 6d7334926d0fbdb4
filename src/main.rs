//! kubeseed - provision, bootstrap, and deploy a two-node cluster

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kubeseed::config::RunConfig;
use kubeseed::pipeline::Pipeline;
use kubeseed::render::Renderer;
use kubeseed::runner::ToolRunner;

/// kubeseed - sequential provisioning pipeline for a two-node Kubernetes cluster
#[derive(Parser, Debug)]
#[command(name = "kubeseed", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline: provision, bootstrap, build, push, deploy
    Run(RunArgs),

    /// Render every generated artifact to a directory and exit
    ///
    /// Useful for reviewing the Terraform definition and manifests a
    /// configuration would produce, without touching any tool.
    Render(RenderArgs),

    /// Validate a configuration file and exit
    Validate(ConfigArg),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the run configuration YAML
    #[arg(short = 'f', long = "config")]
    config_file: PathBuf,

    /// Directory for generated run state (terraform dir, build context,
    /// kubeconfig). Reused across runs for idempotent re-applies.
    #[arg(long, default_value = ".kubeseed")]
    run_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Path to the run configuration YAML
    #[arg(short = 'f', long = "config")]
    config_file: PathBuf,

    /// Directory the rendered artifacts are written to
    #[arg(short = 'o', long = "out-dir")]
    out_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct ConfigArg {
    /// Path to the run configuration YAML
    #[arg(short = 'f', long = "config")]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Render(args) => render(args).await,
        Commands::Validate(args) => validate(args).await,
    }
}

async fn load_config(path: &PathBuf) -> anyhow::Result<RunConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
    RunConfig::from_yaml(&content).map_err(|e| anyhow::anyhow!("{}", e))
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config_file).await?;
    let runner = ToolRunner::new();
    let pipeline = Pipeline::new(&runner, config, &args.run_dir);

    match pipeline.run().await {
        Ok(report) => {
            println!("=== Run complete ===");
            println!("{}", report.summary());
            Ok(())
        }
        Err(failure) => {
            if !failure.report.steps.is_empty() {
                eprintln!("=== Completed before the halt ===");
                eprintln!("{}", failure.report.summary());
            }
            Err(anyhow::anyhow!("{}", failure))
        }
    }
}

async fn render(args: RenderArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config_file).await?;
    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;

    let renderer = Renderer::new().map_err(|e| anyhow::anyhow!("{}", e))?;
    let public_key = tokio::fs::read_to_string(&config.ssh_public_key_path)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to read SSH public key {:?}: {}",
                config.ssh_public_key_path,
                e
            )
        })?;

    let manifests = renderer.manifests(&config)?;
    let artifacts = [
        (
            "main.tf",
            renderer.infra_definition(&config, public_key.trim())?,
        ),
        ("Dockerfile", renderer.dockerfile(&config)?),
        ("app.py", renderer.app_source(&config)?),
        ("deployment.yaml", manifests.deployment),
        ("service.yaml", manifests.service),
        ("issuer.yaml", manifests.issuer),
        ("certificate.yaml", manifests.certificate),
        ("ingress.yaml", manifests.ingress),
    ];

    tokio::fs::create_dir_all(&args.out_dir).await?;
    for (name, content) in artifacts {
        let path = args.out_dir.join(name);
        tokio::fs::write(&path, content).await?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

async fn validate(args: ConfigArg) -> anyhow::Result<()> {
    let config = load_config(&args.config_file).await?;
    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
    println!("{} is valid", args.config_file.display());
    Ok(())
}
