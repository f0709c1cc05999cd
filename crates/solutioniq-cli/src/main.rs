use clap::Parser;
use solutioniq_cli::SolutionIqCli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = SolutionIqCli::parse();
    let mut stdout = std::io::stdout();
    solutioniq_cli::run(cli, &mut stdout).await
}
