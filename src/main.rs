use anyhow::Result;
use clap::Parser;
use math_answer_classifier::cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("math_answer_classifier=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
