use clap::Parser;
use ragline_cli::Cli;
use ragline_telemetry::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    if let Err(e) = ragline_telemetry::init("ragline", format, cli.log_level()) {
        eprintln!("logging disabled: {e}");
    }

    ragline_cli::run(cli).await
}
