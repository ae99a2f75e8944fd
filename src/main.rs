use clap::Parser;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = tidemark_cli::Cli::parse();
    tidemark_cli::telemetry::init(&cli.log_level);

    let result = match &cli.command {
        tidemark_cli::Command::Migrate(args) => {
            tidemark_cli::migrate::run(args, cli.database_url.as_deref(), env!("CARGO_PKG_VERSION"))
                .await
        }
        tidemark_cli::Command::Status(args) => {
            tidemark_cli::status::run(args, cli.database_url.as_deref()).await
        }
    };

    if let Err(err) = result {
        tidemark_cli::error_view::print(&err);
        std::process::exit(err.exit_code());
    }
}
