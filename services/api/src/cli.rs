use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use medspa_waitlist::error::AppError;
use medspa_waitlist::workflows::waitlist::WaitlistSettings;

#[derive(Parser, Debug)]
#[command(
    name = "Med-Spa Waitlist Engine",
    about = "Run and demonstrate the waitlist matching and offer engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Seed an in-memory waitlist and walk a freed slot through auto-fill
    Demo(DemoArgs),
    /// Print the default waitlist settings as JSON
    Settings,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Settings => {
            let rendered = serde_json::to_string_pretty(&WaitlistSettings::default())
                .map_err(std::io::Error::from)?;
            println!("{rendered}");
            Ok(())
        }
    }
}
