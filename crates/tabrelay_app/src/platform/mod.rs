pub(crate) mod cli;
mod logging;
mod results;
mod serve;
mod settings;

use cli::{Cli, Commands};
use tabrelay_logging::relay_info;

pub(crate) async fn run_app(cli: Cli) -> anyhow::Result<()> {
    logging::initialize(&cli);
    match cli.command {
        Commands::Serve(args) => {
            let settings = settings::BridgeSettings::default().with_overrides(&args);
            relay_info!("Starting tabrelay bridge ({:?} transport)", settings.transport);
            serve::run(settings).await
        }
        Commands::Trigger { addr, line } => {
            let reply = tabrelay_engine::send_trigger(addr, &line.join(" ")).await?;
            println!("{reply}");
            Ok(())
        }
        Commands::Results { dir, platform, file } => {
            let report = results::summarize(&dir, platform.as_deref(), file.as_deref())?;
            println!("{report}");
            Ok(())
        }
    }
}
