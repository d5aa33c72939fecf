use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use irsactl::{init_logging, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling outstanding operations");
            interrupt.cancel();
        }
    });

    if let Err(e) = cli.run(cancel).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
