use clap::Parser;
use log::{error, info};

use message_ledger::config::Config;
use message_ledger::session::{Session, StdinPrompt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::parse();
    info!(
        "Recording to {} with keys under {}",
        config.ledger_file.display(),
        config.keys_dir.display()
    );

    let mut session = Session::from_config(&config)?;

    let stdin = std::io::stdin();
    let mut prompt = StdinPrompt::new(stdin.lock(), std::io::stdout());

    if let Err(err) = session.run(&mut prompt).await {
        error!("An error occurred: {:#}", err);
        return Err(err);
    }

    Ok(())
}
