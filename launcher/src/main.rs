use anyhow::{bail, Result};
use launcher::{BotService, LaunchFailure, LaunchOutcome};
use shared::{BotWorkspace, Config, RunMode, UserWorkspace};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env()?;

    let mut args = std::env::args().skip(1);
    let (Some(user_root), Some(bot_root)) = (args.next(), args.next()) else {
        bail!("usage: launcher <user-root> <bot-data-root> [live|dryrun|backstage]");
    };
    let mode = match args.next() {
        Some(raw) => match RunMode::parse(&raw) {
            Some(mode) => Some(mode),
            None => bail!("unknown run mode '{raw}'"),
        },
        None => None,
    };

    let user = UserWorkspace::new(PathBuf::from(user_root));
    let bot = BotWorkspace::new(PathBuf::from(bot_root));

    let service = BotService::new(config);
    match service.prepare_launch(&user, &bot, mode, None).await? {
        LaunchOutcome::Ready(bundle) => {
            tracing::info!(
                attempt = %bundle.attempt_id,
                strategy = %bundle.strategy.name,
                config = %bundle.generated_config.display(),
                "bot is ready to launch"
            );
            Ok(())
        }
        LaunchOutcome::Failed(LaunchFailure::Validation(errors)) => {
            for error in &errors {
                tracing::error!(%error, "configuration defect");
            }
            bail!("launch aborted: {} configuration defect(s)", errors.len());
        }
        LaunchOutcome::Failed(LaunchFailure::Discovery(error)) => {
            bail!("launch aborted: {error}");
        }
    }
}
