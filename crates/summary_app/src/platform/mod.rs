mod app;
pub(crate) mod logging;
mod persistence;

use crate::Cli;

#[tokio::main]
pub(crate) async fn run(cli: Cli) -> anyhow::Result<()> {
    app::run(cli).await
}
