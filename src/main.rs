//! Headless development shell: supervises a Winery backend for a
//! repository given on the command line, without any windows attached.

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info};

use winery_desktop::{
    logging, BundledWineryPaths, SupervisorEvent, WineryManager, WineryPaths,
    DEFAULT_STOP_TIMEOUT,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let repository_path = env::args()
        .nth(1)
        .context("usage: winery-desktop <repository-path>")?;

    let paths = Arc::new(BundledWineryPaths::discover()?);
    logging::init(&paths.data_dir())?;

    let winery = Arc::new(WineryManager::new(paths));
    let mut events = winery.subscribe();

    winery.start(&repository_path).await?;
    info!("Winery ready at {}", winery.backend_url()?);
    info!("Press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("could not listen for Ctrl-C")?;
                break;
            }
            event = events.recv() => {
                if let Ok(SupervisorEvent::UnexpectedExit { message }) = event {
                    match message {
                        Some(message) => bail!("the Winery exited unexpectedly: {message}"),
                        None => bail!("the Winery exited unexpectedly"),
                    }
                }
            }
        }
    }

    if let Err(stop_error) = winery.stop(DEFAULT_STOP_TIMEOUT).await {
        error!("{}", stop_error);
        bail!("the Winery did not shut down cleanly");
    }
    Ok(())
}
