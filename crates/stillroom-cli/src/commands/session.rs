//! `session run`: one session driven from stdin.
//!
//! Each stdin line is either a vertical-axis acceleration sample (a number,
//! fed to the orientation sensor) or one of `start`, `pause`, `resume`,
//! `cancel`, `status`. Events are printed to stdout as JSON lines, followed by
//! a final `state_snapshot` once the session ends.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use stillroom_core::orientation::{
    FeedSource, HapticFeedback, NoHaptics, OrientationSource, TracingHaptics, UnavailableSource,
};
use stillroom_core::persistence::StaticIdentity;
use stillroom_core::storage::TOKEN_ENV_VAR;
use stillroom_core::error::Result;
use stillroom_core::{Config, Event, SessionController, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

use super::config_path;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run one session, reading samples and commands from stdin
    Run {
        /// Target duration in seconds (defaults to session.default_target_secs)
        #[arg(long)]
        duration: Option<u64>,
        /// Ignore the orientation sensor; use start/pause/resume instead
        #[arg(long)]
        no_sensor: bool,
    },
}

pub fn run(action: SessionAction, config: Option<&Path>) -> Result<()> {
    match action {
        SessionAction::Run {
            duration,
            no_sensor,
        } => {
            let config = Config::load_from(&config_path(config)?)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_session(config, duration, no_sensor))
        }
    }
}

async fn run_session(
    config: Config,
    duration: Option<u64>,
    no_sensor: bool,
) -> Result<()> {
    let options = config.session_options(duration)?;
    let gateway = config.gateway(Arc::new(StaticIdentity::from_env(TOKEN_ENV_VAR)))?;
    if !gateway.is_configured() {
        info!("remote.base_url not set; session stays local");
    }

    let feed = FeedSource::new();
    let source: Arc<dyn OrientationSource> = if no_sensor || !config.sensor.enabled {
        Arc::new(UnavailableSource)
    } else {
        Arc::new(feed.clone())
    };
    let haptics: Arc<dyn HapticFeedback> = if config.sensor.haptics {
        Arc::new(TracingHaptics)
    } else {
        Arc::new(NoHaptics)
    };

    let mut controller = SessionController::spawn(options, source, Some(haptics), gateway)?;
    let mut events = controller.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let snapshot = loop {
        tokio::select! {
            finished = controller.finished() => break finished?,
            event = events.recv() => match event {
                Ok(event) => print_event(&event)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => {}
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => handle_line(line.trim(), &controller, &feed).await?,
                None => {
                    stdin_open = false;
                    // Only an active session can still progress without input.
                    let idle = controller
                        .settled_snapshot()
                        .await
                        .is_ok_and(|snapshot| snapshot.state != SessionState::Active);
                    if idle {
                        debug!("stdin closed before the session could finish; cancelling");
                        let _ = controller.cancel();
                    }
                }
            },
        }
    };

    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event)?,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    print_event(&Event::StateSnapshot {
        snapshot,
        at: Utc::now(),
    })?;
    Ok(())
}

async fn handle_line(
    line: &str,
    controller: &SessionController,
    feed: &FeedSource,
) -> Result<()> {
    if line.is_empty() {
        return Ok(());
    }
    if let Ok(sample) = line.parse::<f64>() {
        if feed.subscriber_count() == 0 {
            debug!(sample, "sensor disabled; sample dropped");
        }
        feed.push(sample);
        return Ok(());
    }

    let sent = match line {
        "start" => controller.manual_start(),
        "pause" => controller.manual_pause(),
        "resume" => controller.manual_resume(),
        "cancel" => controller.cancel(),
        "status" => match controller.settled_snapshot().await {
            Ok(snapshot) => {
                return print_event(&Event::StateSnapshot {
                    snapshot,
                    at: Utc::now(),
                })
            }
            Err(e) => Err(e),
        },
        other => {
            warn!(
                input = other,
                "unrecognised input; expected a number or start/pause/resume/cancel/status"
            );
            return Ok(());
        }
    };
    // The session may end between reading the line and sending it.
    if let Err(e) = sent {
        debug!("{line}: {e}");
    }
    Ok(())
}

fn print_event(event: &Event) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
