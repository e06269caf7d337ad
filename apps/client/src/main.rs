use std::env;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod context;

const SIGNALING_GRACE: Duration = Duration::from_secs(2);

use shared_config::AppConfig;
use shared_models::notification::NotificationLevel;
use video_conferencing_cell::CallPhase;

#[tokio::main]
async fn main() -> Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let room_id = match env::args().nth(1) {
        Some(room_id) if !room_id.trim().is_empty() => room_id,
        _ => bail!("usage: telecare-client <room-id>"),
    };

    info!("Starting telecare client for room {}", room_id);

    let config = AppConfig::from_env();
    let context = context::ClientContext::new(&config);

    let mut notifications = context.notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            let label = match notification.level {
                NotificationLevel::Success => "ok",
                NotificationLevel::Info => "info",
                NotificationLevel::Error => "error",
            };
            println!("[{}] {}", label, notification.message);
            for detail in &notification.details {
                println!("    - {}", detail);
            }
        }
    });

    let user = context
        .authenticate()
        .await
        .context("could not establish a session")?;
    info!("Signed in as {} ({})", user.display_name(), user.role);

    let role = user.role;
    let call = context.start_call(&config, &room_id, user)?;

    let mut snapshots = call.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Could not render call state: {}", e),
            }
            if snapshot.phase.is_terminal() || snapshots.changed().await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Could not listen for Ctrl-C: {}", e);
            }
            info!("Leaving room {}", room_id);
            if let Err(e) = call.end_call(role).await {
                warn!("Call ended with an error: {}", e);
            }
        }
        snapshot = call.wait_for(|snapshot| snapshot.phase.is_terminal()) => {
            if snapshot.phase == CallPhase::Failed {
                warn!("Call failed: {:?}", snapshot.failure);
            }
        }
    }

    let failed = call.snapshot().phase == CallPhase::Failed;
    call.finished().await;
    // The leave announcement is still queued on the socket task.
    context.signaling.shutdown(SIGNALING_GRACE).await;
    let _ = printer.await;

    if failed {
        bail!("call failed");
    }
    Ok(())
}
