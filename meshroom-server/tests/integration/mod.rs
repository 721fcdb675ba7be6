pub mod membership_tests;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Level;

use meshroom_server::{ServerConfig, SessionCommand, SessionCoordinator};

use crate::utils::{MockSignalingOutput, Signal};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn create_test_coordinator() -> (
    mpsc::Sender<SessionCommand>,
    mpsc::UnboundedReceiver<Signal>,
    MockSignalingOutput,
) {
    create_test_coordinator_with(ServerConfig::default())
}

pub fn create_test_coordinator_with_knock_timeout(
    timeout: Duration,
) -> (
    mpsc::Sender<SessionCommand>,
    mpsc::UnboundedReceiver<Signal>,
    MockSignalingOutput,
) {
    create_test_coordinator_with(ServerConfig {
        knock_timeout: timeout,
        ..ServerConfig::default()
    })
}

fn create_test_coordinator_with(
    config: ServerConfig,
) -> (
    mpsc::Sender<SessionCommand>,
    mpsc::UnboundedReceiver<Signal>,
    MockSignalingOutput,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(100);
    let (signaling, signal_rx) = MockSignalingOutput::new();

    let coordinator = SessionCoordinator::new(&config, cmd_rx, Arc::new(signaling.clone()));

    tokio::spawn(async move {
        coordinator.run().await;
    });

    (cmd_tx, signal_rx, signaling)
}
