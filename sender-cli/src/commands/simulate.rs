//! Run a scripted session against the mock radio.
//!
//! The script: discover the peer, connect, receive each frame, send one
//! record back, disconnect. With `interrupt` set, the socket fails after the
//! last frame instead of the reply being sent. A snapshot of the session
//! state is taken after every step.

use anyhow::{Context, Result};
use sender_client::{LinkConfig, MockRadio, SessionService};
use sender_core::SessionState;
use sender_types::{decode, Message, Peer};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// How long one step may take before the run is aborted.
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// One labelled snapshot.
#[derive(Debug, Serialize)]
pub struct Step {
    /// What just happened.
    pub step: String,
    /// Session state afterwards.
    pub state: SessionState,
}

async fn wait_for(
    state: &mut watch::Receiver<SessionState>,
    f: impl FnMut(&SessionState) -> bool,
) -> Result<()> {
    tokio::time::timeout(STEP_TIMEOUT, state.wait_for(f))
        .await
        .context("Timed out waiting for session state")?
        .map(|_| ())
        .context("Session state closed")
}

/// Wait for the next published update that satisfies `f`.
///
/// Unlike [`wait_for`], the current value never counts, so a frame equal to
/// the previous one is still waited for.
async fn next_change(
    state: &mut watch::Receiver<SessionState>,
    mut f: impl FnMut(&SessionState) -> bool,
) -> Result<()> {
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            state.changed().await?;
            if f(&*state.borrow_and_update()) {
                return Ok::<_, watch::error::RecvError>(());
            }
        }
    })
    .await
    .context("Timed out waiting for session state")?
    .context("Session state closed")
}

/// Run the script and return the snapshots.
pub async fn simulate(
    config: LinkConfig,
    address: &str,
    frames: &[String],
    interrupt: bool,
) -> Result<Vec<Step>> {
    let records = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            decode(frame.as_bytes())
                .with_context(|| format!("Frame {} is not a valid record", i + 1))
        })
        .collect::<Result<Vec<Message>>>()?;

    info!(peer = address, frames = records.len(), "starting simulated session");
    let radio = MockRadio::new();
    let peer = Peer::new("Simulated sender", address);
    radio.set_bonded(vec![peer.clone()]);
    let socket = radio.queue_socket();

    let service = SessionService::new(radio.clone(), config);
    let mut state = service.state();
    let mut steps = Vec::new();
    let mut record = |step: String, service: &SessionService<MockRadio>| {
        steps.push(Step {
            step,
            state: service.snapshot(),
        });
    };

    service.start();
    service.start_discovery().await?;
    radio.emit_found(peer.clone());
    wait_for(&mut state, |s| s.scanned_peers.contains(&peer)).await?;
    record("discovered".into(), &service);

    service.connect(peer.clone()).await?;
    wait_for(&mut state, |s| s.is_connected || s.last_error.is_some()).await?;
    record("connect".into(), &service);

    for (i, message) in records.iter().enumerate() {
        state.borrow_and_update();
        socket.push_frame(message);
        next_change(&mut state, |s| &s.last_message == message || !s.is_connected).await?;
        record(format!("frame {}", i + 1), &service);
    }

    if interrupt {
        socket.fail_read("simulated read failure");
        wait_for(&mut state, |s| !s.is_connected).await?;
        record("interrupted".into(), &service);
    } else if service.snapshot().is_connected {
        service
            .send("ACK", &records.len().to_string())
            .await
            .context("Failed to send reply")?;
        record("send".into(), &service);
    }

    service.disconnect().await;
    record("disconnect".into(), &service);
    service.release().await;

    Ok(steps)
}

/// Run the simulate command, printing one JSON line per step.
pub async fn run(
    config: LinkConfig,
    address: &str,
    frames: &[String],
    interrupt: bool,
) -> Result<()> {
    for step in simulate(config, address, frames, interrupt).await? {
        println!("{}", serde_json::to_string(&step)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sender_types::CONNECTION_INTERRUPTED;

    const PEER: &str = "00:11:22:33:44:55";

    fn labels(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(|s| s.step.as_str()).collect()
    }

    #[tokio::test]
    async fn full_script_records_every_step() {
        let frames = vec![
            "1#SYNC#u1#true#false#[a,b]#80#12#".to_string(),
            "2#SYNC#u1#false#true#[]#79#12".to_string(),
        ];

        let steps = simulate(LinkConfig::default(), PEER, &frames, false)
            .await
            .unwrap();

        assert_eq!(
            labels(&steps),
            vec!["discovered", "connect", "frame 1", "frame 2", "send", "disconnect"]
        );
        assert_eq!(steps[0].state.scanned_peers.len(), 1);
        assert!(steps[1].state.is_connected);
        assert_eq!(steps[2].state.last_message.battery_percentage, "80");
        assert_eq!(steps[3].state.last_message.is_finished, "true");
        assert_eq!(steps[4].state.last_message, Message::outgoing("2", "ACK"));
        assert!(!steps[5].state.is_connected);
        assert!(steps[5].state.last_message.is_empty());
    }

    #[tokio::test]
    async fn interrupt_reports_error() {
        let frames = vec!["1#SYNC#u1#true#false#[a,b]#80#12#".to_string()];

        let steps = simulate(LinkConfig::default(), PEER, &frames, true)
            .await
            .unwrap();

        assert_eq!(
            labels(&steps),
            vec!["discovered", "connect", "frame 1", "interrupted", "disconnect"]
        );
        let interrupted = &steps[3].state;
        assert!(!interrupted.is_connected);
        assert_eq!(interrupted.last_error.as_deref(), Some(CONNECTION_INTERRUPTED));
        assert!(interrupted.last_message.is_empty());
    }

    #[tokio::test]
    async fn next_change_ignores_current_value() {
        let (tx, mut rx) = watch::channel(SessionState::new());

        let early = tokio::time::timeout(
            Duration::from_millis(20),
            next_change(&mut rx, |_| true),
        )
        .await;
        assert!(early.is_err());

        tx.send_modify(|_| {});
        next_change(&mut rx, |_| true).await.unwrap();
    }

    #[tokio::test]
    async fn repeated_frames_each_get_a_step() {
        let frame = "1#SYNC#u1#true#false#[a,b]#80#12#".to_string();
        let frames = vec![frame.clone(), frame.clone(), frame];

        let steps = simulate(LinkConfig::default(), PEER, &frames, false)
            .await
            .unwrap();

        assert_eq!(
            labels(&steps),
            vec!["discovered", "connect", "frame 1", "frame 2", "frame 3", "send", "disconnect"]
        );
        for step in &steps[2..5] {
            assert_eq!(step.state.last_message.battery_percentage, "80");
        }
        assert_eq!(steps[5].state.last_message, Message::outgoing("3", "ACK"));
    }

    #[tokio::test]
    async fn invalid_frame_is_rejected_up_front() {
        let frames = vec!["1#SYNC#".to_string()];

        let err = simulate(LinkConfig::default(), PEER, &frames, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Frame 1"));
    }
}
