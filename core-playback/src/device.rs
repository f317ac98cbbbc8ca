//! # Relay Device
//!
//! A [`PlaybackDevice`] whose audio engine lives on the other side of a
//! message channel, typically a web view. Commands go out as
//! [`DeviceCommand`]s; the remote side reports back with [`DeviceReport`]s,
//! which update the position and emptiness the player polls.
//!
//! The remote engine needs whole files, so
//! [`streams_partial_files`](PlaybackDevice::streams_partial_files) is
//! `false` and loads wait for complete downloads.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::playback::PlaybackDevice;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound instruction for the remote engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    Load { path: PathBuf },
    Play,
    Pause,
    Stop,
    Volume { level: u8 },
    Speed { speed: f32 },
    Seek { offset: f64 },
}

/// Inbound status from the remote engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum DeviceReport {
    /// The file was decoded and is ready.
    Loaded,
    /// Current head in seconds.
    Position { secs: f64 },
    /// The track ran out.
    Ended,
}

#[derive(Debug)]
struct RelayState {
    empty: bool,
    position: f64,
}

/// Playback device relayed over a channel.
#[derive(Debug)]
pub struct RelayDevice {
    commands: mpsc::UnboundedSender<DeviceCommand>,
    state: Mutex<RelayState>,
}

impl RelayDevice {
    /// Create the device and the receiver the host drains to drive the
    /// remote engine.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeviceCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let device = Self {
            commands,
            state: Mutex::new(RelayState {
                empty: true,
                position: 0.0,
            }),
        };
        (device, rx)
    }

    /// Apply a report from the remote engine.
    pub fn report(&self, report: DeviceReport) {
        let mut state = self.state.lock();
        match report {
            DeviceReport::Loaded => state.empty = false,
            DeviceReport::Position { secs } => state.position = secs,
            DeviceReport::Ended => {
                debug!("Relay reported end of track");
                state.empty = true;
            }
        }
    }

    fn send(&self, command: DeviceCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::Device("relay channel closed".to_string()))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PlaybackDevice for RelayDevice {
    async fn is_empty(&self) -> bool {
        self.state.lock().empty
    }

    async fn load(&self, path: &Path) -> Result<bool> {
        self.send(DeviceCommand::Load {
            path: path.to_path_buf(),
        })?;
        let mut state = self.state.lock();
        state.empty = false;
        state.position = 0.0;
        Ok(true)
    }

    async fn play(&self) -> Result<bool> {
        self.send(DeviceCommand::Play)?;
        Ok(!self.state.lock().empty)
    }

    async fn pause(&self) -> Result<()> {
        self.send(DeviceCommand::Pause)
    }

    async fn stop(&self) -> Result<()> {
        self.send(DeviceCommand::Stop)?;
        self.state.lock().empty = true;
        Ok(())
    }

    async fn position(&self) -> f64 {
        self.state.lock().position
    }

    async fn set_volume(&self, level: u8) -> Result<()> {
        self.send(DeviceCommand::Volume { level })
    }

    async fn seek(&self, offset: f64) -> Result<()> {
        self.send(DeviceCommand::Seek { offset })
    }

    async fn set_speed(&self, speed: f32) -> Result<()> {
        self.send(DeviceCommand::Speed { speed })
    }

    fn streams_partial_files(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands_are_relayed() {
        let (device, mut rx) = RelayDevice::new();
        assert!(device.is_empty().await);

        assert!(device.load(Path::new("/tmp/1")).await.unwrap());
        device.set_volume(40).await.unwrap();
        assert!(device.play().await.unwrap());

        assert_eq!(
            rx.recv().await,
            Some(DeviceCommand::Load {
                path: PathBuf::from("/tmp/1")
            })
        );
        assert_eq!(rx.recv().await, Some(DeviceCommand::Volume { level: 40 }));
        assert_eq!(rx.recv().await, Some(DeviceCommand::Play));
        assert!(!device.streams_partial_files());
    }

    #[tokio::test]
    async fn test_reports_update_state() {
        let (device, _rx) = RelayDevice::new();
        device.load(Path::new("/tmp/1")).await.unwrap();

        device.report(DeviceReport::Position { secs: 12.5 });
        assert_eq!(device.position().await, 12.5);
        assert!(!device.is_empty().await);

        device.report(DeviceReport::Ended);
        assert!(device.is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_channel_is_device_error() {
        let (device, rx) = RelayDevice::new();
        drop(rx);
        let err = device.pause().await.unwrap_err();
        assert!(matches!(err, BridgeError::Device(_)));
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(DeviceCommand::Seek { offset: -5.0 }).unwrap();
        assert_eq!(json["command"], "seek");
        let report: DeviceReport =
            serde_json::from_str(r#"{"report":"position","secs":3.0}"#).unwrap();
        assert_eq!(report, DeviceReport::Position { secs: 3.0 });
    }
}
