use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tracing::{Level, event, instrument};

use super::device::{AudioDevice, AudioRoute, AudioStream};

/// Output levels and route captured right before the first mutation of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeSnapshot {
    levels: HashMap<AudioStream, u32>,
    route: Option<AudioRoute>,
}

impl VolumeSnapshot {
    pub fn level(&self, stream: AudioStream) -> Option<u32> {
        self.levels.get(&stream).copied()
    }

    pub fn route(&self) -> Option<AudioRoute> {
        self.route
    }
}

/// Raises output volume and selects the speaker route for a session.
///
/// Cheap to clone; clones share the same device and snapshot.
#[derive(Clone)]
pub struct AudioRouteController {
    device: Arc<dyn AudioDevice>,
    snapshot: Arc<Mutex<Option<VolumeSnapshot>>>,
}

impl std::fmt::Debug for AudioRouteController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRouteController").field("snapshot", &self.snapshot()).finish()
    }
}

impl AudioRouteController {
    pub fn new(device: Arc<dyn AudioDevice>) -> Self {
        Self {
            device,
            snapshot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn snapshot(&self) -> Option<VolumeSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Raises every managed stream to its maximum and selects `route`.
    ///
    /// Streams already at maximum are left untouched. Each stream is attempted even if
    /// an earlier one failed; the first failure is returned.
    #[instrument(skip_all, fields(route = ?route))]
    pub fn acquire_maximum(&self, route: AudioRoute) -> anyhow::Result<()> {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshot.is_none() {
            *snapshot = Some(self.capture());
            event!(Level::DEBUG, "Captured volume snapshot");
        }
        drop(snapshot);

        let mut first_error = None;
        for stream in AudioStream::ALL {
            if let Err(e) = self.raise(stream) {
                event!(Level::WARN, stream = ?stream, "Failed to raise volume: {:#}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.select_route(route) {
            event!(Level::WARN, "Failed to select audio route: {:#}", e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reapplies the captured snapshot and clears it. No-op without a snapshot.
    #[instrument(skip_all)]
    pub fn restore(&self) -> anyhow::Result<()> {
        let Some(snapshot) = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            event!(Level::TRACE, "No volume snapshot to restore");
            return Ok(());
        };

        let mut first_error = None;
        for (stream, level) in &snapshot.levels {
            if let Err(e) = self.device.set_volume(*stream, *level) {
                event!(Level::WARN, stream = ?stream, "Failed to restore volume: {:#}", e);
                first_error.get_or_insert(e);
            }
        }
        if let Some(route) = snapshot.route {
            if let Err(e) = self.device.set_route(route) {
                event!(Level::WARN, "Failed to restore audio route: {:#}", e);
                first_error.get_or_insert(e);
            }
        }

        event!(Level::DEBUG, "Restored volume snapshot");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drops the snapshot without touching the device.
    pub fn discard_snapshot(&self) {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn capture(&self) -> VolumeSnapshot {
        let mut levels = HashMap::new();
        for stream in AudioStream::ALL {
            match self.device.volume(stream) {
                Ok(level) => {
                    levels.insert(stream, level);
                }
                Err(e) => event!(Level::WARN, stream = ?stream, "Failed to read volume: {:#}", e),
            }
        }
        let route = self.device.route().map_err(|e| event!(Level::WARN, "Failed to read audio route: {:#}", e)).ok();
        VolumeSnapshot { levels, route }
    }

    fn raise(&self, stream: AudioStream) -> anyhow::Result<()> {
        let max = self.device.max_volume(stream).context("reading max volume")?;
        let current = self.device.volume(stream).context("reading volume")?;
        if current != max {
            self.device.set_volume(stream, max).context("setting volume")?;
            event!(Level::DEBUG, stream = ?stream, from = current, to = max, "Raised volume");
        }
        Ok(())
    }

    fn select_route(&self, route: AudioRoute) -> anyhow::Result<()> {
        if self.device.route()? != route {
            self.device.set_route(route)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestDevice {
        levels: Mutex<HashMap<AudioStream, u32>>,
        route: Mutex<Option<AudioRoute>>,
        writes: Mutex<usize>,
        broken_stream: Option<AudioStream>,
    }

    impl TestDevice {
        fn with_levels(media: u32, voice: u32) -> Self {
            let device = TestDevice::default();
            device.levels.lock().unwrap().extend([(AudioStream::Media, media), (AudioStream::VoiceCall, voice)]);
            *device.route.lock().unwrap() = Some(AudioRoute::Earpiece);
            device
        }

        fn writes(&self) -> usize {
            *self.writes.lock().unwrap()
        }
    }

    impl AudioDevice for TestDevice {
        fn volume(&self, stream: AudioStream) -> anyhow::Result<u32> {
            if self.broken_stream == Some(stream) {
                anyhow::bail!("stream unavailable");
            }
            Ok(self.levels.lock().unwrap()[&stream])
        }

        fn max_volume(&self, stream: AudioStream) -> anyhow::Result<u32> {
            Ok(match stream {
                AudioStream::Media => 15,
                AudioStream::VoiceCall => 7,
            })
        }

        fn set_volume(&self, stream: AudioStream, level: u32) -> anyhow::Result<()> {
            *self.writes.lock().unwrap() += 1;
            self.levels.lock().unwrap().insert(stream, level);
            Ok(())
        }

        fn route(&self) -> anyhow::Result<AudioRoute> {
            Ok(self.route.lock().unwrap().unwrap_or_default())
        }

        fn set_route(&self, route: AudioRoute) -> anyhow::Result<()> {
            *self.writes.lock().unwrap() += 1;
            *self.route.lock().unwrap() = Some(route);
            Ok(())
        }
    }

    #[test]
    fn test_acquire_raises_to_max_and_snapshots() {
        let device = Arc::new(TestDevice::with_levels(3, 2));
        let controller = AudioRouteController::new(device.clone());

        controller.acquire_maximum(AudioRoute::Speaker).unwrap();

        assert_eq!(device.volume(AudioStream::Media).unwrap(), 15);
        assert_eq!(device.volume(AudioStream::VoiceCall).unwrap(), 7);
        assert_eq!(device.route().unwrap(), AudioRoute::Speaker);
        let snapshot = controller.snapshot().unwrap();
        assert_eq!(snapshot.level(AudioStream::Media), Some(3));
        assert_eq!(snapshot.level(AudioStream::VoiceCall), Some(2));
        assert_eq!(snapshot.route(), Some(AudioRoute::Earpiece));
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let device = Arc::new(TestDevice::with_levels(3, 2));
        let controller = AudioRouteController::new(device.clone());

        controller.acquire_maximum(AudioRoute::Speaker).unwrap();
        let writes = device.writes();
        controller.acquire_maximum(AudioRoute::Speaker).unwrap();

        assert_eq!(device.writes(), writes);
        // The snapshot still reflects the levels from before the first acquisition.
        assert_eq!(controller.snapshot().unwrap().level(AudioStream::Media), Some(3));
    }

    #[test]
    fn test_restore_reapplies_and_clears() {
        let device = Arc::new(TestDevice::with_levels(3, 2));
        let controller = AudioRouteController::new(device.clone());

        controller.acquire_maximum(AudioRoute::Speaker).unwrap();
        controller.restore().unwrap();

        assert_eq!(device.volume(AudioStream::Media).unwrap(), 3);
        assert_eq!(device.volume(AudioStream::VoiceCall).unwrap(), 2);
        assert_eq!(device.route().unwrap(), AudioRoute::Earpiece);
        assert!(controller.snapshot().is_none());
    }

    #[test]
    fn test_restore_without_snapshot_is_noop() {
        let device = Arc::new(TestDevice::with_levels(3, 2));
        let controller = AudioRouteController::new(device.clone());

        controller.restore().unwrap();
        assert_eq!(device.writes(), 0);
    }

    #[test]
    fn test_failing_stream_does_not_block_others() {
        let mut device = TestDevice::with_levels(3, 2);
        device.broken_stream = Some(AudioStream::Media);
        let device = Arc::new(device);
        let controller = AudioRouteController::new(device.clone());

        assert!(controller.acquire_maximum(AudioRoute::Speaker).is_err());
        assert_eq!(device.volume(AudioStream::VoiceCall).unwrap(), 7);
        assert_eq!(device.route().unwrap(), AudioRoute::Speaker);
        assert_eq!(controller.snapshot().unwrap().level(AudioStream::Media), None);
    }

    #[test]
    fn test_discard_snapshot() {
        let device = Arc::new(TestDevice::with_levels(3, 2));
        let controller = AudioRouteController::new(device);
        controller.acquire_maximum(AudioRoute::Earpiece).unwrap();
        controller.discard_snapshot();
        assert!(controller.snapshot().is_none());
    }
}
