#[cfg(feature = "examples")]
mod loopback {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::FutureExt;
    use futures::future::{self, BoxFuture};
    use pushtalk::audio::{AudioDevice, AudioRoute, AudioStream};
    use pushtalk::engine::{EngineError, EngineEvent, EngineListener, JoinRequest, OfflineReason, RtcEngine};
    use tracing::{Level, event};

    /// Pretend engine: a remote user shows up shortly after every join and leaves again a
    /// few seconds later.
    #[derive(Default)]
    pub struct LoopbackEngine {
        listener: Arc<Mutex<Option<EngineListener>>>,
        channel: Mutex<Option<String>>,
    }

    impl LoopbackEngine {
        fn emit_later(&self, delay: Duration, event: EngineEvent) {
            let listener = Arc::clone(&self.listener);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let current = listener.lock().unwrap().clone();
                if let Some(listener) = current {
                    listener.notify(event);
                }
            });
        }
    }

    impl RtcEngine for LoopbackEngine {
        fn join(&self, request: JoinRequest) -> BoxFuture<'_, Result<(), EngineError>> {
            *self.channel.lock().unwrap() = Some(request.channel_id.clone());
            let channel_id = request.channel_id;
            self.emit_later(
                Duration::from_millis(200),
                EngineEvent::JoinSuccess {
                    channel_id: channel_id.clone(),
                    uid: 1001,
                },
            );
            self.emit_later(
                Duration::from_secs(2),
                EngineEvent::RemoteJoined {
                    channel_id: channel_id.clone(),
                    uid: 2002,
                },
            );
            self.emit_later(
                Duration::from_secs(6),
                EngineEvent::RemoteOffline {
                    channel_id,
                    uid: 2002,
                    reason: OfflineReason::Quit,
                },
            );
            future::ready(Ok(())).boxed()
        }

        fn leave(&self) -> BoxFuture<'_, Result<(), EngineError>> {
            if let Some(channel_id) = self.channel.lock().unwrap().take() {
                self.emit_later(Duration::from_millis(100), EngineEvent::LeaveComplete { channel_id });
            }
            future::ready(Ok(())).boxed()
        }

        fn remote_users(&self) -> BoxFuture<'_, Result<Vec<u32>, EngineError>> {
            future::ready(Ok(Vec::new())).boxed()
        }

        fn mute_local(&self, muted: bool) -> Result<(), EngineError> {
            event!(Level::INFO, muted, "Loopback mute");
            Ok(())
        }

        fn set_listener(&self, listener: Option<EngineListener>) {
            *self.listener.lock().unwrap() = listener;
        }
    }

    #[derive(Default)]
    pub struct ConsoleAudio {
        levels: Mutex<HashMap<AudioStream, u32>>,
        route: Mutex<AudioRoute>,
    }

    impl AudioDevice for ConsoleAudio {
        fn volume(&self, stream: AudioStream) -> anyhow::Result<u32> {
            Ok(self.levels.lock().unwrap().get(&stream).copied().unwrap_or(4))
        }

        fn max_volume(&self, _stream: AudioStream) -> anyhow::Result<u32> {
            Ok(15)
        }

        fn set_volume(&self, stream: AudioStream, level: u32) -> anyhow::Result<()> {
            event!(Level::INFO, stream = ?stream, level, "Volume set");
            self.levels.lock().unwrap().insert(stream, level);
            Ok(())
        }

        fn route(&self) -> anyhow::Result<AudioRoute> {
            Ok(*self.route.lock().unwrap())
        }

        fn set_route(&self, route: AudioRoute) -> anyhow::Result<()> {
            event!(Level::INFO, route = ?route, "Route set");
            *self.route.lock().unwrap() = route;
            Ok(())
        }
    }
}

#[cfg(feature = "examples")]
#[tokio::main]
async fn main() {
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use pushtalk::audio::AudioRouteController;
    use pushtalk::invitation::RawPayload;
    use pushtalk::sessions::events::event_handling::{RemoteJoinedEvent, RemoteLeftEvent, StatusChangedEvent};
    use pushtalk::sessions::{OrchestratorConfig, OutgoingCall, SessionOrchestrator, SessionStatus};
    use tracing::{Level, event};
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry().with(fmt::layer()).with(EnvFilter::from_default_env()).init();

    let orchestrator = SessionOrchestrator::start(
        Arc::new(loopback::LoopbackEngine::default()),
        AudioRouteController::new(Arc::new(loopback::ConsoleAudio::default())),
        OrchestratorConfig::default(),
    );
    orchestrator.add_listener(StatusChangedEvent, |status: &SessionStatus| {
        event!(Level::INFO, "Status: {:?}", status);
    });
    orchestrator.add_listener(RemoteJoinedEvent, |uid: u32| {
        event!(Level::INFO, "Remote {} joined", uid);
    });
    orchestrator.add_listener(RemoteLeftEvent, |uid: u32| {
        event!(Level::INFO, "Remote {} left", uid);
    });

    let issued_at = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_secs();
    let push = format!(
        r#"{{"data":{{"token":"demo","remoteUserId":"2002","channelId":"walkie","displayName":"Alice","issuedAt":"{issued_at}"}}}}"#
    );
    let payload = RawPayload::from_json(push.as_bytes()).expect("Failed to parse push payload");
    event!(Level::INFO, "Push handled: {:?}", orchestrator.handle_push(&payload).await);

    // The loopback remote leaves after a few seconds; the grace period then ends the session.
    let mut status = orchestrator.subscribe_status();
    tokio::select! {
        _ = status.wait_for(|s| s.is_idle()) => {}
        _ = tokio::signal::ctrl_c() => {
            orchestrator.leave().await.expect("Failed to leave");
            return;
        }
    }

    let call = OutgoingCall::with_generated_channel("demo", 1001, "Bob").with_timeout(Duration::from_secs(10));
    event!(Level::INFO, "Calling on {}", call.channel_id);
    match orchestrator.start_as_initiator(call).await {
        Ok(outcome) => event!(Level::INFO, "Call finished: {:?}", outcome),
        Err(e) => event!(Level::ERROR, "Call failed: {}", e),
    }

    tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
    event!(Level::INFO, "Stopping orchestrator");
    orchestrator.leave().await.expect("Failed to leave");
    orchestrator.stop();
}

#[cfg(not(feature = "examples"))]
fn main() {
    println!("This example requires the 'examples' feature to be enabled.");
}
