/// Output streams the controller manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioStream {
    Media,
    VoiceCall,
}

impl AudioStream {
    pub const ALL: [AudioStream; 2] = [AudioStream::Media, AudioStream::VoiceCall];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioRoute {
    #[default]
    Speaker,
    Earpiece,
}

/// Platform audio subsystem. Implementations must change levels without
/// surfacing any system volume UI.
pub trait AudioDevice: Send + Sync {
    fn volume(&self, stream: AudioStream) -> anyhow::Result<u32>;
    fn max_volume(&self, stream: AudioStream) -> anyhow::Result<u32>;
    fn set_volume(&self, stream: AudioStream, level: u32) -> anyhow::Result<()>;
    fn route(&self) -> anyhow::Result<AudioRoute>;
    fn set_route(&self, route: AudioRoute) -> anyhow::Result<()>;
}
