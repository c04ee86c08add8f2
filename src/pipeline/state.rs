/// Lifecycle of a [`Pipeline`](super::Pipeline).
///
/// ```text
/// Uninitialized --start--> Filling --input fill reached--> Running
///                             ^  \________________________/   |
///                             |            start              |
///                             +-------------------------------+
///                   stop / fatal error from any state --> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, no buffers allocated yet.
    Uninitialized,
    /// Accepting producer frames, conversion disabled.
    Filling,
    /// Converting and retuning the ratio.
    Running,
    /// Terminal. Buffers and converter released.
    Stopped,
}

impl PipelineState {
    /// Whether producer and consumer ticks do any work.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Filling | Self::Running)
    }
}
