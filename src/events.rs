use serde::Serialize;

/// Lifecycle notifications emitted by [`crate::WineryManager`].
///
/// Delivered over a `tokio::sync::broadcast` channel so the windowing
/// layer and the shell can observe backend transitions independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SupervisorEvent {
    /// A start request was accepted and the backend is being launched.
    Starting,
    /// The backend answered its first readiness probe.
    Ready { port: u16 },
    /// A stop request was accepted and the shutdown protocol is running.
    Stopping,
    /// The backend exit was confirmed after a stop request.
    Stopped,
    /// The backend exited without a preceding stop request. Carries the
    /// most recent line the process wrote to stderr, if any was captured.
    UnexpectedExit { message: Option<String> },
}
