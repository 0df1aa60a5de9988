use shared::domain::ActorId;
use tokio::sync::watch;

/// Latest signal from the identity layer. `ready` with no actor is the unauthenticated state:
/// public collections sync, private ones do not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub actor_id: Option<ActorId>,
    pub ready: bool,
}

impl SessionState {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn ready(actor_id: Option<ActorId>) -> Self {
        Self {
            actor_id,
            ready: true,
        }
    }
}

/// Channel through which an identity layer publishes session transitions to the engine.
pub fn session_channel() -> (watch::Sender<SessionState>, watch::Receiver<SessionState>) {
    watch::channel(SessionState::pending())
}
