//! Snapshot hand-off of the latest [`LaneState`] across threads.
//!
//! The pipeline publishes a whole new state after every frame and
//! readers clone it out under the lock, so a reader never sees left,
//! right and center from different frames.

use std::sync::{Arc, PoisonError, RwLock};

use crate::types::LaneState;

/// Cloneable handle to the most recently published [`LaneState`].
#[derive(Debug, Clone, Default)]
pub struct SharedLaneState(Arc<RwLock<LaneState>>);

impl SharedLaneState {
    /// Handle holding `state`.
    #[must_use]
    pub fn new(state: LaneState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    /// Replace the published state.
    pub fn publish(&self, state: LaneState) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *guard = state;
    }

    /// Copy of the published state.
    #[must_use]
    pub fn snapshot(&self) -> LaneState {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::thread;

    use super::*;
    use crate::center::with_center;
    use crate::types::{LaneLine, LaneSide};

    fn state(frame_id: u64) -> LaneState {
        #[allow(clippy::cast_precision_loss)]
        let shift = frame_id as f64;
        with_center(
            LaneState {
                frame_id,
                left: Some(LaneLine::new(LaneSide::Left, -1.0, 700.0 + shift, 1)),
                right: Some(LaneLine::new(LaneSide::Right, 1.0, 500.0 + shift, 1)),
                ..LaneState::default()
            },
            350.0,
        )
    }

    #[test]
    fn snapshot_sees_last_publish() {
        let shared = SharedLaneState::default();
        assert_eq!(shared.snapshot(), LaneState::default());
        shared.publish(state(3));
        assert_eq!(shared.snapshot(), state(3));
    }

    #[test]
    fn concurrent_readers_never_see_torn_state() {
        let shared = SharedLaneState::new(state(0));
        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for id in 1..=2000 {
                    shared.publish(state(id));
                }
            })
        };
        let reader = {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..2000 {
                    let snap = shared.snapshot();
                    assert_eq!(snap, state(snap.frame_id));
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(shared.snapshot().frame_id, 2000);
    }
}
