//! Chooses the tree state each frame.
//!
//! With gesture control on, the hand decides: open hand scatters the tree
//! into chaos, anything else (closed fist, no hand, error) keeps it formed.
//! With gesture control off, only the manual toggle changes the state.

use dual_formation::TreeState;
use tracing::info;

use crate::gesture::GestureState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlSignalRouter {
    state:           TreeState,
    gesture_enabled: bool,
}

impl ControlSignalRouter {
    pub fn new(initial: TreeState) -> Self {
        ControlSignalRouter { state: initial, gesture_enabled: false }
    }

    pub fn state(&self) -> TreeState { self.state }

    pub fn gesture_enabled(&self) -> bool { self.gesture_enabled }

    /// Flip the tree state.  Ignored while gesture control is on.
    ///
    /// Returns whether the state changed.
    pub fn toggle_manual(&mut self) -> bool {
        if self.gesture_enabled {
            return false;
        }
        self.state = self.state.flipped();
        info!(state = self.state.label(), "manual toggle");
        true
    }

    /// Turning gesture control off snaps the tree back to formed.
    pub fn set_gesture_enabled(&mut self, enabled: bool) {
        if enabled == self.gesture_enabled {
            return;
        }
        self.gesture_enabled = enabled;
        if !enabled {
            self.state = TreeState::Formed;
        }
        info!(enabled, state = self.state.label(), "gesture control");
    }

    /// The state for this frame.
    pub fn resolve(&mut self, gesture: &GestureState) -> TreeState {
        if self.gesture_enabled {
            let next = if gesture.is_open { TreeState::Chaos } else { TreeState::Formed };
            if next != self.state {
                info!(state = next.label(), "gesture moved tree");
            }
            self.state = next;
        }
        self.state
    }
}

impl Default for ControlSignalRouter {
    fn default() -> Self { Self::new(TreeState::Formed) }
}
