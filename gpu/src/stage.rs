//! Linear run pipeline stages.

use std::fmt;

use log::debug;

/// One step of the vector-add run. Stages only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Init,
    EnumerateDevices,
    LoadDefaultDevice,
    LoadLibrary,
    ResolveFunction,
    BuildPipeline,
    AllocateBuffers,
    Dispatch,
    Wait,
    Readback,
    Print,
    Cleanup,
}

impl Stage {
    #[cfg(test)]
    pub const ALL: [Stage; 12] = [
        Stage::Init,
        Stage::EnumerateDevices,
        Stage::LoadDefaultDevice,
        Stage::LoadLibrary,
        Stage::ResolveFunction,
        Stage::BuildPipeline,
        Stage::AllocateBuffers,
        Stage::Dispatch,
        Stage::Wait,
        Stage::Readback,
        Stage::Print,
        Stage::Cleanup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::EnumerateDevices => "enumerate devices",
            Stage::LoadDefaultDevice => "load default device",
            Stage::LoadLibrary => "load library",
            Stage::ResolveFunction => "resolve function",
            Stage::BuildPipeline => "build pipeline",
            Stage::AllocateBuffers => "allocate buffers",
            Stage::Dispatch => "encode/dispatch",
            Stage::Wait => "wait",
            Stage::Readback => "readback",
            Stage::Print => "print",
            Stage::Cleanup => "cleanup",
        }
    }

    /// The stage that follows this one, or `None` after cleanup.
    #[cfg(test)]
    pub fn next(self) -> Option<Stage> {
        let idx = Stage::ALL.iter().position(|s| *s == self)?;
        Stage::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Records the current stage and logs every transition.
#[derive(Debug)]
pub struct StageTracker {
    current: Stage,
}

impl StageTracker {
    pub fn new() -> Self {
        debug!("stage: {}", Stage::Init);
        StageTracker {
            current: Stage::Init,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Move to `stage`. Going backwards is a logic error.
    pub fn enter(&mut self, stage: Stage) {
        debug_assert!(
            stage >= self.current,
            "stage moved backwards: {} -> {}",
            self.current,
            stage
        );
        debug!("stage: {} -> {}", self.current, stage);
        self.current = stage;
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_form_a_single_chain() {
        let mut walked = vec![Stage::Init];
        let mut stage = Stage::Init;
        while let Some(next) = stage.next() {
            walked.push(next);
            stage = next;
        }
        assert_eq!(walked, Stage::ALL.to_vec());
        assert_eq!(Stage::Cleanup.next(), None);
    }

    #[test]
    fn test_tracker_moves_forward() {
        let mut tracker = StageTracker::new();
        assert_eq!(tracker.current(), Stage::Init);
        tracker.enter(Stage::LoadLibrary);
        tracker.enter(Stage::LoadLibrary);
        tracker.enter(Stage::Cleanup);
        assert_eq!(tracker.current(), Stage::Cleanup);
    }

    #[test]
    #[should_panic(expected = "stage moved backwards")]
    #[cfg(debug_assertions)]
    fn test_tracker_rejects_backwards_move() {
        let mut tracker = StageTracker::new();
        tracker.enter(Stage::Dispatch);
        tracker.enter(Stage::LoadLibrary);
    }
}
