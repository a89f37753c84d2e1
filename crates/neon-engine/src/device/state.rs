//! Resource usage states and CPU-side state tracking.

use super::command::CommandStream;
use super::handle::{BufferId, TextureId};

/// What a resource is currently allowed to be used for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceState {
    Uninitialized,
    RenderTarget,
    ShaderResource,
    CopyDestination,
    VertexBuffer,
    Presentable,
}

/// Resource named by a barrier.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceRef {
    Texture(TextureId),
    Buffer(BufferId),
    /// Swap-chain image by backbuffer index.
    Backbuffer(u32),
}

/// CPU-side label of a resource's GPU state.
///
/// The label is ground truth: a transition whose assumed prior state disagrees
/// with it is corrected, logged and counted instead of recording a barrier
/// from the wrong state.
#[derive(Debug, Clone)]
pub struct TrackedState {
    current: ResourceState,
    mismatches: u32,
}

impl TrackedState {
    pub const fn new(initial: ResourceState) -> Self {
        Self { current: initial, mismatches: 0 }
    }

    #[inline]
    pub fn current(&self) -> ResourceState {
        self.current
    }

    /// Number of transitions whose assumed prior state was wrong.
    #[inline]
    pub fn mismatches(&self) -> u32 {
        self.mismatches
    }

    /// Overwrites the label without recording anything.
    ///
    /// Only for resources that were just (re)created in a known state.
    pub fn reset(&mut self, state: ResourceState) {
        self.current = state;
    }

    /// Records the barrier `expected → after` for `resource`.
    ///
    /// `expected == after` is a no-op. Returns `true` when a barrier was recorded.
    pub fn transition(
        &mut self,
        stream: &mut CommandStream,
        resource: ResourceRef,
        expected: ResourceState,
        after: ResourceState,
    ) -> bool {
        if expected == after {
            return false;
        }

        let before = if self.current != expected {
            self.mismatches += 1;
            log::warn!(
                "{resource:?}: transition assumed {expected:?} but resource is {:?}; using tracked state",
                self.current
            );
            self.current
        } else {
            expected
        };

        self.current = after;

        if before == after {
            return false;
        }
        stream.barrier(resource, before, after);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Command;

    const TEX: ResourceRef = ResourceRef::Texture(TextureId::from_raw(1));

    fn barriers(stream: &CommandStream) -> Vec<(ResourceState, ResourceState)> {
        stream
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Barrier { before, after, .. } => Some((*before, *after)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn same_state_is_noop() {
        let mut stream = CommandStream::new("test");
        let mut state = TrackedState::new(ResourceState::RenderTarget);

        for s in [ResourceState::ShaderResource, ResourceState::RenderTarget] {
            assert!(!state.transition(&mut stream, TEX, s, s));
        }
        assert!(stream.is_empty());
        assert_eq!(state.current(), ResourceState::RenderTarget);
        assert_eq!(state.mismatches(), 0);
    }

    #[test]
    fn valid_transition_records_one_barrier() {
        let mut stream = CommandStream::new("test");
        let mut state = TrackedState::new(ResourceState::RenderTarget);

        assert!(state.transition(
            &mut stream,
            TEX,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource
        ));
        assert_eq!(
            barriers(&stream),
            vec![(ResourceState::RenderTarget, ResourceState::ShaderResource)]
        );
        assert_eq!(state.current(), ResourceState::ShaderResource);
    }

    #[test]
    fn mismatch_uses_tracked_state_and_counts() {
        let mut stream = CommandStream::new("test");
        let mut state = TrackedState::new(ResourceState::CopyDestination);

        state.transition(
            &mut stream,
            TEX,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );

        assert_eq!(state.mismatches(), 1);
        assert_eq!(
            barriers(&stream),
            vec![(ResourceState::CopyDestination, ResourceState::ShaderResource)]
        );
    }

    #[test]
    fn mismatch_into_current_state_records_nothing() {
        let mut stream = CommandStream::new("test");
        let mut state = TrackedState::new(ResourceState::ShaderResource);

        let recorded = state.transition(
            &mut stream,
            TEX,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );

        assert!(!recorded);
        assert!(stream.is_empty());
        assert_eq!(state.mismatches(), 1);
    }

    #[test]
    fn tracked_state_follows_last_destination() {
        use ResourceState::*;

        let mut stream = CommandStream::new("test");
        let mut state = TrackedState::new(RenderTarget);
        let steps = [
            (RenderTarget, ShaderResource),
            (ShaderResource, CopyDestination),
            (CopyDestination, RenderTarget),
            (RenderTarget, Presentable),
        ];

        for (from, to) in steps {
            state.transition(&mut stream, TEX, from, to);
            assert_eq!(state.current(), to);
        }
        assert_eq!(barriers(&stream).len(), steps.len());
        assert_eq!(state.mismatches(), 0);
    }
}
