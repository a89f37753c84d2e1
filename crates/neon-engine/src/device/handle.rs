//! Resource ids and owning handles.
//!
//! Commands refer to resources by plain `Copy` ids. Ownership lives in
//! [`Owned`]: dropping one queues its id on the device's [`ReleaseQueue`], and
//! the device frees it once the GPU can no longer be using it
//! (see [`GarbageList`]).
//!
//! Handles are `Rc`-based and therefore `!Send`: everything that owns GPU
//! resources stays on the rendering thread.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

macro_rules! resource_ids {
    ($($(#[$meta:meta])* $name:ident => $variant:ident,)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
            pub struct $name(u32);

            impl $name {
                #[inline]
                pub(crate) const fn from_raw(raw: u32) -> Self {
                    Self(raw)
                }

                #[inline]
                pub const fn raw(self) -> u32 {
                    self.0
                }
            }

            impl From<$name> for ResourceId {
                #[inline]
                fn from(id: $name) -> Self {
                    ResourceId::$variant(id)
                }
            }
        )*

        /// Any resource id, as queued for release.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        pub enum ResourceId {
            $($variant($name),)*
        }
    };
}

resource_ids! {
    /// GPU image.
    TextureId => Texture,
    /// Drawable or sampleable view of a texture.
    ViewId => View,
    /// Shader-visible binding of a sampleable view (texture + sampler).
    BindingId => Binding,
    /// Vertex buffer.
    BufferId => Buffer,
    /// Compiled pipeline state.
    PipelineId => Pipeline,
}

/// Ids whose owners have been dropped, waiting for the device to collect them.
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    dropped: RefCell<Vec<ResourceId>>,
}

impl ReleaseQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn push(&self, id: ResourceId) {
        self.dropped.borrow_mut().push(id);
    }

    /// Removes and returns everything dropped since the last call.
    pub fn take(&self) -> Vec<ResourceId> {
        std::mem::take(&mut *self.dropped.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.dropped.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owning handle for a device resource.
pub struct Owned<I>
where
    I: Copy + Into<ResourceId>,
{
    id: I,
    queue: Rc<ReleaseQueue>,
}

impl<I> Owned<I>
where
    I: Copy + Into<ResourceId>,
{
    pub(crate) fn new(id: I, queue: &Rc<ReleaseQueue>) -> Self {
        Self { id, queue: Rc::clone(queue) }
    }

    #[inline]
    pub fn id(&self) -> I {
        self.id
    }
}

impl<I> Drop for Owned<I>
where
    I: Copy + Into<ResourceId>,
{
    fn drop(&mut self) {
        self.queue.push(self.id.into());
    }
}

impl<I> fmt::Debug for Owned<I>
where
    I: Copy + Into<ResourceId> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.id).finish()
    }
}

/// Monotonic id source shared by all resource kinds of one device.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub(crate) fn next(&mut self) -> u32 {
        self.next = self.next.wrapping_add(1);
        self.next
    }
}

/// Released ids tagged with the fence value that must complete before they
/// may be destroyed.
#[derive(Debug, Default)]
pub(crate) struct GarbageList {
    pending: Vec<(u64, ResourceId)>,
}

impl GarbageList {
    /// Tags newly dropped ids with `pending_fence` and returns every id whose
    /// tag is `<= completed_fence`.
    pub(crate) fn collect(
        &mut self,
        queue: &ReleaseQueue,
        pending_fence: u64,
        completed_fence: u64,
    ) -> Vec<ResourceId> {
        self.pending
            .extend(queue.take().into_iter().map(|id| (pending_fence, id)));

        let mut ready = Vec::new();
        self.pending.retain(|&(fence, id)| {
            if fence <= completed_fence {
                ready.push(id);
                false
            } else {
                true
            }
        });
        ready
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_owned_queues_release() {
        let queue = ReleaseQueue::new();
        let handle = Owned::new(BufferId::from_raw(7), &queue);
        assert!(queue.is_empty());

        drop(handle);
        assert_eq!(queue.take(), vec![ResourceId::Buffer(BufferId::from_raw(7))]);
        assert!(queue.is_empty());
    }

    #[test]
    fn garbage_waits_for_fence() {
        let queue = ReleaseQueue::new();
        let mut garbage = GarbageList::default();

        drop(Owned::new(TextureId::from_raw(1), &queue));
        assert!(garbage.collect(&queue, 5, 4).is_empty());
        assert_eq!(garbage.len(), 1);

        let ready = garbage.collect(&queue, 6, 5);
        assert_eq!(ready, vec![ResourceId::Texture(TextureId::from_raw(1))]);
        assert_eq!(garbage.len(), 0);
    }

    #[test]
    fn id_allocator_never_hands_out_zero() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }
}
