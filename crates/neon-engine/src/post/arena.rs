use crate::render::RenderSurface;

/// Surfaces owned by the post-process orchestrator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SurfaceSlot {
    /// Full-resolution image the scene is drawn into.
    Scene,
    /// Full-resolution result of an effect.
    Output,
}

impl SurfaceSlot {
    pub const ALL: [SurfaceSlot; 2] = [SurfaceSlot::Scene, SurfaceSlot::Output];

    #[inline]
    const fn index(self) -> usize {
        match self {
            SurfaceSlot::Scene => 0,
            SurfaceSlot::Output => 1,
        }
    }
}

/// Fixed set of surfaces addressed by [`SurfaceSlot`].
///
/// Effects never own these; they borrow them for the duration of one call.
#[derive(Debug)]
pub struct SurfaceArena {
    surfaces: [RenderSurface; 2],
}

impl Default for SurfaceArena {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceArena {
    pub fn new() -> Self {
        Self {
            surfaces: [RenderSurface::new("scene"), RenderSurface::new("post output")],
        }
    }

    #[inline]
    pub fn get(&self, slot: SurfaceSlot) -> &RenderSurface {
        &self.surfaces[slot.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, slot: SurfaceSlot) -> &mut RenderSurface {
        &mut self.surfaces[slot.index()]
    }

    /// Two distinct surfaces at once; `None` if `a == b`.
    pub fn pair_mut(
        &mut self,
        a: SurfaceSlot,
        b: SurfaceSlot,
    ) -> Option<(&mut RenderSurface, &mut RenderSurface)> {
        let (i, j) = (a.index(), b.index());
        if i == j {
            return None;
        }

        let (lo, hi) = self.surfaces.split_at_mut(i.max(j));
        let (first, second) = (&mut lo[i.min(j)], &mut hi[0]);
        Some(if i < j { (first, second) } else { (second, first) })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RenderSurface> {
        self.surfaces.iter_mut()
    }
}
