use crate::feed::types::{EntityId, ProsumerSnapshot};
use std::collections::HashMap;

/// Display position in percent of the map, `left` from x and `top` from y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPosition {
    pub left: f64,
    pub top: f64,
}

impl MarkerPosition {
    /// Out-of-range coordinates are clamped onto the map edge, never rejected.
    pub fn from_normalized(pos_x: f64, pos_y: f64) -> Self {
        Self {
            left: to_percentage(pos_x),
            top: to_percentage(pos_y),
        }
    }
}

fn to_percentage(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0) * 100.0
}

/// Capability a rendering backend exposes for map markers.
///
/// `delete_marker` consumes the handle, so a deleted marker cannot be
/// positioned again.
pub trait MarkerSurface {
    type Handle;

    fn create_marker(&mut self, id: &str) -> Self::Handle;

    fn set_position(&mut self, handle: &mut Self::Handle, position: MarkerPosition);

    fn delete_marker(&mut self, handle: Self::Handle);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub repositioned: usize,
    pub removed: usize,
}

/// Live markers keyed by entity id. After every `reconcile` the key set is
/// exactly the id set of the snapshot it was given.
pub struct MarkerSet<S: MarkerSurface> {
    surface: S,
    markers: HashMap<EntityId, S::Handle>,
}

impl<S: MarkerSurface> MarkerSet<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            markers: HashMap::new(),
        }
    }

    pub fn reconcile(&mut self, snapshot: &ProsumerSnapshot) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for (id, record) in snapshot.iter() {
            if !self.markers.contains_key(id) {
                let handle = self.surface.create_marker(id);
                self.markers.insert(id.clone(), handle);
                summary.created += 1;
            }

            if let Some(handle) = self.markers.get_mut(id) {
                let position = MarkerPosition::from_normalized(record.pos_x, record.pos_y);
                self.surface.set_position(handle, position);
                summary.repositioned += 1;
            }
        }

        let departed: Vec<EntityId> = self
            .markers
            .keys()
            .filter(|id| !snapshot.contains(id))
            .cloned()
            .collect();
        for id in departed {
            if let Some(handle) = self.markers.remove(&id) {
                self.surface.delete_marker(handle);
                summary.removed += 1;
            }
        }

        summary
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.markers.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.markers.keys()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}
