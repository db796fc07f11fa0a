//! Latest transform per child frame, static and dynamic kept apart.

use std::collections::BTreeMap;

use bytes::Bytes;
use roverlink_core::telemetry::TransformEntry;
use roverlink_core::wire;

#[derive(Debug, Default)]
pub struct TransformTable {
    static_tfs: BTreeMap<String, TransformEntry>,
    dynamic_tfs: BTreeMap<String, TransformEntry>,
}

impl TransformTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite by child frame. No history is kept.
    pub fn update(&mut self, is_static: bool, transforms: Vec<TransformEntry>) {
        let table = if is_static {
            &mut self.static_tfs
        } else {
            &mut self.dynamic_tfs
        };
        for tf in transforms {
            table.insert(tf.child_frame.clone(), tf);
        }
    }

    pub fn static_len(&self) -> usize {
        self.static_tfs.len()
    }

    pub fn dynamic_len(&self) -> usize {
        self.dynamic_tfs.len()
    }

    /// Batch of every static transform; None when there are none.
    pub fn encode_static(&self) -> Option<Bytes> {
        (!self.static_tfs.is_empty()).then(|| wire::encode_transforms(self.static_tfs.values()))
    }

    /// Batch of every dynamic transform; None when there are none.
    pub fn encode_dynamic(&self) -> Option<Bytes> {
        (!self.dynamic_tfs.is_empty()).then(|| wire::encode_transforms(self.dynamic_tfs.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roverlink_core::telemetry::{Quaternion, Vec3};
    use roverlink_core::wire::transform_packet_size;

    fn tf(child: &str, x: f64) -> TransformEntry {
        TransformEntry {
            parent_frame: "odom".into(),
            child_frame: child.into(),
            translation: Vec3 { x, y: 0.0, z: 0.0 },
            rotation: Quaternion::default(),
        }
    }

    #[test]
    fn newer_transform_replaces_older() {
        let mut table = TransformTable::new();
        table.update(false, vec![tf("base_link", 1.0), tf("laser", 0.2)]);
        table.update(false, vec![tf("base_link", 2.0)]);
        assert_eq!(table.dynamic_len(), 2);
        assert_eq!(table.static_len(), 0);
        assert_eq!(table.encode_dynamic().unwrap().len(), 2 * transform_packet_size());
        assert!(table.encode_static().is_none());
    }

    #[test]
    fn static_and_dynamic_are_separate() {
        let mut table = TransformTable::new();
        table.update(true, vec![tf("camera", 0.0)]);
        table.update(false, vec![tf("camera", 1.0)]);
        assert_eq!(table.static_len(), 1);
        assert_eq!(table.dynamic_len(), 1);
    }
}
