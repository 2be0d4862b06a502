//! `PVC.MountedByPods` (spec §4.6 "Mounts"). Declared but intentionally an
//! identity transform — per spec §9's Open Question, the source behavior
//! this was distilled from never actually populated this field, and
//! implementers are told not to fabricate the semantics. Left as an
//! explicit enricher (rather than deleted) so a future mount-resolution
//! pass has an obvious place to live.

use crate::model::ClusterSnapshot;

use super::Enricher;

pub struct MountsEnricher;

impl Enricher for MountsEnricher {
    fn name(&self) -> &'static str {
        "mounts"
    }

    fn enrich(&self, _snapshot: &mut ClusterSnapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_a_no_op() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.persistent_volume_claims.push(crate::model::PersistentVolumeClaim {
            name: "data".into(),
            namespace: "default".into(),
            ..Default::default()
        });
        MountsEnricher.enrich(&mut snapshot);
        assert!(snapshot.persistent_volume_claims[0].mounted_by_pods.is_empty());
    }
}
