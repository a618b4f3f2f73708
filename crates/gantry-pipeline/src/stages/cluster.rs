//! Temporal clustering of a sequence into contiguous runs.

use gantry_core::{ImageRecord, Real, SequenceSet, seconds_between};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// A larger gap between consecutive timestamps starts a new cluster.
    pub time_threshold_s: Real,
    /// A larger jump in image number starts a new cluster.
    pub max_frame_gap: u64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            time_threshold_s: 5.0,
            max_frame_gap: 1,
        }
    }
}

/// Whether `next` continues the run ending at `prev`.
///
/// Only a forward time gap splits; a clock stepping backwards does not.
/// Unknown timestamps never continue a run.
fn continues(prev: &ImageRecord, next: &ImageRecord, opts: &ClusterOptions) -> bool {
    let (Some(a), Some(b)) = (&prev.timestamp, &next.timestamp) else {
        return false;
    };
    let dt = seconds_between(a, b);
    let frame_gap = next.id.abs_diff(prev.id);
    dt <= opts.time_threshold_s && frame_gap <= opts.max_frame_gap
}

/// Sort every sequence and assign cluster ids.
///
/// Ids come from one counter shared by all sequences (visited in id order),
/// starting at 1, so no id is ever reused. Returns the number of clusters.
pub fn assign_clusters(set: &mut SequenceSet, opts: &ClusterOptions) -> u32 {
    let mut next_id = 0u32;
    for seq in set.iter_mut() {
        seq.sort_items();
        let first = next_id + 1;
        for i in 0..seq.items.len() {
            if i == 0 || !continues(&seq.items[i - 1], &seq.items[i], opts) {
                next_id += 1;
            }
            seq.items[i].cluster_id = Some(next_id);
        }
        if !seq.items.is_empty() {
            log::debug!(
                "{}: {} clusters (Cluster{:02}..Cluster{:02})",
                seq.id,
                next_id + 1 - first,
                first,
                next_id
            );
        }
    }
    log::info!("assigned {next_id} clusters");
    next_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::synthetic::sweep::{SweepSpec, sweep};

    fn cluster_ids(set: &SequenceSet, seq: &str) -> Vec<u32> {
        set.get(seq)
            .unwrap()
            .items
            .iter()
            .map(|r| r.cluster_id.unwrap())
            .collect()
    }

    #[test]
    fn splits_on_time_gap() {
        let mut set = SequenceSet::new();
        set.insert(sweep(&SweepSpec {
            num_images: 6,
            pauses: vec![(2, 10)],
            ..SweepSpec::default()
        }));
        let n = assign_clusters(&mut set, &ClusterOptions::default());
        assert_eq!(n, 2);
        assert_eq!(cluster_ids(&set, "Step01"), vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn splits_on_frame_gap_and_unknown_time() {
        let mut seq = sweep(&SweepSpec {
            num_images: 6,
            ..SweepSpec::default()
        });
        seq.items[4].id += 1;
        seq.items[5].id += 1;
        seq.items[1].timestamp = None;
        let mut set = SequenceSet::new();
        set.insert(seq);

        assign_clusters(&mut set, &ClusterOptions::default());
        assert_eq!(cluster_ids(&set, "Step01"), vec![1, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn backwards_clock_does_not_split() {
        let mut seq = sweep(&SweepSpec {
            num_images: 5,
            ..SweepSpec::default()
        });
        seq.items[3].timestamp = gantry_core::parse_timestamp("2024:01:01 08:00:00");
        let mut set = SequenceSet::new();
        set.insert(seq);

        // 2 -> 3 steps back months, 3 -> 4 jumps forward again
        assert_eq!(assign_clusters(&mut set, &ClusterOptions::default()), 2);
        assert_eq!(cluster_ids(&set, "Step01"), vec![1, 1, 1, 1, 2]);
    }

    #[test]
    fn ids_are_never_reused_across_sequences() {
        let mut set = SequenceSet::new();
        set.insert(sweep(&SweepSpec {
            num_images: 3,
            ..SweepSpec::default()
        }));
        set.insert(sweep(&SweepSpec {
            sequence_id: "Step02".into(),
            num_images: 3,
            first_image: 9000,
            ..SweepSpec::default()
        }));
        assert_eq!(assign_clusters(&mut set, &ClusterOptions::default()), 2);
        assert_eq!(cluster_ids(&set, "Step01"), vec![1, 1, 1]);
        assert_eq!(cluster_ids(&set, "Step02"), vec![2, 2, 2]);
    }
}
