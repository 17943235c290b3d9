//! Dependence-aware resampling of panels.
//!
//! The block-cluster scheme preserves both kinds of dependence at once:
//! - **Temporal**: rows are drawn in contiguous length-L blocks whose start
//!   indices are uniform on [0, T-L]. ceil(T/L) blocks are concatenated and
//!   truncated to T rows. Blocks never wrap past the last row.
//! - **Cross-sectional**: whole clusters are drawn with replacement and
//!   their full column groups placed side by side, so correlated series
//!   travel together. A draw may duplicate or omit clusters.
//!
//! Within one draw every cluster shares the same row resampling. The output
//! always has the input's (T, K) shape: if cluster sizes differ, clusters
//! keep being drawn until K columns are filled and the excess is cut.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::panel::{ClusterLabeling, Panel, PanelError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResampleError {
    #[error("block length {block_length} outside [1, {periods}]")]
    InvalidBlockLength { block_length: usize, periods: usize },
    #[error(transparent)]
    Panel(#[from] PanelError),
}

/// Which dependence the resampler preserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleScheme {
    /// Moving blocks over time, columns kept as-is.
    MovingBlock,
    /// Clusters drawn with replacement, rows kept as-is.
    Cluster,
    /// Moving blocks over time and clusters drawn with replacement.
    #[default]
    BlockCluster,
}

impl ResampleScheme {
    /// True when rows are drawn in moving blocks, so the block length matters.
    pub fn uses_blocks(self) -> bool {
        matches!(self, ResampleScheme::MovingBlock | ResampleScheme::BlockCluster)
    }

    pub fn uses_clusters(self) -> bool {
        matches!(self, ResampleScheme::Cluster | ResampleScheme::BlockCluster)
    }
}

/// Moving-block, cluster-aware panel resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockClusterResampler {
    block_length: usize,
    scheme: ResampleScheme,
}

impl BlockClusterResampler {
    pub fn new(block_length: usize, scheme: ResampleScheme) -> Self {
        Self {
            block_length,
            scheme,
        }
    }

    pub fn block_length(&self) -> usize {
        self.block_length
    }

    pub fn scheme(&self) -> ResampleScheme {
        self.scheme
    }

    /// Check the block length and labeling against `panel`. Called once
    /// before a batch of draws.
    pub fn check(&self, panel: &Panel, clusters: &ClusterLabeling) -> Result<(), ResampleError> {
        clusters.check_against(panel)?;
        if self.uses_blocks() && !(1..=panel.periods()).contains(&self.block_length) {
            return Err(ResampleError::InvalidBlockLength {
                block_length: self.block_length,
                periods: panel.periods(),
            });
        }
        Ok(())
    }

    fn uses_blocks(&self) -> bool {
        self.scheme.uses_blocks()
    }

    fn uses_clusters(&self) -> bool {
        self.scheme.uses_clusters()
    }

    /// Draw one resampled panel.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        panel: &Panel,
        clusters: &ClusterLabeling,
        rng: &mut R,
    ) -> Result<Panel, ResampleError> {
        self.check(panel, clusters)?;
        Ok(self.draw_unchecked(panel, clusters, rng))
    }

    /// Draw `n` independent resampled panels.
    pub fn resample_many<R: Rng + ?Sized>(
        &self,
        panel: &Panel,
        clusters: &ClusterLabeling,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Panel>, ResampleError> {
        self.check(panel, clusters)?;
        Ok((0..n)
            .map(|_| self.draw_unchecked(panel, clusters, rng))
            .collect())
    }

    /// Draw without re-validating; `check` must have passed for this panel.
    pub(crate) fn draw_unchecked<R: Rng + ?Sized>(
        &self,
        panel: &Panel,
        clusters: &ClusterLabeling,
        rng: &mut R,
    ) -> Panel {
        let rows = if self.uses_blocks() {
            block_row_indices(panel.periods(), self.block_length, rng)
        } else {
            (0..panel.periods()).collect()
        };
        let cols = if self.uses_clusters() {
            cluster_column_indices(clusters, panel.series(), rng)
        } else {
            (0..panel.series()).collect()
        };
        panel.gather(&rows, &cols)
    }
}

/// Row indices of one moving-block draw: ceil(T/L) blocks with starts in
/// [0, T-L], concatenated and cut to T.
pub fn block_row_indices<R: Rng + ?Sized>(
    periods: usize,
    block_length: usize,
    rng: &mut R,
) -> Vec<usize> {
    let n_blocks = periods.div_ceil(block_length);
    let max_start = periods - block_length;
    let mut rows = Vec::with_capacity(n_blocks * block_length);
    for _ in 0..n_blocks {
        let start = rng.gen_range(0..=max_start);
        rows.extend(start..start + block_length);
    }
    rows.truncate(periods);
    rows
}

/// Column indices of one cluster draw, filled to exactly `series` columns.
pub fn cluster_column_indices<R: Rng + ?Sized>(
    clusters: &ClusterLabeling,
    series: usize,
    rng: &mut R,
) -> Vec<usize> {
    let groups = clusters.groups();
    if groups.is_empty() {
        return (0..series).collect();
    }
    let mut cols = Vec::with_capacity(series);
    let mut drawn = 0;
    while drawn < groups.len() || cols.len() < series {
        let (_, members) = &groups[rng.gen_range(0..groups.len())];
        cols.extend_from_slice(members);
        drawn += 1;
    }
    cols.truncate(series);
    cols
}
