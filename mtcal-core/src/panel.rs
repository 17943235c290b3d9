//! Panel data model: a T×K matrix of observations plus the per-series
//! cluster labels and ground-truth markers that travel with it.
//!
//! Storage is column-major so each series is a contiguous slice; every
//! statistic in the engine is computed series by series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from panel construction and shape checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PanelError {
    #[error("panel needs at least 2 time periods, got {0}")]
    TooFewPeriods(usize),
    #[error("panel needs at least 1 series")]
    NoSeries,
    #[error("data length {len} does not match {periods} periods x {series} series")]
    LengthMismatch {
        len: usize,
        periods: usize,
        series: usize,
    },
    #[error("series {series} has length {len}, expected {expected}")]
    RaggedSeries {
        series: usize,
        len: usize,
        expected: usize,
    },
    #[error("non-finite observation at period {period}, series {series}")]
    NonFinite { period: usize, series: usize },
    #[error("{what} has length {len}, panel has {series} series")]
    LabelMismatch {
        what: &'static str,
        len: usize,
        series: usize,
    },
}

/// T×K real-valued panel. Rows are time periods, columns are series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    periods: usize,
    series: usize,
    /// Column-major: series `k` occupies `data[k*periods..(k+1)*periods]`.
    data: Vec<f64>,
}

impl Panel {
    /// Build a panel from column-major data.
    pub fn from_column_major(
        periods: usize,
        series: usize,
        data: Vec<f64>,
    ) -> Result<Self, PanelError> {
        if periods < 2 {
            return Err(PanelError::TooFewPeriods(periods));
        }
        if series == 0 {
            return Err(PanelError::NoSeries);
        }
        if data.len() != periods * series {
            return Err(PanelError::LengthMismatch {
                len: data.len(),
                periods,
                series,
            });
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(PanelError::NonFinite {
                period: pos % periods,
                series: pos / periods,
            });
        }
        Ok(Self {
            periods,
            series,
            data,
        })
    }

    /// Build a panel from one vector per series.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self, PanelError> {
        let series = columns.len();
        if series == 0 {
            return Err(PanelError::NoSeries);
        }
        let periods = columns[0].len();
        let mut data = Vec::with_capacity(periods * series);
        for (k, col) in columns.into_iter().enumerate() {
            if col.len() != periods {
                return Err(PanelError::RaggedSeries {
                    series: k,
                    len: col.len(),
                    expected: periods,
                });
            }
            data.extend(col);
        }
        Self::from_column_major(periods, series, data)
    }

    /// Build a panel from row-major rows (one row per time period).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, PanelError> {
        let periods = rows.len();
        let series = rows.first().map_or(0, Vec::len);
        if let Some((t, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != series) {
            return Err(PanelError::RaggedSeries {
                series: t,
                len: row.len(),
                expected: series,
            });
        }
        let mut data = vec![0.0; periods * series];
        for (t, row) in rows.iter().enumerate() {
            for (k, &v) in row.iter().enumerate() {
                data[k * periods + t] = v;
            }
        }
        Self::from_column_major(periods, series, data)
    }

    /// Number of time periods (T).
    pub fn periods(&self) -> usize {
        self.periods
    }

    /// Number of series (K).
    pub fn series(&self) -> usize {
        self.series
    }

    /// Shape as (T, K).
    pub fn shape(&self) -> (usize, usize) {
        (self.periods, self.series)
    }

    /// Observations of series `k`.
    pub fn column(&self, k: usize) -> &[f64] {
        &self.data[k * self.periods..(k + 1) * self.periods]
    }

    /// Iterate series in column order.
    pub fn columns(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.periods)
    }

    /// Observation at period `t`, series `k`.
    pub fn value(&self, t: usize, k: usize) -> f64 {
        self.data[k * self.periods + t]
    }

    /// Per-series sample means.
    pub fn column_means(&self) -> Vec<f64> {
        let n = self.periods as f64;
        self.columns().map(|c| c.iter().sum::<f64>() / n).collect()
    }

    /// Copy with every series demeaned. Used to impose the null before
    /// resampling.
    pub fn centered(&self) -> Panel {
        let means = self.column_means();
        let data = self
            .columns()
            .zip(&means)
            .flat_map(|(col, &m)| col.iter().map(move |v| v - m))
            .collect();
        Panel {
            periods: self.periods,
            series: self.series,
            data,
        }
    }

    /// Assemble a panel from a row index map and a column index map over
    /// `self`. Indices are trusted; callers guarantee they are in range.
    pub(crate) fn gather(&self, rows: &[usize], cols: &[usize]) -> Panel {
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for &k in cols {
            let col = self.column(k);
            data.extend(rows.iter().map(|&t| col[t]));
        }
        Panel {
            periods: rows.len(),
            series: cols.len(),
            data,
        }
    }
}

/// Cluster membership of each series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLabeling {
    labels: Vec<usize>,
}

impl ClusterLabeling {
    pub fn new(labels: Vec<usize>) -> Self {
        Self { labels }
    }

    /// Every series in its own cluster.
    pub fn singletons(series: usize) -> Self {
        Self {
            labels: (0..series).collect(),
        }
    }

    /// `n_clusters` consecutive blocks of `per_cluster` series each.
    pub fn contiguous(n_clusters: usize, per_cluster: usize) -> Self {
        Self {
            labels: (0..n_clusters)
                .flat_map(|c| std::iter::repeat(c).take(per_cluster))
                .collect(),
        }
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Clusters in ascending label order, each with its member series in
    /// ascending index order.
    pub fn groups(&self) -> Vec<(usize, Vec<usize>)> {
        let mut map: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (k, &label) in self.labels.iter().enumerate() {
            map.entry(label).or_default().push(k);
        }
        map.into_iter().collect()
    }

    /// Number of distinct clusters.
    pub fn n_clusters(&self) -> usize {
        self.groups().len()
    }

    pub fn check_against(&self, panel: &Panel) -> Result<(), PanelError> {
        if self.labels.len() != panel.series() {
            return Err(PanelError::LabelMismatch {
                what: "cluster labeling",
                len: self.labels.len(),
                series: panel.series(),
            });
        }
        Ok(())
    }
}

/// Which series carry a planted non-null effect. Read only by evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruth {
    is_effect: Vec<bool>,
}

impl GroundTruth {
    pub fn new(is_effect: Vec<bool>) -> Self {
        Self { is_effect }
    }

    /// All series null.
    pub fn all_null(series: usize) -> Self {
        Self {
            is_effect: vec![false; series],
        }
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.is_effect
    }

    pub fn len(&self) -> usize {
        self.is_effect.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_effect.is_empty()
    }

    pub fn is_effect(&self, k: usize) -> bool {
        self.is_effect[k]
    }

    pub fn n_effects(&self) -> usize {
        self.is_effect.iter().filter(|&&b| b).count()
    }
}

/// One draw from a data source: the panel plus its labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPanel {
    pub panel: Panel,
    pub clusters: ClusterLabeling,
    pub truth: GroundTruth,
}

impl LabeledPanel {
    /// Bundle a panel with labels, checking that lengths agree.
    pub fn new(
        panel: Panel,
        clusters: ClusterLabeling,
        truth: GroundTruth,
    ) -> Result<Self, PanelError> {
        clusters.check_against(&panel)?;
        if truth.len() != panel.series() {
            return Err(PanelError::LabelMismatch {
                what: "ground truth",
                len: truth.len(),
                series: panel.series(),
            });
        }
        Ok(Self {
            panel,
            clusters,
            truth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Panel {
        Panel::from_columns(vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]).unwrap()
    }

    #[test]
    fn rejects_too_few_periods() {
        let err = Panel::from_columns(vec![vec![1.0]]).unwrap_err();
        assert_eq!(err, PanelError::TooFewPeriods(1));
    }

    #[test]
    fn rejects_empty_panel() {
        assert_eq!(Panel::from_columns(vec![]).unwrap_err(), PanelError::NoSeries);
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Panel::from_columns(vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, PanelError::RaggedSeries { series: 1, .. }));
    }

    #[test]
    fn rejects_non_finite() {
        let err = Panel::from_columns(vec![vec![1.0, f64::NAN]]).unwrap_err();
        assert_eq!(err, PanelError::NonFinite { period: 1, series: 0 });
    }

    #[test]
    fn rows_and_columns_agree() {
        let by_rows =
            Panel::from_rows(&[vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]]).unwrap();
        assert_eq!(by_rows, small());
        assert_eq!(by_rows.value(2, 1), 30.0);
    }

    #[test]
    fn centering_removes_means() {
        let centered = small().centered();
        for m in centered.column_means() {
            assert!(m.abs() < 1e-12);
        }
        assert_eq!(centered.column(0), &[-1.0, 0.0, 1.0]);
    }

    #[test]
    fn gather_selects_rows_and_columns() {
        let g = small().gather(&[2, 2, 0], &[1, 1]);
        assert_eq!(g.shape(), (3, 2));
        assert_eq!(g.column(0), &[30.0, 30.0, 10.0]);
    }

    #[test]
    fn groups_are_sorted_by_label() {
        let labels = ClusterLabeling::new(vec![2, 0, 2, 1, 0]);
        assert_eq!(
            labels.groups(),
            vec![(0, vec![1, 4]), (1, vec![3]), (2, vec![0, 2])]
        );
        assert_eq!(labels.n_clusters(), 3);
    }

    #[test]
    fn contiguous_labels() {
        assert_eq!(ClusterLabeling::contiguous(2, 3).labels(), &[0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn labeled_panel_checks_lengths() {
        let err = LabeledPanel::new(
            small(),
            ClusterLabeling::singletons(3),
            GroundTruth::all_null(2),
        )
        .unwrap_err();
        assert!(matches!(err, PanelError::LabelMismatch { len: 3, .. }));
    }
}
