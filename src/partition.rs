//! Comparison groups over a categorical class column.
//!
//! Groups carry a structured [`ComparisonId`]; the `"A vs. B"` label is only
//! rendered for display and file names, never parsed back.

use crate::error::{PipelineError, Result};
use crate::signature::BackendKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Identity of one directed comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComparisonId {
    control: Option<String>,
    case: String,
}

impl ComparisonId {
    pub fn one_vs_rest(case: impl Into<String>) -> Self {
        ComparisonId {
            control: None,
            case: case.into(),
        }
    }

    pub fn pairwise(control: impl Into<String>, case: impl Into<String>) -> Self {
        ComparisonId {
            control: Some(control.into()),
            case: case.into(),
        }
    }

    /// Class whose up-regulated genes the signature describes.
    pub fn case(&self) -> &str {
        &self.case
    }

    /// Control class, `None` when the control is every other sample.
    pub fn control(&self) -> Option<&str> {
        self.control.as_deref()
    }

    pub fn is_one_vs_rest(&self) -> bool {
        self.control.is_none()
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ComparisonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.control {
            Some(control) => write!(f, "{} vs. {}", control, self.case),
            None => write!(f, "{} vs. rest", self.case),
        }
    }
}

/// Control and case sample indices (rows of the expression matrix).
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonGroup {
    pub id: ComparisonId,
    pub control: Vec<usize>,
    pub case: Vec<usize>,
}

impl ComparisonGroup {
    pub fn label(&self) -> String {
        self.id.label()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Every ordered pair of distinct classes.
    Pairwise,
    /// Each class against all remaining samples.
    OneVsRest,
}

/// Outcome of the size safeguard plus the groups to evaluate.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    /// Backend that will actually run; may differ from the requested one.
    pub backend: BackendKind,
    pub downsampled: bool,
    /// Sample indices retained for the comparisons, ascending.
    pub samples: Vec<usize>,
    pub groups: Vec<ComparisonGroup>,
}

#[derive(Debug, Clone)]
pub struct LabelPartitioner {
    mode: GroupingMode,
    max_classes: usize,
    max_samples: usize,
    strict_backend: bool,
}

impl LabelPartitioner {
    pub fn new(mode: GroupingMode) -> Self {
        LabelPartitioner {
            mode,
            max_classes: 5,
            max_samples: 5000,
            strict_backend: false,
        }
    }

    /// Above `max_classes` classes and `max_samples` samples, the run is
    /// downsampled to `max_samples` and switched to the rank-sum backend.
    pub fn with_limits(mut self, max_classes: usize, max_samples: usize) -> Self {
        self.max_classes = max_classes;
        self.max_samples = max_samples;
        self
    }

    /// Refuse to substitute the backend instead of warning.
    pub fn with_strict_backend(mut self, strict: bool) -> Self {
        self.strict_backend = strict;
        self
    }

    pub fn mode(&self) -> GroupingMode {
        self.mode
    }

    /// Apply the size safeguard, then partition the retained samples.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        labels: &[Option<String>],
        classes: &[String],
        requested: BackendKind,
        rng: &mut R,
    ) -> Result<PartitionPlan> {
        let n_samples = labels.len();
        let oversized = classes.len() > self.max_classes && n_samples > self.max_samples;

        if !oversized {
            let samples: Vec<usize> = (0..n_samples).collect();
            let groups = self.partition(labels, classes, &samples);
            return Ok(PartitionPlan {
                backend: requested,
                downsampled: false,
                samples,
                groups,
            });
        }

        if self.strict_backend && requested != BackendKind::RankSum {
            return Err(PipelineError::Input(format!(
                "{} classes over {} samples exceed the limits of {} classes and {} samples for {}",
                classes.len(),
                n_samples,
                self.max_classes,
                self.max_samples,
                requested
            )));
        }

        if requested == BackendKind::RankSum {
            warn!(
                "Too many samples/classes ({} samples, {} classes); randomly selecting {} samples",
                n_samples,
                classes.len(),
                self.max_samples
            );
        } else {
            warn!(
                "Too many samples/classes ({} samples, {} classes); switching from {} to {} and randomly selecting {} samples",
                n_samples,
                classes.len(),
                requested,
                BackendKind::RankSum,
                self.max_samples
            );
        }

        let mut samples = rand::seq::index::sample(rng, n_samples, self.max_samples).into_vec();
        samples.sort_unstable();
        let groups = self.partition(labels, classes, &samples);

        Ok(PartitionPlan {
            backend: BackendKind::RankSum,
            downsampled: true,
            samples,
            groups,
        })
    }

    /// Comparison groups over `samples`, in class order.
    ///
    /// Fewer than two classes yields no groups. Classes without any sample
    /// among `samples` are skipped. Samples with a missing label only ever
    /// appear on the "rest" side of one-vs-rest comparisons.
    pub fn partition(
        &self,
        labels: &[Option<String>],
        classes: &[String],
        samples: &[usize],
    ) -> Vec<ComparisonGroup> {
        if classes.len() < 2 {
            warn!(
                "Please provide at least 2 classes in the metadata (found {})",
                classes.len()
            );
            return Vec::new();
        }

        let members = |class: &str| -> Vec<usize> {
            samples
                .iter()
                .copied()
                .filter(|&i| labels[i].as_deref() == Some(class))
                .collect()
        };

        let present: Vec<(&String, Vec<usize>)> = classes
            .iter()
            .filter_map(|class| {
                let idx = members(class);
                if idx.is_empty() {
                    debug!("Class '{}' has no retained samples; skipping", class);
                    None
                } else {
                    Some((class, idx))
                }
            })
            .collect();

        match self.mode {
            GroupingMode::OneVsRest => present
                .iter()
                .map(|(class, case)| {
                    let control = samples
                        .iter()
                        .copied()
                        .filter(|&i| labels[i].as_deref() != Some(class.as_str()))
                        .collect();
                    ComparisonGroup {
                        id: ComparisonId::one_vs_rest(class.as_str()),
                        control,
                        case: case.clone(),
                    }
                })
                .collect(),
            GroupingMode::Pairwise => {
                let mut groups = Vec::with_capacity(present.len() * (present.len() - 1));
                for (control_class, control) in &present {
                    for (case_class, case) in &present {
                        if control_class == case_class {
                            continue;
                        }
                        groups.push(ComparisonGroup {
                            id: ComparisonId::pairwise(control_class.as_str(), case_class.as_str()),
                            control: control.clone(),
                            case: case.clone(),
                        });
                    }
                }
                groups
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn labels(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    fn classes(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_labels() {
        assert_eq!(ComparisonId::one_vs_rest("A").label(), "A vs. rest");
        assert_eq!(ComparisonId::pairwise("A", "B").label(), "A vs. B");
        // class names containing the separator stay recoverable
        let tricky = ComparisonId::pairwise("x vs. y", "z");
        assert_eq!(tricky.case(), "z");
        assert_eq!(tricky.control(), Some("x vs. y"));
    }

    #[test]
    fn test_pairwise_counts_and_order() {
        let labels = labels(&["A", "B", "C", "A", "B", "C"]);
        let classes = classes(&["A", "B", "C"]);
        let samples: Vec<usize> = (0..labels.len()).collect();
        let groups = LabelPartitioner::new(GroupingMode::Pairwise).partition(&labels, &classes, &samples);

        assert_eq!(groups.len(), 3 * 2);
        let rendered: Vec<String> = groups.iter().map(|g| g.label()).collect();
        assert_eq!(
            rendered,
            vec!["A vs. B", "A vs. C", "B vs. A", "B vs. C", "C vs. A", "C vs. B"]
        );
        for group in &groups {
            assert_ne!(group.control, group.case);
            let control: HashSet<_> = group.control.iter().collect();
            assert!(group.case.iter().all(|i| !control.contains(i)));
        }
        assert_eq!(groups[0].control, vec![0, 3]);
        assert_eq!(groups[0].case, vec![1, 4]);
    }

    #[test]
    fn test_one_vs_rest_covers_every_sample_once() {
        let labels = labels(&["A", "B", "C", "A", "B", "C", "C"]);
        let classes = classes(&["A", "B", "C"]);
        let samples: Vec<usize> = (0..labels.len()).collect();
        let groups = LabelPartitioner::new(GroupingMode::OneVsRest).partition(&labels, &classes, &samples);

        assert_eq!(groups.len(), 3);
        let mut case_counts = vec![0; labels.len()];
        for group in &groups {
            assert!(group.id.is_one_vs_rest());
            assert_eq!(group.control.len() + group.case.len(), labels.len());
            for &i in &group.case {
                case_counts[i] += 1;
            }
        }
        assert!(case_counts.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_single_class_yields_nothing() {
        let labels = labels(&["A", "A"]);
        let groups = LabelPartitioner::new(GroupingMode::Pairwise).partition(&labels, &classes(&["A"]), &[0, 1]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_safeguard_switches_backend_and_downsamples() {
        let names = ["A", "B", "C", "D", "E", "F"];
        let labels: Vec<Option<String>> = (0..60).map(|i| Some(names[i % 6].to_string())).collect();
        let classes = classes(&names);
        let mut rng = StdRng::seed_from_u64(7);

        let partitioner = LabelPartitioner::new(GroupingMode::OneVsRest).with_limits(5, 30);
        let plan = partitioner
            .plan(&labels, &classes, BackendKind::DESeq2, &mut rng)
            .unwrap();
        assert_eq!(plan.backend, BackendKind::RankSum);
        assert!(plan.downsampled);
        assert_eq!(plan.samples.len(), 30);
        assert!(plan.samples.windows(2).all(|w| w[0] < w[1]));
        for group in &plan.groups {
            assert!(group.case.iter().chain(group.control.iter()).all(|i| plan.samples.contains(i)));
        }

        let strict = partitioner.clone().with_strict_backend(true);
        let result = strict.plan(&labels, &classes, BackendKind::DESeq2, &mut rng);
        assert!(matches!(result, Err(PipelineError::Input(_))));
    }

    #[test]
    fn test_safeguard_not_triggered_for_small_runs() {
        let labels = labels(&["A", "B", "A", "B"]);
        let mut rng = StdRng::seed_from_u64(1);
        let plan = LabelPartitioner::new(GroupingMode::Pairwise)
            .plan(&labels, &classes(&["A", "B"]), BackendKind::EdgeR, &mut rng)
            .unwrap();
        assert_eq!(plan.backend, BackendKind::EdgeR);
        assert!(!plan.downsampled);
        assert_eq!(plan.groups.len(), 2);
    }
}
