//! Custom stages, which may drop or regroup instances freely.
use crate::filter::{check_output, Filter, FilterError, FilterKind, FilterLog, NotConfiguredSnafu, Result};
use dcmanon_core::{InstanceSet, Tag};
use snafu::OptionExt;

/// Drops the instances whose attribute has a given value.
///
/// Instances without the attribute are kept.
#[derive(Debug, Clone, Default)]
pub struct TagValueFilter {
    criterion: Option<(Tag, String)>,
}

impl TagValueFilter {
    /// Create a filter which still needs its criterion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter dropping the instances where `tag` is `value`.
    pub fn with_criterion(tag: Tag, value: impl Into<String>) -> Self {
        TagValueFilter {
            criterion: Some((tag, value.into())),
        }
    }

    /// Set the attribute and the value of the instances to drop.
    pub fn set_criterion(&mut self, tag: Tag, value: impl Into<String>) {
        self.criterion = Some((tag, value.into()));
    }
}

impl Filter for TagValueFilter {
    fn name(&self) -> &str {
        "Tag value filter"
    }

    fn description(&self) -> &str {
        "Removes the instances in which an attribute has a given value."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Custom
    }

    fn is_configuration_required(&self) -> bool {
        true
    }

    fn apply(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
        let (tag, value) = self
            .criterion
            .as_ref()
            .context(NotConfiguredSnafu { name: "Tag value filter" })?;
        let before = set.len();
        let kept: InstanceSet = set
            .into_iter()
            .filter(|instance| {
                let text = instance.get(*tag).and_then(|v| v.to_text());
                text.as_deref().map(|t| t.trim_end_matches([' ', '\0'])) != Some(value.as_str())
            })
            .collect();
        if kept.len() < before {
            log.info(
                self.name(),
                format!("removed {} instances where {} is {:?}", before - kept.len(), tag, value),
            );
        }
        Ok(vec![kept])
    }
}

/// A sequence of stages which runs as a single stage.
///
/// Every set produced by one stage is fed to the next.
/// A failure of the first stage is reported as is,
/// since its instance positions refer to the composite's input.
/// Failures of later stages are wrapped in [`FilterError::Nested`].
#[derive(Debug)]
pub struct CompositeFilter {
    name: String,
    stages: Vec<Box<dyn Filter>>,
}

impl CompositeFilter {
    /// Create an empty composite stage.
    pub fn new(name: impl Into<String>) -> Self {
        CompositeFilter {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn push(&mut self, stage: impl Filter + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// Append a stage, builder style.
    pub fn with(mut self, stage: impl Filter + 'static) -> Self {
        self.push(stage);
        self
    }

    /// The stages, in order.
    pub fn stages(&self) -> &[Box<dyn Filter>] {
        &self.stages
    }
}

impl Filter for CompositeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Runs a sequence of stages as one."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Custom
    }

    fn is_configuration_required(&self) -> bool {
        self.stages.iter().any(|s| s.is_configuration_required())
    }

    fn apply(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
        let mut sets = vec![set];
        for (i, stage) in self.stages.iter_mut().enumerate() {
            let mut next = Vec::with_capacity(sets.len());
            for set in sets {
                let output = stage
                    .apply(set, log)
                    .and_then(|output| check_output(stage.as_ref(), &output).map(|_| output));
                match output {
                    Ok(output) => next.extend(output),
                    Err(e) if i == 0 => return Err(e),
                    Err(e) => {
                        return Err(FilterError::Nested {
                            stage: stage.name().to_string(),
                            source: Box::new(e),
                        })
                    }
                }
            }
            sets = next;
        }
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SopClassUidSplitter, InstanceNumberSorter};
    use dcmanon_core::dictionary::uids;
    use dcmanon_core::{tags, Dataset};
    use pretty_assertions::assert_eq;

    fn instance(class: &str, number: i64) -> Dataset {
        let mut ds = Dataset::new();
        ds.set(tags::SOP_CLASS_UID, class);
        ds.set(tags::INSTANCE_NUMBER, number);
        ds
    }

    #[test]
    fn removes_matching_instances() {
        let set: InstanceSet = vec![
            instance(uids::CT_IMAGE_STORAGE, 1),
            instance(uids::SPATIAL_FIDUCIALS_STORAGE, 2),
            Dataset::new(),
        ]
        .into();
        let mut filter =
            TagValueFilter::with_criterion(tags::SOP_CLASS_UID, uids::SPATIAL_FIDUCIALS_STORAGE);
        let mut log = FilterLog::new();
        let out = filter.apply(set, &mut log).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn composite_runs_stages_in_order() {
        let set: InstanceSet = vec![
            instance(uids::CT_IMAGE_STORAGE, 3),
            instance(uids::MR_IMAGE_STORAGE, 2),
            instance(uids::CT_IMAGE_STORAGE, 1),
        ]
        .into();
        let mut composite = CompositeFilter::new("split and sort")
            .with(SopClassUidSplitter)
            .with(InstanceNumberSorter);
        assert_eq!(composite.stages().len(), 2);
        let out = composite.apply(set, &mut FilterLog::new()).unwrap();
        let numbers: Vec<Vec<i64>> = out
            .iter()
            .map(|s| s.iter().filter_map(|ds| ds.get_int(tags::INSTANCE_NUMBER)).collect())
            .collect();
        assert_eq!(numbers, vec![vec![1, 3], vec![2]]);
    }

    #[test]
    fn failures_of_later_stages_are_nested() {
        let mut ds = Dataset::new();
        ds.set(tags::SOP_CLASS_UID, uids::CT_IMAGE_STORAGE);
        let mut composite = CompositeFilter::new("split and sort")
            .with(SopClassUidSplitter)
            .with(InstanceNumberSorter);
        let err = composite
            .apply(vec![ds].into(), &mut FilterLog::new())
            .unwrap_err();
        assert!(matches!(err, FilterError::Nested { .. }));
        assert_eq!(err.instance(), None);

        let err = composite
            .apply(vec![Dataset::new()].into(), &mut FilterLog::new())
            .unwrap_err();
        assert_eq!(err.instance(), Some(0));
    }

    #[test]
    fn composite_requires_configuration_of_any_stage() {
        let composite = CompositeFilter::new("c")
            .with(SopClassUidSplitter)
            .with(TagValueFilter::new());
        assert!(composite.is_configuration_required());
    }
}
