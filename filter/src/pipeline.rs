//! Driving instance sets through a sequence of stages.
use crate::filter::{check_output, Filter, FilterError, FilterLog, Result};
use dcmanon_core::{Dataset, InstanceSet};
use tracing::{debug, warn};

/// What a pipeline does when a stage fails on a single instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run and report the failure.
    #[default]
    Abort,
    /// Leave the offending instance out and run the stage again.
    SkipInstance,
}

/// An instance which was left out of a pipeline run.
#[derive(Debug)]
pub struct Skipped {
    /// The name of the stage which failed on the instance.
    pub stage: String,
    /// The instance.
    pub instance: Dataset,
    /// Why the stage failed.
    pub error: FilterError,
}

/// The result of a pipeline run.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// The instance sets produced by the last stage.
    pub sets: Vec<InstanceSet>,
    /// The instances which were left out, in the order they were dropped.
    pub skipped: Vec<Skipped>,
}

/// A sequence of stages, each applied to every set
/// produced by the previous one.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Filter>>,
    policy: FailurePolicy,
}

impl Pipeline {
    /// Create an empty pipeline, which aborts on failure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: impl Filter + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append a boxed stage, such as one made by the registry.
    pub fn push(&mut self, stage: Box<dyn Filter>) {
        self.stages.push(stage);
    }

    /// The number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run an instance set through all stages.
    ///
    /// Stage output is checked against the kind of the stage:
    /// a sorter must produce exactly one set
    /// and a splitter at least one.
    pub fn run(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<PipelineOutput> {
        let mut output = PipelineOutput {
            sets: vec![set],
            skipped: Vec::new(),
        };
        for stage in &mut self.stages {
            debug!("running stage `{}` on {} sets", stage.name(), output.sets.len());
            let mut next = Vec::with_capacity(output.sets.len());
            for set in std::mem::take(&mut output.sets) {
                let produced = match self.policy {
                    FailurePolicy::Abort => apply_checked(stage.as_mut(), set, log)?,
                    FailurePolicy::SkipInstance => {
                        apply_skipping(stage.as_mut(), set, log, &mut output.skipped)?
                    }
                };
                next.extend(produced);
            }
            output.sets = next;
        }
        Ok(output)
    }
}

fn apply_checked(stage: &mut dyn Filter, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
    let output = stage.apply(set, log)?;
    check_output(stage, &output)?;
    Ok(output)
}

fn apply_skipping(
    stage: &mut dyn Filter,
    mut set: InstanceSet,
    log: &mut FilterLog,
    skipped: &mut Vec<Skipped>,
) -> Result<Vec<InstanceSet>> {
    loop {
        let attempt = set.clone();
        match apply_checked(stage, attempt, log) {
            Ok(output) => return Ok(output),
            Err(error) => {
                let index = match error.instance() {
                    Some(index) if index < set.len() => index,
                    _ => return Err(error),
                };
                let instance = set.instances_mut().remove(index);
                warn!("skipping instance #{} in stage `{}`: {}", index, stage.name(), error);
                log.error(stage.name(), format!("instance skipped: {}", error));
                skipped.push(Skipped {
                    stage: stage.name().to_string(),
                    instance,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKind;
    use crate::{InstanceNumberSorter, SopClassUidSplitter};
    use dcmanon_core::dictionary::uids;
    use dcmanon_core::tags;
    use pretty_assertions::assert_eq;

    fn instance(class: Option<&str>, number: i64) -> Dataset {
        let mut ds = Dataset::new();
        if let Some(class) = class {
            ds.set(tags::SOP_CLASS_UID, class);
        }
        ds.set(tags::INSTANCE_NUMBER, number);
        ds
    }

    fn input() -> InstanceSet {
        vec![
            instance(Some(uids::CT_IMAGE_STORAGE), 2),
            instance(None, 5),
            instance(Some(uids::CT_IMAGE_STORAGE), 1),
        ]
        .into()
    }

    #[test]
    fn abort_reports_the_failure() {
        let mut pipeline = Pipeline::new().with_stage(SopClassUidSplitter);
        let err = pipeline.run(input(), &mut FilterLog::new()).unwrap_err();
        assert_eq!(err.instance(), Some(1));
    }

    #[test]
    fn skip_instance_leaves_out_the_offender() {
        let mut pipeline = Pipeline::new()
            .with_policy(FailurePolicy::SkipInstance)
            .with_stage(SopClassUidSplitter)
            .with_stage(InstanceNumberSorter);
        assert_eq!(pipeline.len(), 2);
        let mut log = FilterLog::new();
        let out = pipeline.run(input(), &mut log).unwrap();
        assert_eq!(out.sets.len(), 1);
        let numbers: Vec<_> = out.sets[0]
            .iter()
            .filter_map(|ds| ds.get_int(tags::INSTANCE_NUMBER))
            .collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].instance.get_int(tags::INSTANCE_NUMBER), Some(5));
        assert_eq!(out.skipped[0].stage, "SOP class UID splitter");
        assert_eq!(log.entries().len(), 1);
    }

    #[derive(Debug)]
    struct Duplicator;

    impl Filter for Duplicator {
        fn name(&self) -> &str {
            "duplicator"
        }

        fn description(&self) -> &str {
            "claims to sort, but returns two sets"
        }

        fn kind(&self) -> FilterKind {
            FilterKind::Sorter
        }

        fn apply(&mut self, set: InstanceSet, _log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
            Ok(vec![set.clone(), set])
        }
    }

    #[test]
    fn sorter_must_return_one_set() {
        let mut pipeline = Pipeline::new()
            .with_policy(FailurePolicy::SkipInstance)
            .with_stage(Duplicator);
        let err = pipeline.run(input(), &mut FilterLog::new()).unwrap_err();
        assert!(matches!(
            err,
            FilterError::InvalidOutput { count: 2, kind: FilterKind::Sorter, .. }
        ));
    }

    #[test]
    fn empty_pipeline_passes_the_set_through() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.is_empty());
        let out = pipeline.run(input(), &mut FilterLog::new()).unwrap();
        assert_eq!(out.sets, vec![input()]);
    }
}
