//! The anonymizer as a filter pipeline stage.
use crate::anonymizer::Anonymizer;
use crate::context::AnonymizationContext;
use crate::policy::AnonymizationPolicy;
use dcmanon_core::InstanceSet;
use dcmanon_filter::{Filter, FilterError, FilterFactory, FilterKind, FilterLog};

/// The registry name of the anonymizer stage with the basic profile.
pub const BASIC_PROFILE_FILTER: &str = "dcmanon::anonymizer::basic_profile";

/// A custom stage which anonymizes every instance of a set.
///
/// The stage owns the context of its job,
/// so the UIDs of all the sets it processes are mapped consistently.
#[derive(Debug)]
pub struct AnonymizerFilter {
    anonymizer: Anonymizer,
    context: AnonymizationContext,
}

impl AnonymizerFilter {
    /// Create a stage starting a new job with the given anonymizer.
    pub fn new(anonymizer: Anonymizer) -> Self {
        AnonymizerFilter {
            anonymizer,
            context: AnonymizationContext::new(),
        }
    }

    /// The context of the job.
    pub fn context(&self) -> &AnonymizationContext {
        &self.context
    }

    /// Finish the job, retrieving its context.
    pub fn into_context(self) -> AnonymizationContext {
        self.context
    }
}

impl Filter for AnonymizerFilter {
    fn name(&self) -> &str {
        "Anonymizer"
    }

    fn description(&self) -> &str {
        "Strips or replaces identifying attributes according to a policy."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Custom
    }

    fn apply(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>, FilterError> {
        let count = set.len();
        // a failed set may be retried without the offending instance,
        // so only a set anonymized in full is counted
        let processed = self.context.datasets_processed();
        let mut out = InstanceSet::new();
        for (instance, dataset) in set.into_iter().enumerate() {
            match self.anonymizer.anonymize(&mut self.context, dataset) {
                Ok(anonymized) => out.push(anonymized),
                Err(e) => {
                    self.context.rewind_count(processed);
                    return Err(FilterError::Custom {
                        stage: "Anonymizer".to_string(),
                        instance,
                        source: Box::new(e),
                    });
                }
            }
        }
        log.info(self.name(), format!("anonymized {} instances", count));
        Ok(vec![out])
    }
}

#[cfg_attr(not(feature = "inventory-registry"), allow(dead_code))]
fn basic_profile_filter() -> Box<dyn Filter> {
    Box::new(AnonymizerFilter::new(Anonymizer::new(
        AnonymizationPolicy::basic_profile(),
    )))
}

dcmanon_filter::submit_filter!(FilterFactory::new(BASIC_PROFILE_FILTER, basic_profile_filter));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Action;
    use dcmanon_core::{tags, Dataset};
    use dcmanon_filter::{FailurePolicy, Pipeline, SopClassUidSplitter};

    fn instance(series: &str, number: i64) -> Dataset {
        let mut ds = Dataset::new();
        ds.set(tags::SOP_CLASS_UID, "1.2.840.10008.5.1.4.1.1.2");
        ds.set(tags::SERIES_INSTANCE_UID, series);
        ds.set(tags::PATIENT_NAME, "DOE^JOHN");
        ds.set(tags::INSTANCE_NUMBER, number);
        ds
    }

    #[test]
    fn anonymizes_sets_consistently() {
        let mut stage = AnonymizerFilter::new(Anonymizer::new(AnonymizationPolicy::basic_profile()));
        let set: InstanceSet = vec![instance("1.2.3", 1), instance("1.2.3", 2)].into();
        let out = stage.apply(set, &mut FilterLog::new()).unwrap();
        assert_eq!(out.len(), 1);
        let series: Vec<_> = out[0]
            .iter()
            .map(|ds| ds.get_str(tags::SERIES_INSTANCE_UID).unwrap_or_default().to_string())
            .collect();
        assert_eq!(series[0], series[1]);
        assert_ne!(series[0], "1.2.3");
        assert_eq!(stage.context().datasets_processed(), 2);
        assert_eq!(stage.into_context().mapped_uid("1.2.3"), Some(series[0].as_str()));
    }

    #[test]
    fn failing_instances_can_be_skipped() {
        let policy = AnonymizationPolicy::new()
            .with(tags::INSTANCE_NUMBER, Action::ReplaceWithFixed("x".into()));
        let mut bad = instance("1.2.3", 2);
        bad.put(
            tags::INSTANCE_NUMBER,
            dcmanon_core::Element::new(dcmanon_core::VR::SL, 2_i64),
        );
        let set: InstanceSet = vec![instance("1.2.3", 1), bad].into();

        let mut pipeline = Pipeline::new()
            .with_policy(FailurePolicy::SkipInstance)
            .with_stage(SopClassUidSplitter)
            .with_stage(AnonymizerFilter::new(Anonymizer::new(policy)));
        let out = pipeline.run(set, &mut FilterLog::new()).unwrap();
        assert_eq!(out.sets[0].len(), 1);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].stage, "Anonymizer");
    }

    #[test]
    fn failed_sets_are_not_counted() {
        let policy = AnonymizationPolicy::new()
            .with(tags::INSTANCE_NUMBER, Action::ReplaceWithFixed("x".into()));
        let mut bad = instance("1.2.3", 3);
        bad.put(
            tags::INSTANCE_NUMBER,
            dcmanon_core::Element::new(dcmanon_core::VR::SL, 3_i64),
        );
        let mut stage = AnonymizerFilter::new(Anonymizer::new(policy));
        let mut log = FilterLog::new();

        let set: InstanceSet = vec![instance("1.2.3", 1), instance("1.2.3", 2), bad].into();
        let err = stage.apply(set, &mut log).unwrap_err();
        assert_eq!(err.instance(), Some(2));
        assert_eq!(stage.context().datasets_processed(), 0);

        let retry: InstanceSet = vec![instance("1.2.3", 1), instance("1.2.3", 2)].into();
        stage.apply(retry, &mut log).unwrap();
        assert_eq!(stage.context().datasets_processed(), 2);
    }

    #[cfg(feature = "inventory-registry")]
    #[test]
    fn registered_by_name() {
        let stage = dcmanon_filter::create_filter(BASIC_PROFILE_FILTER).unwrap();
        assert_eq!(stage.kind(), FilterKind::Custom);
    }
}
