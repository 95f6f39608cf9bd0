//! Stages submitted by other crates become available by name.
use dcmanon_core::{tags, Dataset, InstanceSet};
use dcmanon_filter::{
    create_filter, registry, submit_filter, Filter, FilterFactory, FilterKind, FilterLog,
};

#[derive(Debug)]
struct Reverser;

impl Filter for Reverser {
    fn name(&self) -> &str {
        "Reverser"
    }

    fn description(&self) -> &str {
        "Reverses the order of the instances."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Sorter
    }

    fn apply(
        &mut self,
        set: InstanceSet,
        _log: &mut FilterLog,
    ) -> Result<Vec<InstanceSet>, dcmanon_filter::FilterError> {
        let mut instances = set.into_vec();
        instances.reverse();
        Ok(vec![instances.into()])
    }
}

fn create_reverser() -> Box<dyn Filter> {
    Box::new(Reverser)
}

submit_filter!(FilterFactory::new("tests::reverser", create_reverser));

#[cfg(feature = "inventory-registry")]
#[test]
fn submitted_filter_can_be_created() {
    assert!(registry().contains("tests::reverser"));
    let mut filter = create_filter("tests::reverser").unwrap();
    assert_eq!(filter.name(), "Reverser");

    let set: InstanceSet = (1..=3_i64)
        .map(|n| {
            let mut ds = Dataset::new();
            ds.set(tags::INSTANCE_NUMBER, n);
            ds
        })
        .collect();
    let out = filter.apply(set, &mut FilterLog::new()).unwrap();
    let numbers: Vec<_> = out[0]
        .iter()
        .filter_map(|ds| ds.get_int(tags::INSTANCE_NUMBER))
        .collect();
    assert_eq!(numbers, vec![3, 2, 1]);
}

#[test]
fn built_in_names_are_listed() {
    let names = registry().names();
    assert!(names.contains(&"dcmanon::filter::default_dicom_filter"));
    assert!(names.contains(&"dcmanon::filter::image_position_patient_sorter"));
}
