//! Organizing a mixed collection of instances into sorted series.
use dcmanon_core::dictionary::uids;
use dcmanon_core::{tags, Dataset, InstanceSet};
use dcmanon_filter::{
    create_filter, FailurePolicy, FilterLog, ImagePositionPatientSorter, Pipeline,
    DEFAULT_DICOM_FILTER,
};
use pretty_assertions::assert_eq;

fn slice(uid: &str, series: &str, z: f64) -> Dataset {
    let mut ds = Dataset::new();
    ds.set(tags::SOP_CLASS_UID, uids::CT_IMAGE_STORAGE);
    ds.set(tags::SOP_INSTANCE_UID, uid);
    ds.set(tags::SERIES_INSTANCE_UID, series);
    ds.set(tags::IMAGE_ORIENTATION_PATIENT, "1\\0\\0\\0\\1\\0");
    ds.set(tags::IMAGE_POSITION_PATIENT, format!("0\\0\\{}", z));
    ds
}

fn uids_of(set: &InstanceSet) -> Vec<&str> {
    set.iter()
        .filter_map(|ds| ds.get_str(tags::SOP_INSTANCE_UID))
        .collect()
}

#[test]
fn split_into_series_then_sort_slices() {
    let mut fiducials = Dataset::new();
    fiducials.set(tags::SOP_CLASS_UID, uids::SPATIAL_FIDUCIALS_STORAGE);
    fiducials.set(tags::SOP_INSTANCE_UID, "f");
    fiducials.set(tags::SERIES_INSTANCE_UID, "1.9");

    let set: InstanceSet = vec![
        slice("a3", "1.1", 3.),
        slice("b1", "1.2", 1.),
        fiducials,
        slice("a1", "1.1", 1.),
        slice("a2", "1.1", 2.),
    ]
    .into();

    let mut pipeline = Pipeline::new().with_policy(FailurePolicy::SkipInstance);
    pipeline.push(create_filter(DEFAULT_DICOM_FILTER).unwrap());
    let mut log = FilterLog::new();
    let output = pipeline.run(set, &mut log).unwrap();
    assert!(output.skipped.is_empty());
    assert_eq!(output.sets.len(), 3);

    // the fiducials have no position and are left out of the sorted series
    let mut sorting = Pipeline::new()
        .with_policy(FailurePolicy::SkipInstance)
        .with_stage(ImagePositionPatientSorter);
    let mut sorted = Vec::new();
    let mut skipped = 0;
    for set in output.sets {
        let out = sorting.run(set, &mut log).unwrap();
        skipped += out.skipped.len();
        sorted.extend(out.sets);
    }
    assert_eq!(skipped, 1);
    let series: Vec<Vec<&str>> = sorted.iter().map(uids_of).collect();
    assert_eq!(series, vec![vec!["a1", "a2", "a3"], vec!["b1"], vec![]]);
}
