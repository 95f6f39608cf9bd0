//! Job-scoped anonymization state.
use std::collections::HashMap;
use tracing::trace;
use uuid::Uuid;

/// The state shared by the data sets of one anonymization job.
///
/// The context maps each original UID to its replacement,
/// so that a UID referenced from many data sets of the job
/// (such as the series instance UID of every instance in a series)
/// is replaced by the same new UID everywhere.
/// A context belongs to one job: starting another job
/// with a fresh context yields unrelated UIDs.
///
/// The context is not synchronized.
/// Anonymizing the data sets of one job from several threads
/// requires an external lock around the context.
#[derive(Debug, Default, Clone)]
pub struct AnonymizationContext {
    uid_map: HashMap<String, String>,
    datasets: usize,
}

impl AnonymizationContext {
    /// Create a context for a new job.
    pub fn new() -> Self {
        Self::default()
    }

    /// The replacement of an original UID,
    /// generating one on first sight.
    ///
    /// Trailing padding is not part of the UID.
    /// An empty UID stays empty.
    pub fn map_uid(&mut self, uid: &str) -> String {
        let uid = uid.trim_end_matches(['\0', ' ']).trim_start();
        if uid.is_empty() {
            return String::new();
        }
        if let Some(mapped) = self.uid_map.get(uid) {
            return mapped.clone();
        }
        let mut mapped = generate_uid();
        while mapped == uid {
            mapped = generate_uid();
        }
        trace!("{} => {}", uid, mapped);
        self.uid_map.insert(uid.to_string(), mapped.clone());
        mapped
    }

    /// The replacement of an original UID, if it was already mapped.
    pub fn mapped_uid(&self, uid: &str) -> Option<&str> {
        self.uid_map
            .get(uid.trim_end_matches(['\0', ' ']).trim_start())
            .map(String::as_str)
    }

    /// All UID replacements made so far.
    pub fn uid_map(&self) -> &HashMap<String, String> {
        &self.uid_map
    }

    /// The number of data sets anonymized in this job.
    pub fn datasets_processed(&self) -> usize {
        self.datasets
    }

    pub(crate) fn count_dataset(&mut self) {
        self.datasets += 1;
    }

    /// Forget the data sets counted after the count was `count`.
    pub(crate) fn rewind_count(&mut self, count: usize) {
        self.datasets = self.datasets.min(count);
    }
}

/// Generate a new globally unique UID,
/// in the `2.25` arc derived from a random UUID.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_are_mapped_consistently() {
        let mut ctx = AnonymizationContext::new();
        let a = ctx.map_uid("1.2.3");
        let b = ctx.map_uid("1.2.3\0");
        let c = ctx.map_uid("1.2.4");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, "1.2.3");
        assert!(a.starts_with("2.25."));
        assert!(a.len() <= 64);
        assert_eq!(ctx.mapped_uid("1.2.3"), Some(a.as_str()));
        assert_eq!(ctx.uid_map().len(), 2);
        assert_eq!(ctx.map_uid("  "), "");
    }

    #[test]
    fn jobs_do_not_share_uids() {
        let mut first = AnonymizationContext::new();
        let mut second = AnonymizationContext::new();
        assert_ne!(first.map_uid("1.2.3"), second.map_uid("1.2.3"));
    }
}
