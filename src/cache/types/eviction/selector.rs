//! Eviction candidate selection
//!
//! Two phases. `classify` loads every source and sorts it into one of three
//! outcomes: protected (too young), deleted on the spot (eligible and due), or
//! expired-but-spared (eligible, not yet due). `clean` then trims the spared and,
//! under severe pressure, half of the protected items against a size budget,
//! oldest first.

use super::candidate::{Cleanable, ItemLoader};

/// Outcome of classifying a batch of sources
#[derive(Debug)]
pub struct Partition<I> {
    /// Eligible for eviction but not yet due
    pub expired: Vec<I>,
    /// Younger than the expiration time
    pub protected: Vec<I>,
    /// Items deleted during classification because they were due
    pub deleted_items: usize,
    pub deleted_size: u64,
    /// Sources that failed to load and were discarded
    pub discarded: usize,
}

impl<I> Default for Partition<I> {
    fn default() -> Self {
        Self {
            expired: Vec::new(),
            protected: Vec::new(),
            deleted_items: 0,
            deleted_size: 0,
            discarded: 0,
        }
    }
}

impl<I> Partition<I> {
    /// Append another partition, keeping this one's items first
    pub fn merge(mut self, other: Partition<I>) -> Self {
        self.expired.extend(other.expired);
        self.protected.extend(other.protected);
        self.deleted_items += other.deleted_items;
        self.deleted_size += other.deleted_size;
        self.discarded += other.discarded;
        self
    }
}

/// Summary of one cleaning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub deleted_items: usize,
    pub deleted_size: u64,
    pub discarded: usize,
    /// Size of the surviving expired and protected items
    pub remaining_size: u64,
}

impl EvictionReport {
    fn absorb<I>(&mut self, partition: &Partition<I>) {
        self.deleted_items += partition.deleted_items;
        self.deleted_size += partition.deleted_size;
        self.discarded += partition.discarded;
    }
}

/// Load every source and partition the resulting items
///
/// Sources are visited in the given order, which is also the order the protected
/// list keeps.
pub fn classify<S, L>(loader: &L, sources: impl IntoIterator<Item = S>) -> Partition<L::Item>
where
    L: ItemLoader<S>,
{
    let mut partition = Partition::default();
    for source in sources {
        let item = match loader.load(&source) {
            Ok(item) => item,
            Err(e) => {
                log::debug!("discarding unloadable cache item: {}", e);
                loader.discard(&source);
                partition.discarded += 1;
                continue;
            }
        };

        if !item.can_delete() {
            partition.protected.push(item);
        } else if item.should_delete() {
            partition.deleted_size += item.size();
            partition.deleted_items += 1;
            item.delete();
        } else {
            partition.expired.push(item);
        }
    }
    partition
}

fn total_size<I: Cleanable>(items: &[I]) -> u64 {
    items.iter().map(Cleanable::size).sum()
}

/// Delete oldest-first until at least `size_to_delete` has been freed
fn clean_list<I: Cleanable>(items: &mut [I], size_to_delete: u64) -> (usize, u64) {
    // stable: equal ages keep their input order
    items.sort_by(|first, second| second.age().cmp(&first.age()));

    let mut deleted_items = 0;
    let mut deleted_size = 0u64;
    for item in items.iter() {
        if deleted_size >= size_to_delete {
            break;
        }
        deleted_size += item.size();
        deleted_items += 1;
        item.delete();
    }
    (deleted_items, deleted_size)
}

/// Trim expired and protected items to fit `max_size`
///
/// A negative `max_size` means no budget. The protected list is only touched when
/// it alone exceeds the budget, and then only its first half (in source order) is
/// considered, with a target of half the overshoot.
pub fn clean<I: Cleanable>(mut expired: Vec<I>, mut protected: Vec<I>, max_size: i64) -> EvictionReport {
    let expired_size = total_size(&expired);
    let protected_size = total_size(&protected);
    let size = expired_size + protected_size;

    let mut report = EvictionReport {
        remaining_size: size,
        ..EvictionReport::default()
    };

    let Ok(max_size) = u64::try_from(max_size) else {
        return report;
    };
    if size <= max_size {
        return report;
    }

    let (items, freed) = clean_list(&mut expired, size - max_size);
    report.deleted_items += items;
    report.deleted_size += freed;

    if protected_size > max_size {
        let half = protected.len() / 2;
        let (items, freed) = clean_list(&mut protected[..half], (protected_size - max_size) / 2);
        report.deleted_items += items;
        report.deleted_size += freed;
    }

    report.remaining_size = size.saturating_sub(report.deleted_size);
    report
}

/// Classify `sources` and trim the survivors against `max_size`
pub fn clean_sources<S, L>(
    loader: &L,
    sources: impl IntoIterator<Item = S>,
    max_size: i64,
) -> EvictionReport
where
    L: ItemLoader<S>,
{
    clean_partition(classify(loader, sources), max_size)
}

/// Trim an already classified partition
pub fn clean_partition<I: Cleanable>(partition: Partition<I>, max_size: i64) -> EvictionReport {
    let mut report = EvictionReport::default();
    report.absorb(&partition);
    let trimmed = clean(partition.expired, partition.protected, max_size);
    report.deleted_items += trimmed.deleted_items;
    report.deleted_size += trimmed.deleted_size;
    report.remaining_size = trimmed.remaining_size;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::traits::CacheOperationError;
    use std::cell::RefCell;

    #[derive(Debug)]
    struct TestItem<'a> {
        name: &'static str,
        age: i64,
        size: u64,
        can: bool,
        should: bool,
        log: &'a RefCell<Vec<&'static str>>,
    }

    impl Cleanable for TestItem<'_> {
        fn age(&self) -> i64 {
            self.age
        }
        fn size(&self) -> u64 {
            self.size
        }
        fn can_delete(&self) -> bool {
            self.can
        }
        fn should_delete(&self) -> bool {
            self.should
        }
        fn delete(&self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    fn item<'a>(
        log: &'a RefCell<Vec<&'static str>>,
        name: &'static str,
        age: i64,
        size: u64,
    ) -> TestItem<'a> {
        TestItem {
            name,
            age,
            size,
            can: true,
            should: false,
            log,
        }
    }

    struct Loader<'a> {
        log: &'a RefCell<Vec<&'static str>>,
        discarded: RefCell<Vec<&'static str>>,
    }

    impl<'a> ItemLoader<(&'static str, i64, bool, bool)> for Loader<'a> {
        type Item = TestItem<'a>;

        fn load(
            &self,
            source: &(&'static str, i64, bool, bool),
        ) -> Result<Self::Item, CacheOperationError> {
            let (name, age, can, should) = *source;
            if age == i64::MIN {
                return Err(CacheOperationError::corrupted(name));
            }
            Ok(TestItem {
                name,
                age,
                size: 10,
                can,
                should,
                log: self.log,
            })
        }

        fn discard(&self, source: &(&'static str, i64, bool, bool)) {
            self.discarded.borrow_mut().push(source.0);
        }
    }

    #[test]
    fn test_classify_partitions_items() {
        let log = RefCell::new(Vec::new());
        let loader = Loader {
            log: &log,
            discarded: RefCell::new(Vec::new()),
        };
        let partition = classify(
            &loader,
            vec![
                ("young", 1, false, true),
                ("due", 100, true, true),
                ("spared", 50, true, false),
                ("broken", i64::MIN, true, true),
            ],
        );

        assert_eq!(partition.protected.len(), 1);
        assert_eq!(partition.protected[0].name, "young");
        assert_eq!(partition.expired.len(), 1);
        assert_eq!(partition.expired[0].name, "spared");
        assert_eq!(partition.deleted_items, 1);
        assert_eq!(*log.borrow(), vec!["due"]);
        assert_eq!(partition.discarded, 1);
        assert_eq!(*loader.discarded.borrow(), vec!["broken"]);
    }

    #[test]
    fn test_negative_budget_deletes_nothing() {
        let log = RefCell::new(Vec::new());
        let report = clean(
            vec![item(&log, "a", 10, 1000), item(&log, "b", 20, 1000)],
            Vec::new(),
            -1,
        );
        assert!(log.borrow().is_empty());
        assert_eq!(report.deleted_items, 0);
        assert_eq!(report.remaining_size, 2000);
    }

    #[test]
    fn test_within_budget_deletes_nothing() {
        let log = RefCell::new(Vec::new());
        clean(vec![item(&log, "a", 10, 40)], vec![item(&log, "b", 1, 60)], 100);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_oldest_of_two_is_deleted_to_fit_budget() {
        let log = RefCell::new(Vec::new());
        let report = clean(
            vec![item(&log, "newer", 10, 60), item(&log, "older", 20, 60)],
            Vec::new(),
            100,
        );
        assert_eq!(*log.borrow(), vec!["older"]);
        assert_eq!(report.deleted_size, 60);
        assert_eq!(report.remaining_size, 60);
    }

    #[test]
    fn test_deletes_just_enough_oldest_first() {
        let log = RefCell::new(Vec::new());
        let expired = vec![
            item(&log, "a", 30, 10),
            item(&log, "b", 50, 10),
            item(&log, "c", 40, 10),
            item(&log, "d", 10, 10),
        ];
        // 40 total + 20 protected against a budget of 45: free 15, i.e. two items
        let protected = vec![item(&log, "p", 1, 20)];
        let report = clean(expired, protected, 45);
        assert_eq!(*log.borrow(), vec!["b", "c"]);
        assert_eq!(report.remaining_size, 40);
    }

    #[test]
    fn test_equal_ages_keep_input_order() {
        let log = RefCell::new(Vec::new());
        clean(
            vec![
                item(&log, "first", 10, 10),
                item(&log, "second", 10, 10),
                item(&log, "third", 10, 10),
            ],
            Vec::new(),
            15,
        );
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_protected_pressure_only_touches_first_half() {
        let log = RefCell::new(Vec::new());
        let protected = vec![
            item(&log, "p0", 1, 50),
            item(&log, "p1", 5, 50),
            item(&log, "p2", 100, 50),
            item(&log, "p3", 200, 50),
        ];
        // protected 200 vs budget 100: expired list is empty, half list gets target 50
        let report = clean(Vec::new(), protected, 100);
        assert_eq!(*log.borrow(), vec!["p1"]);
        assert_eq!(report.deleted_items, 1);
        assert_eq!(report.remaining_size, 150);
    }

    #[test]
    fn test_exhausted_pool_leaves_cache_over_budget() {
        let log = RefCell::new(Vec::new());
        let report = clean(vec![item(&log, "only", 10, 30)], vec![item(&log, "p", 1, 90)], 50);
        assert_eq!(*log.borrow(), vec!["only"]);
        assert_eq!(report.remaining_size, 90);
    }

    #[test]
    fn test_clean_sources_reports_both_phases() {
        let log = RefCell::new(Vec::new());
        let loader = Loader {
            log: &log,
            discarded: RefCell::new(Vec::new()),
        };
        let report = clean_sources(
            &loader,
            vec![
                ("due", 100, true, true),
                ("old", 80, true, false),
                ("new", 60, true, false),
            ],
            10,
        );
        assert_eq!(*log.borrow(), vec!["due", "old"]);
        assert_eq!(report.deleted_items, 2);
        assert_eq!(report.deleted_size, 20);
        assert_eq!(report.remaining_size, 10);
    }
}
