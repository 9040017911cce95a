//! Property-based tests for indices and composite cursors.

use std::collections::BTreeSet;
use proptest::prelude::*;
use dirsearch::core::config::PartitionConfig;
use dirsearch::core::partition::Partition;
use dirsearch::core::types::{Dn, Entry, EntryId};
use dirsearch::cursor::{collect_ids, Cursor};
use dirsearch::index::index::{Index, IndexChange};
use dirsearch::query::ast::Filter;
use dirsearch::query::types::{SearchRequest, SearchScope};
use dirsearch::schema::schema::Syntax;
use dirsearch::search::engine::SearchEngine;

// ============================================================================
// Strategies
// ============================================================================

fn change_strategy() -> impl Strategy<Value = (bool, u64, u64)> {
    (any::<bool>(), 0u64..8, 1u64..12)
}

#[derive(Debug, Clone)]
struct Person {
    department: u8,
    level: i64,
    has_mail: bool,
}

fn person_strategy() -> impl Strategy<Value = Person> {
    (0u8..4, 0i64..20, any::<bool>()).prop_map(|(department, level, has_mail)| Person {
        department,
        level,
        has_mail,
    })
}

fn leaf_strategy() -> impl Strategy<Value = Filter> {
    prop_oneof![
        (0u8..4).prop_map(|d| Filter::equality("departmentNumber", format!("d{}", d))),
        (0i64..20).prop_map(|l| Filter::greater_eq("level", l)),
        (0i64..20).prop_map(|l| Filter::less_eq("level", l)),
        Just(Filter::presence("mail")),
        (0u8..4).prop_map(|d| Filter::not(Filter::equality("departmentNumber", format!("d{}", d)))),
    ]
}

fn tree_strategy() -> impl Strategy<Value = Filter> {
    leaf_strategy().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Filter::and),
            prop::collection::vec(inner, 1..4).prop_map(Filter::or),
        ]
    })
}

fn partition(people: &[Person]) -> Partition {
    let config = PartitionConfig::new("o=prop")
        .with_index("departmentNumber")
        .with_index("level")
        .with_attribute_type("level", Syntax::Integer, true);
    let p = Partition::new(config).unwrap();
    p.add(Entry::new(Dn::parse("o=prop").unwrap())).unwrap();
    for (n, person) in people.iter().enumerate() {
        let mut entry = Entry::new(Dn::parse(&format!("cn=p{},o=prop", n)).unwrap())
            .with_attribute("departmentNumber", [format!("d{}", person.department)])
            .with_attribute("level", [person.level]);
        if person.has_mail {
            entry = entry.with_attribute("mail", [format!("p{}@prop", n)]);
        }
        p.add(entry).unwrap();
    }
    p
}

fn matching(p: &Partition, filter: &Filter) -> BTreeSet<EntryId> {
    let engine = SearchEngine::new(p);
    let evaluator = engine.evaluator(filter).unwrap();
    p.master_snapshot()
        .values()
        .filter(|entry| evaluator.evaluate_entry(entry).unwrap())
        .map(|entry| entry.id)
        .collect()
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// Every forward tuple has its reverse twin and the other way round.
    #[test]
    fn forward_and_reverse_stay_symmetric(changes in prop::collection::vec(change_strategy(), 0..60)) {
        let index: Index<u64> = Index::new("prop", true);
        let mut model = BTreeSet::new();
        for (add, key, id) in changes {
            let change = if add {
                model.insert((key, id));
                IndexChange::Add(key, EntryId(id))
            } else {
                model.remove(&(key, id));
                IndexChange::Drop(key, EntryId(id))
            };
            index.apply(&[change]).unwrap();
        }

        prop_assert_eq!(index.count(), model.len() as u64);
        for key in 0u64..8 {
            for id in index.forward(&key).iter() {
                prop_assert!(index.reverse_values(EntryId(id)).contains(&key));
            }
        }
        for id in 1u64..12 {
            for key in index.reverse_values(EntryId(id)) {
                prop_assert!(index.has(&key, EntryId(id)));
                prop_assert!(model.contains(&(key, id)));
            }
        }

        let mut forward = BTreeSet::new();
        let mut cursor = index.forward_cursor();
        while cursor.next().unwrap() {
            let element = cursor.get().unwrap();
            forward.insert((element.key, element.id.0));
        }
        let mut reverse = BTreeSet::new();
        let mut cursor = index.reverse_cursor();
        while cursor.next().unwrap() {
            let element = cursor.get().unwrap();
            reverse.insert((element.key, element.id.0));
        }
        prop_assert_eq!(&forward, &model);
        prop_assert_eq!(&reverse, &model);
    }

    /// An AND cursor returns exactly the entries its filter accepts,
    /// whichever child ends up driving.
    #[test]
    fn and_cursor_matches_evaluation(
        people in prop::collection::vec(person_strategy(), 1..25),
        leaves in prop::collection::vec(leaf_strategy(), 1..4),
    ) {
        let p = partition(&people);
        let engine = SearchEngine::new(&p);
        let mut filter = Filter::and(leaves).normalized(p.schema()).unwrap();
        engine.annotate(&mut filter);

        let mut cursor = engine.build(&filter).unwrap();
        let ids = collect_ids(&mut cursor).unwrap();
        let found: BTreeSet<_> = ids.iter().copied().collect();
        prop_assert_eq!(found.len(), ids.len());
        prop_assert_eq!(found, matching(&p, &filter));
    }

    /// OR never repeats an entry and misses none.
    #[test]
    fn or_cursor_matches_evaluation(
        people in prop::collection::vec(person_strategy(), 1..25),
        leaves in prop::collection::vec(leaf_strategy(), 1..4),
    ) {
        let p = partition(&people);
        let engine = SearchEngine::new(&p);
        let mut filter = Filter::or(leaves).normalized(p.schema()).unwrap();
        engine.annotate(&mut filter);

        let mut cursor = engine.build(&filter).unwrap();
        let ids = collect_ids(&mut cursor).unwrap();
        let found: BTreeSet<_> = ids.iter().copied().collect();
        prop_assert_eq!(found.len(), ids.len());
        prop_assert_eq!(found, matching(&p, &filter));
    }

    /// A search walks its freshly built cursor straight through and finds
    /// exactly what the evaluator accepts, whatever leaf ends up driving.
    #[test]
    fn search_matches_evaluation(
        people in prop::collection::vec(person_strategy(), 1..25),
        filter in tree_strategy(),
    ) {
        let p = partition(&people);
        let engine = SearchEngine::new(&p);
        let request = SearchRequest::new(Dn::parse("o=prop").unwrap(), SearchScope::Subtree, filter.clone());

        let mut found = Vec::new();
        for entry in engine.search(&request).unwrap() {
            found.push(entry.unwrap().id);
        }
        let unique: BTreeSet<_> = found.iter().copied().collect();
        prop_assert_eq!(unique.len(), found.len());
        let expected = matching(&p, &filter.normalized(p.schema()).unwrap());
        prop_assert_eq!(unique, expected);
    }
}
