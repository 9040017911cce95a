use regex::Regex;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::partition::Partition;
use crate::core::types::{EntryId, Value};
use crate::cursor::{check_open, Cursor};
use crate::index::cursor::IndexCursor;
use crate::index::entry::IndexEntry;
use crate::query::ast::{Filter, SubstringFilter};
use crate::search::evaluator::{substring_pattern, Evaluator};
use crate::search::filtered::FilteredCursor;
use crate::search::ordering::Backing;
use crate::search::SearchKey;

/// Cursor for `attr=init*any*final`.
///
/// An indexed attribute is walked in value order, narrowed to the keys
/// starting with the initial part when there is one; each entry is reported
/// under its first matching value. Without an index the master table is
/// scanned in id order and only id seeks are accepted.
pub struct SubstringCursor<'a> {
    backing: Backing<'a>,
    pattern: Regex,
    prefix: Option<Value>,
    closed: bool,
}

impl<'a> SubstringCursor<'a> {
    pub fn new(partition: &'a Partition, filter: &SubstringFilter) -> Result<Self> {
        let pattern = substring_pattern(filter)?;
        let backing = match partition.find_user_index(&filter.attribute) {
            Some(index) => Backing::Indexed(index.forward_cursor()),
            None => {
                let evaluator = Evaluator::new(partition, &Filter::Substring(filter.clone()))?;
                Backing::FullScan(FilteredCursor::new(partition.master_cursor(), evaluator))
            }
        };

        // only a textual initial part maps onto a contiguous key range
        let prefix = filter.initial.as_ref().and_then(|initial| {
            match partition.schema().normalize(&filter.attribute, &Value::Text(initial.clone())) {
                Ok(Value::Text(text)) => Some(Value::Text(text)),
                _ => None,
            }
        });

        let mut cursor = SubstringCursor {
            backing,
            pattern,
            prefix,
            closed: false,
        };
        cursor.before_first()?;
        Ok(cursor)
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.backing, Backing::Indexed(_))
    }

    fn within(&self, key: &Value) -> bool {
        self.prefix.as_ref().is_none_or(|prefix| has_prefix(prefix, key))
    }

    fn below(&self, key: &Value) -> bool {
        self.prefix.as_ref().is_some_and(|prefix| key < prefix)
    }

    /// Before the first key carrying the prefix.
    fn start(cursor: &mut IndexCursor<Value>, prefix: Option<&Value>) -> Result<()> {
        match prefix {
            Some(prefix) => cursor.before_value(None, prefix),
            None => cursor.before_first(),
        }
    }

    /// After the last key carrying the prefix.
    fn end(cursor: &mut IndexCursor<Value>, prefix: Option<&Value>) -> Result<()> {
        let Some(prefix) = prefix else {
            return cursor.after_last();
        };
        let last = cursor
            .tables()
            .forward
            .range(prefix..)
            .take_while(|(key, _)| has_prefix(prefix, key))
            .last()
            .map(|(key, _)| key.clone());
        match last {
            Some(key) => cursor.after_value(None, &key),
            None => cursor.before_value(None, prefix),
        }
    }

    /// True when `key` is the first matching value of `id`.
    fn canonical(cursor: &IndexCursor<Value>, pattern: &Regex, key: &Value, id: EntryId) -> bool {
        cursor
            .tables()
            .reverse
            .get(&id)
            .and_then(|keys| keys.iter().find(|k| pattern.is_match(&k.to_string())))
            .is_some_and(|first| first == key)
    }

    fn step(&mut self, forward: bool) -> Result<bool> {
        let Backing::Indexed(cursor) = &mut self.backing else {
            return Err(Error::unsupported("step() on a full scan"));
        };
        let prefix = self.prefix.as_ref();
        loop {
            let moved = if forward { cursor.next()? } else { cursor.previous()? };
            if !moved {
                return Ok(false);
            }
            let element = cursor.get()?;
            if !prefix.is_none_or(|prefix| has_prefix(prefix, &element.key)) {
                // outside on the near side: the prefix range lies ahead
                let below = prefix.is_some_and(|prefix| element.key < *prefix);
                if below == forward {
                    if forward {
                        Self::start(cursor, prefix)?;
                    } else {
                        Self::end(cursor, prefix)?;
                    }
                    continue;
                }
                if forward {
                    Self::end(cursor, prefix)?;
                } else {
                    Self::start(cursor, prefix)?;
                }
                return Ok(false);
            }
            if self.pattern.is_match(&element.key.to_string())
                && Self::canonical(cursor, &self.pattern, &element.key, element.id)
            {
                return Ok(true);
            }
        }
    }

    /// Seeks an indexed cursor, clamping to the prefix range.
    fn seek(&mut self, key: &SearchKey, id: Option<EntryId>, before: bool) -> Result<()> {
        let key = key.clone().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                "substring cursor needs a value to seek to".to_string(),
            )
        })?;
        let below = self.below(&key);
        let above = !below && !self.within(&key);
        let Backing::Indexed(cursor) = &mut self.backing else {
            return Ok(());
        };
        let prefix = self.prefix.as_ref();
        if below {
            Self::start(cursor, prefix)
        } else if above {
            Self::end(cursor, prefix)
        } else if before {
            cursor.before_value(id, &key)
        } else {
            cursor.after_value(id, &key)
        }
    }
}

fn has_prefix(prefix: &Value, key: &Value) -> bool {
    matches!((prefix, key), (Value::Text(p), Value::Text(k)) if k.starts_with(p.as_str()))
}

impl Cursor for SubstringCursor<'_> {
    type Key = SearchKey;

    fn before(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "before()")?;
        match self.backing {
            Backing::FullScan(ref mut scan) => scan.before(element),
            Backing::Indexed(_) => self.seek(&element.key, Some(element.id), true),
        }
    }

    fn after(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "after()")?;
        match self.backing {
            Backing::FullScan(ref mut scan) => scan.after(element),
            Backing::Indexed(_) => self.seek(&element.key, Some(element.id), false),
        }
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        match self.backing {
            Backing::FullScan(ref mut scan) => scan.before_value(id, key),
            Backing::Indexed(_) => self.seek(key, id, true),
        }
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        match self.backing {
            Backing::FullScan(ref mut scan) => scan.after_value(id, key),
            Backing::Indexed(_) => self.seek(key, id, false),
        }
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        match &mut self.backing {
            Backing::Indexed(cursor) => Self::start(cursor, self.prefix.as_ref()),
            Backing::FullScan(scan) => scan.before_first(),
        }
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        match &mut self.backing {
            Backing::Indexed(cursor) => Self::end(cursor, self.prefix.as_ref()),
            Backing::FullScan(scan) => scan.after_last(),
        }
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        match self.backing {
            Backing::Indexed(_) => self.step(true),
            Backing::FullScan(ref mut scan) => scan.next(),
        }
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        match self.backing {
            Backing::Indexed(_) => self.step(false),
            Backing::FullScan(ref mut scan) => scan.previous(),
        }
    }

    fn get(&self) -> Result<IndexEntry<SearchKey>> {
        check_open(self.closed, "get()")?;
        match &self.backing {
            Backing::Indexed(cursor) => Ok(cursor.get()?.map_key(Some)),
            Backing::FullScan(scan) => scan.get(),
        }
    }

    fn available(&self) -> bool {
        !self.closed
            && match &self.backing {
                Backing::Indexed(cursor) => cursor.available(),
                Backing::FullScan(scan) => scan.available(),
            }
    }

    fn close(&mut self) {
        match &mut self.backing {
            Backing::Indexed(cursor) => cursor.close(),
            Backing::FullScan(scan) => scan.close(),
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PartitionConfig;
    use crate::core::types::{Dn, Entry};
    use crate::cursor::{collect_ids, collect_ids_reverse};

    fn partition(indexed: bool) -> (Partition, Vec<EntryId>) {
        let mut config = PartitionConfig::new("o=test");
        if indexed {
            config = config.with_index("sn");
        }
        let p = Partition::new(config).unwrap();
        p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        let ids = [("u1", vec!["Smith"]), ("u2", vec!["Smythe", "Smithers"]), ("u3", vec!["Jones"]), ("u4", vec!["Smallwood"])]
            .into_iter()
            .map(|(cn, sn)| {
                p.add(Entry::new(Dn::parse(&format!("cn={},o=test", cn)).unwrap()).with_attribute("sn", sn))
                    .unwrap()
            })
            .collect();
        (p, ids)
    }

    fn cursor<'a>(p: &'a Partition, filter: Filter) -> SubstringCursor<'a> {
        let Filter::Substring(s) = filter.normalized(p.schema()).unwrap() else {
            unreachable!()
        };
        SubstringCursor::new(p, &s).unwrap()
    }

    #[test]
    fn prefix_range_on_index() {
        let (p, ids) = partition(true);
        let mut c = cursor(&p, Filter::substring("sn", Some("SMI"), &[], None));
        assert!(c.is_indexed());
        // value order: smith, smithers; u2 is reported once under smithers
        assert_eq!(collect_ids(&mut c).unwrap(), vec![ids[0], ids[1]]);
        assert_eq!(collect_ids_reverse(&mut c).unwrap(), vec![ids[1], ids[0]]);
    }

    #[test]
    fn fresh_cursor_yields_matches() {
        let (p, ids) = partition(true);
        let mut c = cursor(&p, Filter::substring("sn", Some("sm"), &[], None));
        let mut found = Vec::new();
        while c.next().unwrap() {
            found.push(c.get().unwrap().id);
        }
        assert_eq!(found, vec![ids[3], ids[0], ids[1]]);

        let mut c = cursor(&p, Filter::substring("sn", None, &[], Some("es")));
        assert!(c.next().unwrap());
        assert_eq!(c.get().unwrap().id, ids[2]);
    }

    #[test]
    fn any_and_final_parts_scan_the_index() {
        let (p, ids) = partition(true);
        let mut c = cursor(&p, Filter::substring("sn", None, &["m"], Some("e")));
        assert_eq!(collect_ids(&mut c).unwrap(), vec![ids[1]]);

        let mut c = cursor(&p, Filter::substring("sn", Some("sm"), &[], Some("s")));
        assert_eq!(collect_ids(&mut c).unwrap(), vec![ids[1]]);
    }

    #[test]
    fn seeks_clamp_to_prefix() {
        let (p, ids) = partition(true);
        let mut c = cursor(&p, Filter::substring("sn", Some("sm"), &[], None));
        c.before_value(None, &Some(Value::from("a"))).unwrap();
        assert!(c.next().unwrap());
        assert_eq!(c.get().unwrap().id, ids[3]);

        c.after_value(None, &Some(Value::from("zzz"))).unwrap();
        assert!(!c.next().unwrap());
        assert!(c.previous().unwrap());
        assert_eq!(c.get().unwrap().id, ids[1]);
    }

    #[test]
    fn full_scan_without_index() {
        let (p, ids) = partition(false);
        let mut c = cursor(&p, Filter::substring("sn", Some("sm"), &[], None));
        assert!(!c.is_indexed());
        assert_eq!(collect_ids(&mut c).unwrap(), vec![ids[0], ids[1], ids[3]]);
    }
}
