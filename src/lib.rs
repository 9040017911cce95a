pub mod core;
pub mod cursor;
pub mod schema;
pub mod index;
pub mod query;
pub mod search;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              DIRSEARCH STRUCT ARCHITECTURE                                   │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────── CORE LAYER ─────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                               struct Partition                                      │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ config: PartitionConfig           // Suffix, indexed attributes, validation  │ │    │
│  │  │ schema: Arc<dyn Schema>           // Normalization and matching rules        │ │    │
│  │  │ master: RwLock<Arc<MasterTable>>  // id -> Entry, copy-on-write              │ │    │
│  │  │ system: SystemIndices             // ndn, one/sub level, alias indices       │ │    │
│  │  │ presence: Index<AttributeId>      // attribute -> ids holding it             │ │    │
│  │  │ user: RwLock<HashMap<..>>         // attribute -> Index<Value>               │ │    │
│  │  │ writer: Mutex<()>                 // Single writer                           │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────┐  ┌──────────────────┐  ┌───────────────────────────────────────┐    │
│  │ struct Entry     │  │ enum Value       │  │ struct WriteTransaction               │    │
│  │ • id: EntryId    │  │ • Integer(i64)   │  │ • undo log of applied index changes   │    │
│  │ • dn: Dn         │  │ • Text(String)   │  │ • rolls back on error or drop         │    │
│  │ • attributes     │  │ • Binary(Vec<u8>)│  └───────────────────────────────────────┘    │
│  └──────────────────┘  └──────────────────┘                                                │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────── INDEX LAYER ────────────────────────────────────────┐
│                                                                                              │
│  Index<K> ──holds──> RwLock<Arc<IndexTables<K>>>                                            │
│                        ├── forward: BTreeMap<K, BTreeSet<EntryId>>                          │
│                        └── reverse: BTreeMap<EntryId, BTreeSet<K>>                          │
│                                                                                              │
│  IndexCursor<K> ──walks──> one IndexTables snapshot, (key, id) or (id, key) order           │
│                                                                                              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────── QUERY LAYER ────────────────────────────────────────┐
│                                                                                              │
│  "(&(cn=a*)(uid>=5))" ──parse_filter──> Filter ──normalized──> Filter                       │
│                                            │                                                 │
│                                            ├──QueryValidator──> depth / fan-out checks      │
│                                            └──Optimizer::annotate──> per-node scan counts   │
│                                                                                              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────── SEARCH LAYER ───────────────────────────────────────┐
│                                                                                              │
│  SearchEngine::search(SearchRequest)                                                         │
│     │                                                                                        │
│     ├──resolves──> base EntryId (optionally through an alias)                               │
│     ├──wraps──> And(Scope, filter) ──annotate──> build                                      │
│     │                                              │                                         │
│     │     Scope ──> ScopeCursor / SingletonCursor  │                                         │
│     │     Equality, Presence ──> KeyCursor         │                                         │
│     │     >=, <= ──> RangeCursor (Indexed | FullScan)                                        │
│     │     Substring ──> SubstringCursor            │                                         │
│     │     Extensible, unindexed ──> FilteredCursor │                                         │
│     │     And ──> AndCursor (cheapest child drives, Evaluators check the rest)               │
│     │     Or ──> OrCursor (children in turn, earlier children suppress duplicates)          │
│     │     Not ──> NotCursor (negated full scan)                                              │
│     │                                                                                        │
│     └──returns──> SearchResults (re-fetches entries, size limit, Iterator)                  │
│                                                                                              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
