/// dirsearch walkthrough
///
/// Builds a small partition, adds people and an alias, then runs parsed
/// filters through the search engine.

use dirsearch::core::config::PartitionConfig;
use dirsearch::core::partition::Partition;
use dirsearch::core::types::{AttributeId, Dn, Entry, Modification};
use dirsearch::query::parser::parse_filter;
use dirsearch::query::types::{AliasDerefMode, SearchRequest, SearchScope};
use dirsearch::schema::schema::Syntax;
use dirsearch::search::engine::SearchEngine;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        dirsearch - Simple Search Demo         ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    println!("Step 1: creating partition o=example...");
    let config = PartitionConfig::new("o=example")
        .with_index("cn")
        .with_index("uidNumber")
        .with_attribute_type("uidNumber", Syntax::Integer, true);
    let partition = Partition::new(config)?;
    partition.add(Entry::new(Dn::parse("o=example")?))?;
    partition.add(Entry::new(Dn::parse("ou=people,o=example")?))?;
    partition.add(Entry::new(Dn::parse("ou=staff,o=example")?))?;

    println!("Step 2: adding entries...");
    for (n, (name, mail)) in [("alice", true), ("bob", false), ("carol", true), ("dave", false)]
        .into_iter()
        .enumerate()
    {
        let mut entry = Entry::new(Dn::parse(&format!("cn={},ou=people,o=example", name))?)
            .with_attribute("objectClass", ["person"])
            .with_attribute("uidNumber", [1000 + n as i64]);
        if mail {
            entry = entry.with_attribute("mail", [format!("{}@example.org", name)]);
        }
        let id = partition.add(entry)?;
        println!("  added {} as {}", name, id);
    }
    partition.add(
        Entry::new(Dn::parse("cn=lead,ou=staff,o=example")?)
            .with_attribute("objectClass", ["alias", "extensibleObject"])
            .with_attribute("aliasedObjectName", ["cn=carol,ou=people,o=example"]),
    )?;
    println!("Done!\n");

    println!("Step 3: searching...");
    let engine = SearchEngine::new(&partition);
    let base = Dn::parse("o=example")?;
    for source in [
        "(uidNumber>=1002)",
        "(&(objectClass=person)(mail=*))",
        "(|(cn=al*)(uidNumber<=1001))",
        "(!(cn=bob))",
    ] {
        let request = SearchRequest::new(base.clone(), SearchScope::Subtree, parse_filter(source)?);
        println!("  {}", source);
        for entry in engine.search(&request)? {
            println!("    {}", entry?.dn);
        }
    }

    println!("\nStep 4: following the alias under ou=staff...");
    let request = SearchRequest::new(
        Dn::parse("ou=staff,o=example")?,
        SearchScope::OneLevel,
        parse_filter("(objectClass=*)")?,
    )
    .with_deref(AliasDerefMode::Always);
    for entry in engine.search(&request)? {
        println!("    {}", entry?.dn);
    }

    println!("\nStep 5: modifying bob and searching with a size limit...");
    let bob = partition
        .entry_id(&Dn::parse("cn=bob,ou=people,o=example")?)
        .ok_or("bob is missing")?;
    partition.modify(bob, &[Modification::add("mail", ["bob@example.org"])])?;
    let request = SearchRequest::new(base, SearchScope::Subtree, parse_filter("(mail=*)")?).with_size_limit(2);
    let mut results = engine.search(&request)?;
    for entry in results.by_ref() {
        let entry = entry?;
        let mail = entry
            .get(&AttributeId::new("mail"))
            .and_then(|values| values.first())
            .map(|value| value.to_string())
            .unwrap_or_default();
        println!("    {} <{}>", entry.dn, mail);
    }
    println!("  size limit reached: {}", results.limit_reached());

    println!("\nStep 6: statistics");
    println!("{}", partition.stats().to_json()?);

    Ok(())
}
