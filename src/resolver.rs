//! C7: the symbol resolver (spec §4.7), grounded on
//! `original_source/linkers/rld-resolver.cpp`'s depth-first
//! `resolve_symbols`, extended with the weak-symbol and base-precedence
//! tie-breaks spec §4.7 spells out (the original resolver predates the
//! weak-symbol table split; this crate's symbol model already carries it,
//! so the tie-break logic lives here).

use crate::cache::Cache;
use crate::elf::Binding;
use crate::error::{Error, Result};
use crate::object_file::ObjectId;
use crate::symbols::{BaseSymbols, SymbolRef, Table, UnresolvedTable};
use std::collections::BTreeSet;

/// The ordered, deduplicated dependent-object list the resolver produces.
#[derive(Debug, Default)]
pub struct Dependents {
    order: Vec<ObjectId>,
    seen: BTreeSet<ObjectId>,
}

impl Dependents {
    fn push(&mut self, id: ObjectId) {
        if self.seen.insert(id) {
            self.order.push(id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.order.iter().copied()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Resolves symbols starting from `undefined_seeds`, then from every
/// explicitly-specified (non-archive) object in the cache, producing the
/// dependent set (spec §4.7 "resolve"). Archive members are never roots:
/// they enter `dependents` only by being pulled in through a reference,
/// matching the classic "explicit objects always link, library members
/// link on demand" rule spec §4.5/§4.7 describe.
pub fn resolve(
    cache: &Cache,
    base: &BaseSymbols,
    cache_syms: &Table,
    undefined_seeds: &UnresolvedTable,
    seed_owner_name: &str,
) -> Result<Dependents> {
    let mut dependents = Dependents::default();

    // The forced seeds (entry point + user-defined externs) have no
    // "owner object" of their own; resolve them first under a synthetic
    // name, matching the original's `"undefines"` pass.
    resolve_symbols(
        &mut dependents,
        cache,
        base,
        cache_syms,
        undefined_seeds,
        seed_owner_name,
        None,
    )?;

    for id in cache.object_ids() {
        let object = cache.object(id);
        if object.archive_name.is_some() {
            continue;
        }
        dependents.push(id);
        resolve_symbols(
            &mut dependents,
            cache,
            base,
            cache_syms,
            &object.unresolved_symbols,
            object.basename(),
            Some(id),
        )?;
    }

    Ok(dependents)
}

/// The re-entrant recursion core (spec §4.7 `resolve_symbols`). Newly
/// pulled objects are folded into `dependents` as soon as the reference
/// that pulls them in is seen (pre-order), then recursed into once the
/// current object's own pass completes -- so a dependent always appears
/// after the object that needed it but before anything only that
/// dependent needs, which is the ordering spec §5 calls for.
fn resolve_symbols(
    dependents: &mut Dependents,
    cache: &Cache,
    base: &BaseSymbols,
    cache_syms: &Table,
    urs_table: &UnresolvedTable,
    owner_name: &str,
    owner: Option<ObjectId>,
) -> Result<()> {
    if let Some(owner_id) = owner {
        let owner_obj = cache.object(owner_id);
        // Cycle break / re-entrancy guard (spec §4.7).
        if owner_obj.is_resolved() || owner_obj.is_resolving() {
            return Ok(());
        }
        owner_obj.mark_resolving();
    }

    let mut newly_pulled = Vec::new();

    for (name, bucket_index) in urs_table.iter() {
        let urs_symbol = owner.map(|id| cache.object(id).symbol(*bucket_index));

        // Another pass may already have bound this (non-weak) reference;
        // skip it the way the original's loop guard does.
        if let Some(sym) = urs_symbol {
            if sym.binding != Binding::Weak && sym.owning_object.get().is_some() {
                continue;
            }
        }

        if let Some(base_sym) = base.get(name) {
            // Base-image definition always wins (spec §4.7 tie-break);
            // the object holding it (there is none) is never added.
            base_sym.references.set(base_sym.references.get() + 1);
            continue;
        }

        let found = cache_syms
            .find_global(name)
            .or_else(|| cache_syms.find_weak(name));

        match found {
            Some(symref) => {
                let defining_object = cache.object(symref.object);
                defining_object.symbol(symref.index).referenced();
                if let Some(urs) = urs_symbol {
                    urs.owning_object.set(Some(symref.object));
                }
                if !defining_object.is_resolved()
                    && !defining_object.is_resolving()
                    && !dependents.contains(symref.object)
                    && !newly_pulled.contains(&symref.object)
                {
                    dependents.push(symref.object);
                    newly_pulled.push(symref.object);
                }
            }
            None => {
                if let Some(sym) = urs_symbol {
                    if sym.binding == Binding::Weak {
                        // Weak-undefined leniency (spec §4.7 / testable
                        // property 8): never pulls anything in, never fails.
                        continue;
                    }
                }
                return Err(Error::UnresolvedSymbol {
                    symbol: name.clone(),
                    owner: owner_name.to_string(),
                    location: "resolving",
                });
            }
        }
    }

    if let Some(owner_id) = owner {
        cache.object(owner_id).mark_resolved();
    }

    for id in newly_pulled {
        let object = cache.object(id);
        resolve_symbols(
            dependents,
            cache,
            base,
            cache_syms,
            &object.unresolved_symbols,
            object.basename(),
            Some(id),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_archive;
    use crate::object_file::tests::build_test_object;
    use std::io::Write;

    fn setup_cache(dir: &std::path::Path) -> Cache {
        let a_bytes = build_test_object("main", Some("foo"));
        let a_path = dir.join("a.o");
        std::fs::File::create(&a_path).unwrap().write_all(&a_bytes).unwrap();

        let foo_bytes = build_test_object("foo", Some("baz"));
        let baz_bytes = build_test_object("baz", None);
        let bar_bytes = build_test_object("bar", None);
        let archive_bytes =
            write_archive(&[("foo.o", &foo_bytes), ("baz.o", &baz_bytes), ("bar.o", &bar_bytes)]);
        let lib_path = dir.join("libx.a");
        std::fs::File::create(&lib_path).unwrap().write_all(&archive_bytes).unwrap();

        let mut cache = Cache::new();
        cache.add(a_path.to_str().unwrap());
        cache.add(lib_path.to_str().unwrap());
        cache.open().unwrap();
        cache
    }

    #[test]
    fn scenario_s3_transitive_pull_in_minimal_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = setup_cache(dir.path());

        let mut table = Table::new();
        cache.load_symbols(&mut table).unwrap();
        let base = BaseSymbols::new();
        let seeds = UnresolvedTable::new();

        let dependents = resolve(&cache, &base, &table, &seeds, "undefines").unwrap();

        let names: Vec<&str> = dependents
            .iter()
            .map(|id| cache.object(id).basename())
            .collect();
        assert_eq!(names, vec!["a.o", "foo.o", "baz.o"]);
        assert!(!names.contains(&"bar.o"));
    }

    #[test]
    fn scenario_s4_missing_symbol_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a_bytes = build_test_object("main", Some("nowhere"));
        let a_path = dir.path().join("a.o");
        std::fs::File::create(&a_path).unwrap().write_all(&a_bytes).unwrap();

        let mut cache = Cache::new();
        cache.add(a_path.to_str().unwrap());
        cache.open().unwrap();

        let mut table = Table::new();
        cache.load_symbols(&mut table).unwrap();
        let base = BaseSymbols::new();
        let seeds = UnresolvedTable::new();

        let err = resolve(&cache, &base, &table, &seeds, "undefines").unwrap_err();
        assert!(matches!(err, Error::UnresolvedSymbol { .. }));
    }

    #[test]
    fn scenario_s1_base_symbol_precedence_excludes_object() {
        let dir = tempfile::tempdir().unwrap();
        let a_bytes = build_test_object("main", Some("puts"));
        let a_path = dir.path().join("a.o");
        std::fs::File::create(&a_path).unwrap().write_all(&a_bytes).unwrap();

        let puts_bytes = build_test_object("puts", None);
        let archive_bytes = write_archive(&[("puts.o", &puts_bytes)]);
        let lib_path = dir.path().join("libx.a");
        std::fs::File::create(&lib_path).unwrap().write_all(&archive_bytes).unwrap();

        let mut cache = Cache::new();
        cache.add(a_path.to_str().unwrap());
        cache.add(lib_path.to_str().unwrap());
        cache.open().unwrap();

        let mut table = Table::new();
        cache.load_symbols(&mut table).unwrap();
        let mut base = BaseSymbols::new();
        base.insert("puts", 0x1000);
        let seeds = UnresolvedTable::new();

        let dependents = resolve(&cache, &base, &table, &seeds, "undefines").unwrap();
        let names: Vec<&str> = dependents
            .iter()
            .map(|id| cache.object(id).basename())
            .collect();
        assert_eq!(names, vec!["a.o"]);
    }
}
