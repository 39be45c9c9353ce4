//! C6: the symbol model (spec §4.6) and the per-object symbol bucket that
//! backs C4's `external_symbols` / `unresolved_symbols` views.
//!
//! The original keeps raw `symbol*` pointers in its three submaps and in
//! relocation records. This crate follows spec §9's own redesign note
//! ("Symbols hold object handles, not pointers") and represents a pointer
//! as a `SymbolRef { object, index }` handle into the owning object's
//! bucket -- a `Vec<Symbol>` that only ever grows, so indices handed out
//! earlier stay valid for the life of the object, which is the stability
//! guarantee spec §5 asks for without needing an arena.

use crate::elf::Binding;
use crate::error::{Error, Result};
use crate::object_file::ObjectId;
use std::cell::Cell;
use std::collections::BTreeMap;

/// One entry in an object's symbol bucket (spec §3 "Symbol").
#[derive(Debug)]
pub struct Symbol {
    pub elf_index: usize,
    pub name: String,
    demangled: Option<String>,
    pub binding: Binding,
    /// `None` means undefined (`SHN_UNDEF`).
    pub section_name: Option<String>,
    pub value: u64,
    pub size: u64,
    /// Set at creation for a defined symbol (points at its own object), or
    /// by the resolver for what was initially an unresolved reference.
    pub owning_object: Cell<Option<ObjectId>>,
    pub references: Cell<u32>,
}

impl Symbol {
    pub fn new(
        elf_index: usize,
        name: String,
        binding: Binding,
        section_name: Option<String>,
        value: u64,
        size: u64,
    ) -> Symbol {
        let demangled = demangle(&name);
        Symbol {
            elf_index,
            name,
            demangled,
            binding,
            section_name,
            value,
            size,
            owning_object: Cell::new(None),
            references: Cell::new(0),
        }
    }

    pub fn is_defined(&self) -> bool {
        self.section_name.is_some()
    }

    pub fn is_cplusplus(&self) -> bool {
        self.name.starts_with("_Z")
    }

    pub fn demangled(&self) -> &str {
        self.demangled.as_deref().unwrap_or(&self.name)
    }

    pub fn referenced(&self) {
        self.references.set(self.references.get() + 1);
    }

    pub fn references(&self) -> u32 {
        self.references.get()
    }
}

/// Demangles a C++ (Itanium) mangled name. A name that doesn't start with
/// `_Z` is never a C++ name (spec §4.6); demangling failure is simply "no
/// demangled form", never an error.
pub fn demangle(name: &str) -> Option<String> {
    if !name.starts_with("_Z") {
        return None;
    }
    cpp_demangle::Symbol::new(name)
        .ok()
        .and_then(|sym| sym.demangle(&cpp_demangle::DemangleOptions::default()).ok())
}

/// A handle to a symbol living in some object's bucket (spec §9 redesign
/// note: "symbols hold object handles, not pointers").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SymbolRef {
    pub object: ObjectId,
    pub index: usize,
}

/// A linker-synthesized symbol with no owning object (spec §4.6,
/// "Linker-synthesized symbols may be constructed from `(name, value)`").
#[derive(Debug, Clone)]
pub struct SyntheticSymbol {
    pub name: String,
    pub value: u64,
    pub references: Cell<u32>,
}

impl SyntheticSymbol {
    pub fn new(name: impl Into<String>, value: u64) -> SyntheticSymbol {
        SyntheticSymbol {
            name: name.into(),
            value,
            references: Cell::new(0),
        }
    }
}

/// The base-image symbol table: read-only globals known to the target
/// runtime that resolve references but are never pulled into the
/// dependent set (spec §4.7 "base_symbols").
#[derive(Debug, Default)]
pub struct BaseSymbols {
    symbols: BTreeMap<String, SyntheticSymbol>,
}

impl BaseSymbols {
    pub fn new() -> BaseSymbols {
        BaseSymbols::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: u64) {
        let name = name.into();
        self.symbols
            .insert(name.clone(), SyntheticSymbol::new(name, value));
    }

    pub fn get(&self, name: &str) -> Option<&SyntheticSymbol> {
        self.symbols.get(name)
    }
}

/// Three name -> symbol-reference submaps (spec §4.6 "A `table`").
#[derive(Debug, Default)]
pub struct Table {
    globals: BTreeMap<String, SymbolRef>,
    weaks: BTreeMap<String, SymbolRef>,
    locals: BTreeMap<String, SymbolRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submap {
    Global,
    Weak,
    Local,
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    fn submap_mut(&mut self, which: Submap) -> &mut BTreeMap<String, SymbolRef> {
        match which {
            Submap::Global => &mut self.globals,
            Submap::Weak => &mut self.weaks,
            Submap::Local => &mut self.locals,
        }
    }

    /// Files a symbol into the given submap. Spec §4.6: "Names are unique
    /// within each map" -- a second insertion under the same name in the
    /// same submap is a load-time `DuplicateSymbol` error.
    pub fn add(&mut self, which: Submap, name: &str, sym: SymbolRef) -> Result<()> {
        let map = self.submap_mut(which);
        if map.contains_key(name) {
            return Err(Error::DuplicateSymbol {
                what: name.to_string(),
                location: "symbols",
            });
        }
        map.insert(name.to_string(), sym);
        Ok(())
    }

    pub fn add_global(&mut self, name: &str, sym: SymbolRef) -> Result<()> {
        self.add(Submap::Global, name, sym)
    }

    pub fn add_weak(&mut self, name: &str, sym: SymbolRef) -> Result<()> {
        self.add(Submap::Weak, name, sym)
    }

    pub fn add_local(&mut self, name: &str, sym: SymbolRef) -> Result<()> {
        self.add(Submap::Local, name, sym)
    }

    pub fn find_global(&self, name: &str) -> Option<SymbolRef> {
        self.globals.get(name).copied()
    }

    pub fn find_weak(&self, name: &str) -> Option<SymbolRef> {
        self.weaks.get(name).copied()
    }

    pub fn find_local(&self, name: &str) -> Option<SymbolRef> {
        self.locals.get(name).copied()
    }

    pub fn globals(&self) -> impl Iterator<Item = (&String, &SymbolRef)> {
        self.globals.iter()
    }

    pub fn weaks(&self) -> impl Iterator<Item = (&String, &SymbolRef)> {
        self.weaks.iter()
    }
}

/// An unresolved-symbol table: a plain ordered map of name -> bucket index
/// within the owning object (spec §3 "unresolved table"). Iteration order
/// is insertion order (ELF symtab order), which the resolver relies on for
/// determinism (spec §5).
#[derive(Debug, Default, Clone)]
pub struct UnresolvedTable {
    entries: Vec<(String, usize)>,
}

impl UnresolvedTable {
    pub fn new() -> UnresolvedTable {
        UnresolvedTable::default()
    }

    pub fn push(&mut self, name: String, bucket_index: usize) {
        self.entries.push((name, bucket_index));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, usize)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes the formatted symbol-table dump the original's
/// `rld::symbols::output` produces (spec §4.6 "Output"), one line per
/// symbol: binding, section, hex value, size, demangled-or-raw name, and
/// the owning object's basename in parentheses.
pub fn write_listing<W: std::io::Write>(
    out: &mut W,
    entries: &[(&str, &Symbol, &str)],
) -> std::io::Result<()> {
    for (_name, sym, owner_basename) in entries {
        let binding = match sym.binding {
            Binding::Local => "local ",
            Binding::Weak => "weak  ",
            Binding::Global => "global",
        };
        writeln!(
            out,
            "{binding} sect={:<12} 0x{:016x} size={:<6} {} ({owner_basename})",
            sym.section_name.as_deref().unwrap_or("*UND*"),
            sym.value,
            sym.size,
            sym.demangled(),
        )?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_cxx_name_is_never_demangled() {
        assert_eq!(demangle("puts"), None);
    }

    #[test]
    fn cxx_name_demangles() {
        // mangled form of `int foo(int)`
        let demangled = demangle("_Z3fooi");
        assert_eq!(demangled.as_deref(), Some("foo(int)"));
    }

    #[test]
    fn duplicate_name_in_same_submap_errors() {
        let mut table = Table::new();
        let object = ObjectId::new(0);
        table
            .add_global("foo", SymbolRef { object, index: 0 })
            .unwrap();
        let err = table
            .add_global("foo", SymbolRef { object, index: 1 })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol { .. }));
    }

    #[test]
    fn same_name_local_and_global_in_different_submaps_is_fine() {
        let mut table = Table::new();
        let object = ObjectId::new(0);
        table
            .add_global("foo", SymbolRef { object, index: 0 })
            .unwrap();
        table
            .add_local("foo", SymbolRef { object, index: 1 })
            .unwrap();
    }

    #[test]
    fn listing_format_has_expected_columns() {
        let sym = Symbol::new(1, "puts".into(), Binding::Global, Some(".text".into()), 0x10, 4);
        let mut buf = Vec::new();
        write_listing(&mut buf, &[("puts", &sym, "a.o")]).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(line.contains("global"));
        assert!(line.contains(".text"));
        assert!(line.contains("puts"));
        assert!(line.contains("(a.o)"));
    }
}
