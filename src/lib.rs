//! Object/archive cache, symbol resolver, and RAP container writer for
//! preparing statically linked code for in-target dynamic loading
//! (RTEMS-style "rtld" link step).
//!
//! The modules below mirror the original `rld` library's component split:
//! block compression (C1), ELF reading (C2), archive reading (C3), the
//! object model (C4), the file cache (C5), the symbol model (C6), the
//! resolver (C7), and the RAP writer/reader (C8). `link` wires them
//! together the way `rtems-ld`'s top-level driver does, minus the thin CLI
//! argument-parsing layer that lives in `src/bin/rap_ld.rs`.

pub mod archive;
pub mod cache;
pub mod compress;
pub mod elf;
pub mod error;
pub mod filename;
pub mod image;
pub mod object_file;
pub mod rap;
pub mod resolver;
pub mod symbols;
pub mod verbosity;

use crate::cache::Cache;
use crate::error::Result;
use crate::image::Image;
use crate::resolver::Dependents;
use crate::symbols::{BaseSymbols, Table, UnresolvedTable};
use log::{info, warn};

/// The inputs a link invocation needs beyond the object/library paths
/// already registered with a `Cache` (spec §6 "Operational knobs", minus
/// the CLI-only ones).
pub struct LinkOptions {
    pub entry_symbol: String,
    pub verbosity: verbosity::Verbosity,
    pub rap: rap::RapOptions,
}

/// Runs one full link invocation: opens the cache, seeds the entry symbol,
/// resolves, writes the RAP container, and warns about any dependent
/// object whose externals all went unreferenced (SPEC_FULL.md supplemented
/// feature #4). Returns the resolved dependent set for callers that want
/// to inspect it (tests, the example binary).
pub fn link(
    mut cache: Cache,
    base: &BaseSymbols,
    options: &LinkOptions,
    output: Image,
) -> Result<Dependents> {
    cache.open()?;

    let mut table = Table::new();
    cache.load_symbols(&mut table)?;

    // The entry seed has no owning bucket index of its own; `resolve`
    // only dereferences a seed's bucket index when it has an owner
    // object, and the entry-seed pass runs with `owner = None`.
    let mut seeds = UnresolvedTable::new();
    seeds.push(options.entry_symbol.clone(), 0);

    if options.verbosity.enables(verbosity::Level::Info) {
        info!("resolving from entry symbol '{}'", options.entry_symbol);
    }

    let dependents = resolver::resolve(&cache, base, &table, &seeds, "entry")?;

    if options.verbosity.enables(verbosity::Level::Info) {
        for id in dependents.iter() {
            let object = cache.object(id);
            if object.externals_all_unreferenced() {
                warn!("object '{}' has no referenced externals", object.basename());
            }
        }
    }

    rap::write(&cache, &dependents, output, &options.rap)?;

    Ok(dependents)
}
