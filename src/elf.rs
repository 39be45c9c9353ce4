//! C2: the ELF reader (spec §4.2), built on the `object` crate's read API
//! -- which already parses both ELF classes and either endianness -- plus
//! the cross-file class/machine/encoding validation spec §4.2 calls for
//! and the section/relocation descriptors spec §3 names.

use crate::error::{Error, Result};
use object::{Object, ObjectSection, ObjectSymbol};

/// The three process-wide atoms from spec §5/§9, scoped to one link
/// invocation instead of global statics (per spec §9's design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassInfo {
    pub is_64: bool,
    pub machine: object::Architecture,
    pub little_endian: bool,
}

impl ClassInfo {
    pub fn of(file: &object::File) -> ClassInfo {
        ClassInfo {
            is_64: file.is_64(),
            machine: file.architecture(),
            little_endian: file.is_little_endian(),
        }
    }
}

/// Validates a newly-opened file's class/machine/encoding against whatever
/// was recorded for the first file loaded in this invocation, seeding it
/// if this is the first. Mirrors spec §4.2's `MixedClasses` /
/// `MixedMachineTypes` / `MixedDataTypes` failures.
pub fn validate_and_record(
    recorded: &mut Option<ClassInfo>,
    candidate: ClassInfo,
    where_: &'static str,
) -> Result<()> {
    match recorded {
        None => {
            *recorded = Some(candidate);
            Ok(())
        }
        Some(first) => {
            if first.is_64 != candidate.is_64 {
                return Err(Error::MixedClasses {
                    what: format!(
                        "expected {}-bit, got {}-bit",
                        if first.is_64 { 64 } else { 32 },
                        if candidate.is_64 { 64 } else { 32 }
                    ),
                    location: where_,
                });
            }
            if first.machine != candidate.machine {
                return Err(Error::MixedMachineTypes {
                    what: format!("expected {:?}, got {:?}", first.machine, candidate.machine),
                    location: where_,
                });
            }
            if first.little_endian != candidate.little_endian {
                return Err(Error::MixedDataTypes {
                    what: "mismatched byte order".into(),
                    location: where_,
                });
            }
            Ok(())
        }
    }
}

/// An ELF symbol-binding classification (spec §3 "Symbol").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local,
    Weak,
    Global,
}

impl Binding {
    pub fn of(sym: &object::Symbol) -> Binding {
        if sym.is_weak() {
            Binding::Weak
        } else if sym.is_global() {
            Binding::Global
        } else {
            Binding::Local
        }
    }
}

/// Raw per-symtab-entry data needed to populate an object's symbol bucket.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub elf_index: usize,
    pub name: String,
    pub binding: Binding,
    pub is_section: bool,
    /// `None` means `SHN_UNDEF`.
    pub section_name: Option<String>,
    pub value: u64,
    pub size: u64,
}

/// Reads every symtab entry (spec §4.2 "Loads symbols from SYMTAB
/// sections"), in symtab order, so the entry's position doubles as its
/// ELF symtab index for relocations to key on directly.
pub fn read_symbols(file: &object::File) -> Result<Vec<RawSymbol>> {
    let mut out = Vec::new();
    for (elf_index, sym) in file.symbols().enumerate() {
        let name = sym.name().unwrap_or("").to_string();
        let section_name = match sym.section() {
            object::SymbolSection::Section(idx) => file
                .section_by_index(idx)
                .ok()
                .and_then(|s| s.name().ok().map(|n| n.to_string())),
            _ => None,
        };
        out.push(RawSymbol {
            elf_index,
            name,
            binding: Binding::of(&sym),
            is_section: sym.kind() == object::SymbolKind::Section,
            section_name,
            value: sym.address(),
            size: sym.size(),
        });
    }
    Ok(out)
}

/// A relocation record (spec §3 "Relocation record"). `symbol_index` keys
/// directly into the owning object's symbol bucket, matching the
/// `RawSymbol::elf_index` field above.
#[derive(Debug, Clone)]
pub struct RelocationRecord {
    pub offset_in_target_section: u64,
    pub kind: object::RelocationKind,
    pub encoding: object::RelocationEncoding,
    pub size: u8,
    pub addend: i64,
    pub has_explicit_addend: bool,
    pub symbol_index: Option<usize>,
    pub target_section_symbol: bool,
}

/// A section descriptor (spec §3 "ELF section descriptor").
#[derive(Debug, Clone)]
pub struct SectionDescriptor {
    pub index: usize,
    pub name: String,
    pub kind: object::SectionKind,
    pub is_alloc: bool,
    pub is_write: bool,
    pub is_exec: bool,
    pub is_merge: bool,
    pub align: u64,
    pub address: u64,
    pub file_offset: u64,
    pub size: u64,
    pub data: Vec<u8>,
    pub relocations: Vec<RelocationRecord>,
}

fn section_flag_bits(section: &object::Section) -> (bool, bool, bool, bool) {
    match section.flags() {
        object::SectionFlags::Elf { sh_flags } => {
            let f = sh_flags as u64;
            (
                f & u64::from(object::elf::SHF_ALLOC) != 0,
                f & u64::from(object::elf::SHF_WRITE) != 0,
                f & u64::from(object::elf::SHF_EXECINSTR) != 0,
                f & u64::from(object::elf::SHF_MERGE) != 0,
            )
        }
        _ => (false, false, false, false),
    }
}

/// Reads every section, lazily filtered the way spec §4.2's
/// `get_sections` is described (callers further filter by region), and
/// loads the `REL`/`RELA` records targeting each one (spec §4.2 "Loads
/// relocations").
pub fn read_sections(file: &object::File) -> Result<Vec<SectionDescriptor>> {
    let mut out = Vec::new();
    for (index, section) in file.sections().enumerate() {
        let name = section.name().unwrap_or("").to_string();
        let (is_alloc, is_write, is_exec, is_merge) = section_flag_bits(&section);
        let data = section.data().unwrap_or(&[]).to_vec();

        let mut relocations = Vec::new();
        for (offset, reloc) in section.relocations() {
            let (symbol_index, target_section_symbol) = match reloc.target() {
                object::RelocationTarget::Symbol(symbol_id) => {
                    let sym = file.symbol_by_index(symbol_id).ok();
                    let is_section_sym = sym
                        .as_ref()
                        .map(|s| s.kind() == object::SymbolKind::Section)
                        .unwrap_or(false);
                    (Some(symbol_id.0), is_section_sym)
                }
                _ => (None, false),
            };
            relocations.push(RelocationRecord {
                offset_in_target_section: offset,
                kind: reloc.kind(),
                encoding: reloc.encoding(),
                size: reloc.size(),
                addend: reloc.addend(),
                has_explicit_addend: !reloc.has_implicit_addend(),
                symbol_index,
                target_section_symbol,
            });
        }

        out.push(SectionDescriptor {
            index,
            name,
            kind: section.kind(),
            is_alloc,
            is_write,
            is_exec,
            is_merge,
            align: section.align(),
            address: section.address(),
            file_offset: section.file_range().map(|r| r.0).unwrap_or(0),
            size: section.size(),
            data,
            relocations,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_class_detected() {
        let mut recorded = Some(ClassInfo {
            is_64: true,
            machine: object::Architecture::X86_64,
            little_endian: true,
        });
        let candidate = ClassInfo {
            is_64: false,
            machine: object::Architecture::X86_64,
            little_endian: true,
        };
        let err = validate_and_record(&mut recorded, candidate, "elf").unwrap_err();
        assert!(matches!(err, Error::MixedClasses { .. }));
    }

    #[test]
    fn mixed_machine_detected() {
        let mut recorded = Some(ClassInfo {
            is_64: true,
            machine: object::Architecture::X86_64,
            little_endian: true,
        });
        let candidate = ClassInfo {
            is_64: true,
            machine: object::Architecture::Aarch64,
            little_endian: true,
        };
        let err = validate_and_record(&mut recorded, candidate, "elf").unwrap_err();
        assert!(matches!(err, Error::MixedMachineTypes { .. }));
    }

    #[test]
    fn first_file_seeds_recorded_class() {
        let mut recorded = None;
        let candidate = ClassInfo {
            is_64: true,
            machine: object::Architecture::X86_64,
            little_endian: true,
        };
        validate_and_record(&mut recorded, candidate, "elf").unwrap();
        assert_eq!(recorded, Some(candidate));
    }
}
