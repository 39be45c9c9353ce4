//! A thin illustrative wrapper showing the `Cache` -> `link` -> RAP
//! call-site contract (SPEC_FULL.md "Configuration / options": real flag
//! parsing is out of core scope, same minimalism as the teacher's own
//! `ld.rs`). Takes object/archive paths and an output path; the entry
//! symbol defaults to `"rtems"` (spec §6).

use log::info;
use rld_core::cache::Cache;
use rld_core::image::Image;
use rld_core::rap::RapOptions;
use rld_core::symbols::BaseSymbols;
use rld_core::verbosity::Verbosity;
use rld_core::{link, LinkOptions};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    info!("launched with args: {:?}", args);

    let mut output_path = "a.rap".to_string();
    let mut entry_symbol = "rtems".to_string();
    let mut verbosity = Verbosity::new(0);
    let mut inputs = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" => {
                output_path = iter.next().ok_or_else(|| anyhow::anyhow!("missing output after -o"))?;
            }
            "-e" => {
                entry_symbol = iter.next().ok_or_else(|| anyhow::anyhow!("missing symbol after -e"))?;
            }
            "-v" => verbosity.increment(),
            path => inputs.push(path.to_string()),
        }
    }

    let mut cache = Cache::new();
    for path in &inputs {
        cache.add(path.clone());
    }

    let base = BaseSymbols::new();
    let options = LinkOptions {
        entry_symbol,
        verbosity,
        rap: RapOptions {
            version: 1,
            compress: true,
            metadata: "rap-ld".to_string(),
        },
    };

    let output = Image::create_write(&output_path)?;
    let dependents = link(cache, &base, &options, output)?;
    info!("wrote {} objects to {}", dependents.len(), output_path);

    Ok(())
}
