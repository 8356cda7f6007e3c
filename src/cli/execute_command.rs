use crate::cli::{Cli, Commands};
use shared_hash_map::utils::{format_bytes, parse_quantity};
use shared_hash_map::{LongValue, MapError, Result, SharedHashMap, SharedHashMapBuilder};

/// Executes a CLI command against a map of `LongValue` counters.
///
/// Every command except `create` requires the map file to exist. Errors are
/// returned to `main`, which reports them and exits with status 1; a missing
/// key is reported here the same way.
///
/// # References
/// - [`Commands`](crate::cli::Commands): Defines the available CLI commands.
/// - [`SharedHashMap`]: The underlying map.
pub fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Create {
            entries,
            segments,
            entry_size,
        } => {
            let mut builder = SharedHashMapBuilder::new();

            if let Some(entries) = entries {
                builder = builder.entries(parse_option("entries", entries)?);
            }
            if let Some(segments) = segments {
                builder = builder.segments(to_u32("segments", parse_option("segments", segments)?)?);
            }
            if let Some(entry_size) = entry_size {
                builder = builder
                    .entry_size(to_u32("entry size", parse_option("entry size", entry_size)?)?);
            }

            let map = builder.create::<LongValue>(&cli.storage)?;
            println!(
                "Map '{}' ready: {} segments, capacity {}",
                cli.storage.display(),
                map.segment_count(),
                map.capacity()
            );
            map.close()?;
        }

        Commands::Get { key } => {
            let map = open_map(cli)?;
            let mut counter = LongValue::new();

            match map.get_using(key, &mut counter)? {
                Some(counter) => println!("{}", counter.get_value()),
                None => {
                    eprintln!("Error: Key '{}' not found", key);
                    std::process::exit(1);
                }
            }
        }

        Commands::Incr { key, delta, repeat } => {
            let map = open_map(cli)?;
            let mut counter = LongValue::new();
            let counter = map.acquire_using(key, &mut counter)?;

            let mut value = counter.get_value();
            for _ in 0..*repeat {
                value = counter.add_atomic_value(*delta);
            }
            println!("{}", value);
        }

        Commands::Set { key, value } => {
            let map = open_map(cli)?;
            let mut counter = LongValue::new();
            map.acquire_using(key, &mut counter)?.set_value(*value);
            println!("Stored '{}'", key);
        }

        Commands::Remove { key } => {
            let map = open_map(cli)?;
            if !map.remove(key)? {
                eprintln!("Error: Key '{}' not found", key);
                std::process::exit(1);
            }
            eprintln!("Removed key '{}'", key);
        }

        Commands::List => {
            let map = open_map(cli)?;
            let mut counter = LongValue::new();
            let mut rows = Vec::new();

            map.for_each_entry(&mut counter, |key, counter| {
                rows.push((String::from_utf8_lossy(key).into_owned(), counter.get_value()));
            })?;

            rows.sort();
            for (key, value) in rows {
                println!("{}\t{}", key, value);
            }
        }

        Commands::Info => {
            let map = open_map(cli)?;
            let stats = map.stats()?;

            println!("\n{:=^50}", " MAP INFO ");
            println!("{:<25} {:?}", "MAP FILE:", cli.storage);
            println!("{:-<50}", ""); // Separator

            println!("{:<25} {}", "TOTAL SIZE:", format_bytes(stats.mapped_bytes));
            println!("{:<25} {}", "ENTRIES:", stats.len);
            println!("{:<25} {}", "CAPACITY:", stats.capacity);
            println!("{:<25} {:.2}%", "LOAD FACTOR:", stats.load_factor() * 100.0);
            println!("{:<25} {}", "SEGMENTS:", stats.segments);
            println!(
                "{:<25} {} / {}",
                "FULLEST SEGMENT:", stats.max_segment_len, stats.segment_capacity
            );
            println!("{:<25} {}", "LOCKED SEGMENTS:", stats.locked_segments);
            println!("{:<25} {} bytes", "ENTRY SIZE:", map.entry_size());
            println!("{:<25} {} bytes", "MAX KEY LENGTH:", map.max_key_len());

            println!("{:=<50}", ""); // Footer
        }
    }

    Ok(())
}

fn open_map(cli: &Cli) -> Result<SharedHashMap<LongValue>> {
    SharedHashMap::open(&cli.storage)
}

fn parse_option(name: &str, input: &str) -> Result<u64> {
    parse_quantity(input).map_err(|err| MapError::InvalidConfig(format!("{}: {}", name, err)))
}

fn to_u32(name: &str, value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| MapError::InvalidConfig(format!("{} {} is out of range", name, value)))
}
