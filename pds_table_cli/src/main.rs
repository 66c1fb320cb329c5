use clap::{Arg, Command};
use human_bytes::human_bytes;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use libpds_table::config::Config;
use libpds_table::product::{ProductModel, SectionSelector};
use libpds_table::reader::ReaderRegistry;
use libpds_table::table::TableSection;

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

fn log_table(name: &str, table: &TableSection) {
    log::info!(
        "Section {name}: {} rows, {} columns",
        table.n_rows,
        table.n_columns
    );
    for (schema, data) in table.iter() {
        log::info!(
            "  {}: {} as {} {:?}{}",
            schema.name,
            schema.element_kind,
            data.type_name(),
            data.shape(),
            schema
                .unit
                .as_ref()
                .map(|unit| format!(" [{unit}]"))
                .unwrap_or_default()
        );
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("pds_table_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Could not write template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Label Path: {}", config.label_path.to_string_lossy());
    for (name, path) in config.structure_overrides.iter() {
        log::info!("Structure {name} -> {}", path.to_string_lossy());
    }
    log::info!("Sections: {:?}", config.selector());

    let mut product = match ProductModel::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Could not open product: {e}");
            return;
        }
    };
    if let Some(id) = product.dataset_id() {
        log::info!("Dataset: {id}");
    }

    let names: Vec<String> = match config.selector() {
        SectionSelector::All => product
            .sections()
            .into_iter()
            .filter(|name| {
                product
                    .data_section(name)
                    .is_some_and(|section| section.is_table())
            })
            .map(String::from)
            .collect(),
        SectionSelector::Single(name) => vec![name],
        SectionSelector::List(names) => names,
    };

    for name in names.iter() {
        if let Some(section) = product.data_section(name) {
            let size = std::fs::metadata(section.referenced_file())
                .map(|meta| human_bytes(meta.len() as f64))
                .unwrap_or_else(|_| String::from("missing"));
            log::info!(
                "{name} is in {} ({size}) at byte {}",
                section.referenced_file().to_string_lossy(),
                section.byte_offset()
            );
        }
    }

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(names.len() as u64));
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        pb.set_style(style);
    }

    let mut n_failed = 0;
    for name in names.iter() {
        pb.set_message(name.clone());
        match product.load(&SectionSelector::Single(name.clone())) {
            Ok(_) => (),
            Err(e) => {
                log::error!("Loading failed with error: {e}");
                n_failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish();

    for name in names.iter() {
        if let Ok(table) = product.section(name) {
            log_table(name, table);
        }
    }

    // Summarize the axes the reader for this dataset can find
    let registry = ReaderRegistry::default();
    let reader = match config.dataset_id.as_deref() {
        Some(id) if registry.is_registered(id) => registry.open_as(id, product),
        _ => registry.open_product(product),
    };
    match reader {
        Ok(reader) => {
            if let Ok(time) = reader.time_axis() {
                if let (Some(first), Some(last)) = (time.iter().next(), time.iter().last()) {
                    log::info!("Time axis: {} values from {first} to {last}", time.len());
                }
            }
            if let Ok(frequency) = reader.frequency_axis() {
                log::info!("Frequency axis: {} values", frequency.len());
            }
        }
        Err(e) => log::warn!("No reader available: {e}"),
    }

    if n_failed == 0 {
        log::info!("Successfully loaded {} sections!", names.len());
    } else {
        log::error!("{n_failed} of {} sections failed to load", names.len());
    }
    log::info!("Done.");
}
