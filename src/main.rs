use anyhow::{anyhow, Result};
use std::path::PathBuf;

use genesis_importer::export::{dae::write_dae, gltf::write_gltf};
use genesis_importer::scene::SceneCollector;
use genesis_importer::{import, read_document, ImportConfig};

const HELP: &str = "\
genesis_importer

USAGE:
  genesis_importer [OPTIONS] INPUT

FLAGS:
  -h, --help            Prints help information

OPTIONS:
  --config FILE         JSON file overriding the default attribute names
  --gltf OUT            Write the imported scene as glTF
  --dae OUT             Write the imported scene as COLLADA

ARGS:
  INPUT                 Genesis JSON document
";

struct Args {
    config: Option<PathBuf>,
    gltf: Option<PathBuf>,
    dae: Option<PathBuf>,
    input: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    let args = Args {
        config: pargs.opt_value_from_os_str("--config", parse_path)?,
        gltf: pargs.opt_value_from_os_str("--gltf", parse_path)?,
        dae: pargs.opt_value_from_os_str("--dae", parse_path)?,
        input: pargs.free_from_os_str(parse_path)?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        return Err(anyhow!("Unexpected arguments: {:?}", remaining));
    }
    Ok(args)
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, HELP);
            std::process::exit(2);
        }
    };

    let config = match &args.config {
        Some(path) => ImportConfig::from_file(path)?,
        None => ImportConfig::default(),
    };

    let document = read_document(&args.input)?;
    let mut scene = SceneCollector::new();
    let report = import(&document, &config, &mut scene);

    println!("Imported {} object(s)", report.imported_count());
    for skipped in &report.skipped {
        println!("  skipped '{}' (index {}): {}", skipped.name, skipped.index, skipped.reason);
    }

    if let Some(path) = &args.gltf {
        write_gltf(scene.objects(), path)?;
    }
    if let Some(path) = &args.dae {
        write_dae(scene.objects(), path)?;
    }

    Ok(())
}
