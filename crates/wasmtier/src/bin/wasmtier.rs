use std::io::Read;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use wasmtier::{Config, Engine, Linker, LogTracer, Module, TierMode, Val, ValType};

#[derive(Parser)]
#[command(name = "wasmtier", about = "Tiered WebAssembly interpreter")]
struct Cli {
    /// Which tiers functions may run in.
    #[arg(long, value_enum, default_value_t = Tiers::Natural, global = true)]
    tiers: Tiers,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Tiers {
    Natural,
    Icode,
    Fcode,
}

#[derive(Subcommand)]
enum Command {
    /// Print the icode and fcode of every defined function.
    Inspect {
        /// Path to a .wat or .wasm file. Reads from stdin if omitted.
        file: Option<String>,
    },
    /// Call an exported function and print its results.
    Run {
        file: String,
        export: String,
        /// Arguments, parsed according to the export's signature.
        args: Vec<String>,
        /// Log every executed instruction at TRACE level.
        #[arg(long)]
        trace: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::new();
    config.tier_mode(match cli.tiers {
        Tiers::Natural => TierMode::Natural,
        Tiers::Icode => TierMode::IcodeOnly,
        Tiers::Fcode => TierMode::FcodeOnly,
    });
    let engine = Engine::new(&config);

    match cli.command {
        Command::Inspect { file } => inspect(&engine, file),
        Command::Run {
            file,
            export,
            args,
            trace,
        } => run(&engine, &file, &export, &args, trace),
    }
}

fn inspect(engine: &Engine, file: Option<String>) -> anyhow::Result<()> {
    let module = load(engine, &read_input(file)?)?;
    let mut exports: Vec<_> = module.exports().collect();
    exports.sort_by_key(|(name, _)| *name);
    for (name, export) in exports {
        println!("export {name:?}: {export:?}");
    }
    for func in module.num_imported_functions()..module.num_functions() {
        println!("{}", module.dump(func)?);
    }
    Ok(())
}

fn run(engine: &Engine, file: &str, export: &str, args: &[String], trace: bool) -> anyhow::Result<()> {
    let module = load(engine, &read_input(Some(file.to_string()))?)?;
    let mut instance = Linker::new().instantiate(&module)?;
    let Some(func) = instance.get_func(export) else {
        anyhow::bail!("no exported function {export:?}");
    };
    let Some(ty) = instance.func_type(func) else {
        anyhow::bail!("no signature for {export:?}");
    };
    anyhow::ensure!(
        ty.params().len() == args.len(),
        "{export} takes {} arguments, got {}",
        ty.params().len(),
        args.len()
    );
    let vals = ty
        .params()
        .iter()
        .zip(args)
        .map(|(&ty, arg)| parse_val(ty, arg))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let results = if trace {
        instance.call_traced(export, &vals, &mut LogTracer)?
    } else {
        instance.call_dynamic(export, &vals)?
    };
    for result in results {
        println!("{result:?}");
    }
    Ok(())
}

fn parse_val(ty: ValType, arg: &str) -> anyhow::Result<Val> {
    Ok(match ty {
        // Unsigned spellings are reinterpreted, anything wider is an error.
        ValType::I32 => Val::I32(match arg.parse::<i32>() {
            Ok(value) => value,
            Err(_) => arg.parse::<u32>()? as i32,
        }),
        ValType::I64 => Val::I64(match arg.parse::<i64>() {
            Ok(value) => value,
            Err(_) => arg.parse::<u64>()? as i64,
        }),
        ValType::F32 => Val::F32(arg.parse()?),
        ValType::F64 => Val::F64(arg.parse()?),
    })
}

/// Accept either text or binary modules.
fn load(engine: &Engine, input: &[u8]) -> anyhow::Result<Module> {
    if input.starts_with(b"\0asm") {
        Module::from_bytes(engine, input)
    } else {
        Module::new(engine, std::str::from_utf8(input)?)
    }
}

fn read_input(file: Option<String>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) => Ok(std::fs::read(&path)?),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arguments_stay_in_range() {
        assert_eq!(parse_val(ValType::I32, "-7").unwrap(), Val::I32(-7));
        assert_eq!(parse_val(ValType::I32, "4294967295").unwrap(), Val::I32(-1));
        assert!(parse_val(ValType::I32, "4294967296").is_err());
        assert!(parse_val(ValType::I32, "-2147483649").is_err());
        assert_eq!(parse_val(ValType::I64, "18446744073709551615").unwrap(), Val::I64(-1));
        assert!(parse_val(ValType::I64, "x").is_err());
    }
}
