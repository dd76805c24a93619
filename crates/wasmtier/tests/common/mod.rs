#![allow(dead_code)]

use anyhow::Context;
use wasmtier::{Config, Engine, Instance, Linker, Module, TierMode};

pub const MODES: [TierMode; 3] = [TierMode::Natural, TierMode::IcodeOnly, TierMode::FcodeOnly];

pub fn engine(mode: TierMode) -> Engine {
    let mut config = Config::new();
    config.tier_mode(mode);
    Engine::new(&config)
}

pub fn instantiate(engine: &Engine, wat: &str) -> Result<Instance, anyhow::Error> {
    let module = Module::new(engine, wat)?;
    Linker::new().instantiate(&module)
}

/// Run `check` against a fresh instance of `wat` in every tier mode.
pub fn each_tier(
    wat: &str,
    mut check: impl FnMut(&mut Instance) -> Result<(), anyhow::Error>,
) -> Result<(), anyhow::Error> {
    for mode in MODES {
        let mut instance = instantiate(&engine(mode), wat)?;
        check(&mut instance).with_context(|| format!("tier mode {mode:?}"))?;
    }
    Ok(())
}

/// The trap raised by a failed call, as text.
pub fn trap_message<T: std::fmt::Debug>(result: Result<T, anyhow::Error>) -> String {
    match result {
        Ok(value) => panic!("expected a trap, got {value:?}"),
        Err(err) => err.to_string(),
    }
}
