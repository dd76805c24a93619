use wasmtier::{Config, Engine, Linker, Module, TierKind};

const TWO_BODIES: &str = r#"
    (module
      (func (export "ok") (result i32) i32.const 1)
      (func (export "sum") (param i32 i32) (result i32)
        local.get 0
        local.get 1
        i32.add))
"#;

fn engines() -> [Engine; 2] {
    let mut eager = Config::new();
    eager.eager_validation(true);
    [Engine::default(), Engine::new(&eager)]
}

#[test]
fn bodies_are_decoded_on_first_call() -> Result<(), anyhow::Error> {
    let module = Module::new(&Engine::default(), TWO_BODIES)?;
    let mut instance = Linker::new().instantiate(&module)?;
    assert_eq!(instance.function_tier("sum"), Some(TierKind::Bytecode));
    assert_eq!(instance.call::<(), i32>("ok", ())?, 1);
    assert_eq!(instance.function_tier("sum"), Some(TierKind::Bytecode));
    assert_eq!(instance.call::<(i32, i32), i32>("sum", (2, 3))?, 5);
    assert!(matches!(
        instance.function_tier("sum"),
        Some(TierKind::CountingIcode { invocations: 1 })
    ));
    module.validate_bodies()
}

#[test]
fn eager_validation_decodes_at_load() -> Result<(), anyhow::Error> {
    let mut config = Config::new();
    config.eager_validation(true);
    let module = Module::new(&Engine::new(&config), TWO_BODIES)?;
    let mut instance = Linker::new().instantiate(&module)?;
    assert_eq!(instance.call::<(i32, i32), i32>("sum", (-2, 3))?, 1);
    Ok(())
}

#[test]
fn unsupported_features_fail_at_load() {
    let cases = [
        (
            "bulk memory",
            r#"(module (memory 1)
                 (func (export "fill") i32.const 0 i32.const 0 i32.const 8 memory.fill))"#,
        ),
        (
            "second table",
            r#"(module (table $a 2 funcref) (table $b 1 funcref)
                 (func $one (result i32) i32.const 1)
                 (elem (table $a) (i32.const 1) func $one))"#,
        ),
        ("reference types", r#"(module (func (result funcref) ref.null func))"#),
        (
            "extended constants",
            r#"(module (global i32 (i32.add (i32.const 1) (i32.const 2))))"#,
        ),
        ("table import", r#"(module (import "env" "table" (table 1 funcref)))"#),
    ];
    for engine in engines() {
        for (feature, wat) in cases {
            assert!(Module::new(&engine, wat).is_err(), "{feature} loaded");
        }
    }
}

#[test]
fn memory_imports_load_and_need_a_provider() -> Result<(), anyhow::Error> {
    let module = Module::new(&Engine::default(), r#"(module (import "env" "mem" (memory 1)))"#)?;
    let err = Linker::new().instantiate(&module).err().map(|e| e.to_string());
    assert!(err.is_some_and(|msg| msg.contains("env::mem")));
    Ok(())
}

#[test]
fn malformed_modules_are_rejected() {
    let engine = Engine::default();
    assert!(Module::from_bytes(&engine, b"\0asm\x02\0\0\0").is_err());
    assert!(Module::new(
        &engine,
        r#"(module (func (result i32) i64.const 1))"#
    )
    .is_err());
    assert!(Module::new(&engine, r#"(module (func (export "f") (param i32)) (start 0))"#).is_err());
    assert!(Module::new(
        &engine,
        r#"(module (func (param i32) (result i32) local.get 0 if (result i32) i32.const 7 end))"#
    )
    .is_err());
}
