mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{each_tier, engine, instantiate, trap_message, MODES};
use wasmtier::{
    Config, Engine, Error, FuncType, HostFunc, Linker, Module, TraceEvent, Tracer, Trap, Val,
    ValType,
};

const I32: ValType = ValType::I32;
const I64: ValType = ValType::I64;

const HOST_CALLS: &str = r#"
    (module
      (import "env" "add3" (func $add3 (param i32 i64 i32) (result i64)))
      (import "env" "poke" (func $poke (param i32 i32)))
      (import "env" "fail" (func $fail))
      (import "env" "base" (global $base i32))
      (memory 1)
      (func (export "mix") (param i32) (result i64)
        local.get 0
        i64.const 10
        global.get $base
        call $add3
        i64.const 1
        i64.add)
      (func (export "poke_then_load") (param i32 i32) (result i32)
        local.get 0
        local.get 1
        call $poke
        local.get 0
        i32.load8_u)
      (func (export "fail") (result i32)
        call $fail
        i32.const 0))
"#;

fn host_linker() -> Linker {
    let mut linker = Linker::new();
    linker
        .func(
            "env",
            "add3",
            FuncType::new([I32, I64, I32], [I64]),
            |_caller, args, results| {
                let sum = args[0] as u32 as i32 as i64 + args[1] as i64 + args[2] as u32 as i32 as i64;
                results[0] = sum as u64;
                Ok(())
            },
        )
        .func(
            "env",
            "poke",
            FuncType::new([I32, I32], []),
            |caller, args, _results| {
                let mut memory = caller
                    .memory_mut()
                    .ok_or_else(|| Trap::Host("no memory".into()))?;
                memory.write(args[0] as u32, &[args[1] as u8])
            },
        )
        .host_func(
            "env",
            "fail",
            HostFunc::wrap(FuncType::new([], []), |_caller, _args| {
                Err(Trap::Host("refused".into()))
            }),
        )
        .global("env", "base", Val::I32(100));
    linker
}

#[test]
fn host_functions_share_the_call_path() -> Result<(), anyhow::Error> {
    for mode in MODES {
        let module = Module::new(&engine(mode), HOST_CALLS)?;
        let mut instance = host_linker().instantiate(&module)?;
        for _ in 0..3 {
            assert_eq!(instance.call::<i32, i64>("mix", -3)?, 108);
        }
        assert_eq!(instance.call::<(i32, i32), i32>("poke_then_load", (9, 77))?, 77);
        assert_eq!(instance.memory().map(|m| m.data()[9]), Some(77));
        assert_eq!(trap_message(instance.call::<(), i32>("fail", ())), "host function failed: refused");
    }
    Ok(())
}

#[test]
fn missing_or_mistyped_imports_fail_to_link() -> Result<(), anyhow::Error> {
    let module = Module::new(&Engine::default(), HOST_CALLS)?;
    let err = Linker::new().instantiate(&module).err().map(|e| e.to_string());
    assert!(err.is_some_and(|msg| msg.contains("env::add3")));

    let mut linker = host_linker();
    linker.func("env", "add3", FuncType::new([I32], [I64]), |_, _, _| Ok(()));
    assert!(linker.instantiate(&module).is_err());
    Ok(())
}

const LIBRARY: &str = r#"
    (module
      (memory (export "memory") 1 4)
      (global (export "base") i32 (i32.const 40))
      (global (export "counter") (mut i32) (i32.const 0))
      (table (export "table") 1 funcref)
      (func (export "double") (param i32) (result i32)
        local.get 0
        i32.const 2
        i32.mul)
      (func (export "peek") (param i32) (result i32)
        local.get 0
        i32.load8_u)
      (func (export "boom") (result i32)
        unreachable))
"#;

const CLIENT: &str = r#"
    (module
      (import "lib" "double" (func $double (param i32) (result i32)))
      (import "lib" "boom" (func $boom (result i32)))
      (import "lib" "base" (global $base i32))
      (import "lib" "memory" (memory 1))
      (data (i32.const 3) "\2a")
      (func (export "twice_base") (result i32)
        global.get $base
        call $double)
      (func (export "store") (param i32 i32)
        local.get 0
        local.get 1
        i32.store8)
      (func (export "grow") (result i32)
        i32.const 1
        memory.grow)
      (func (export "boom") (result i32)
        call $boom))
"#;

#[test]
fn instances_link_functions_globals_and_memory() -> Result<(), anyhow::Error> {
    for mode in MODES {
        let engine = engine(mode);
        let mut library = Linker::new().instantiate(&Module::new(&engine, LIBRARY)?)?;
        let mut linker = Linker::new();
        linker.instance("lib", &library);
        let mut client = linker.instantiate(&Module::new(&engine, CLIENT)?)?;

        // The client's data segment lands in the library's memory.
        assert_eq!(library.call::<i32, i32>("peek", 3)?, 42);
        for _ in 0..3 {
            assert_eq!(client.call::<(), i32>("twice_base", ())?, 80);
        }
        client.call::<(i32, i32), ()>("store", (7, 99))?;
        assert_eq!(library.call::<i32, i32>("peek", 7)?, 99);
        assert_eq!(client.call::<(), i32>("grow", ())?, 1);
        assert_eq!(library.memory().map(|m| m.size()), Some(2));
        assert_eq!(trap_message(client.call::<(), i32>("boom", ())), "unreachable");
        assert_eq!(library.call::<i32, i32>("double", 4)?, 8);
    }
    Ok(())
}

#[test]
fn only_shareable_exports_link() -> Result<(), anyhow::Error> {
    let engine = Engine::default();
    let library = Linker::new().instantiate(&Module::new(&engine, LIBRARY)?)?;
    let mut linker = Linker::new();
    linker.instance("lib", &library);
    assert!(linker.has("lib", "double"));
    assert!(linker.has("lib", "memory"));
    assert!(!linker.has("lib", "table"));

    let mutable = Module::new(&engine, r#"(module (import "lib" "counter" (global (mut i32))))"#)?;
    let err = linker.instantiate(&mutable).err().map(|e| e.to_string());
    assert!(err.is_some_and(|msg| msg.contains("mutable")));

    let too_big = Module::new(&engine, r#"(module (import "lib" "memory" (memory 2)))"#)?;
    assert!(linker.instantiate(&too_big).is_err());
    Ok(())
}

#[test]
fn typed_call_checks_arguments() -> Result<(), anyhow::Error> {
    let mut instance = instantiate(
        &Engine::default(),
        r#"(module (func (export "id") (param i64) (result i64) local.get 0))"#,
    )?;
    assert!(instance.call_dynamic("id", &[Val::I32(1)]).is_err());
    assert!(instance.call_dynamic("id", &[]).is_err());
    assert!(instance.call::<i64, i64>("missing", 1).is_err());
    assert_eq!(instance.call_dynamic("id", &[Val::I64(-2)])?, vec![Val::I64(-2)]);
    Ok(())
}

#[test]
fn unchecked_call_takes_raw_words() -> Result<(), anyhow::Error> {
    let mut instance = instantiate(
        &Engine::default(),
        r#"(module
             (func (export "neg") (param i32 f32) (result i32 f32)
               i32.const 0
               local.get 0
               i32.sub
               local.get 1
               f32.neg))"#,
    )?;
    let func = instance.get_func("neg").expect("exported");
    assert_eq!(
        instance.func_type(func),
        Some(&FuncType::new([I32, ValType::F32], [I32, ValType::F32]))
    );
    let results = instance.call_unchecked(func, &[5, 1.5f32.to_bits() as u64])?;
    assert_eq!(results, vec![(-5i32) as u32 as u64, (-1.5f32).to_bits() as u64]);
    Ok(())
}

const INDIRECT: &str = r#"
    (module
      (type $unary (func (param i32) (result i32)))
      (type $nullary (func (result i32)))
      (table 4 funcref)
      (elem (i32.const 0) $double $seven)
      (func $double (type $unary) local.get 0 i32.const 2 i32.mul)
      (func $seven (type $nullary) i32.const 7)
      (func (export "apply") (param i32 i32) (result i32)
        local.get 1
        local.get 0
        call_indirect (type $unary)))
"#;

#[test]
fn call_indirect_checks_in_order() -> Result<(), anyhow::Error> {
    each_tier(INDIRECT, |instance| {
        assert_eq!(instance.call::<(i32, i32), i32>("apply", (0, 21))?, 42);
        assert_eq!(
            trap_message(instance.call::<(i32, i32), i32>("apply", (1, 0))),
            "indirect call type mismatch"
        );
        assert_eq!(
            trap_message(instance.call::<(i32, i32), i32>("apply", (2, 0))),
            "uninitialized element"
        );
        assert_eq!(
            trap_message(instance.call::<(i32, i32), i32>("apply", (4, 0))),
            "undefined element"
        );
        Ok(())
    })
}

const RECURSION: &str = r#"
    (module
      (func $sum (export "sum") (param i32) (result i64) (local i64 i64)
        ;; Locals hold state that has to survive the recursive call.
        local.get 0
        i64.extend_i32_u
        local.set 1
        local.get 0
        i64.extend_i32_u
        i64.const 1000
        i64.mul
        local.set 2
        local.get 0
        i32.eqz
        if (result i64)
          i64.const 0
        else
          local.get 0
          i32.const 1
          i32.sub
          call $sum
        end
        local.get 1
        i64.add
        local.get 2
        local.get 1
        i64.const 1000
        i64.mul
        i64.sub
        i64.add)
      (func $forever (export "forever") (param i32) (result i32)
        local.get 0
        call $forever))
"#;

#[test]
fn arena_growth_preserves_live_frames() -> Result<(), anyhow::Error> {
    for mode in MODES {
        let mut config = Config::new();
        config.tier_mode(mode).initial_arena_slots(16);
        let module = Module::new(&Engine::new(&config), RECURSION)?;
        let mut instance = Linker::new().instantiate(&module)?;
        assert_eq!(instance.call::<i32, i64>("sum", 60)?, 60 * 61 / 2);
        assert!(instance.arena_growths() > 0, "{mode:?} never grew the arena");
    }
    Ok(())
}

fn trap_of(result: Result<i32, anyhow::Error>) -> Option<Trap> {
    let err = result.err()?;
    err.downcast_ref::<Error>().and_then(Error::as_trap).cloned()
}

#[test]
fn runaway_recursion_traps_with_default_limits() -> Result<(), anyhow::Error> {
    each_tier(RECURSION, |instance| {
        for _ in 0..2 {
            assert_eq!(
                trap_of(instance.call::<i32, i32>("forever", 1)),
                Some(Trap::CallStackExhausted)
            );
        }
        assert_eq!(instance.call::<i32, i64>("sum", 50)?, 50 * 51 / 2);
        Ok(())
    })
}

#[test]
fn stack_budget_bounds_recursion_below_the_depth_limit() -> Result<(), anyhow::Error> {
    for mode in MODES {
        let mut config = Config::new();
        config
            .tier_mode(mode)
            .max_call_depth(u32::MAX)
            .max_stack_bytes(64 * 1024);
        let module = Module::new(&Engine::new(&config), RECURSION)?;
        let mut instance = Linker::new().instantiate(&module)?;
        assert_eq!(
            trap_of(instance.call::<i32, i32>("forever", 1)),
            Some(Trap::CallStackExhausted)
        );
        assert_eq!(instance.call::<i32, i64>("sum", 3)?, 6);
    }
    Ok(())
}

#[test]
fn deep_recursion_traps_instead_of_overflowing() -> Result<(), anyhow::Error> {
    for mode in MODES {
        let mut config = Config::new();
        config
            .tier_mode(mode)
            .max_call_depth(200)
            .max_stack_bytes(1536 * 1024);
        let module = Module::new(&Engine::new(&config), RECURSION)?;
        let mut instance = Linker::new().instantiate(&module)?;

        assert_eq!(
            trap_of(instance.call::<i32, i32>("forever", 1)),
            Some(Trap::CallStackExhausted)
        );

        assert_eq!(instance.call::<i32, i64>("sum", 100)?, 100 * 101 / 2);
        assert!(instance.call::<i32, i64>("sum", 250).is_err());
    }
    Ok(())
}

#[derive(Default)]
struct Recorder {
    frames: Vec<(u32, u32)>,
    steps: Vec<String>,
}

impl Tracer for Recorder {
    fn enter_frame(&mut self, function: u32, depth: u32) {
        self.frames.push((function, depth));
    }

    fn step(&mut self, event: &TraceEvent<'_>) {
        self.steps.push(format!(
            "{} {:?} -> {:?}",
            event.instruction.opcode, event.args, event.results
        ));
    }
}

#[test]
fn tracing_reports_every_step() -> Result<(), anyhow::Error> {
    let wat = r#"
        (module
          (func $double (param i32) (result i32)
            local.get 0
            i32.const 2
            i32.mul)
          (func (export "quad") (param i32) (result i32)
            (call $double (call $double (local.get 0)))))
    "#;
    let mut instance = instantiate(&engine(wasmtier::TierMode::FcodeOnly), wat)?;
    let mut recorder = Recorder::default();
    let results = instance.call_traced("quad", &[Val::I32(3)], &mut recorder)?;
    assert_eq!(results, vec![Val::I32(12)]);
    assert_eq!(recorder.frames, vec![(1, 1), (0, 2), (0, 2)]);
    assert_eq!(recorder.steps[0], "local.get [] -> [3]");
    assert!(recorder.steps.contains(&"i32.mul [3, 2] -> [6]".to_string()));
    assert!(recorder.steps.contains(&"call [6] -> [12]".to_string()));

    // Untraced calls afterwards run the compiled code.
    assert_eq!(instance.call::<i32, i32>("quad", 5)?, 20);
    Ok(())
}

#[test]
fn host_state_is_the_embedders() -> Result<(), anyhow::Error> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let mut linker = Linker::new();
    linker.func("env", "log", FuncType::new([I32], []), move |_, args, _| {
        sink.borrow_mut().push(args[0] as u32);
        Ok(())
    });
    let module = Module::new(
        &Engine::default(),
        r#"(module
             (import "env" "log" (func $log (param i32)))
             (func (export "count") (param i32)
               block
                 loop
                   local.get 0
                   i32.eqz
                   br_if 1
                   local.get 0
                   call $log
                   local.get 0
                   i32.const 1
                   i32.sub
                   local.set 0
                   br 0
                 end
               end)
             (start 1))"#,
    );
    // The start function needs an argument, so the module is invalid.
    assert!(module.is_err());

    let module = Module::new(
        &Engine::default(),
        r#"(module
             (import "env" "log" (func $log (param i32)))
             (func $count (export "count") (param i32)
               block
                 loop
                   local.get 0
                   i32.eqz
                   br_if 1
                   local.get 0
                   call $log
                   local.get 0
                   i32.const 1
                   i32.sub
                   local.set 0
                   br 0
                 end
               end)
             (func $init (call $count (i32.const 2)))
             (start $init))"#,
    )?;
    let mut instance = linker.instantiate(&module)?;
    assert_eq!(*log.borrow(), vec![2, 1]);
    instance.call::<i32, ()>("count", 3)?;
    assert_eq!(*log.borrow(), vec![2, 1, 3, 2, 1]);
    Ok(())
}
