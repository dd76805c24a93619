use wasmparser::{Validator, WasmFeatures};

/// Which tiers a function may execute in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierMode {
    /// Loops and hot short functions are promoted to fcode.
    #[default]
    Natural,
    /// Every function stays in icode and runs on the stack interpreter.
    IcodeOnly,
    /// Every function is compiled to fcode before its first call.
    FcodeOnly,
}

/// Thresholds for promotion from icode to fcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieringPolicy {
    /// Loop-free functions shorter than this many instructions are counted
    /// and promoted; longer ones stay in icode.
    pub short_function_len: usize,
    /// Invocation at which a counted function is compiled to fcode.
    pub promote_after: u32,
}

impl Default for TieringPolicy {
    fn default() -> Self {
        TieringPolicy {
            short_function_len: 16,
            promote_after: 2,
        }
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) tier_mode: TierMode,
    pub(crate) tiering: TieringPolicy,
    pub(crate) max_call_depth: u32,
    pub(crate) max_stack_bytes: usize,
    pub(crate) initial_arena_slots: usize,
    pub(crate) eager_validation: bool,
    pub(crate) max_memory_pages: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tier_mode: TierMode::Natural,
            tiering: TieringPolicy::default(),
            max_call_depth: 1_000,
            max_stack_bytes: 1024 * 1024,
            initial_arena_slots: 1024,
            eager_validation: false,
            max_memory_pages: 65536,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tier_mode(&mut self, mode: TierMode) -> &mut Self {
        self.tier_mode = mode;
        self
    }

    pub fn tiering(&mut self, policy: TieringPolicy) -> &mut Self {
        self.tiering = policy;
        self
    }

    /// Nested call depth at which execution traps with `call stack exhausted`.
    pub fn max_call_depth(&mut self, depth: u32) -> &mut Self {
        self.max_call_depth = depth;
        self
    }

    /// Native stack, in bytes, a call chain may use before it traps with
    /// `call stack exhausted`. Must stay below the stack size of the thread
    /// calling into the instance.
    pub fn max_stack_bytes(&mut self, bytes: usize) -> &mut Self {
        self.max_stack_bytes = bytes;
        self
    }

    /// Size, in 64-bit slots, of the value arena allocated for each call chain.
    pub fn initial_arena_slots(&mut self, slots: usize) -> &mut Self {
        self.initial_arena_slots = slots.max(1);
        self
    }

    /// Decode and type-check every function body while loading the module
    /// instead of on first call.
    pub fn eager_validation(&mut self, eager: bool) -> &mut Self {
        self.eager_validation = eager;
        self
    }

    pub fn max_memory_pages(&mut self, pages: u32) -> &mut Self {
        self.max_memory_pages = pages.min(65536);
        self
    }
}

/// Shared compilation configuration.
#[derive(Debug, Clone)]
pub struct Engine {
    features: WasmFeatures,
    config: Config,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        // Wasm 1.0 plus the numeric and multi-value extensions the decoder
        // understands. One table and one memory, no reference types.
        let features = WasmFeatures::WASM1
            | WasmFeatures::SATURATING_FLOAT_TO_INT
            | WasmFeatures::SIGN_EXTENSION
            | WasmFeatures::MULTI_VALUE;
        Engine {
            features,
            config: config.clone(),
        }
    }

    /// Create a new validator with the engine's features.
    pub fn new_validator(&self) -> Validator {
        Validator::new_with_features(self.features)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(&Config::default())
    }
}
