// This module is the C-callable boundary of hlc. A host process that knows nothing about LLVM
// drives the whole module lifecycle through these hlc_* functions: initialize a context,
// parse text or bitcode into a module handle, optimize, link, print and emit, then destroy
// the handle and finalize. Each calling thread gets its own Runtime (LLVM contexts must not
// be shared across threads), created idempotently by hlc_initialize and torn down with every
// live module by hlc_finalize. Module handles are non-zero ids drawn from one process-wide
// counter and are never reused, not even after a finalize, so a destroyed, unknown or stale
// handle is reported as a failure instead of reaching another module. No error crosses the
// boundary as a panic: every function returns a status (0 or a null handle on failure) and
// records the diagnostic for hlc_last_error. Failures are logged and counted once, by the
// thread's Runtime. Strings and buffers handed out are owned by the caller and must be
// returned through hlc_dispose_string / hlc_dispose_buffer.

//! C-callable boundary.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;

use crate::core::{shutdown, CompileError, CompileResult, Runtime};
use crate::llvm::{IrModule, OptLevel, OptimizationRequest};

/// Module handle. `0` means "no module".
pub type HlcModuleId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

struct Session {
    runtime: NonNull<Runtime>,
    modules: HashMap<HlcModuleId, IrModule<'static>>,
}

impl Session {
    fn new() -> Self {
        let runtime = Box::new(Runtime::initialize());
        Self {
            runtime: NonNull::from(Box::leak(runtime)),
            modules: HashMap::new(),
        }
    }

    fn runtime(&self) -> &'static Runtime {
        // SAFETY: the runtime is only freed in `Drop`, after every module
        // borrowing it has been dropped.
        unsafe { self.runtime.as_ref() }
    }

    /// Count a failure raised by the boundary itself.
    fn check<T>(&self, result: CompileResult<T>) -> CompileResult<T> {
        self.runtime().check(result)
    }

    fn runtime_mut(&mut self) -> CompileResult<&mut Runtime> {
        if !self.modules.is_empty() {
            return self.check(Err(CompileError::InvalidOption {
                reason: "backend options must be set while no module is alive".to_string(),
            }));
        }
        // SAFETY: no module, and therefore no borrow of the runtime, exists.
        Ok(unsafe { self.runtime.as_mut() })
    }

    fn insert(&mut self, module: IrModule<'static>) -> HlcModuleId {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        self.modules.insert(id, module);
        id
    }

    fn module(&self, id: HlcModuleId) -> CompileResult<&IrModule<'static>> {
        let runtime = self.runtime();
        runtime.check(self.modules.get(&id).ok_or(CompileError::InvalidHandle { id }))
    }

    fn module_mut(&mut self, id: HlcModuleId) -> CompileResult<&mut IrModule<'static>> {
        let runtime = self.runtime();
        runtime.check(self.modules.get_mut(&id).ok_or(CompileError::InvalidHandle { id }))
    }

    fn take(&mut self, id: HlcModuleId) -> CompileResult<IrModule<'static>> {
        let runtime = self.runtime();
        runtime.check(self.modules.remove(&id).ok_or(CompileError::InvalidHandle { id }))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let live = self.modules.len();
        self.modules.clear();
        // SAFETY: allocated by `Box::leak` in `Session::new`; all borrowers are gone.
        let runtime = unsafe { Box::from_raw(self.runtime.as_ptr()) };
        log::debug!("releasing thread context with {} live module(s)", live);
        runtime.finalize();
    }
}

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(text));
}

/// Run `f` against this thread's session, turning errors into `None`.
///
/// `f` must pass every error through the runtime, which logs and counts it.
fn with_session<R>(f: impl FnOnce(&mut Session) -> CompileResult<R>) -> Option<R> {
    SESSION.with(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(session) = slot.as_mut() else {
            log::warn!("hlc call on a thread without a context");
            set_last_error("hlc_initialize has not been called on this thread");
            return None;
        };
        match f(session) {
            Ok(value) => Some(value),
            Err(err) => {
                set_last_error(err.to_string());
                None
            }
        }
    })
}

fn require<T>(pointer: *mut T, name: &'static str) -> CompileResult<()> {
    if pointer.is_null() {
        Err(CompileError::NullArgument { name })
    } else {
        Ok(())
    }
}

fn into_c_string(text: String) -> CompileResult<*mut c_char> {
    CString::new(text)
        .map(CString::into_raw)
        .map_err(|e| CompileError::CodeGeneration {
            reason: format!("output contains a NUL byte: {e}"),
        })
}

fn status(ok: Option<()>) -> c_int {
    ok.is_some() as c_int
}

/// Create this thread's context. Calling it again is a no-op.
#[no_mangle]
pub extern "C" fn hlc_initialize() {
    SESSION.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(Session::new());
        }
    });
}

/// Destroy this thread's context and every module still alive in it.
#[no_mangle]
pub extern "C" fn hlc_finalize() {
    let session = SESSION.with(|slot| slot.borrow_mut().take());
    drop(session);
}

/// Finalize and release LLVM's process-wide state.
///
/// # Safety
///
/// Must be the last hlc call in the process, on any thread.
#[no_mangle]
pub unsafe extern "C" fn hlc_shutdown() {
    hlc_finalize();
    shutdown();
}

/// Apply backend flags. Returns 1 on success.
///
/// Flags hlc does not know are handed to LLVM, which terminates the process
/// on a flag it does not recognise either. Fails while modules are alive.
///
/// # Safety
///
/// `argv` must point to `argc` valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn hlc_set_command_line_options(argc: c_int, argv: *const *const c_char) -> c_int {
    let args: Vec<String> = if argv.is_null() || argc <= 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(argv, argc as usize)
            .iter()
            .filter(|arg| !arg.is_null())
            .map(|&arg| CStr::from_ptr(arg).to_string_lossy().into_owned())
            .collect()
    };
    status(with_session(|session| {
        let result = session.runtime_mut()?.set_command_line_options(&args);
        session.check(result)
    }))
}

/// Parse IR text. Returns the new handle or 0.
///
/// # Safety
///
/// `text` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hlc_parse_module(text: *const c_char) -> HlcModuleId {
    let source = if text.is_null() { None } else { Some(CStr::from_ptr(text)) };
    with_session(|session| {
        let source = session.check(
            source
                .ok_or(CompileError::NullArgument { name: "IR text" })
                .and_then(|text| {
                    text.to_str().map_err(|e| CompileError::Parse {
                        message: e.to_string(),
                    })
                }),
        )?;
        let module = session.runtime().parse_text(source)?;
        Ok(session.insert(module))
    })
    .unwrap_or(0)
}

/// Decode bitcode. Returns the new handle or 0.
///
/// # Safety
///
/// `data` must be null or point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn hlc_parse_bitcode(data: *const u8, len: usize) -> HlcModuleId {
    let bytes: &[u8] = if data.is_null() { &[] } else { std::slice::from_raw_parts(data, len) };
    with_session(|session| {
        let module = session.runtime().parse_bitcode(bytes)?;
        Ok(session.insert(module))
    })
    .unwrap_or(0)
}

/// Print a module as IR text into `*output`. Returns 1 on success.
///
/// # Safety
///
/// `output` must be null or a valid pointer to write to.
#[no_mangle]
pub unsafe extern "C" fn hlc_module_print(module: HlcModuleId, output: *mut *mut c_char) -> c_int {
    let text = with_session(|session| {
        session.check(require(output, "output"))?;
        let text = session.module(module)?.serialize();
        session.check(into_c_string(text))
    });
    match text {
        Some(text) => {
            *output = text;
            1
        }
        None => 0,
    }
}

/// Destroy a module. The handle is invalid afterwards. Returns 1 on success.
#[no_mangle]
pub extern "C" fn hlc_module_destroy(module: HlcModuleId) -> c_int {
    status(with_session(|session| {
        session.take(module)?.destroy();
        Ok(())
    }))
}

/// Optimize a module in place. Returns 1 on success.
///
/// Out-of-range levels fail without touching the module.
#[no_mangle]
pub extern "C" fn hlc_module_optimize(module: HlcModuleId, opt_level: c_int, size_level: c_int, verify: c_int) -> c_int {
    status(with_session(|session| {
        let request = session.check(OptimizationRequest::from_raw(
            opt_level.into(),
            size_level.into(),
            verify != 0,
        ))?;
        let runtime = session.runtime();
        runtime.optimize(session.module_mut(module)?, request)
    }))
}

/// Link a copy of `src` into `dst`. Returns 1 on success.
#[no_mangle]
pub extern "C" fn hlc_module_link_in(dst: HlcModuleId, src: HlcModuleId) -> c_int {
    status(with_session(|session| {
        let runtime = session.runtime();
        session.module(src)?;
        let mut target = session.take(dst)?;
        let result = if dst == src {
            runtime
                .check(target.try_clone())
                .and_then(|copy| runtime.link(&mut target, &copy))
        } else {
            session.module(src).and_then(|source| runtime.link(&mut target, source))
        };
        session.modules.insert(dst, target);
        result
    }))
}

/// Emit assembly into `*output`. Returns 1 on success.
///
/// # Safety
///
/// `output` must be null or a valid pointer to write to.
#[no_mangle]
pub unsafe extern "C" fn hlc_module_emit_assembly(module: HlcModuleId, opt_level: c_int, output: *mut *mut c_char) -> c_int {
    let text = with_session(|session| {
        session.check(require(output, "output"))?;
        let level = session.check(OptLevel::try_from(i64::from(opt_level)))?;
        let asm = session.runtime().emit_assembly(session.module(module)?, level)?;
        session.check(into_c_string(asm))
    });
    match text {
        Some(text) => {
            *output = text;
            1
        }
        None => 0,
    }
}

/// Emit object code into `*output`. Returns its length, 0 on failure.
///
/// # Safety
///
/// `output` must be null or a valid pointer to write to.
#[no_mangle]
pub unsafe extern "C" fn hlc_module_emit_object(module: HlcModuleId, opt_level: c_int, output: *mut *mut u8) -> usize {
    let object = with_session(|session| {
        session.check(require(output, "output"))?;
        let level = session.check(OptLevel::try_from(i64::from(opt_level)))?;
        session.runtime().emit_object(session.module(module)?, level)
    });
    match object {
        Some(object) => {
            let bytes = object.into_bytes().into_boxed_slice();
            let len = bytes.len();
            *output = Box::into_raw(bytes) as *mut u8;
            len
        }
        None => 0,
    }
}

/// Copy the thread's last diagnostic into `*output`. Returns 0 if there is none.
///
/// # Safety
///
/// `output` must be a valid pointer to write to.
#[no_mangle]
pub unsafe extern "C" fn hlc_last_error(output: *mut *mut c_char) -> c_int {
    if output.is_null() {
        return 0;
    }
    let message = LAST_ERROR.with(|slot| slot.borrow().clone());
    match message {
        Some(message) => {
            *output = message.into_raw();
            1
        }
        None => {
            *output = ptr::null_mut();
            0
        }
    }
}

/// Release a string returned by hlc.
///
/// # Safety
///
/// `text` must come from hlc and not have been released yet.
#[no_mangle]
pub unsafe extern "C" fn hlc_dispose_string(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

/// Release an object buffer returned by hlc.
///
/// # Safety
///
/// `data`/`len` must come from [`hlc_module_emit_object`] unchanged.
#[no_mangle]
pub unsafe extern "C" fn hlc_dispose_buffer(data: *mut u8, len: usize) {
    if !data.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)));
    }
}
