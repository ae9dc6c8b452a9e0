//! Engine loaded from the execution context image.
//!
//! The image is a shared library exporting:
//!
//! ```text
//! int32_t infomap_execute(const char *const *argv, size_t argc,
//!                         void (*emit)(void *ctx, const uint8_t *ptr, size_t len),
//!                         void *ctx);
//! ```
//!
//! `argv` follows the Infomap command line: program name, the job's
//! arguments, the network file and the output directory. The engine runs
//! with the scratch directory as working directory.

use std::collections::BTreeMap;
use std::ffi::{CString, c_char, c_void};

use infomap_core::{Engine, Error, JobPayload, Result};
use libloading::{Library, Symbol};

use crate::scratch::Scratch;

/// Exported entry point of the engine library.
const ENTRY_SYMBOL: &[u8] = b"infomap_execute";

type EmitFn = unsafe extern "C" fn(*mut c_void, *const u8, usize);
type EntryFn = unsafe extern "C" fn(*const *const c_char, usize, EmitFn, *mut c_void) -> i32;

/// Runs the engine shipped in each job's payload.
pub struct DylibEngine;

impl Engine for DylibEngine {
    fn execute(
        &self,
        job: &JobPayload,
        output: &mut dyn FnMut(&str),
    ) -> Result<BTreeMap<String, String>> {
        let mut scratch = Scratch::new()?;
        scratch.write_input(&job.input_filename, &job.input_data)?;
        for (name, content) in &job.files {
            scratch.write_input(name, content)?;
        }

        let engine_path = scratch.write_engine(&job.mem_buffer)?;
        // SAFETY: the image comes from the orchestrator's provisioned context.
        let library = unsafe { Library::new(&engine_path) }
            .map_err(|e| Error::Engine(format!("Failed to load engine image: {}", e)))?;
        let entry: Symbol<EntryFn> = unsafe { library.get(ENTRY_SYMBOL) }
            .map_err(|e| Error::Engine(format!("Failed to get symbol: {}", e)))?;

        let argv = command_line(job)?;
        let argv_ptrs: Vec<*const c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();

        tracing::debug!("Running {} in {}", job.id, scratch.path().display());
        let previous_dir = std::env::current_dir()?;
        std::env::set_current_dir(scratch.path())?;

        let mut sink = Utf8Sink::new(output);
        let code = unsafe {
            entry(
                argv_ptrs.as_ptr(),
                argv_ptrs.len(),
                emit_trampoline,
                &mut sink as *mut Utf8Sink<'_> as *mut c_void,
            )
        };
        sink.finish();

        std::env::set_current_dir(previous_dir)?;
        drop(library);

        match code {
            0 => scratch.collect_outputs(&job.out_name),
            code => Err(Error::Engine(format!("Infomap exited with code {}", code))),
        }
    }
}

fn command_line(job: &JobPayload) -> Result<Vec<CString>> {
    std::iter::once("Infomap")
        .chain(job.arguments.iter().map(String::as_str))
        .chain([job.input_filename.as_str(), "."])
        .map(|arg| {
            CString::new(arg)
                .map_err(|_| Error::Engine(format!("Argument contains a NUL byte: {:?}", arg)))
        })
        .collect()
}

/// Turns the engine's byte chunks into text.
///
/// A multibyte character split across two chunks is held back until its
/// remaining bytes arrive.
struct Utf8Sink<'a> {
    output: &'a mut dyn FnMut(&str),
    pending: Vec<u8>,
}

impl<'a> Utf8Sink<'a> {
    fn new(output: &'a mut dyn FnMut(&str)) -> Self {
        Self {
            output,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let mut text = String::new();
        let mut rest = self.pending.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        if !text.is_empty() {
            (self.output)(&text);
        }
    }

    /// Emit whatever is still buffered once the engine has returned.
    fn finish(&mut self) {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            (self.output)(&String::from_utf8_lossy(&tail));
        }
    }
}

/// Forwards engine output to the job's output callback.
unsafe extern "C" fn emit_trampoline(ctx: *mut c_void, ptr: *const u8, len: usize) {
    if ctx.is_null() || (ptr.is_null() && len > 0) {
        return;
    }
    // SAFETY: `ctx` is the `Utf8Sink` passed to the entry point, alive for
    // the duration of the call.
    let sink = unsafe { &mut *(ctx as *mut Utf8Sink<'_>) };
    if len == 0 {
        return;
    }
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
    sink.push(bytes);
}
