//! Timeout-guarded emission.
//!
//! Code generation runs on a worker thread writing into a shared buffer;
//! the calling thread polls completion on a 100 ms tick against a
//! wall-clock deadline and an output-size cap. On timeout or overflow the
//! worker is detached — a controlled leak on a path where the process is
//! about to exit anyway — and a descriptive error suggests lowering `-O`.
//!
//! The worker owns its clone of the program; the main thread neither reads
//! nor writes it until the worker reports completion.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cm_mir::MirProgram;

use crate::{Backend, CodegenError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_OUTPUT_SIZE: usize = 100 * 1024 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An `io::Write` the watchdog can observe while the worker writes.
#[derive(Clone)]
struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    fn take(&self) -> Vec<u8> {
        self.data
            .lock()
            .map(|mut d| std::mem::take(&mut *d))
            .unwrap_or_default()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.data.lock() {
            Ok(mut data) => {
                data.extend_from_slice(buf);
                Ok(buf.len())
            }
            Err(_) => Err(io::Error::other("emission buffer poisoned")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `backend.emit` under the deadline and size cap, returning the
/// produced bytes.
pub fn generate_guarded(
    backend: Box<dyn Backend>,
    program: MirProgram,
    triple: String,
    opt_level: u8,
    timeout: Duration,
    max_output_size: usize,
) -> Result<Vec<u8>, CodegenError> {
    let buffer = SharedBuffer::new();
    let done = Arc::new(AtomicBool::new(false));
    let result: Arc<Mutex<Option<Result<(), CodegenError>>>> = Arc::new(Mutex::new(None));

    let worker = {
        let mut out = buffer.clone();
        let done = Arc::clone(&done);
        let result = Arc::clone(&result);
        std::thread::spawn(move || {
            let emitted = backend.emit(&program, &triple, opt_level, &mut out);
            if let Ok(mut slot) = result.lock() {
                *slot = Some(emitted);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let deadline = Instant::now() + timeout;
    loop {
        if done.load(Ordering::SeqCst) {
            break;
        }
        if Instant::now() > deadline {
            // Detach: abandoning the worker leaks its resources, which is
            // accepted on this failure path — the compile exits shortly.
            drop(worker);
            return Err(CodegenError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        if buffer.len() > max_output_size {
            drop(worker);
            return Err(CodegenError::OutputTooLarge {
                limit_mb: max_output_size / (1024 * 1024),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    // Normal completion: reap the worker.
    let _ = worker.join();
    let outcome = match result.lock() {
        Ok(mut slot) => match slot.take() {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(e),
            None => Err(CodegenError::Io("emission worker produced no result".into())),
        },
        Err(_) => Err(CodegenError::Io("emission result lock poisoned".into())),
    };
    outcome.map(|()| buffer.take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct InstantBackend;
    impl Backend for InstantBackend {
        fn name(&self) -> &'static str {
            "instant"
        }
        fn emit(
            &self,
            _program: &MirProgram,
            _triple: &str,
            _opt_level: u8,
            out: &mut dyn io::Write,
        ) -> Result<(), CodegenError> {
            out.write_all(b"artifact").map_err(|e| CodegenError::Io(e.to_string()))
        }
    }

    struct HangingBackend;
    impl Backend for HangingBackend {
        fn name(&self) -> &'static str {
            "hanging"
        }
        fn emit(
            &self,
            _program: &MirProgram,
            _triple: &str,
            _opt_level: u8,
            _out: &mut dyn io::Write,
        ) -> Result<(), CodegenError> {
            loop {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    struct FirehoseBackend;
    impl Backend for FirehoseBackend {
        fn name(&self) -> &'static str {
            "firehose"
        }
        fn emit(
            &self,
            _program: &MirProgram,
            _triple: &str,
            _opt_level: u8,
            out: &mut dyn io::Write,
        ) -> Result<(), CodegenError> {
            let chunk = vec![0u8; 64 * 1024];
            loop {
                if out.write_all(&chunk).is_err() {
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn normal_emission_returns_bytes() {
        let data = generate_guarded(
            Box::new(InstantBackend),
            MirProgram::default(),
            "t".into(),
            0,
            Duration::from_secs(5),
            MAX_OUTPUT_SIZE,
        )
        .unwrap();
        assert_eq!(data, b"artifact");
    }

    #[test]
    fn hanging_backend_times_out() {
        let err = generate_guarded(
            Box::new(HangingBackend),
            MirProgram::default(),
            "t".into(),
            0,
            Duration::from_millis(300),
            MAX_OUTPUT_SIZE,
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::Timeout { .. }), "{err}");
    }

    #[test]
    fn oversized_output_is_capped() {
        let err = generate_guarded(
            Box::new(FirehoseBackend),
            MirProgram::default(),
            "t".into(),
            0,
            Duration::from_secs(10),
            256 * 1024,
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::OutputTooLarge { .. }), "{err}");
    }
}
