//! The background key-generation pump.
//!
//! Key generation on small hardware can blow the host's command
//! timeout, so a worker thread keeps one candidate key per slot ready
//! before GENERATE ASYMMETRIC KEY PAIR asks for it.  The pump is
//! purely speculative: it never touches persistent state, and a
//! candidate generated for attributes that have changed in the
//! meantime is discarded.

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use crate::crypto::{Algorithm, PrivateKey};
use crate::types::KeyRole;

/// One candidate cell.
#[derive(Debug)]
pub(crate) enum Candidate {
    /// Generation pending.
    Empty,
    /// A key is ready to be consumed.
    Ready(PrivateKey),
    /// Generation failed for the current attributes; it will not be
    /// retried until the attributes change.
    Failed,
}

struct Shared {
    cells: Mutex<Cells>,
    wakeup: Condvar,
}

struct Cells {
    candidates: [Candidate; 3],
    algorithms: [Algorithm; 3],
    shutdown: bool,
}

/// Handle to the pump owned by the application.
pub(crate) struct Keygen {
    shared: Arc<Shared>,
}

impl Keygen {
    /// Starts the worker for the given per-slot algorithms.
    pub fn start(algorithms: [Algorithm; 3]) -> Keygen {
        let shared = Arc::new(Shared {
            cells: Mutex::new(Cells {
                candidates: [Candidate::Empty, Candidate::Empty,
                             Candidate::Empty],
                algorithms,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name("keygen".into())
            .spawn(move || run(worker))
            .expect("spawning the keygen thread");
        Keygen { shared }
    }

    /// Installs new attributes for a slot, dropping its candidate.
    pub fn set_algorithm(&self, slot: usize, algorithm: Algorithm) {
        let mut cells = self.shared.cells.lock()
            .expect("keygen lock poisoned");
        cells.algorithms[slot] = algorithm;
        cells.candidates[slot] = Candidate::Empty;
        self.shared.wakeup.notify_one();
    }

    /// Takes the candidate of a slot.
    ///
    /// A ready key is handed over and its cell emptied; the worker is
    /// signalled to refill it.  `Empty` and `Failed` are reported
    /// without consuming anything.
    pub fn take(&self, slot: usize) -> Candidate {
        let mut cells = self.shared.cells.lock()
            .expect("keygen lock poisoned");
        match cells.candidates[slot] {
            Candidate::Empty => Candidate::Empty,
            Candidate::Failed => Candidate::Failed,
            Candidate::Ready(_) => {
                let taken = std::mem::replace(&mut cells.candidates[slot],
                                              Candidate::Empty);
                self.shared.wakeup.notify_one();
                taken
            },
        }
    }
}

impl Drop for Keygen {
    fn drop(&mut self) {
        let mut cells = self.shared.cells.lock()
            .expect("keygen lock poisoned");
        cells.shutdown = true;
        self.shared.wakeup.notify_one();
    }
}

fn run(shared: Arc<Shared>) {
    let mut cells = shared.cells.lock().expect("keygen lock poisoned");
    loop {
        if cells.shutdown {
            return;
        }
        let slot = (0..3).find(
            |&i| matches!(cells.candidates[i], Candidate::Empty));
        let slot = match slot {
            Some(slot) => slot,
            None => {
                cells = shared.wakeup.wait(cells)
                    .expect("keygen lock poisoned");
                continue;
            },
        };
        let algorithm = cells.algorithms[slot].clone();
        drop(cells);

        // The slow part runs unlocked; commands are not held up.
        let before = Instant::now();
        let result = PrivateKey::generate(&algorithm);

        cells = shared.cells.lock().expect("keygen lock poisoned");
        if cells.shutdown {
            return;
        }
        if cells.algorithms[slot] != algorithm {
            log::debug!("keygen: discarding slot {} key, \
                         attributes changed during generation", slot);
            continue;
        }
        cells.candidates[slot] = match result {
            Ok(key) => {
                log::debug!("keygen: produced key {} in {:.2?}",
                            slot, before.elapsed());
                Candidate::Ready(key)
            },
            Err(e) => {
                log::error!("keygen: generating key {} failed: {}",
                            slot, e);
                Candidate::Failed
            },
        };
    }
}

impl Keygen {
    /// Starts a pump for freshly blanked attributes.
    pub fn start_default() -> Keygen {
        Keygen::start(KeyRole::ALL.map(Algorithm::default_for))
    }
}
