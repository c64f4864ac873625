use std::sync::{Arc, Mutex, MutexGuard};

use super::mode::Mode;

/// Command and mode, always read and written together.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CommandState {
    pub command: [f32; 3],
    pub mode: Mode,
}

/// Command state shared between the control loop and the keyboard thread.
///
/// Every access goes through [`SharedCommand::update`] or
/// [`SharedCommand::get`], so a read-modify-write never interleaves with
/// another writer.
#[derive(Clone, Debug, Default)]
pub struct SharedCommand {
    inner: Arc<Mutex<CommandState>>,
}

impl SharedCommand {
    pub fn new(command: [f32; 3], mode: Mode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CommandState { command, mode })),
        }
    }

    // A panicking writer cannot leave the plain-data state half-written.
    fn lock(&self) -> MutexGuard<'_, CommandState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> CommandState {
        *self.lock()
    }

    pub fn command(&self) -> [f32; 3] {
        self.lock().command
    }

    /// Runs `f` with the lock held and returns its result.
    pub fn update<R>(&self, f: impl FnOnce(&mut CommandState) -> R) -> R {
        f(&mut *self.lock())
    }

    pub fn set_command(&self, command: [f32; 3]) {
        self.update(|state| state.command = command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_update_returns_closure_result() {
        let shared = SharedCommand::new([0.1, 0.0, 0.0], Mode::Walk);
        let mode = shared.update(|s| {
            s.mode = s.mode.next();
            s.mode
        });
        assert_eq!(mode, Mode::Run);
        assert_eq!(shared.get(), CommandState { command: [0.1, 0.0, 0.0], mode: Mode::Run });
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let shared = SharedCommand::default();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        shared.update(|s| s.command[0] += 1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.command()[0], 4000.0);
    }
}
