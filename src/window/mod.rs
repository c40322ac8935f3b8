//! Anchor window and its message loop.
//!
//! Interactive token requests need a window to parent their UI to, and the
//! thread owning that window must keep pumping messages while the request is
//! outstanding. The token flow therefore runs on a worker thread; the calling
//! thread pumps the loop until the worker asks the anchor to go away.

#[cfg(windows)]
pub mod win32;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use thiserror::Error;

/// Raw native window handle, safe to hand across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowHandle(pub isize);

#[derive(Debug, Error)]
pub enum WindowError {
    #[cfg(windows)]
    #[error("CreateWindowExW failed: {0}")]
    Create(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("GetMessageW failed: {0}")]
    MessageLoop(#[source] windows::core::Error),

    #[error("Failed to start the orchestration thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("The orchestration task panicked")]
    TaskPanicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum AnchorState {
    Created = 0,
    Running = 1,
    DestroyRequested = 2,
    Destroyed = 3,
}

impl AnchorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AnchorState::Created,
            1 => AnchorState::Running,
            2 => AnchorState::DestroyRequested,
            _ => AnchorState::Destroyed,
        }
    }
}

/// Forward-only state shared between the loop thread and destroy requests.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl Default for StateCell {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(AnchorState::Created as u8)))
    }
}

impl StateCell {
    pub fn get(&self) -> AnchorState {
        AnchorState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves to `to` unless already there or beyond. Returns whether it moved.
    pub fn advance(&self, to: AnchorState) -> bool {
        self.0.fetch_max(to as u8, Ordering::SeqCst) < to as u8
    }

    /// Marks the loop as exited. A destroy that did not come through
    /// [`Anchor::destroyer`] still passes through `DestroyRequested`, and
    /// is reported by returning `true`.
    pub fn finish(&self) -> bool {
        let unrequested = self.advance(AnchorState::DestroyRequested);
        self.advance(AnchorState::Destroyed);
        unrequested
    }
}

pub type DestroyFn = Box<dyn Fn() + Send + 'static>;

pub trait Anchor {
    fn handle(&self) -> WindowHandle;

    fn state(&self) -> AnchorState;

    /// Returns a callable, usable from any thread, that asks the window to
    /// destroy itself. Only the first call has an effect.
    fn destroyer(&self) -> DestroyFn;

    /// Pumps messages on the calling thread until the window is destroyed.
    /// Every anchor enters `Running` when its loop starts.
    fn run_message_loop(&mut self) -> Result<(), WindowError>;
}

struct DestroyOnDrop(DestroyFn);

impl Drop for DestroyOnDrop {
    fn drop(&mut self) {
        (self.0)()
    }
}

/// Runs `task` on a worker thread while this thread pumps `anchor`'s loop.
///
/// The anchor is destroyed when the task returns or panics; the task's exit
/// code is returned once the loop has unwound.
pub fn run_until_complete<A, F>(anchor: &mut A, task: F) -> Result<i32, WindowError>
where
    A: Anchor,
    F: FnOnce(WindowHandle) -> i32 + Send + 'static,
{
    let window = anchor.handle();
    let guard = DestroyOnDrop(anchor.destroyer());

    let worker = thread::Builder::new()
        .name("orchestrator".to_string())
        .spawn(move || {
            let _guard = guard;
            task(window)
        })?;

    let pumped = anchor.run_message_loop();
    tracing::debug!("Anchor loop exited in state {:?}", anchor.state());
    let exit_code = worker.join().map_err(|_| WindowError::TaskPanicked);

    pumped?;
    exit_code
}

// -- Headless anchor ----------------------------------------------------------

enum LoopMessage {
    Close,
}

/// Channel-backed anchor for hosts without a native window system.
pub struct HeadlessAnchor {
    sender: Sender<LoopMessage>,
    receiver: Receiver<LoopMessage>,
    state: StateCell,
}

impl HeadlessAnchor {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            state: StateCell::default(),
        }
    }
}

impl Default for HeadlessAnchor {
    fn default() -> Self {
        Self::new()
    }
}

impl Anchor for HeadlessAnchor {
    fn handle(&self) -> WindowHandle {
        WindowHandle(0)
    }

    fn state(&self) -> AnchorState {
        self.state.get()
    }

    fn destroyer(&self) -> DestroyFn {
        let sender = self.sender.clone();
        let state = self.state.clone();

        Box::new(move || {
            if state.advance(AnchorState::DestroyRequested) {
                let _ = sender.send(LoopMessage::Close);
            }
        })
    }

    fn run_message_loop(&mut self) -> Result<(), WindowError> {
        self.state.advance(AnchorState::Running);

        while let Ok(message) = self.receiver.recv() {
            match message {
                LoopMessage::Close => break,
            }
        }

        if self.state.finish() {
            tracing::debug!("Headless anchor closed without a destroy request");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn state_only_moves_forward() {
        let state = StateCell::default();
        assert_eq!(state.get(), AnchorState::Created);

        assert!(state.advance(AnchorState::Running));
        assert!(state.advance(AnchorState::DestroyRequested));
        assert!(!state.advance(AnchorState::Running));
        assert!(!state.advance(AnchorState::DestroyRequested));
        assert_eq!(state.get(), AnchorState::DestroyRequested);

        assert!(state.advance(AnchorState::Destroyed));
        assert_eq!(state.get(), AnchorState::Destroyed);
    }

    #[test]
    fn finish_never_skips_destroy_requested() {
        let external = StateCell::default();
        external.advance(AnchorState::Running);
        assert!(external.finish());
        assert_eq!(external.get(), AnchorState::Destroyed);

        let requested = StateCell::default();
        requested.advance(AnchorState::Running);
        requested.advance(AnchorState::DestroyRequested);
        assert!(!requested.finish());
        assert_eq!(requested.get(), AnchorState::Destroyed);
    }

    #[test]
    fn anchor_is_running_while_the_task_runs() {
        let mut anchor = HeadlessAnchor::new();
        let state = anchor.state.clone();
        assert_eq!(anchor.state(), AnchorState::Created);

        let code = run_until_complete(&mut anchor, move |_| {
            // The loop may not have started yet; it cannot be past Running
            // before this task returns.
            while state.get() == AnchorState::Created {
                thread::yield_now();
            }
            if state.get() == AnchorState::Running {
                0
            } else {
                1
            }
        })
        .unwrap();

        assert_eq!(code, 0);
        assert_eq!(anchor.state(), AnchorState::Destroyed);
    }

    #[test]
    fn close_without_destroy_request_still_ends_destroyed() {
        let mut anchor = HeadlessAnchor::new();
        anchor.sender.send(LoopMessage::Close).unwrap();

        anchor.run_message_loop().unwrap();

        assert_eq!(anchor.state(), AnchorState::Destroyed);
    }

    #[test]
    fn loop_exits_with_task_exit_code() {
        let mut anchor = HeadlessAnchor::new();
        assert_eq!(anchor.state(), AnchorState::Created);

        let code = run_until_complete(&mut anchor, |_| 7).unwrap();

        assert_eq!(code, 7);
        assert_eq!(anchor.state(), AnchorState::Destroyed);
    }

    #[test]
    fn task_receives_anchor_handle() {
        let mut anchor = HeadlessAnchor::new();
        let expected = anchor.handle();

        let code = run_until_complete(&mut anchor, move |window| {
            if window == expected {
                0
            } else {
                1
            }
        })
        .unwrap();

        assert_eq!(code, 0);
    }

    #[test]
    fn panicking_task_still_stops_the_loop() {
        let mut anchor = HeadlessAnchor::new();

        let result = run_until_complete(&mut anchor, |_| panic!("platform call blew up"));

        assert!(matches!(result, Err(WindowError::TaskPanicked)));
        assert_eq!(anchor.state(), AnchorState::Destroyed);
    }

    #[test]
    fn loop_keeps_running_until_task_finishes() {
        let mut anchor = HeadlessAnchor::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        run_until_complete(&mut anchor, move |_| {
            thread::sleep(std::time::Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
            0
        })
        .unwrap();

        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn repeated_destroy_requests_are_ignored() {
        let mut anchor = HeadlessAnchor::new();
        let destroy = anchor.destroyer();

        destroy();
        destroy();
        assert_eq!(anchor.state(), AnchorState::DestroyRequested);

        anchor.run_message_loop().unwrap();
        assert_eq!(anchor.state(), AnchorState::Destroyed);
    }
}
