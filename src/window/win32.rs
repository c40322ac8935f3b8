use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DispatchMessageW, GetClientRect, GetDesktopWindow,
    GetMessageW, LoadCursorW, PostMessageW, PostQuitMessage, RegisterClassExW, ShowWindow,
    TranslateMessage, UpdateWindow, CS_HREDRAW, CS_VREDRAW, IDC_ARROW, MSG, SW_SHOWNORMAL,
    WINDOW_EX_STYLE, WM_CLOSE, WM_DESTROY, WNDCLASSEXW, WS_POPUP,
};

use super::{Anchor, AnchorState, DestroyFn, StateCell, WindowError, WindowHandle};

const CLASS_NAME: PCWSTR = w!("GetTokenAnchorWindow");

extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_DESTROY => {
            // SAFETY: called on the thread that owns the message queue.
            unsafe { PostQuitMessage(0) };
            LRESULT(0)
        }
        // WM_CLOSE falls through to DestroyWindow.
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

/// Zero-size popup window centred on the desktop.
pub struct Win32Anchor {
    hwnd: HWND,
    state: StateCell,
}

impl Win32Anchor {
    /// Registers the window class, creates the window and shows it.
    ///
    /// The window has no visible area, but it must be shown for the WAM
    /// dialog parented to it to come to the foreground.
    pub fn create() -> Result<Self, WindowError> {
        // SAFETY: plain Win32 calls with valid, stack-owned arguments.
        let hwnd = unsafe {
            let instance = GetModuleHandleW(None).map_err(WindowError::Create)?;

            let class = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(wnd_proc),
                hInstance: instance.into(),
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };
            // A zero atom means the class already exists; creation reports real failures.
            RegisterClassExW(&class);

            let mut desktop = RECT::default();
            let _ = GetClientRect(GetDesktopWindow(), &mut desktop);

            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                CLASS_NAME,
                w!("Anchor Window"),
                WS_POPUP,
                desktop.right / 2,
                desktop.bottom / 2,
                0,
                0,
                None,
                None,
                instance,
                None,
            )
            .map_err(WindowError::Create)?
        };

        let state = StateCell::default();

        // SAFETY: `hwnd` was just created on this thread.
        unsafe {
            let _ = ShowWindow(hwnd, SW_SHOWNORMAL);
            let _ = UpdateWindow(hwnd);
        }
        tracing::debug!("Anchor window created: {:?}", hwnd);

        Ok(Self { hwnd, state })
    }
}

impl Anchor for Win32Anchor {
    fn handle(&self) -> WindowHandle {
        WindowHandle(self.hwnd.0 as isize)
    }

    fn state(&self) -> AnchorState {
        self.state.get()
    }

    fn destroyer(&self) -> DestroyFn {
        let raw = self.hwnd.0 as isize;
        let state = self.state.clone();

        Box::new(move || {
            if state.advance(AnchorState::DestroyRequested) {
                // SAFETY: posting is allowed from any thread; a stale handle only fails the post.
                let posted = unsafe {
                    PostMessageW(HWND(raw as *mut _), WM_CLOSE, WPARAM(0), LPARAM(0))
                };
                if let Err(e) = posted {
                    tracing::warn!("Failed to post WM_CLOSE to the anchor window: {}", e);
                }
            }
        })
    }

    fn run_message_loop(&mut self) -> Result<(), WindowError> {
        self.state.advance(AnchorState::Running);
        let mut msg = MSG::default();

        loop {
            // SAFETY: `msg` outlives the call.
            let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match ret.0 {
                0 => break,
                -1 => return Err(WindowError::MessageLoop(windows::core::Error::from_win32())),
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }

        if self.state.finish() {
            tracing::debug!("Anchor window destroyed without a destroy request");
        }
        tracing::debug!("Anchor window message loop exited");
        Ok(())
    }
}
