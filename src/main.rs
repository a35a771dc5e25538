#![windows_subsystem = "windows"]

// MicGuard only manages Windows audio endpoints.
#[cfg(not(windows))]
fn main() {}

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    tray_app::run()
}

#[cfg(windows)]
mod tray_app {
    use std::cell::RefCell;
    use std::time::Duration;

    use anyhow::Context;
    use tracing::{error, info};
    use windows::core::*;
    use windows::Win32::Foundation::*;
    use windows::Win32::System::Com::*;
    use windows::Win32::UI::WindowsAndMessaging::*;

    use mic_guard::app::{AppState, GuardMessage, UiAction, APP_TITLE, WM_GUARD_MESSAGE, WM_TRAY_ICON};
    use mic_guard::ui::menu::show_context_menu;
    use mic_guard::ui::MenuCommand;
    use mic_guard::{logging, AppConfig};

    thread_local! {
        static APP_STATE: RefCell<Option<AppState>> = const { RefCell::new(None) };
    }

    /// Run `f` against the application state.
    ///
    /// Returns None before startup, after shutdown, or while a nested
    /// message loop already holds the state.
    fn with_app_state<F, R>(f: F) -> Option<R>
    where
        F: FnOnce(&mut AppState) -> R,
    {
        APP_STATE.with(|state| {
            let mut state = state.try_borrow_mut().ok()?;
            state.as_mut().map(f)
        })
    }

    fn message_box(text: &str, title: &str, style: MESSAGEBOX_STYLE) {
        let text_wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
        let title_wide: Vec<u16> = title.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            MessageBoxW(None, PCWSTR(text_wide.as_ptr()), PCWSTR(title_wide.as_ptr()), MB_OK | style);
        }
    }

    fn show_error(msg: &str) {
        message_box(msg, APP_TITLE, MB_ICONERROR);
    }

    fn show_about() {
        message_box(
            &format!("MicGuard {}\nDefault microphone tray manager", env!("CARGO_PKG_VERSION")),
            "About MicGuard",
            MB_ICONINFORMATION,
        );
    }

    pub fn run() -> anyhow::Result<()> {
        let config = match AppConfig::load() {
            Ok(config) => config,
            Err(e) => {
                show_error(&format!("Cannot locate MicGuard files.\n{e:#}"));
                return Err(e);
            }
        };
        logging::init(&config.log_path);
        info!(
            version = env!("CARGO_PKG_VERSION"),
            policy = %config.policy_path.display(),
            "MicGuard starting"
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("micguard-worker")
            .enable_all()
            .build()
            .context("cannot start async runtime")?;

        unsafe {
            if let Err(e) = CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok() {
                show_error(&format!("COM init failed: {e}"));
                return Err(e.into());
            }

            let result = run_message_loop(&config, runtime.handle().clone());
            CoUninitialize();
            runtime.shutdown_timeout(Duration::from_secs(2));

            if let Err(e) = &result {
                error!(error = %format!("{e:#}"), "MicGuard stopped with an error");
            }
            result
        }
    }

    unsafe fn run_message_loop(config: &AppConfig, runtime: tokio::runtime::Handle) -> anyhow::Result<()> {
        // Create hidden message window
        let instance = windows::Win32::System::LibraryLoader::GetModuleHandleW(None)?;

        let window_class = w!("MicGuardWindow");
        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(window_proc),
            hInstance: instance.into(),
            lpszClassName: window_class,
            ..Default::default()
        };
        RegisterClassExW(&wc);

        let hwnd = CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            window_class,
            w!("MicGuard"),
            WS_OVERLAPPEDWINDOW,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            None,
            None,
            instance,
            None,
        )?;

        let app = match AppState::new(hwnd, config, runtime) {
            Ok(app) => app,
            Err(e) => {
                show_error(&format!("MicGuard failed to start.\n{e:#}"));
                let _ = DestroyWindow(hwnd);
                return Err(e);
            }
        };
        APP_STATE.with(|state| *state.borrow_mut() = Some(app));
        info!("tray ready");

        // Deliver anything the startup evaluation queued before the state was installed
        let _ = PostMessageW(hwnd, WM_GUARD_MESSAGE, WPARAM(0), LPARAM(0));

        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).into() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        Ok(())
    }

    fn perform(action: UiAction) {
        match action {
            UiAction::None => {}
            UiAction::ShowError(message) => show_error(&message),
            UiAction::ShowAbout => show_about(),
            UiAction::Exit => {
                if let Some(hwnd) = with_app_state(|app| app.hwnd()) {
                    unsafe {
                        let _ = DestroyWindow(hwnd);
                    }
                }
            }
        }
    }

    fn dispatch_command(command: MenuCommand) {
        if let Some(action) = with_app_state(|app| app.handle_command(command)) {
            perform(action);
        }
    }

    fn show_menu(hwnd: HWND) {
        let Some(model) = with_app_state(|app| app.menu_model()) else {
            return;
        };

        let mut pt = POINT::default();
        unsafe {
            let _ = GetCursorPos(&mut pt);
        }

        match show_context_menu(hwnd, pt.x, pt.y, &model) {
            Ok(Some(command)) => dispatch_command(command),
            Ok(None) => {}
            Err(e) => error!(error = %e, "failed to show context menu"),
        }
    }

    fn deliver_guard_messages() {
        let Some(messages) = with_app_state(|app| app.drain_inbox()) else {
            return;
        };

        for message in messages {
            match message {
                GuardMessage::Notice(text) => {
                    with_app_state(|app| app.show_notice(&text));
                }
                GuardMessage::Failure(text) => show_error(&text),
            }
        }
    }

    unsafe extern "system" fn window_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        match msg {
            WM_TRAY_ICON => {
                let event = (lparam.0 & 0xFFFF) as u32;
                match event {
                    WM_RBUTTONUP => show_menu(hwnd),
                    WM_LBUTTONDBLCLK => {
                        with_app_state(|app| app.refresh());
                    }
                    _ => {}
                }
                LRESULT(0)
            }
            WM_GUARD_MESSAGE => {
                deliver_guard_messages();
                LRESULT(0)
            }
            WM_COMMAND => {
                let cmd_id = (wparam.0 & 0xFFFF) as u32;
                if let Some(command) = MenuCommand::from_id(cmd_id) {
                    dispatch_command(command);
                }
                LRESULT(0)
            }
            WM_DESTROY => {
                let app = APP_STATE.with(|state| state.try_borrow_mut().ok().and_then(|mut s| s.take()));
                if let Some(app) = app {
                    app.shutdown();
                }
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}
