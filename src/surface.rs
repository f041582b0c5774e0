use image::RgbaImage;
#[cfg(windows)]
use std::sync::atomic::AtomicU64;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Full-screen, always-on-top, cursor-hidden output target created for one
/// effect invocation and destroyed at its end.
///
/// Implementations own their own event handling; pressing Escape while the
/// surface has focus must close it, which `is_open` reports to the render
/// loop.
pub trait PresentationSurface {
    fn open(&mut self, width: u32, height: u32) -> anyhow::Result<()>;
    fn present(&mut self, frame: &RgbaImage) -> anyhow::Result<()>;
    fn is_open(&self) -> bool;
    /// Safe to call multiple times; after the first call the surface and any
    /// thread behind it are gone.
    fn close(&mut self);
}

pub trait SurfaceFactory: Send + Sync {
    fn create(&self) -> Box<dyn PresentationSurface>;
}

pub struct DefaultSurfaceFactory;

impl SurfaceFactory for DefaultSurfaceFactory {
    fn create(&self) -> Box<dyn PresentationSurface> {
        #[cfg(windows)]
        {
            Box::new(GdiSurface::new())
        }
        #[cfg(not(windows))]
        {
            Box::new(UnsupportedSurface)
        }
    }
}

#[cfg(not(windows))]
pub struct UnsupportedSurface;

#[cfg(not(windows))]
impl PresentationSurface for UnsupportedSurface {
    fn open(&mut self, _width: u32, _height: u32) -> anyhow::Result<()> {
        Err(anyhow::anyhow!(
            "the effect surface is not supported on this platform"
        ))
    }

    fn present(&mut self, _frame: &RgbaImage) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// Latest composited frame in the BGRA layout GDI blits from.
#[cfg(windows)]
struct FramePixels {
    width: i32,
    height: i32,
    bgra: Vec<u8>,
}

#[cfg(windows)]
struct SurfaceShared {
    frame: Mutex<Option<FramePixels>>,
    version: AtomicU64,
    last_painted: AtomicU64,
    closed: AtomicBool,
}

#[cfg(windows)]
const REPAINT_TIMER_MS: u32 = 15;

/// Full-screen topmost popup window on its own thread with a message loop.
/// The render loop publishes frames through `present`; the window procedure
/// blits the latest one and handles Escape.
#[cfg(windows)]
pub struct GdiSurface {
    shared: Arc<SurfaceShared>,
    hwnd: Arc<Mutex<Option<isize>>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(windows)]
impl GdiSurface {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SurfaceShared {
                frame: Mutex::new(None),
                version: AtomicU64::new(0),
                last_painted: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            hwnd: Arc::new(Mutex::new(None)),
            thread: None,
        }
    }
}

#[cfg(windows)]
impl Default for GdiSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
impl PresentationSurface for GdiSurface {
    fn open(&mut self, _width: u32, _height: u32) -> anyhow::Result<()> {
        use anyhow::anyhow;
        use std::time::Duration;

        if self.thread.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let hwnd_store = Arc::clone(&self.hwnd);

        // Handshake so open() only returns once the window actually exists.
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<anyhow::Result<()>>(1);

        let join = std::thread::spawn(move || {
            use windows::core::{w, PCWSTR};
            use windows::Win32::Foundation::BOOL;
            use windows::Win32::System::LibraryLoader::GetModuleHandleW;
            use windows::Win32::UI::WindowsAndMessaging::{
                CreateWindowExW, DispatchMessageW, GetMessageW, GetSystemMetrics,
                RegisterClassW, SetForegroundWindow, SetTimer, SetWindowPos, ShowCursor,
                ShowWindow, TranslateMessage, CS_HREDRAW, CS_VREDRAW, HMENU, HWND_TOPMOST,
                MSG, SM_CXSCREEN, SM_CYSCREEN, SWP_NOMOVE, SWP_NOSIZE, SW_SHOW, WNDCLASSW,
                WS_EX_TOPMOST, WS_POPUP,
            };

            unsafe {
                let class_name = w!("ClickjoltEffectSurface");
                let hinstance = GetModuleHandleW(None).unwrap_or_default();
                let wc = WNDCLASSW {
                    style: CS_HREDRAW | CS_VREDRAW,
                    lpfnWndProc: Some(surface_wndproc),
                    hInstance: hinstance.into(),
                    lpszClassName: class_name,
                    ..Default::default()
                };
                let _ = RegisterClassW(&wc);

                let screen_w = GetSystemMetrics(SM_CXSCREEN);
                let screen_h = GetSystemMetrics(SM_CYSCREEN);
                let hwnd = match CreateWindowExW(
                    WS_EX_TOPMOST,
                    wc.lpszClassName,
                    PCWSTR::null(),
                    WS_POPUP,
                    0,
                    0,
                    screen_w,
                    screen_h,
                    None,
                    HMENU::default(),
                    hinstance,
                    None,
                ) {
                    Ok(hwnd) if !hwnd.0.is_null() => hwnd,
                    Ok(_) => {
                        shared.closed.store(true, Ordering::Release);
                        let _ = ready_tx.send(Err(anyhow!(windows::core::Error::from_win32())));
                        return;
                    }
                    Err(e) => {
                        shared.closed.store(true, Ordering::Release);
                        let _ = ready_tx.send(Err(anyhow!(e)));
                        return;
                    }
                };

                use windows::Win32::UI::WindowsAndMessaging::{
                    SetWindowLongPtrW, GWLP_USERDATA,
                };
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, &*shared as *const SurfaceShared as isize);

                let _ = ShowWindow(hwnd, SW_SHOW);
                let _ = SetWindowPos(hwnd, HWND_TOPMOST, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE);
                // Keyboard focus so Escape lands in our wndproc.
                let _ = SetForegroundWindow(hwnd);
                ShowCursor(BOOL::from(false));
                let _ = SetTimer(hwnd, 1, REPAINT_TIMER_MS, None);

                if let Ok(mut store) = hwnd_store.lock() {
                    *store = Some(hwnd.0 as isize);
                }
                let _ = ready_tx.send(Ok(()));

                let mut msg = MSG::default();
                while GetMessageW(&mut msg, None, 0, 0).into() {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }

                ShowCursor(BOOL::from(true));
                shared.closed.store(true, Ordering::Release);
            }
        });

        match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(())) => {
                self.thread = Some(join);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                self.shared.closed.store(true, Ordering::Release);
                let _ = join.join();
                Err(anyhow!("surface thread did not signal readiness"))
            }
        }
    }

    fn present(&mut self, frame: &RgbaImage) -> anyhow::Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let (w, h) = frame.dimensions();
        if let Ok(mut store) = self.shared.frame.lock() {
            if store
                .as_ref()
                .map_or(true, |p| p.width != w as i32 || p.height != h as i32)
            {
                *store = Some(FramePixels {
                    width: w as i32,
                    height: h as i32,
                    bgra: vec![0; (w as usize) * (h as usize) * 4],
                });
            }
            if let Some(pixels) = store.as_mut() {
                for (src, dst) in frame
                    .as_raw()
                    .chunks_exact(4)
                    .zip(pixels.bgra.chunks_exact_mut(4))
                {
                    dst[0] = src[2];
                    dst[1] = src[1];
                    dst[2] = src[0];
                    dst[3] = 255;
                }
            }
        }
        self.shared.version.fetch_add(1, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.thread.is_some() && !self.shared.closed.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        if let Ok(store) = self.hwnd.lock() {
            if let Some(hwnd) = *store {
                unsafe {
                    let _ = windows::Win32::UI::WindowsAndMessaging::PostMessageW(
                        windows::Win32::Foundation::HWND(hwnd as *mut _),
                        windows::Win32::UI::WindowsAndMessaging::WM_CLOSE,
                        windows::Win32::Foundation::WPARAM(0),
                        windows::Win32::Foundation::LPARAM(0),
                    );
                }
            }
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[cfg(windows)]
unsafe extern "system" fn surface_wndproc(
    hwnd: windows::Win32::Foundation::HWND,
    msg: u32,
    wparam: windows::Win32::Foundation::WPARAM,
    lparam: windows::Win32::Foundation::LPARAM,
) -> windows::Win32::Foundation::LRESULT {
    use windows::Win32::Foundation::{LRESULT, RECT};
    use windows::Win32::Graphics::Gdi::{
        BeginPaint, EndPaint, FillRect, GetStockObject, RedrawWindow, SetStretchBltMode,
        StretchDIBits, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, BLACK_BRUSH, COLORONCOLOR,
        DIB_RGB_COLORS, HBRUSH, PAINTSTRUCT, RDW_INVALIDATE, SRCCOPY,
    };
    use windows::Win32::UI::Input::KeyboardAndMouse::VK_ESCAPE;
    use windows::Win32::UI::WindowsAndMessaging::{
        DefWindowProcW, DestroyWindow, GetClientRect, GetWindowLongPtrW, KillTimer,
        PostQuitMessage, GWLP_USERDATA, WM_DESTROY, WM_KEYDOWN, WM_PAINT, WM_TIMER,
    };

    let state_ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA);
    if state_ptr != 0 {
        let state = &*(state_ptr as *const SurfaceShared);
        match msg {
            WM_TIMER => {
                let version = state.version.load(Ordering::Acquire);
                if version != state.last_painted.load(Ordering::Relaxed) {
                    let _ = RedrawWindow(hwnd, None, None, RDW_INVALIDATE);
                }
                return LRESULT(0);
            }
            WM_PAINT => {
                let mut paint = PAINTSTRUCT::default();
                let hdc = BeginPaint(hwnd, &mut paint);
                let mut rect = RECT::default();
                let _ = GetClientRect(hwnd, &mut rect);
                let version = state.version.load(Ordering::Acquire);
                let mut painted = false;
                if let Ok(store) = state.frame.lock() {
                    if let Some(pixels) = store.as_ref() {
                        let bmi = BITMAPINFO {
                            bmiHeader: BITMAPINFOHEADER {
                                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                                biWidth: pixels.width,
                                // negative height = top-down rows
                                biHeight: -pixels.height,
                                biPlanes: 1,
                                biBitCount: 32,
                                biCompression: BI_RGB.0,
                                ..Default::default()
                            },
                            ..Default::default()
                        };
                        SetStretchBltMode(hdc, COLORONCOLOR);
                        StretchDIBits(
                            hdc,
                            0,
                            0,
                            rect.right,
                            rect.bottom,
                            0,
                            0,
                            pixels.width,
                            pixels.height,
                            Some(pixels.bgra.as_ptr() as *const _),
                            &bmi,
                            DIB_RGB_COLORS,
                            SRCCOPY,
                        );
                        painted = true;
                    }
                }
                if !painted {
                    FillRect(hdc, &rect, HBRUSH(GetStockObject(BLACK_BRUSH).0));
                }
                state.last_painted.store(version, Ordering::Relaxed);
                let _ = EndPaint(hwnd, &paint);
                return LRESULT(0);
            }
            WM_KEYDOWN => {
                if wparam.0 as u32 == VK_ESCAPE.0 as u32 {
                    let _ = DestroyWindow(hwnd);
                    return LRESULT(0);
                }
            }
            WM_DESTROY => {
                state.closed.store(true, Ordering::Release);
                let _ = KillTimer(hwnd, 1);
                PostQuitMessage(0);
                return LRESULT(0);
            }
            _ => {}
        }
    } else if msg == WM_DESTROY {
        PostQuitMessage(0);
    }

    DefWindowProcW(hwnd, msg, wparam, lparam)
}

#[derive(Default)]
struct MockSurfaceState {
    opened: AtomicUsize,
    presented: AtomicUsize,
    close_calls: AtomicUsize,
    open: AtomicBool,
    fail_open: AtomicBool,
    close_after: AtomicUsize,
    last_dims: Mutex<Option<(u32, u32)>>,
}

/// Test surface: records presented frames and can simulate a user pressing
/// Escape (`request_close`) or the window closing itself after a number of
/// frames (`close_after`).
pub struct MockSurface {
    state: Arc<MockSurfaceState>,
}

impl PresentationSurface for MockSurface {
    fn open(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("mock surface configured to fail"));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        self.state.open.store(true, Ordering::SeqCst);
        if let Ok(mut dims) = self.state.last_dims.lock() {
            *dims = Some((width, height));
        }
        Ok(())
    }

    fn present(&mut self, _frame: &RgbaImage) -> anyhow::Result<()> {
        let presented = self.state.presented.fetch_add(1, Ordering::SeqCst) + 1;
        if presented >= self.state.close_after.load(Ordering::SeqCst) {
            self.state.open.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.state.open.store(false, Ordering::SeqCst);
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockSurfaceFactory {
    state: Arc<MockSurfaceState>,
}

pub struct MockSurfaceHandle {
    state: Arc<MockSurfaceState>,
}

impl MockSurfaceFactory {
    pub fn new() -> (Self, MockSurfaceHandle) {
        let state = Arc::new(MockSurfaceState {
            close_after: AtomicUsize::new(usize::MAX),
            ..Default::default()
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            MockSurfaceHandle { state },
        )
    }
}

impl SurfaceFactory for MockSurfaceFactory {
    fn create(&self) -> Box<dyn PresentationSurface> {
        Box::new(MockSurface {
            state: Arc::clone(&self.state),
        })
    }
}

impl MockSurfaceHandle {
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn presented(&self) -> usize {
        self.state.presented.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn last_dims(&self) -> Option<(u32, u32)> {
        self.state.last_dims.lock().ok().and_then(|d| *d)
    }

    /// Simulate the user cancelling with Escape.
    pub fn request_close(&self) {
        self.state.open.store(false, Ordering::SeqCst);
    }

    /// Have the surface close itself after `frames` presented frames.
    pub fn close_after(&self, frames: usize) {
        self.state.close_after.store(frames, Ordering::SeqCst);
    }

    pub fn fail_open(&self) {
        self.state.fail_open.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_surface_tracks_frames_and_close() {
        let (factory, handle) = MockSurfaceFactory::new();
        let mut surface = factory.create();
        surface.open(640, 480).unwrap();
        assert!(handle.is_open());
        assert_eq!(handle.last_dims(), Some((640, 480)));

        let frame = RgbaImage::new(1, 1);
        surface.present(&frame).unwrap();
        surface.present(&frame).unwrap();
        assert_eq!(handle.presented(), 2);

        surface.close();
        assert!(!surface.is_open());
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn mock_surface_close_after_simulates_auto_close() {
        let (factory, handle) = MockSurfaceFactory::new();
        handle.close_after(2);
        let mut surface = factory.create();
        surface.open(10, 10).unwrap();

        let frame = RgbaImage::new(1, 1);
        surface.present(&frame).unwrap();
        assert!(surface.is_open());
        surface.present(&frame).unwrap();
        assert!(!surface.is_open());
    }
}
