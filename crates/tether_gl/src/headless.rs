//! # Headless Platform
//!
//! In-process implementation of the driver contract with no GPU or window
//! system behind it. It keeps the one rule that makes the scheduling
//! protocol necessary: a context is current on at most one OS thread, and
//! making it current anywhere else fails. Contexts created while the shared
//! context is borrowed join its share group and see each other's objects.
//!
//! Faults can be injected per operation with [`HeadlessPlatform::fail_next`],
//! and [`HeadlessPlatform::stats`] counts creations, destructions and shared
//! borrows.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tether_core::ThreadError;

use crate::driver::{ContextDriver, Platform, WindowDriver, WindowHandle};
use crate::event::Event;
use crate::settings::{ContextSettings, VideoMode};
use crate::share::Rendezvous;
use crate::style::WindowStyle;

/// Driver operations that accept an injected fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeadlessOp {
    /// Context creation (all three initialize variants).
    Initialize,
    /// Making a context current.
    Activate,
    /// Detaching a context.
    Deactivate,
    /// Borrowing the shared context.
    Take,
    /// Presenting.
    SwapBuffers,
    /// Toggling vertical sync.
    SetVerticalSync,
    /// Creating a platform window.
    CreateWindow,
    /// Showing or hiding a window.
    SetVisible,
}

/// Snapshot of the platform counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Contexts whose platform resource was created.
    pub contexts_created: usize,
    /// Contexts whose platform resource was destroyed.
    pub contexts_destroyed: usize,
    /// Platform windows created.
    pub windows_created: usize,
    /// Platform windows destroyed.
    pub windows_destroyed: usize,
    /// Successful `take` calls on a shared context.
    pub shared_borrows: usize,
}

#[derive(Default)]
struct Counters {
    contexts_created: AtomicUsize,
    contexts_destroyed: AtomicUsize,
    windows_created: AtomicUsize,
    windows_destroyed: AtomicUsize,
    shared_borrows: AtomicUsize,
}

struct PlatformState {
    next_handle: AtomicU64,
    counters: Counters,
    faults: Mutex<HashMap<HeadlessOp, ThreadError>>,
}

impl PlatformState {
    /// Consumes the fault armed for `op`, if any.
    fn check(&self, op: HeadlessOp) -> Result<(), ThreadError> {
        match self.faults.lock().remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// The headless platform. Cheap to clone; clones share counters and faults.
#[derive(Clone)]
pub struct HeadlessPlatform {
    state: Arc<PlatformState>,
}

impl HeadlessPlatform {
    /// Creates a platform with no faults armed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(PlatformState {
                next_handle: AtomicU64::new(1),
                counters: Counters::default(),
                faults: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Makes the next `op` on any driver of this platform fail with `err`.
    pub fn fail_next(&self, op: HeadlessOp, err: ThreadError) {
        self.state.faults.lock().insert(op, err);
    }

    /// Current counter values.
    #[must_use]
    pub fn stats(&self) -> HeadlessStats {
        let counters = &self.state.counters;
        HeadlessStats {
            contexts_created: counters.contexts_created.load(Ordering::SeqCst),
            contexts_destroyed: counters.contexts_destroyed.load(Ordering::SeqCst),
            windows_created: counters.windows_created.load(Ordering::SeqCst),
            windows_destroyed: counters.windows_destroyed.load(Ordering::SeqCst),
            shared_borrows: counters.shared_borrows.load(Ordering::SeqCst),
        }
    }
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HeadlessPlatform {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_context_driver(&self) -> Box<dyn ContextDriver> {
        Box::new(HeadlessContext::new(Arc::clone(&self.state)))
    }

    fn create_window_driver(&self) -> Arc<dyn WindowDriver> {
        Arc::new(HeadlessWindow::new(Arc::clone(&self.state)))
    }
}

/// Objects visible to every context of one share group.
#[derive(Default)]
struct ShareGroup {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

/// Headless context driver.
pub struct HeadlessContext {
    platform: Arc<PlatformState>,
    current_on: Mutex<Option<ThreadId>>,
    group: Mutex<Option<Arc<ShareGroup>>>,
    settings: Mutex<ContextSettings>,
    owner: Mutex<Option<WindowHandle>>,
    vsync: AtomicBool,
    frames: AtomicU64,
    created: AtomicBool,
    destroyed: AtomicBool,
}

impl HeadlessContext {
    fn new(platform: Arc<PlatformState>) -> Self {
        Self {
            platform,
            current_on: Mutex::new(None),
            group: Mutex::new(None),
            settings: Mutex::new(ContextSettings::default()),
            owner: Mutex::new(None),
            vsync: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            created: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    fn make_current(&self, operation: &str) -> Result<(), ThreadError> {
        let me = std::thread::current().id();
        let mut current = self.current_on.lock();
        match *current {
            Some(owner) if owner != me => Err(ThreadError::fatal(format!(
                "{operation}: context is current on another thread"
            ))),
            _ => {
                *current = Some(me);
                Ok(())
            }
        }
    }

    fn clear_current(&self, operation: &str) -> Result<(), ThreadError> {
        let me = std::thread::current().id();
        let mut current = self.current_on.lock();
        match *current {
            Some(owner) if owner != me => Err(ThreadError::fatal(format!(
                "{operation}: context is current on another thread"
            ))),
            _ => {
                *current = None;
                Ok(())
            }
        }
    }

    fn require_current(&self, operation: &str) -> Result<(), ThreadError> {
        if self.is_current_here() {
            Ok(())
        } else {
            Err(ThreadError::recoverable(format!(
                "{operation}: context is not current on this thread"
            )))
        }
    }

    fn create(
        &self,
        settings: &ContextSettings,
        owner: Option<WindowHandle>,
        shared: Option<&dyn ContextDriver>,
    ) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::Initialize)?;
        if self.created.load(Ordering::SeqCst) {
            return Err(ThreadError::fatal("context created twice"));
        }

        let group = match shared {
            None => Arc::new(ShareGroup::default()),
            Some(shared) => {
                let shared = shared
                    .as_any()
                    .downcast_ref::<HeadlessContext>()
                    .ok_or_else(|| ThreadError::fatal("shared context belongs to another platform"))?;
                if !shared.is_current_here() {
                    return Err(ThreadError::fatal(
                        "shared context is not current on the creating thread",
                    ));
                }
                shared
                    .group
                    .lock()
                    .clone()
                    .ok_or_else(|| ThreadError::fatal("shared context was never created"))?
            }
        };

        *self.group.lock() = Some(group);
        *self.settings.lock() = *settings;
        *self.owner.lock() = owner;
        // A freshly created context is current on the creating thread.
        *self.current_on.lock() = Some(std::thread::current().id());
        self.created.store(true, Ordering::SeqCst);
        bump(&self.platform.counters.contexts_created);
        Ok(())
    }

    fn share_group(&self) -> Result<Arc<ShareGroup>, ThreadError> {
        self.group
            .lock()
            .clone()
            .ok_or_else(|| ThreadError::recoverable("context has no share group"))
    }

    /// Stores an object in the share group. The context must be current here.
    ///
    /// # Errors
    ///
    /// Non-fatal if the context is not current on the calling thread.
    pub fn upload(&self, name: &str, data: Vec<u8>) -> Result<(), ThreadError> {
        self.require_current("upload")?;
        self.share_group()?.objects.lock().insert(name.to_owned(), data);
        Ok(())
    }

    /// Reads an object from the share group. The context must be current here.
    ///
    /// # Errors
    ///
    /// Non-fatal if the context is not current on the calling thread.
    pub fn download(&self, name: &str) -> Result<Option<Vec<u8>>, ThreadError> {
        self.require_current("download")?;
        Ok(self.share_group()?.objects.lock().get(name).cloned())
    }

    /// Returns true if both contexts are in the same share group.
    #[must_use]
    pub fn shares_with(&self, other: &HeadlessContext) -> bool {
        if std::ptr::eq(self, other) {
            return self.group.lock().is_some();
        }
        match (&*self.group.lock(), &*other.group.lock()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns true if the context is current on the calling OS thread.
    #[must_use]
    pub fn is_current_here(&self) -> bool {
        *self.current_on.lock() == Some(std::thread::current().id())
    }

    /// Number of presented frames.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Last vertical sync setting.
    #[must_use]
    pub fn vsync_enabled(&self) -> bool {
        self.vsync.load(Ordering::SeqCst)
    }

    /// Window the context renders into, if created from one.
    #[must_use]
    pub fn owner(&self) -> Option<WindowHandle> {
        *self.owner.lock()
    }

    /// Returns true once the platform resource has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl ContextDriver for HeadlessContext {
    fn initialize_from_settings(
        &self,
        settings: &ContextSettings,
        width: u32,
        height: u32,
        shared: Option<&dyn ContextDriver>,
    ) -> Result<(), ThreadError> {
        if width == 0 || height == 0 {
            return Err(ThreadError::fatal(format!(
                "invalid offscreen surface {width}x{height}"
            )));
        }
        self.create(settings, None, shared)
    }

    fn initialize_from_owner(
        &self,
        settings: &ContextSettings,
        owner: WindowHandle,
        _bits_per_pixel: u32,
        shared: Option<&dyn ContextDriver>,
    ) -> Result<(), ThreadError> {
        if !owner.is_valid() {
            return Err(ThreadError::fatal("owner window has no handle"));
        }
        self.create(settings, Some(owner), shared)
    }

    fn activate(&self) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::Activate)?;
        self.make_current("activate")
    }

    fn deactivate(&self) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::Deactivate)?;
        self.clear_current("deactivate")
    }

    fn pause(&self, rendezvous: &Rendezvous) -> Result<(), ThreadError> {
        self.clear_current("pause")?;
        rendezvous.park();
        self.make_current("resume")
    }

    fn take(&self) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::Take)?;
        self.make_current("take")?;
        bump(&self.platform.counters.shared_borrows);
        Ok(())
    }

    fn release(&self) -> Result<(), ThreadError> {
        self.clear_current("release")
    }

    fn swap_buffers(&self) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::SwapBuffers)?;
        self.require_current("swap buffers")?;
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn settings(&self) -> Result<ContextSettings, ThreadError> {
        Ok(*self.settings.lock())
    }

    fn set_vertical_sync_enabled(&self, enabled: bool) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::SetVerticalSync)?;
        self.require_current("set vertical sync")?;
        self.vsync.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), ThreadError> {
        if !self.created.load(Ordering::SeqCst) || self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.current_on.lock() = None;
        *self.group.lock() = None;
        bump(&self.platform.counters.contexts_destroyed);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone, Debug, Default)]
struct WindowState {
    title: String,
    position: (i32, i32),
    size: (u32, u32),
    style: WindowStyle,
    visible: bool,
    cursor_visible: bool,
    key_repeat: bool,
    mouse: (i32, i32),
}

/// Headless window driver.
///
/// Events are injected with [`push_event`](Self::push_event) from any thread.
pub struct HeadlessWindow {
    platform: Arc<PlatformState>,
    handle: AtomicU64,
    state: Mutex<WindowState>,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    destroyed: AtomicBool,
}

impl HeadlessWindow {
    fn new(platform: Arc<PlatformState>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            platform,
            handle: AtomicU64::new(0),
            state: Mutex::new(WindowState::default()),
            events_tx,
            events_rx,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Queues an event for the next [`poll_events`](WindowDriver::poll_events).
    pub fn push_event(&self, event: Event) {
        // The window holds the receive end.
        let _ = self.events_tx.send(event);
    }

    /// Current title.
    #[must_use]
    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }

    /// Style the window was created with.
    #[must_use]
    pub fn style(&self) -> WindowStyle {
        self.state.lock().style
    }

    /// Returns true if the window is shown.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    /// Returns true if the cursor is shown over the window.
    #[must_use]
    pub fn is_cursor_visible(&self) -> bool {
        self.state.lock().cursor_visible
    }

    /// Returns true if key repeat is enabled.
    #[must_use]
    pub fn is_key_repeat_enabled(&self) -> bool {
        self.state.lock().key_repeat
    }

    /// Returns true once the platform window has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl WindowDriver for HeadlessWindow {
    fn initialize(&self, mode: VideoMode, title: &str, style: WindowStyle) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::CreateWindow)?;
        {
            let mut state = self.state.lock();
            state.title = title.to_owned();
            state.size = (mode.width, mode.height);
            state.style = style;
        }
        let handle = self.platform.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handle.store(handle, Ordering::SeqCst);
        bump(&self.platform.counters.windows_created);
        Ok(())
    }

    fn close(&self) -> Result<(), ThreadError> {
        if self.handle.load(Ordering::SeqCst) == 0 || self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        bump(&self.platform.counters.windows_destroyed);
        Ok(())
    }

    fn system_handle(&self) -> WindowHandle {
        WindowHandle(self.handle.load(Ordering::SeqCst))
    }

    fn poll_events(&self, block: bool) -> (Vec<Event>, Vec<ThreadError>) {
        let mut events = Vec::new();
        if block {
            if let Ok(event) = self.events_rx.recv() {
                events.push(event);
            }
        }
        events.extend(self.events_rx.try_iter());

        let mut state = self.state.lock();
        for event in &events {
            match *event {
                Event::Resized { width, height } => state.size = (width, height),
                Event::MouseMoved { x, y } => state.mouse = (x, y),
                _ => {}
            }
        }
        (events, Vec::new())
    }

    fn position(&self) -> (i32, i32) {
        self.state.lock().position
    }

    fn set_position(&self, x: i32, y: i32) {
        self.state.lock().position = (x, y);
    }

    fn size(&self) -> (u32, u32) {
        self.state.lock().size
    }

    fn set_size(&self, width: u32, height: u32) {
        self.state.lock().size = (width, height);
    }

    fn set_title(&self, title: &str) {
        title.clone_into(&mut self.state.lock().title);
    }

    fn set_visible(&self, visible: bool) -> Result<(), ThreadError> {
        self.platform.check(HeadlessOp::SetVisible)?;
        self.state.lock().visible = visible;
        Ok(())
    }

    fn set_mouse_cursor_visible(&self, visible: bool) -> Result<(), ThreadError> {
        self.state.lock().cursor_visible = visible;
        Ok(())
    }

    fn set_key_repeat_enabled(&self, enabled: bool) -> Result<(), ThreadError> {
        self.state.lock().key_repeat = enabled;
        Ok(())
    }

    fn mouse_position(&self) -> Result<(i32, i32), ThreadError> {
        Ok(self.state.lock().mouse)
    }

    fn set_mouse_position(&self, x: i32, y: i32) -> Result<(), ThreadError> {
        self.state.lock().mouse = (x, y);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
