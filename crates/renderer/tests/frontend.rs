//! Frontend behavior against a scripted backend.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::CStr;
use std::rc::Rc;

use ember_renderer::{RenderPacket, Renderer, RendererBackend};
use ember_rhi::surface::SurfaceSource;
use ember_rhi::{RhiError, RhiResult, vk};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Initialize(String),
    Shutdown,
    Resized(u32, u32),
    Begin,
    End,
}

type BeginResult = RhiResult<bool>;

/// Replays queued `begin_frame` results and logs every call.
struct ScriptedBackend {
    calls: Rc<RefCell<Vec<Call>>>,
    begin_results: VecDeque<BeginResult>,
    fail_end: bool,
}

impl ScriptedBackend {
    fn new(calls: Rc<RefCell<Vec<Call>>>, begin_results: Vec<BeginResult>) -> Self {
        Self {
            calls,
            begin_results: begin_results.into(),
            fail_end: false,
        }
    }
}

impl RendererBackend for ScriptedBackend {
    fn initialize(&mut self, app_name: &str, _platform: &dyn SurfaceSource) -> RhiResult<()> {
        self.calls
            .borrow_mut()
            .push(Call::Initialize(app_name.to_string()));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.calls.borrow_mut().push(Call::Shutdown);
    }

    fn resized(&mut self, width: u32, height: u32) {
        self.calls.borrow_mut().push(Call::Resized(width, height));
    }

    fn begin_frame(&mut self, _delta_time: f32) -> RhiResult<bool> {
        self.calls.borrow_mut().push(Call::Begin);
        self.begin_results.pop_front().unwrap_or(Ok(true))
    }

    fn end_frame(&mut self, _delta_time: f32) -> RhiResult<()> {
        self.calls.borrow_mut().push(Call::End);
        if self.fail_end {
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        } else {
            Ok(())
        }
    }
}

struct NoSurface;

impl SurfaceSource for NoSurface {
    fn required_extensions(&self, _extensions: &mut Vec<&'static CStr>) -> RhiResult<()> {
        Ok(())
    }

    fn create_surface(
        &self,
        _entry: &ash::Entry,
        _instance: &ash::Instance,
    ) -> RhiResult<vk::SurfaceKHR> {
        Err(RhiError::SurfaceError("headless".to_string()))
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        (640, 480)
    }
}

fn packet() -> RenderPacket {
    RenderPacket { delta_time: 0.016 }
}

#[test]
fn test_draw_frame_calls_begin_then_end() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = Renderer::new(Box::new(ScriptedBackend::new(calls.clone(), vec![])));

    renderer.draw_frame(&packet()).unwrap();

    assert_eq!(*calls.borrow(), vec![Call::Begin, Call::End]);
    assert_eq!(renderer.frame_number(), 1);
}

#[test]
fn test_skipped_frame_does_not_end_or_count() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = Renderer::new(Box::new(ScriptedBackend::new(
        calls.clone(),
        vec![Ok(false), Ok(true)],
    )));

    renderer.draw_frame(&packet()).unwrap();
    renderer.draw_frame(&packet()).unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![Call::Begin, Call::Begin, Call::End]
    );
    assert_eq!(renderer.frame_number(), 1);
}

#[test]
fn test_begin_failure_is_fatal() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = Renderer::new(Box::new(ScriptedBackend::new(
        calls.clone(),
        vec![Err(RhiError::FenceTimeout { timeout_ns: 1 })],
    )));

    let result = renderer.draw_frame(&packet());

    assert!(matches!(result, Err(RhiError::FenceTimeout { .. })));
    assert_eq!(*calls.borrow(), vec![Call::Begin]);
    assert_eq!(renderer.frame_number(), 0);
}

#[test]
fn test_end_failure_is_fatal() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut backend = ScriptedBackend::new(calls.clone(), vec![]);
    backend.fail_end = true;
    let mut renderer = Renderer::new(Box::new(backend));

    let result = renderer.draw_frame(&packet());

    assert!(matches!(
        result,
        Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
    ));
    assert_eq!(*calls.borrow(), vec![Call::Begin, Call::End]);
}

#[test]
fn test_lifecycle_calls_are_forwarded() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = Renderer::new(Box::new(ScriptedBackend::new(calls.clone(), vec![])));

    renderer.initialize("lifecycle", &NoSurface).unwrap();
    renderer.resized(1920, 1080);
    renderer.draw_frame(&packet()).unwrap();
    renderer.shutdown();

    assert_eq!(
        *calls.borrow(),
        vec![
            Call::Initialize("lifecycle".to_string()),
            Call::Resized(1920, 1080),
            Call::Begin,
            Call::End,
            Call::Shutdown,
        ]
    );
}

#[test]
fn test_frame_number_counts_successful_frames() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let script = vec![Ok(true), Ok(false), Ok(true), Ok(true), Ok(false)];
    let mut renderer = Renderer::new(Box::new(ScriptedBackend::new(calls.clone(), script)));

    for _ in 0..5 {
        renderer.draw_frame(&packet()).unwrap();
    }

    assert_eq!(renderer.frame_number(), 3);
    let ends = calls.borrow().iter().filter(|c| **c == Call::End).count();
    assert_eq!(ends, 3);
}
