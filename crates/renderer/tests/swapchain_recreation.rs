//! Swapchain invalidation, resize and minimize handling.

mod common;

use ash::vk;

use common::{AcquireScript, Call, EXTENT, renderer, run_frame};
use renderer_rhi::swapchain::PresentOutcome;

fn recreations(calls: &[Call]) -> Vec<vk::Extent2D> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::RecreateSwapchain(extent) => Some(*extent),
            _ => None,
        })
        .collect()
}

#[test]
fn test_no_recreation_without_trigger() {
    let mut renderer = renderer(2);
    for _ in 0..5 {
        run_frame(&mut renderer, 1);
    }
    assert!(recreations(&renderer.backend().calls).is_empty());
}

#[test]
fn test_resize_recreates_before_acquire() {
    let mut renderer = renderer(2);
    run_frame(&mut renderer, 1);

    renderer.window().set_size(800, 600);
    renderer.framebuffer_resized(800, 600);
    renderer.backend_mut().calls.clear();
    run_frame(&mut renderer, 1);

    let backend = renderer.backend();
    let recreate = backend
        .position(|c| matches!(c, Call::RecreateSwapchain(_)))
        .expect("swapchain not recreated");
    let acquire = backend.position(|c| matches!(c, Call::Acquire(_))).unwrap();
    assert!(recreate < acquire);
    assert_eq!(
        recreations(&backend.calls),
        vec![vk::Extent2D {
            width: 800,
            height: 600
        }]
    );
    assert_eq!(renderer.swapchain_extent().width, 800);
}

#[test]
fn test_recreation_waits_idle_first() {
    let mut renderer = renderer(3);
    run_frame(&mut renderer, 1);
    run_frame(&mut renderer, 1);
    renderer.backend_mut().calls.clear();

    assert!(renderer.recreate_swapchain().unwrap());

    let calls = &renderer.backend().calls;
    assert_eq!(
        calls.as_slice(),
        &[
            Call::WaitIdle,
            Call::DestroySwapchainResources,
            Call::RecreateSwapchain(EXTENT),
            Call::CreateSwapchainResources,
        ]
    );
}

#[test]
fn test_out_of_date_acquire_skips_frame() {
    let mut renderer = renderer(2);
    run_frame(&mut renderer, 1);
    renderer.backend_mut().acquire_script.push_back(AcquireScript::OutOfDate);

    assert!(!renderer.begin_frame().unwrap());
    assert_eq!(renderer.frame_counter(), 1);
    assert_eq!(recreations(&renderer.backend().calls).len(), 1);

    run_frame(&mut renderer, 1);
    assert_eq!(renderer.frame_counter(), 2);
}

#[test]
fn test_suboptimal_acquire_recreates_after_present() {
    let mut renderer = renderer(2);
    renderer.backend_mut().acquire_script.push_back(AcquireScript::Suboptimal);

    assert!(renderer.begin_frame().unwrap());
    assert!(recreations(&renderer.backend().calls).is_empty());
    renderer.end_frame().unwrap();

    let backend = renderer.backend();
    let present = backend.position(|c| matches!(c, Call::Present { .. })).unwrap();
    let recreate = backend
        .position(|c| matches!(c, Call::RecreateSwapchain(_)))
        .expect("suboptimal swapchain kept");
    assert!(present < recreate);
}

#[test]
fn test_out_of_date_present_advances_counter() {
    let mut renderer = renderer(2);
    renderer
        .backend_mut()
        .present_script
        .push_back(PresentOutcome::OutOfDate);

    run_frame(&mut renderer, 1);

    assert_eq!(renderer.frame_counter(), 1);
    assert_eq!(recreations(&renderer.backend().calls).len(), 1);

    run_frame(&mut renderer, 1);
    assert_eq!(renderer.backend().begun_slots(), vec![0, 1]);
}

#[test]
fn test_minimized_window_defers_recreation() {
    let mut renderer = renderer(2);
    run_frame(&mut renderer, 1);

    renderer.window().set_size(0, 0);
    renderer.framebuffer_resized(0, 0);
    renderer.backend_mut().calls.clear();

    // Each call returns to the event loop instead of waiting for a new size.
    for (width, height) in [(0, 0), (640, 0), (0, 480)] {
        renderer.window().set_size(width, height);
        assert!(!renderer.begin_frame().unwrap());
        assert!(!renderer.is_recording());
    }
    assert!(renderer.backend().calls.is_empty());
    assert_eq!(renderer.frame_counter(), 1);

    renderer.window().set_size(1024, 768);
    run_frame(&mut renderer, 1);
    assert_eq!(
        recreations(&renderer.backend().calls),
        vec![vk::Extent2D {
            width: 1024,
            height: 768
        }]
    );
    assert_eq!(renderer.frame_counter(), 2);
}

#[test]
fn test_minimized_during_out_of_date_present() {
    let mut renderer = renderer(2);
    renderer.backend_mut().present_script.push_back(PresentOutcome::OutOfDate);

    assert!(renderer.begin_frame().unwrap());
    renderer.window().set_size(0, 0);
    renderer.end_frame().unwrap();
    assert!(recreations(&renderer.backend().calls).is_empty());

    assert!(!renderer.begin_frame().unwrap());
    renderer.window().set_size(EXTENT.width, EXTENT.height);
    run_frame(&mut renderer, 1);
    assert_eq!(recreations(&renderer.backend().calls), vec![EXTENT]);
}

#[test]
fn test_explicit_recreation_while_minimized_is_deferred() {
    let mut renderer = renderer(2);
    renderer.window().set_size(0, 0);
    assert!(!renderer.recreate_swapchain().unwrap());
    assert_eq!(renderer.backend().live_swapchain_resources, 1);

    renderer.window().set_size(EXTENT.width, EXTENT.height);
    assert!(renderer.begin_frame().unwrap());
    assert_eq!(recreations(&renderer.backend().calls), vec![EXTENT]);
}

#[test]
fn test_repeated_recreation_is_idempotent() {
    let mut renderer = renderer(2);
    run_frame(&mut renderer, 1);

    for _ in 0..3 {
        assert!(renderer.recreate_swapchain().unwrap());
    }

    let backend = renderer.backend();
    assert_eq!(backend.live_swapchain_resources, 1);
    assert_eq!(backend.extent, EXTENT);
    assert_eq!(
        backend.count(|c| matches!(c, Call::DestroySwapchainResources)),
        backend.count(|c| matches!(c, Call::CreateSwapchainResources))
    );

    run_frame(&mut renderer, 1);
    assert_eq!(renderer.frame_counter(), 2);
}

#[test]
fn test_resize_and_suboptimal_collapse_into_one_recreation() {
    let mut renderer = renderer(2);
    renderer.backend_mut().acquire_script.push_back(AcquireScript::Suboptimal);

    assert!(renderer.begin_frame().unwrap());
    renderer.framebuffer_resized(EXTENT.width, EXTENT.height);
    renderer.end_frame().unwrap();
    run_frame(&mut renderer, 1);

    assert_eq!(recreations(&renderer.backend().calls).len(), 1);
}

#[test]
#[should_panic(expected = "swapchain recreation requested while frame 0 is recording")]
fn test_recreation_while_recording_panics() {
    let mut renderer = renderer(2);
    assert!(renderer.begin_frame().unwrap());
    let _ = renderer.recreate_swapchain();
}
