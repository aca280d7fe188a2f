//! Frame ring ordering and begin/end contract checks, driven through a
//! recording backend.

mod common;

use common::{AcquireScript, Call, MockBuffer, renderer, run_frame};
use renderer_renderer::{Material, RenderTarget};

#[test]
fn test_frames_cycle_through_slots() {
    let mut renderer = renderer(3);
    for _ in 0..7 {
        run_frame(&mut renderer, 1);
    }

    assert_eq!(renderer.frame_counter(), 7);
    assert_eq!(renderer.total_frames(), 7);
    assert_eq!(renderer.backend().begun_slots(), vec![0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn test_slot_waited_before_reuse() {
    let mut renderer = renderer(2);
    for _ in 0..6 {
        run_frame(&mut renderer, 2);
    }

    // Every reset of a slot's commands follows a wait issued after that
    // slot's previous submission.
    let calls = &renderer.backend().calls;
    for (i, call) in calls.iter().enumerate() {
        let Call::ResetCommands(slot) = call else { continue };
        let last_submit = calls[..i]
            .iter()
            .rposition(|c| matches!(c, Call::Submit { slot: s, .. } if s == slot));
        let last_wait = calls[..i]
            .iter()
            .rposition(|c| matches!(c, Call::WaitForSlot(s) if s == slot))
            .expect("slot reset without a wait");
        if let Some(submit) = last_submit {
            assert!(last_wait > submit, "slot {} reused before its fence wait", slot);
        }
    }
}

#[test]
fn test_frame_sequence_order() {
    let mut renderer = renderer(2);
    run_frame(&mut renderer, 1);

    let calls = &renderer.backend().calls;
    let expected: [fn(&Call) -> bool; 8] = [
        |c: &Call| matches!(c, Call::WaitForSlot(0)),
        |c: &Call| matches!(c, Call::ResetCommands(0)),
        |c: &Call| matches!(c, Call::Acquire(0)),
        |c: &Call| matches!(c, Call::ResetFence(0)),
        |c: &Call| matches!(c, Call::BeginCommands { slot: 0, .. }),
        |c: &Call| matches!(c, Call::Draw { slot: 0, .. }),
        |c: &Call| matches!(c, Call::Submit { slot: 0, .. }),
        |c: &Call| matches!(c, Call::Present { slot: 0, .. }),
    ];
    let order: Vec<usize> = expected
        .iter()
        .map(|p| calls.iter().position(p).expect("missing call"))
        .collect();

    assert!(order.windows(2).all(|w| w[0] < w[1]), "calls out of order: {:?}", calls);
}

#[test]
fn test_single_frame_in_flight() {
    let mut renderer = renderer(1);
    for _ in 0..3 {
        run_frame(&mut renderer, 1);
    }
    assert_eq!(renderer.backend().begun_slots(), vec![0, 0, 0]);
    assert_eq!(renderer.frames_in_flight(), 1);
}

#[test]
fn test_skipped_frame_keeps_fence_signaled() {
    let mut renderer = renderer(2);
    renderer.backend_mut().acquire_script.push_back(AcquireScript::OutOfDate);

    assert!(!renderer.begin_frame().unwrap());
    assert!(!renderer.is_recording());
    assert_eq!(renderer.frame_counter(), 0);
    assert_eq!(renderer.backend().count(|c| matches!(c, Call::ResetFence(_))), 0);

    // The retry waits on the same fence; an unsignaled fence would trip the
    // mock's deadlock check.
    run_frame(&mut renderer, 1);
    assert_eq!(renderer.frame_counter(), 1);
}

#[test]
fn test_objects_drawn_resets_each_frame() {
    let mut renderer = renderer(2);
    run_frame(&mut renderer, 4);
    assert!(renderer.begin_frame().unwrap());
    assert_eq!(renderer.objects_drawn(), 0);
}

#[test]
fn test_shutdown_waits_for_device() {
    let mut renderer = renderer(2);
    run_frame(&mut renderer, 1);
    renderer.shutdown().unwrap();
}

#[test]
#[should_panic(expected = "begin_frame called while frame 0 is still recording")]
fn test_double_begin_frame_panics() {
    let mut renderer = renderer(2);
    assert!(renderer.begin_frame().unwrap());
    let _ = renderer.begin_frame();
}

#[test]
#[should_panic(expected = "end_frame called outside begin_frame/end_frame")]
fn test_end_frame_without_begin_panics() {
    let mut renderer = renderer(2);
    let _ = renderer.end_frame();
}

#[test]
#[should_panic(expected = "end_frame called inside a render pass")]
fn test_end_frame_inside_render_pass_panics() {
    let mut renderer = renderer(2);
    assert!(renderer.begin_frame().unwrap());
    let clear = renderer.clear_values();
    renderer.begin_render_pass(RenderTarget::Swapchain, &clear).unwrap();
    let _ = renderer.end_frame();
}

#[test]
#[should_panic(expected = "begin_render_pass called inside a render pass")]
fn test_nested_render_pass_panics() {
    let mut renderer = renderer(2);
    assert!(renderer.begin_frame().unwrap());
    let clear = renderer.clear_values();
    renderer.begin_render_pass(RenderTarget::Swapchain, &clear).unwrap();
    let _ = renderer.begin_render_pass(RenderTarget::Swapchain, &clear);
}

#[test]
#[should_panic(expected = "draw called without a bound pipeline")]
fn test_draw_without_pipeline_panics() {
    let mut renderer = renderer(2);
    assert!(renderer.begin_frame().unwrap());
    let clear = renderer.clear_values();
    renderer.begin_render_pass(RenderTarget::Swapchain, &clear).unwrap();
    let _ = renderer.draw(&MockBuffer(0), &Material::default(), &MockBuffer(1), 6);
}

#[test]
#[should_panic(expected = "draw called outside begin_frame/end_frame")]
fn test_draw_outside_frame_panics() {
    let mut renderer = renderer(2);
    let _ = renderer.draw(&MockBuffer(0), &Material::default(), &MockBuffer(1), 6);
}

#[test]
#[should_panic(expected = "shutdown called while frame 0 is recording")]
fn test_shutdown_while_recording_panics() {
    let mut renderer = renderer(2);
    assert!(renderer.begin_frame().unwrap());
    let _ = renderer.shutdown();
}
