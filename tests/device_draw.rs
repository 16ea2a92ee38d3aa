//! Device state and draw-engine scenarios (spec §8) that don't require a
//! windowing-system drawable: degenerate call-order tolerance, the
//! pending-clear FIFO, and the `flush` commit/rotate path. The swap-chain-
//! dependent scenarios (present, textured quad) need a live `CAMetalLayer`
//! backed by an actual view and are exercised by the host integration
//! harness, not here.

use gs_metal::device::clear_flags;
use gs_metal::device::draw::Primitive;
use gs_metal::Device;

fn with_device<F: FnOnce(Device)>(f: F) {
    let Some(metal_device) = metal::Device::system_default() else {
        eprintln!("skipping: no Metal device available in this environment");
        return;
    };
    f(Device::new(metal_device));
}

#[test]
fn draw_before_begin_scene_is_a_tolerated_no_op() {
    with_device(|mut device| {
        // No begin_scene() was called, so there is no active command buffer
        // (spec §4.6 Step 1: tolerate degenerate host call orders).
        let result = device.draw(Primitive::TriangleList, 0, 3);
        assert!(result.is_ok());
        assert_eq!(device.state.frame_draw_count, 0);
    });
}

#[test]
fn flush_with_no_active_command_buffer_is_a_no_op() {
    with_device(|mut device| {
        assert!(device.command_buffer.is_none());
        assert!(device.flush().is_ok());
    });
}

#[test]
fn begin_scene_then_flush_resets_the_command_buffer_slot() {
    with_device(|mut device| {
        device.begin_scene();
        assert!(device.command_buffer.is_some());
        device.flush().expect("flush with no pending work must succeed");
        assert!(device.command_buffer.is_none());
    });
}

#[test]
fn pending_clear_records_render_target_identity_at_call_time() {
    with_device(|mut device| {
        device.begin_scene();
        device.state.render_target = Some(7);
        device.clear(clear_flags::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0, 0);
        device.state.render_target = Some(9);
        device.clear(clear_flags::DEPTH, [0.0, 0.0, 0.0, 1.0], 1.0, 0);

        assert_eq!(device.state.pending_clears.len(), 2);
        assert_eq!(device.state.pending_clears[0].render_target, Some(7));
        assert_eq!(device.state.pending_clears[0].flags, clear_flags::COLOR);
        assert_eq!(device.state.pending_clears[1].render_target, Some(9));
        assert_eq!(device.state.pending_clears[1].flags, clear_flags::DEPTH);

        device.flush().unwrap();
    });
}

#[test]
fn combined_clear_flags_are_preserved_as_a_bitmask() {
    with_device(|mut device| {
        device.begin_scene();
        device.clear(
            clear_flags::COLOR | clear_flags::DEPTH | clear_flags::STENCIL,
            [1.0, 1.0, 1.0, 1.0],
            1.0,
            0,
        );
        let pending = &device.state.pending_clears[0];
        assert_ne!(pending.flags & clear_flags::COLOR, 0);
        assert_ne!(pending.flags & clear_flags::DEPTH, 0);
        assert_ne!(pending.flags & clear_flags::STENCIL, 0);
        device.flush().unwrap();
    });
}
