mod common;

use std::time::Duration;

use camfan::rendering::{DrawTarget, ProgramKind};
use camfan::{
    BindingKind, CameraFrame, ContractViolation, Error, FramePipeline, GpuError, GpuLedger,
    HeadlessBackend, HeadlessSurface, ShaderFilter,
};
use crossbeam_channel as channel;
use dpi::PhysicalSize;

use common::{Journal, Recording, init_tracing, small_params};

fn spawn() -> (FramePipeline<HeadlessBackend>, GpuLedger) {
    init_tracing();
    let ledger = GpuLedger::default();
    let for_thread = ledger.clone();
    let pipeline = FramePipeline::spawn(small_params(), move || {
        Ok(HeadlessBackend::with_ledger(for_thread))
    })
    .unwrap();
    (pipeline, ledger)
}

fn frame(timestamp_ns: i64) -> CameraFrame {
    CameraFrame {
        texture: 7,
        timestamp_ns,
    }
}

fn notify(pipeline: &FramePipeline<HeadlessBackend>, timestamp_ns: i64) {
    pipeline.on_frame_available(frame(timestamp_ns)).unwrap();
    pipeline.sync().unwrap();
}

#[test]
fn full_lifecycle_releases_every_gpu_object() {
    let (mut pipeline, ledger) = spawn();

    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(720, 1280))
        .unwrap();
    pipeline.attach_encoder(HeadlessSurface::new("encoder")).unwrap();
    notify(&pipeline, 1_000);
    pipeline.detach_encoder().unwrap();
    pipeline.detach_display().unwrap();
    pipeline.uninit().unwrap();

    assert_eq!(ledger.live_objects(), 0);
    assert_eq!(ledger.live_contexts(), 0);
    assert_eq!(pipeline.stats().drawn_frames, 1);
    assert!(pipeline.halted().is_none());
    pipeline.shutdown();
}

#[test]
fn shutdown_releases_bindings_left_attached() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(4, 4))
        .unwrap();
    pipeline.attach_encoder(HeadlessSurface::new("encoder")).unwrap();
    drop(pipeline);

    assert_eq!(ledger.live_objects(), 0);
}

#[test]
fn double_attach_is_fatal_and_halts() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(4, 4))
        .unwrap();

    let err = pipeline
        .attach_display(HeadlessSurface::new("again"), PhysicalSize::new(4, 4))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Contract(ContractViolation::AlreadyAttached(BindingKind::Display))
    ));
    assert!(pipeline.halted().is_some());
    assert!(matches!(pipeline.detach_display(), Err(Error::Halted(_))));
    assert!(matches!(pipeline.sync(), Err(Error::Halted(_))));

    drop(pipeline);
    assert_eq!(ledger.live_objects(), 0);
}

#[test]
fn stray_detach_is_fatal() {
    let (pipeline, _ledger) = spawn();
    pipeline.init().unwrap();

    let err = pipeline.detach_encoder().unwrap_err();
    assert!(matches!(
        err,
        Error::Contract(ContractViolation::NotAttached(BindingKind::Encoder))
    ));
    assert!(err.is_fatal());
    assert!(matches!(pipeline.init(), Err(Error::Halted(_))));
}

#[test]
fn backend_creation_failure_is_reported_by_spawn() {
    init_tracing();
    let result = FramePipeline::<HeadlessBackend>::spawn(small_params(), || {
        Err(GpuError::ContextCreation("no device".into()))
    });
    assert!(matches!(
        result,
        Err(Error::Gpu(GpuError::ContextCreation(_)))
    ));
}

#[test]
fn frames_before_init_are_ignored() {
    let (pipeline, ledger) = spawn();
    notify(&pipeline, 1);
    assert_eq!(pipeline.stats().drawn_frames, 0);
    assert_eq!(pipeline.pending_frames(), 0);
    assert!(ledger.draws().is_empty());
}

#[test]
fn burst_behind_a_busy_render_thread_draws_once() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(4, 4))
        .unwrap();
    pipeline.attach_encoder(HeadlessSurface::new("encoder")).unwrap();

    // Park the render thread inside the screenshot callback of the first frame.
    let (entered_tx, entered_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded::<()>(1);
    pipeline.request_screenshot(Box::new(move |_| {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    }));
    pipeline.on_frame_available(frame(0)).unwrap();
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    for i in 1..=5 {
        pipeline.on_frame_available(frame(i * 100)).unwrap();
    }
    release_tx.send(()).unwrap();
    pipeline.sync().unwrap();

    let stats = pipeline.stats();
    assert_eq!(stats.drawn_frames, 2);
    assert_eq!(stats.dropped_frames, 4);
    assert_eq!(pipeline.pending_frames(), 0);
    assert_eq!(ledger.presents("encoder"), vec![Some(0), Some(500)]);
    assert_eq!(ledger.surface_draws("display").len(), 2);
}

#[test]
fn unsynchronized_burst_never_draws_more_than_notified() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(4, 4))
        .unwrap();

    for i in 0..50 {
        pipeline.on_frame_available(frame(i)).unwrap();
    }
    pipeline.sync().unwrap();

    let stats = pipeline.stats();
    assert!(stats.drawn_frames >= 1);
    assert!(stats.drawn_frames + stats.dropped_frames <= 50);
    assert_eq!(pipeline.pending_frames(), 0);
    assert_eq!(ledger.surface_draws("display").len() as u64, stats.drawn_frames);
}

#[test]
fn screenshot_is_taken_by_exactly_one_draw() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline.attach_encoder(HeadlessSurface::new("encoder")).unwrap();

    let (tx, rx) = channel::unbounded();
    pipeline.request_screenshot(Box::new(move |image| {
        let _ = tx.send(image.map(|image| image.dimensions()));
    }));
    for i in 0..3 {
        notify(&pipeline, i);
    }

    assert_eq!(rx.try_recv().unwrap(), Some((8, 16)));
    assert!(rx.try_recv().is_err());
    assert_eq!(ledger.readbacks(), 1);
}

#[test]
fn failed_readback_reports_none_and_clears_the_request() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline.attach_encoder(HeadlessSurface::new("encoder")).unwrap();
    ledger.fail_next_readbacks(1);

    let (tx, rx) = channel::unbounded();
    let first = tx.clone();
    pipeline.request_screenshot(Box::new(move |image| {
        let _ = first.send(image.is_some());
    }));
    notify(&pipeline, 1);
    notify(&pipeline, 2);
    assert_eq!(rx.try_recv().unwrap(), false);
    assert!(rx.try_recv().is_err());

    pipeline.request_screenshot(Box::new(move |image| {
        let _ = tx.send(image.is_some());
    }));
    notify(&pipeline, 3);
    assert_eq!(rx.try_recv().unwrap(), true);
    assert!(pipeline.halted().is_none());
}

#[test]
fn replacing_the_filter_mid_stream_brackets_each_instance() {
    let (pipeline, _ledger) = spawn();
    let journal = Journal::default();
    pipeline.init().unwrap();

    pipeline.set_filter(Some(Recording::boxed("a", &journal)));
    notify(&pipeline, 1);
    notify(&pipeline, 2);
    pipeline.set_filter(Some(Recording::boxed("b", &journal)));
    notify(&pipeline, 3);
    pipeline.set_filter(None);
    notify(&pipeline, 4);

    assert_eq!(
        *journal.lock(),
        ["a:init", "a:draw", "a:draw", "a:destroy", "b:init", "b:draw", "b:destroy"]
    );
}

#[test]
fn held_filter_slot_falls_back_to_pass_through() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline.set_filter(Some(Box::new(ShaderFilter::invert())));

    notify(&pipeline, 1);
    assert!(
        ledger
            .draws()
            .iter()
            .any(|draw| matches!(draw.program, ProgramKind::Custom(_)))
    );

    ledger.clear_events();
    {
        let guard = pipeline.acquire_filter();
        assert!(!guard.is_empty());
        pipeline.on_frame_available(frame(2)).unwrap();
        pipeline.sync().unwrap();
    }
    let draws = ledger.draws();
    assert!(draws.iter().any(|draw| draw.program == ProgramKind::Identity));
    assert!(
        !draws
            .iter()
            .any(|draw| matches!(draw.program, ProgramKind::Custom(_)))
    );
}

#[test]
fn display_stage_uses_the_latest_viewport() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(720, 1280))
        .unwrap();

    notify(&pipeline, 1);
    pipeline.update_viewport(PhysicalSize::new(360, 640));
    notify(&pipeline, 2);

    let viewports: Vec<_> = ledger
        .surface_draws("display")
        .iter()
        .map(|draw| draw.viewport)
        .collect();
    assert_eq!(
        viewports,
        [PhysicalSize::new(720, 1280), PhysicalSize::new(360, 640)]
    );
    assert!(
        ledger
            .surface_draws("display")
            .iter()
            .all(|draw| draw.target == DrawTarget::Surface)
    );
}

#[test]
fn presentation_failure_halts_the_pipeline() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(4, 4))
        .unwrap();
    ledger.fail_presents(true);

    pipeline.on_frame_available(frame(1)).unwrap();
    assert!(matches!(pipeline.sync(), Err(Error::Halted(_))));
    let reason = pipeline.halted().unwrap();
    assert!(reason.starts_with("frame_available"), "{reason}");
}

#[test]
fn facing_switch_reselects_the_camera_transform() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();

    let camera_coords = |ledger: &GpuLedger| -> Vec<Vec<f32>> {
        ledger
            .draws()
            .into_iter()
            .filter(|draw| matches!(draw.program, ProgramKind::CameraSample(_)))
            .map(|draw| draw.coords)
            .collect()
    };

    notify(&pipeline, 1);
    pipeline.set_camera_facing(camfan::CameraFacing::Front).unwrap();
    notify(&pipeline, 2);
    pipeline.set_camera_facing(camfan::CameraFacing::Back).unwrap();
    notify(&pipeline, 3);

    let coords = camera_coords(&ledger);
    assert_eq!(coords.len(), 3);
    assert_ne!(coords[0], coords[1]);
    assert_eq!(coords[0], coords[2]);
}

#[test]
fn camera_source_change_forgets_notifications_in_flight() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline.attach_encoder(HeadlessSurface::new("encoder")).unwrap();

    let (entered_tx, entered_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded::<()>(1);
    pipeline.request_screenshot(Box::new(move |_| {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    }));
    pipeline.on_frame_available(frame(0)).unwrap();
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    for i in 1..=3 {
        pipeline.on_frame_available(frame(i * 100)).unwrap();
    }
    assert_eq!(pipeline.pending_frames(), 3);
    pipeline.set_camera_source_changed();
    assert_eq!(pipeline.pending_frames(), 0);

    release_tx.send(()).unwrap();
    pipeline.sync().unwrap();

    assert_eq!(ledger.presents("encoder"), vec![Some(0), Some(300)]);
    assert_eq!(pipeline.stats().drawn_frames, 2);
    assert_eq!(pipeline.pending_frames(), 0);
    assert!(pipeline.halted().is_none());
}

#[test]
fn frame_queued_before_a_detach_still_reaches_that_surface() {
    let (pipeline, ledger) = spawn();
    pipeline.init().unwrap();
    pipeline
        .attach_display(HeadlessSurface::new("display"), PhysicalSize::new(4, 4))
        .unwrap();
    pipeline.attach_encoder(HeadlessSurface::new("encoder")).unwrap();

    pipeline.on_frame_available(frame(1)).unwrap();
    pipeline.detach_encoder().unwrap();
    pipeline.on_frame_available(frame(2)).unwrap();
    pipeline.detach_display().unwrap();

    assert_eq!(ledger.presents("encoder"), vec![Some(1)]);
    assert_eq!(ledger.presents("display"), vec![None, None]);
    assert_eq!(pipeline.stats().drawn_frames, 2);
    assert!(pipeline.halted().is_none());
}
