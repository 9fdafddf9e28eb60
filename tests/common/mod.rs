#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use camfan::{
    CoreParameters, EncodedPacket, EncoderFormat, Error, FilterPass, GpuError, HardwareEncoder,
    HeadlessBackend, HeadlessSurface, Result, VideoFilter,
};
use crossbeam_channel as channel;
use dpi::PhysicalSize;
use parking_lot::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("camfan=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn small_params() -> CoreParameters {
    CoreParameters {
        video_width: 8,
        video_height: 16,
        ..CoreParameters::default()
    }
}

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Filter that only records which hooks ran.
pub struct Recording {
    pub name: &'static str,
    pub journal: Journal,
}

impl Recording {
    pub fn boxed(name: &'static str, journal: &Journal) -> Box<dyn VideoFilter<HeadlessBackend>> {
        Box::new(Self {
            name,
            journal: journal.clone(),
        })
    }

    fn log(&self, event: &str) {
        self.journal.lock().push(format!("{}:{event}", self.name));
    }
}

impl VideoFilter<HeadlessBackend> for Recording {
    fn initialize(
        &mut self,
        _gpu: &mut HeadlessBackend,
        _size: PhysicalSize<u32>,
    ) -> Result<(), GpuError> {
        self.log("init");
        Ok(())
    }

    fn draw(&mut self, _gpu: &mut HeadlessBackend, _pass: &FilterPass<'_>) -> Result<(), GpuError> {
        self.log("draw");
        Ok(())
    }

    fn destroy(&mut self, _gpu: &mut HeadlessBackend) {
        self.log("destroy");
    }
}

/// Knobs and call log shared by every [`MockEncoder`] a factory creates.
#[derive(Default)]
pub struct EncoderScript {
    pub calls: Mutex<Vec<String>>,
    pub configure_failures: AtomicU32,
    pub start_failures: AtomicU32,
    pub created: AtomicU32,
}

impl EncoderScript {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

pub struct MockEncoder {
    script: Arc<EncoderScript>,
    output: channel::Receiver<EncodedPacket>,
}

impl HardwareEncoder for MockEncoder {
    type Surface = HeadlessSurface;

    fn configure(&mut self, format: &EncoderFormat) -> Result<()> {
        self.script
            .record(format!("configure {}x{}", format.width, format.height));
        if EncoderScript::take_failure(&self.script.configure_failures) {
            return Err(Error::Encoder("configure rejected".into()));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.script.record("start");
        if EncoderScript::take_failure(&self.script.start_failures) {
            return Err(Error::Encoder("start rejected".into()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.script.record("stop");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.script.record("release");
        Ok(())
    }

    fn input_surface(&mut self) -> Result<HeadlessSurface> {
        Ok(HeadlessSurface::new("encoder"))
    }

    fn drain_output(&mut self, timeout: Duration) -> Result<Option<EncodedPacket>> {
        Ok(self.output.recv_timeout(timeout).ok())
    }
}

/// Builds an encoder factory; packets sent on the returned sender come out of `drain_output`.
pub fn encoder_factory(
    script: &Arc<EncoderScript>,
) -> (
    impl FnMut() -> Result<MockEncoder> + Send + 'static,
    channel::Sender<EncodedPacket>,
) {
    let (tx, rx) = channel::unbounded();
    let script = script.clone();
    let factory = move || {
        script.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockEncoder {
            script: script.clone(),
            output: rx.clone(),
        })
    };
    (factory, tx)
}
