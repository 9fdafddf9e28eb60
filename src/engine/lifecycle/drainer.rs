//! ### English
//! Output drain thread: pulls packets from the hardware encoder and forwards them to a sink.
//!
//! ### 中文
//! 输出 drain 线程：从硬件编码器取出编码包并转交给 sink。

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{self as channel, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;

use crate::engine::error::{Error, Result};

use super::encoder::{HardwareEncoder, PacketSink};

const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
const IDLE_WAIT: Duration = Duration::from_millis(5);

pub(super) struct OutputDrainer {
    stop: channel::Sender<()>,
    thread: Option<thread::JoinHandle<u64>>,
}

impl OutputDrainer {
    pub(super) fn spawn<E, K>(encoder: Arc<Mutex<E>>, mut sink: K) -> Result<Self>
    where
        E: HardwareEncoder + 'static,
        K: PacketSink,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("camfan-video-sender".into())
            .spawn(move || {
                let mut forwarded = 0u64;
                loop {
                    match stop_rx.try_recv() {
                        Err(TryRecvError::Empty) => {}
                        Ok(()) | Err(TryRecvError::Disconnected) => break,
                    }

                    let drained = encoder.lock().drain_output(DRAIN_TIMEOUT);
                    match drained {
                        Ok(Some(packet)) => {
                            tracing::trace!(
                                target: "camfan::sender",
                                pts_us = packet.pts_us,
                                bytes = packet.data.len(),
                                "packet forwarded"
                            );
                            sink.on_packet(packet);
                            forwarded += 1;
                            continue;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            tracing::warn!(target: "camfan::sender", "drain_output failed: {err}");
                        }
                    }

                    match stop_rx.recv_timeout(IDLE_WAIT) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                forwarded
            })
            .map_err(|err| Error::Encoder(format!("failed to spawn sender thread: {err}")))?;

        Ok(Self {
            stop: stop_tx,
            thread: Some(thread),
        })
    }

    /// ### English
    /// Signals the thread and joins it; returns how many packets it forwarded.
    ///
    /// ### 中文
    /// 通知线程退出并 join；返回已转发的包数。
    pub(super) fn stop(&mut self) -> u64 {
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        let _ = self.stop.try_send(());
        match thread.join() {
            Ok(forwarded) => {
                tracing::debug!(target: "camfan::sender", forwarded, "sender thread stopped");
                forwarded
            }
            Err(_) => {
                tracing::error!(target: "camfan::sender", "sender thread panicked");
                0
            }
        }
    }
}

impl Drop for OutputDrainer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::engine::lifecycle::encoder::{EncodedPacket, EncoderFormat};

    struct Queued(VecDeque<EncodedPacket>);

    impl HardwareEncoder for Queued {
        type Surface = ();

        fn configure(&mut self, _format: &EncoderFormat) -> Result<()> {
            Ok(())
        }
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        fn release(&mut self) -> Result<()> {
            Ok(())
        }
        fn input_surface(&mut self) -> Result<()> {
            Ok(())
        }
        fn drain_output(&mut self, _timeout: Duration) -> Result<Option<EncodedPacket>> {
            Ok(self.0.pop_front())
        }
    }

    fn packet(pts_us: i64) -> EncodedPacket {
        EncodedPacket {
            data: vec![0, 0, 0, 1],
            pts_us,
            keyframe: pts_us == 0,
            codec_config: false,
        }
    }

    #[test]
    fn forwards_every_packet_in_order_then_stops() {
        let encoder = Arc::new(Mutex::new(Queued((0..3).map(packet).collect())));
        let (tx, rx) = channel::unbounded();
        let mut drainer = OutputDrainer::spawn(encoder, tx).unwrap();

        let received: Vec<i64> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().pts_us)
            .collect();
        assert_eq!(received, vec![0, 1, 2]);
        assert_eq!(drainer.stop(), 3);
        assert_eq!(drainer.stop(), 0);
    }
}
