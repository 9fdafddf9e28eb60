//! ### English
//! One-shot screenshot hook, serviced by the encoder stage of the next draw pass.
//!
//! ### 中文
//! 一次性截图钩子，由下一次绘制流程的编码器阶段处理。

use dpi::PhysicalSize;
use image::RgbaImage;

use super::lockfree::CoalescedBox;

/// ### English
/// Receives the composed frame, or `None` when the readback failed or the request was
/// superseded or abandoned.
///
/// ### 中文
/// 接收合成后的帧；若读回失败、请求被覆盖或被放弃，则收到 `None`。
pub type ScreenshotCallback = Box<dyn FnOnce(Option<RgbaImage>) + Send>;

struct ScreenshotRequest {
    callback: ScreenshotCallback,
}

/// ### English
/// Write-once, read-once request slot. A newer request supersedes a pending one.
///
/// ### 中文
/// 写一次、读一次的请求槽；新请求会覆盖尚未处理的旧请求。
#[derive(Default)]
pub struct ScreenshotSlot {
    pending: CoalescedBox<ScreenshotRequest>,
}

impl ScreenshotSlot {
    pub fn request(&self, callback: ScreenshotCallback) {
        if let Some(superseded) = self.pending.replace(Box::new(ScreenshotRequest { callback })) {
            tracing::debug!(target: "camfan::screenshot", "pending screenshot superseded");
            (superseded.callback)(None);
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.is_pending()
    }

    /// ### English
    /// Takes the pending request and answers it with the result of `read`.
    /// Returns whether a request was serviced.
    ///
    /// ### 中文
    /// 取出待处理请求，并以 `read` 的结果应答。返回是否处理了请求。
    pub(crate) fn service<E: std::fmt::Display>(
        &self,
        size: PhysicalSize<u32>,
        read: impl FnOnce() -> Result<Vec<u8>, E>,
    ) -> bool {
        let Some(request) = self.pending.take() else {
            return false;
        };
        let image = match read() {
            Ok(pixels) => image_from_bottom_up_rows(pixels, size),
            Err(err) => {
                tracing::warn!(target: "camfan::screenshot", "screenshot readback failed: {err}");
                None
            }
        };
        if image.is_none() {
            tracing::warn!(target: "camfan::screenshot", "delivering failed screenshot");
        }
        (request.callback)(image);
        true
    }

    /// ### English
    /// Answers any pending request with `None`.
    ///
    /// ### 中文
    /// 以 `None` 应答尚未处理的请求。
    pub(crate) fn abandon(&self) {
        if let Some(request) = self.pending.take() {
            tracing::debug!(target: "camfan::screenshot", "pending screenshot abandoned");
            (request.callback)(None);
        }
    }
}

/// ### English
/// Converts a GL readback (bottom row first) into a top-down image.
///
/// ### 中文
/// 将 GL 读回数据（自底行开始）转换为自顶向下的图像。
pub(crate) fn image_from_bottom_up_rows(
    mut pixels: Vec<u8>,
    size: PhysicalSize<u32>,
) -> Option<RgbaImage> {
    let stride = size.width as usize * 4;
    let height = size.height as usize;
    if stride == 0 || pixels.len() != stride * height {
        return None;
    }
    for y in 0..height / 2 {
        let top_start = y * stride;
        let bottom_start = (height - y - 1) * stride;
        let (head, tail) = pixels.split_at_mut(bottom_start);
        head[top_start..top_start + stride].swap_with_slice(&mut tail[..stride]);
    }
    RgbaImage::from_raw(size.width, size.height, pixels)
}

impl Drop for ScreenshotSlot {
    fn drop(&mut self) {
        self.abandon();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    type Results = Arc<Mutex<Vec<Option<RgbaImage>>>>;

    fn recorder(results: &Results) -> ScreenshotCallback {
        let results = results.clone();
        Box::new(move |image| results.lock().push(image))
    }

    #[test]
    fn flips_rows_top_down() {
        let size = PhysicalSize::new(1, 3);
        let pixels = vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];
        let image = image_from_bottom_up_rows(pixels, size).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [2, 2, 2, 2]);
        assert_eq!(image.get_pixel(0, 2).0, [0, 0, 0, 0]);
        assert!(image_from_bottom_up_rows(vec![0; 3], size).is_none());
    }

    #[test]
    fn serviced_once() {
        let results = Results::default();
        let slot = ScreenshotSlot::default();
        slot.request(recorder(&results));
        assert!(slot.is_pending());

        let size = PhysicalSize::new(2, 2);
        assert!(slot.service(size, || Ok::<_, String>(vec![7; 16])));
        assert!(!slot.is_pending());
        assert!(!slot.service(size, || Ok::<_, String>(vec![7; 16])));

        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().map(|img| img.dimensions()), Some((2, 2)));
    }

    #[test]
    fn failure_delivers_none_and_clears() {
        let results = Results::default();
        let slot = ScreenshotSlot::default();
        slot.request(recorder(&results));
        assert!(slot.service(PhysicalSize::new(2, 2), || Err("lost context")));
        assert!(!slot.is_pending());
        assert_eq!(results.lock().len(), 1);
        assert!(results.lock()[0].is_none());
    }

    #[test]
    fn superseded_and_abandoned_requests_get_none() {
        let results = Results::default();
        let slot = ScreenshotSlot::default();
        slot.request(recorder(&results));
        slot.request(recorder(&results));
        assert_eq!(results.lock().len(), 1);
        drop(slot);
        assert_eq!(results.lock().len(), 2);
        assert!(results.lock().iter().all(Option::is_none));
    }
}
