use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// ### English
/// Latest-wins slot holding one boxed payload.
///
/// Writers swap a new node in and get the superseded one back; the render thread takes the
/// current node out. One spare node is cached so a steady stream of camera frames does not
/// allocate on every notification.
///
/// ### 中文
/// “只保留最新值”的单槽，存放一个 `Box<T>`。
///
/// 写端原子换入新节点并拿回被覆盖的旧节点；渲染线程取走当前节点。
/// 额外缓存一个空闲节点，使连续的相机帧通知不必每次分配。
pub(crate) struct CoalescedBox<T> {
    slot: AtomicPtr<T>,
    spare: AtomicPtr<T>,
}

unsafe impl<T: Send> Send for CoalescedBox<T> {}
unsafe impl<T: Send> Sync for CoalescedBox<T> {}

impl<T> Default for CoalescedBox<T> {
    fn default() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
            spare: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

#[inline]
fn reclaim<T>(raw: *mut T) -> Option<Box<T>> {
    if raw.is_null() {
        None
    } else {
        // Every non-null pointer stored here came from `Box::into_raw` and is owned by the slot.
        Some(unsafe { Box::from_raw(raw) })
    }
}

impl<T> CoalescedBox<T> {
    #[inline]
    pub(crate) fn is_pending(&self) -> bool {
        !self.slot.load(Ordering::Acquire).is_null()
    }

    /// ### English
    /// Stores `node`, returning the payload it superseded (if any).
    ///
    /// ### 中文
    /// 写入 `node`，返回被覆盖的旧载荷（若有）。
    #[inline]
    pub(crate) fn replace(&self, node: Box<T>) -> Option<Box<T>> {
        reclaim(self.slot.swap(Box::into_raw(node), Ordering::AcqRel))
    }

    #[inline]
    pub(crate) fn take(&self) -> Option<Box<T>> {
        reclaim(self.slot.swap(ptr::null_mut(), Ordering::AcqRel))
    }

    /// ### English
    /// Stores a `Copy` value, reusing the spare node when one is cached.
    ///
    /// ### 中文
    /// 写入一个 `Copy` 值；若有缓存的空闲节点则复用。
    pub(crate) fn store_value(&self, value: T)
    where
        T: Copy,
    {
        let node = match reclaim(self.spare.swap(ptr::null_mut(), Ordering::AcqRel)) {
            Some(mut node) => {
                *node = value;
                node
            }
            None => Box::new(value),
        };
        if let Some(old) = self.replace(node) {
            self.recycle(old);
        }
    }

    /// ### English
    /// Takes the current `Copy` value and returns its node to the spare cache.
    ///
    /// ### 中文
    /// 取出当前 `Copy` 值，并把节点放回空闲缓存。
    pub(crate) fn take_value(&self) -> Option<T>
    where
        T: Copy,
    {
        let node = self.take()?;
        let value = *node;
        self.recycle(node);
        Some(value)
    }

    #[inline]
    fn recycle(&self, node: Box<T>) {
        drop(reclaim(self.spare.swap(Box::into_raw(node), Ordering::AcqRel)));
    }
}

impl<T> Drop for CoalescedBox<T> {
    fn drop(&mut self) {
        drop(reclaim(*self.slot.get_mut()));
        drop(reclaim(*self.spare.get_mut()));
    }
}
