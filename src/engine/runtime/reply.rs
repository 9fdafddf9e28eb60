//! ### English
//! Answer slot for commands that a producer thread waits on.
//!
//! ### 中文
//! 生产者线程需要等待应答的命令所用的应答槽。

use std::mem;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

enum ReplyState<T> {
    Waiting,
    Answered(T),
    /// ### English
    /// The waiter took the answer, or gave up before it arrived.
    ///
    /// ### 中文
    /// 等待方已取走应答，或在应答到达前已放弃。
    Closed,
}

/// ### English
/// Answered at most once by the render thread; any thread may wait on it.
///
/// ### 中文
/// 由渲染线程至多应答一次；任意线程都可以等待它。
pub(crate) struct ReplySlot<T> {
    state: Mutex<ReplyState<T>>,
    answered: Condvar,
}

impl<T> ReplySlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ReplyState::Waiting),
            answered: Condvar::new(),
        }
    }

    /// ### English
    /// Stores the answer and wakes the waiter. Returns `false` if the slot was already
    /// answered or the waiter gave up.
    ///
    /// ### 中文
    /// 写入应答并唤醒等待方。若已应答过或等待方已放弃则返回 `false`。
    pub(crate) fn answer(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, ReplyState::Waiting) {
            return false;
        }
        *state = ReplyState::Answered(value);
        self.answered.notify_all();
        true
    }

    /// ### English
    /// Waits up to `timeout` for the answer. The slot is closed afterwards either way.
    ///
    /// ### 中文
    /// 最多等待 `timeout` 取得应答。无论结果如何，之后该槽都会关闭。
    pub(crate) fn wait_for(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let ReplyState::Answered(_) = &*state {
                break;
            }
            if self.answered.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        match mem::replace(&mut *state, ReplyState::Closed) {
            ReplyState::Answered(value) => Some(value),
            ReplyState::Waiting | ReplyState::Closed => None,
        }
    }
}
