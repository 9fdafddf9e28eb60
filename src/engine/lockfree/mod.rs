//! ### English
//! Lock-free handoff used between producer threads and the render thread.
//!
//! ### 中文
//! 生产者线程与渲染线程之间使用的无锁交接。
mod coalesced;

pub(crate) use coalesced::CoalescedBox;
