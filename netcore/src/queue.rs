//! 出站写队列
//!
//! 每个会话一个队列。外部线程入队，写循环出队；任何时刻最多只有一次写操作在途，
//! 队首元素在其写操作确认完成之前不会被移除。

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::codec::Frame;
use crate::error::{NetError, Result};

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<Frame>,
    in_flight: bool,
    closed: bool,
}

/// 线程安全的有序写队列
#[derive(Debug, Default)]
pub struct WriteQueue {
    state: Mutex<QueueState>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一帧到队尾
    ///
    /// 返回 `true` 表示当前没有在途写操作，调用方应唤醒写循环。
    /// 队列关闭后返回 [`NetError::SessionClosed`]。
    pub fn push(&self, frame: Frame) -> Result<bool> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(NetError::SessionClosed);
        }
        state.frames.push_back(frame);
        Ok(!state.in_flight)
    }

    /// 开始发送队首帧
    ///
    /// 已有在途写操作或队列为空时返回 `None`；否则标记在途并返回队首帧的副本。
    pub fn begin(&self) -> Option<Frame> {
        let mut state = self.state.lock();
        if state.in_flight {
            return None;
        }
        let front = state.frames.front().cloned()?;
        state.in_flight = true;
        Some(front)
    }

    /// 确认在途写操作已完整发送，弹出队首帧
    pub fn complete(&self) -> Option<Frame> {
        let mut state = self.state.lock();
        if !state.in_flight {
            return None;
        }
        state.in_flight = false;
        state.frames.pop_front()
    }

    /// 拒绝后续入队；已在队列中的帧不受影响
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// 丢弃所有待发送帧并清除在途标记，返回丢弃的帧数
    pub fn abort(&self) -> usize {
        let mut state = self.state.lock();
        state.in_flight = false;
        let dropped = state.frames.len();
        state.frames.clear();
        state.frames.shrink_to_fit();
        dropped
    }

    /// 待发送帧数（包括在途的那一帧）
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    pub fn in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    /// 队列为空且没有在途写操作
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.frames.is_empty() && !state.in_flight
    }
}
