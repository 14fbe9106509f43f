//! 帧编解码
//!
//! 帧格式:
//! ```text
//! ┌──────────────────────────────────────────┬──────────────┐
//! │            Payload (N bytes)             │ Sentinel (1B)│
//! │      不允许包含 0x00 的任意字节序列       │     0x00     │
//! └──────────────────────────────────────────┴──────────────┘
//! ```
//!
//! 没有长度前缀也没有校验和，接收方只靠扫描分隔符恢复消息边界。
//! 编解码器不做任何 I/O，给定相同的输入总是得到相同的结果。

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::SENTINEL;
use crate::error::{NetError, Result};

/// 一条已编码的帧：载荷加一个分隔符
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// 帧的线上字节（含分隔符）
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 载荷部分（不含分隔符）
    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    /// 线上长度，等于载荷长度 + 1
    pub fn wire_len(&self) -> usize {
        self.bytes.len()
    }

    /// 取出载荷，不复制
    pub fn into_payload(self) -> Bytes {
        let len = self.bytes.len() - 1;
        self.bytes.slice(..len)
    }
}

/// 单次解码的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// 解出的消息；缓冲区中还没有完整帧时为 `None`
    pub message: Option<Bytes>,
    /// 应从缓冲区头部移除的字节数（包含分隔符）
    pub consumed: usize,
}

/// 分隔符帧编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// 把消息编码为一帧
    ///
    /// 消息中出现分隔符时返回 [`NetError::InvalidPayload`]，不做转义。
    /// 空消息是合法的，编码结果只有一个分隔符。
    pub fn encode(message: &[u8]) -> Result<Frame> {
        if let Some(offset) = message.iter().position(|&b| b == SENTINEL) {
            return Err(NetError::InvalidPayload { offset });
        }

        let mut buf = BytesMut::with_capacity(message.len() + 1);
        buf.put_slice(message);
        buf.put_u8(SENTINEL);
        Ok(Frame { bytes: buf.freeze() })
    }

    /// 在累积缓冲区中查找第一条完整消息
    ///
    /// 找不到分隔符时返回 `message: None, consumed: 0`，调用方应继续读取。
    pub fn try_decode(buffer: &[u8]) -> Decoded {
        match buffer.iter().position(|&b| b == SENTINEL) {
            Some(end) => Decoded {
                message: Some(Bytes::copy_from_slice(&buffer[..end])),
                consumed: end + 1,
            },
            None => Decoded {
                message: None,
                consumed: 0,
            },
        }
    }

    /// 从累积缓冲区中取出第一条完整消息并移除其占用的字节
    ///
    /// 与 [`try_decode`](Self::try_decode) 语义相同，但直接切分 `BytesMut`，不复制载荷。
    pub fn decode_from(buffer: &mut BytesMut) -> Option<Bytes> {
        let end = buffer.iter().position(|&b| b == SENTINEL)?;
        let mut frame = buffer.split_to(end + 1);
        frame.truncate(end);
        Some(frame.freeze())
    }
}
