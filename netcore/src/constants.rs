//! 协议常量定义

use std::time::Duration;

/// 帧分隔符（哨兵字节），不允许出现在消息内容中
pub const SENTINEL: u8 = 0x00;

/// 默认服务器地址
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// 默认端口
pub const DEFAULT_PORT: u16 = 1111;

/// 流式读取时每次预留的缓冲区大小
pub const READ_CHUNK_SIZE: usize = 4096;

/// UDP 数据报最大载荷
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// 累积缓冲区中未完成帧的最大长度
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// 服务端关闭时等待会话退出的最长时间（秒）
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// 关闭等待 Duration
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(SHUTDOWN_GRACE_SECS);
