//! 网络客户端
//!
//! 连接服务端后从控制台读取命令：`w` 发送一行文本，`s` 刷新写队列，`q` 退出。

mod client;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use client::ClientOptions;
use netcore::{
    ReactorConfig, SessionConfig, TransportConfig, TransportKind, DEFAULT_HOST, DEFAULT_PORT,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Tcp,
    Udp,
}

/// 网络客户端
#[derive(Parser, Debug)]
#[command(name = "net-client")]
#[command(about = "Console client for sentinel-framed messages")]
#[command(version)]
struct Args {
    /// 传输方式
    #[arg(short, long, value_enum, default_value_t = Mode::Tcp)]
    transport: Mode,

    /// 服务端地址
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// 服务端端口
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 事件循环线程数，1 为单线程
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// 连接超时（秒），不指定则一直等待
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// 连接建立后先发送的消息
    #[arg(long)]
    handshake: Option<String>,
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("net_client=debug".parse()?)
                .add_directive("netcore=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut session = SessionConfig::default();
    if let Some(message) = &args.handshake {
        session = session.with_handshake(message.as_bytes())?;
    }

    let options = ClientOptions {
        addr: format!("{}:{}", args.host, args.port),
        kind: match args.transport {
            Mode::Tcp => TransportKind::Stream,
            Mode::Udp => TransportKind::Datagram,
        },
        reactor: ReactorConfig {
            worker_threads: args.threads,
            thread_name: "net-client".to_string(),
        },
        transport: TransportConfig {
            connect_timeout: args.connect_timeout.map(std::time::Duration::from_secs),
            ..Default::default()
        },
        session,
    };

    info!("Connecting to {} ({:?})", options.addr, args.transport);
    client::run(options)
}
