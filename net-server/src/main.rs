//! 网络服务端
//!
//! TCP 模式接受任意数量的连接，UDP 模式绑定单个数据报会话。
//! 默认把收到的每条消息原样发回。

mod server;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use netcore::{ReactorConfig, SessionConfig, TransportKind, DEFAULT_HOST, DEFAULT_PORT};
use server::ServerOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Tcp,
    Udp,
}

/// 网络服务端
#[derive(Parser, Debug)]
#[command(name = "net-server")]
#[command(about = "Echo server for sentinel-framed messages")]
#[command(version)]
struct Args {
    /// 传输方式
    #[arg(short, long, value_enum, default_value_t = Mode::Tcp)]
    transport: Mode,

    /// 监听地址
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// 监听端口
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 事件循环线程数，1 为单线程
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// 不回显收到的消息
    #[arg(long)]
    no_echo: bool,

    /// 会话启动时先发送的消息
    #[arg(long)]
    handshake: Option<String>,
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("net_server=debug".parse()?)
                .add_directive("netcore=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut session = SessionConfig::default().with_echo(!args.no_echo);
    if let Some(message) = &args.handshake {
        session = session.with_handshake(message.as_bytes())?;
    }

    let options = ServerOptions {
        addr: format!("{}:{}", args.host, args.port),
        kind: match args.transport {
            Mode::Tcp => TransportKind::Stream,
            Mode::Udp => TransportKind::Datagram,
        },
        reactor: ReactorConfig {
            worker_threads: args.threads,
            ..Default::default()
        },
        session,
    };

    info!("Server starting on {} ({:?})", options.addr, args.transport);
    server::run(options)
}
