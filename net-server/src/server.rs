//! 服务端运行逻辑

use std::time::{Duration, Instant};

use netcore::console::{self, Command};
use netcore::{
    datagram, event_channel, EventKind, EventReceiver, Listener, Reactor, ReactorConfig,
    ReactorHandle, SessionConfig, TransportConfig, TransportKind, SHUTDOWN_GRACE,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// 关闭期间检查会话数的间隔
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// 服务端启动参数
#[derive(Debug)]
pub struct ServerOptions {
    pub addr: String,
    pub kind: TransportKind,
    pub reactor: ReactorConfig,
    pub session: SessionConfig,
}

/// 创建事件循环并运行到控制台发出 `q`
pub fn run(options: ServerOptions) -> anyhow::Result<()> {
    let reactor = Reactor::new(options.reactor.clone())?;
    let handle = reactor.handle();
    let commands = console::spawn_stdin();

    let result = match options.kind {
        TransportKind::Stream => reactor.block_on(run_stream(&handle, options, commands)),
        TransportKind::Datagram => reactor.block_on(run_datagram(&handle, options, commands)),
    };

    reactor.shutdown(SHUTDOWN_GRACE);
    result
}

async fn run_stream(
    reactor: &ReactorHandle,
    options: ServerOptions,
    mut commands: UnboundedReceiver<Command>,
) -> anyhow::Result<()> {
    let (events_tx, mut events) = event_channel();
    let listener = Listener::bind(
        reactor,
        &options.addr,
        TransportConfig::default(),
        options.session,
        events_tx,
    )
    .await?;
    println!("Listening on {}", listener.local_endpoint());
    listener.start_accepting();

    loop {
        tokio::select! {
            Some(event) = events.recv() => println!("{}", event),
            command = commands.recv() => match command {
                Some(Command::Quit) | None => break,
                Some(Command::Unknown(input)) => println!("Unknown command: {}", input),
                Some(other) => println!("{:?} is only available in udp mode", other),
            },
        }
    }

    info!("Received quit, initiating graceful shutdown...");
    listener.shutdown_all();

    // 等待所有会话关闭（最多等待 SHUTDOWN_GRACE）
    let start = Instant::now();
    while !listener.is_empty() {
        if start.elapsed() > SHUTDOWN_GRACE {
            warn!("Shutdown timeout, {} session(s) still active", listener.len());
            break;
        }
        tokio::select! {
            Some(event) = events.recv() => println!("{}", event),
            _ = tokio::time::sleep(SHUTDOWN_POLL) => {}
        }
    }
    print_pending(&mut events);

    info!("Server shutdown complete");
    Ok(())
}

async fn run_datagram(
    reactor: &ReactorHandle,
    options: ServerOptions,
    mut commands: UnboundedReceiver<Command>,
) -> anyhow::Result<()> {
    let (events_tx, mut events) = event_channel();
    let session = datagram::bind(reactor, &options.addr, options.session, events_tx).await?;
    println!("Listening on {}", session.handle().endpoint());
    let session = session.start();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                println!("{}", event);
                if event.kind == EventKind::Closed {
                    return Ok(());
                }
            }
            command = commands.recv() => {
                let command = command.unwrap_or(Command::Quit);
                match &command {
                    Command::Unknown(input) => println!("Unknown command: {}", input),
                    _ => {
                        if let Err(e) = command.apply(&session) {
                            println!("Message not queued: {}", e);
                        }
                    }
                }
                if command == Command::Quit {
                    break;
                }
            }
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, session.closed()).await.is_err() {
        warn!("Shutdown timeout, {} frame(s) still pending", session.pending());
    }
    print_pending(&mut events);

    info!("Server shutdown complete");
    Ok(())
}

/// 打印已经到达但尚未显示的事件
fn print_pending(events: &mut EventReceiver) {
    while let Ok(event) = events.try_recv() {
        println!("{}", event);
    }
}
