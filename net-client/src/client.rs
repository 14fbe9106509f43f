//! 客户端运行逻辑

use netcore::console::{self, Command};
use netcore::{
    datagram, event_channel, stream, EventKind, EventReceiver, EventSender, Reactor,
    ReactorConfig, ReactorHandle, SessionConfig, SessionHandle, TransportConfig, TransportKind,
    SHUTDOWN_GRACE,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

/// 客户端启动参数
#[derive(Debug)]
pub struct ClientOptions {
    pub addr: String,
    pub kind: TransportKind,
    pub reactor: ReactorConfig,
    pub transport: TransportConfig,
    pub session: SessionConfig,
}

/// 连接并运行到会话关闭；连接失败不重试，直接返回错误
pub fn run(options: ClientOptions) -> anyhow::Result<()> {
    let reactor = Reactor::new(options.reactor.clone())?;
    let handle = reactor.handle();

    let result = reactor.block_on(async {
        let (events_tx, events) = event_channel();
        let session = match connect(&handle, &options, events_tx).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to connect to {}: {}", options.addr, e);
                return Err(anyhow::Error::from(e));
            }
        };
        println!("Connected to {}", session.endpoint());

        drive(&session, events, console::spawn_stdin()).await;
        anyhow::Ok(())
    });

    reactor.shutdown(SHUTDOWN_GRACE);
    result
}

async fn connect(
    reactor: &ReactorHandle,
    options: &ClientOptions,
    events: EventSender,
) -> netcore::Result<SessionHandle> {
    let session = options.session.clone();
    let handle = match options.kind {
        TransportKind::Stream => {
            stream::connect(reactor, &options.addr, &options.transport, session, events)
                .await?
                .start()
        }
        TransportKind::Datagram => {
            datagram::connect(reactor, &options.addr, session, events)
                .await?
                .start()
        }
    };
    Ok(handle)
}

/// 打印事件并执行控制台命令，直到会话关闭
async fn drive(
    session: &SessionHandle,
    mut events: EventReceiver,
    mut commands: UnboundedReceiver<Command>,
) {
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                println!("{}", event);
                if event.kind == EventKind::Closed {
                    return;
                }
            }
            command = commands.recv() => {
                let command = command.unwrap_or(Command::Quit);
                match &command {
                    Command::Unknown(input) => println!("Unknown command: {}", input),
                    _ => {
                        if let Err(e) = command.apply(session) {
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

    info!("Disconnecting...");
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(event) = events.recv().await {
            println!("{}", event);
            if event.kind == EventKind::Closed {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!("Shutdown timeout, {} frame(s) still pending", session.pending());
    }
}
