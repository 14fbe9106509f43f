//! 控制台命令
//!
//! `q` 请求关闭，`s` 刷新写队列，`w <文本>` 把一行文本作为出站消息入队。
//! 只输入 `w` 时，下一行整行作为消息内容。

use std::io::{self, BufRead};
use std::thread;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::session::SessionHandle;

/// 控制台命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Flush,
    Write(String),
    Unknown(String),
}

impl Command {
    /// 解析一行输入，空行返回 `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim_start();
        if trimmed.trim_end().is_empty() {
            return None;
        }

        let (word, rest) = match trimmed.find(char::is_whitespace) {
            Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
            None => (trimmed, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "q" | "quit" => Self::Quit,
            "s" | "send" => Self::Flush,
            "w" | "write" => Self::Write(rest.to_string()),
            _ => Self::Unknown(trimmed.trim_end().to_string()),
        };
        Some(command)
    }

    /// 把命令作用到会话上
    ///
    /// `Write` 的入队失败原样返回，由调用方决定如何提示。
    pub fn apply(&self, session: &SessionHandle) -> Result<()> {
        match self {
            Self::Quit => session.request_shutdown(),
            Self::Flush => session.flush(),
            Self::Write(text) => session.enqueue_outbound(text.as_bytes())?,
            Self::Unknown(_) => {}
        }
        Ok(())
    }
}

/// 逐行读取命令
pub struct Console<R> {
    input: R,
}

impl<R: BufRead> Console<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(e) => {
                debug!("Console input failed: {}", e);
                None
            }
        }
    }
}

impl<R: BufRead> Iterator for Console<R> {
    type Item = Command;

    fn next(&mut self) -> Option<Command> {
        loop {
            let line = self.next_line()?;
            let Some(command) = Command::parse(&line) else {
                continue;
            };

            if is_bare_write(&line) {
                let text = self.next_line()?;
                return Some(Command::Write(text.trim_end_matches(['\r', '\n']).to_string()));
            }
            return Some(command);
        }
    }
}

/// 在独立线程中读取标准输入，输入结束时补发一条 `Quit`
pub fn spawn_stdin() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for command in Console::new(io::stdin().lock()) {
            if tx.send(command).is_err() {
                return;
            }
        }
        let _ = tx.send(Command::Quit);
    });
    rx
}

fn is_bare_write(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "w" | "write")
}
