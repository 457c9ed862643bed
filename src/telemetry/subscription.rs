//! 订阅：一个观察者对一个运行遥测通道的连接
//!
//! 只持有游标（下一条待投递事件的序号）；回放 backlog 后接收实时广播，
//! 广播落后（Lagged）或出现序号跳跃时从 journal 按游标补齐，保证无缺口无重复。

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::telemetry::{SequencedEvent, TelemetryChannel};

pub struct Subscription {
    channel: Arc<TelemetryChannel>,
    rx: broadcast::Receiver<SequencedEvent>,
    backlog: VecDeque<SequencedEvent>,
    cursor: u64,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(
        channel: Arc<TelemetryChannel>,
        rx: broadcast::Receiver<SequencedEvent>,
        backlog: VecDeque<SequencedEvent>,
        cursor: u64,
        finished: bool,
    ) -> Self {
        Self {
            channel,
            rx,
            backlog,
            cursor,
            finished,
        }
    }

    /// 下一条待投递事件的序号
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// 取下一条事件；终态状态事件投递后返回 None
    pub async fn next(&mut self) -> Option<SequencedEvent> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(ev) = self.backlog.pop_front() {
                if ev.seq < self.cursor {
                    continue;
                }
                self.cursor = ev.seq + 1;
                if ev.event.is_terminal() {
                    self.finished = true;
                }
                return Some(ev);
            }
            match self.rx.recv().await {
                Ok(ev) if ev.seq < self.cursor => continue,
                Ok(ev) if ev.seq == self.cursor => self.backlog.push_back(ev),
                Ok(_) | Err(RecvError::Lagged(_)) => self.resync(),
                Err(RecvError::Closed) => {
                    self.resync();
                    if self.backlog.is_empty() {
                        self.finished = true;
                    }
                }
            }
        }
    }

    /// 从 journal 补齐游标之后的全部事件
    fn resync(&mut self) {
        let journal = self.channel.journal();
        let start = (self.cursor as usize).min(journal.events.len());
        self.backlog.clear();
        self.backlog.extend(journal.events[start..].iter().cloned());
        if journal.closed && self.backlog.is_empty() {
            self.finished = true;
        }
    }

    /// 读到终态为止，返回全部事件
    pub async fn collect_all(mut self) -> Vec<SequencedEvent> {
        let mut out = Vec::new();
        while let Some(ev) = self.next().await {
            out.push(ev);
        }
        out
    }

    /// 转为 Stream（供 SSE 等传输层使用）
    pub fn into_stream(self) -> impl Stream<Item = SequencedEvent> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|ev| (ev, sub))
        })
    }
}
