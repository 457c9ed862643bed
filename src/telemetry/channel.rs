//! 单运行遥测通道：单生产者 / 多消费者
//!
//! 所有事件先写入只追加的 journal 再广播，journal 与广播在同一把锁内完成，
//! 因此新订阅者「先回放 journal 再接实时事件」时不会有缺口或重复。
//! 终态状态事件发布后通道关闭，之后的 publish 被忽略。

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::telemetry::{SequencedEvent, Subscription, TelemetryEvent};

pub(crate) struct Journal {
    pub(crate) events: Vec<SequencedEvent>,
    pub(crate) closed: bool,
}

/// 遥测通道：journal（完整历史）+ broadcast（实时推送）
pub struct TelemetryChannel {
    journal: Mutex<Journal>,
    tx: broadcast::Sender<SequencedEvent>,
}

impl TelemetryChannel {
    /// capacity：广播缓冲大小，观察者落后超过该值时自动从 journal 补齐
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            journal: Mutex::new(Journal {
                events: Vec::new(),
                closed: false,
            }),
            tx,
        })
    }

    pub(crate) fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 发布事件，返回分配的序号；通道已关闭（已发布终态）时返回 None
    pub fn publish(&self, event: TelemetryEvent) -> Option<u64> {
        let mut journal = self.journal();
        if journal.closed {
            tracing::warn!(?event, "Telemetry publish after terminal status ignored");
            return None;
        }
        let seq = journal.events.len() as u64;
        let sequenced = SequencedEvent { seq, event };
        if sequenced.event.is_terminal() {
            journal.closed = true;
        }
        journal.events.push(sequenced.clone());
        // 没有实时订阅者时 send 返回 Err，事件已在 journal 中，忽略即可
        let _ = self.tx.send(sequenced);
        Some(seq)
    }

    /// 从头订阅：先回放全部历史，再接实时事件
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        self.subscribe_from(0)
    }

    /// 从指定序号开始订阅（断线重连时传入上次收到的 seq + 1）
    pub fn subscribe_from(self: &Arc<Self>, cursor: u64) -> Subscription {
        let journal = self.journal();
        let rx = self.tx.subscribe();
        let start = (cursor as usize).min(journal.events.len());
        let backlog = journal.events[start..].iter().cloned().collect();
        let exhausted = journal.closed && start >= journal.events.len();
        drop(journal);
        Subscription::new(Arc::clone(self), rx, backlog, cursor, exhausted)
    }

    /// 已发布事件的完整副本
    pub fn history(&self) -> Vec<SequencedEvent> {
        self.journal().events.clone()
    }

    pub fn len(&self) -> usize {
        self.journal().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.journal().closed
    }

    /// 当前实时订阅者数量
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
