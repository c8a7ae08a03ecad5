//! 事件总线 - 订阅注册表与一次性等待者
//!
//! 调度循环把每个解码后的事件交给总线扇出：
//! - 持久监听器按类别订阅，按订阅顺序逐个调用；每次调用被
//!   `catch_unwind` 隔离，监听器 panic 记录日志后跳过，绝不
//!   传播进调度循环，也不影响后续监听器。
//! - 一次性等待者携带谓词注册；首个匹配事件送达后即注销。
//!   丢弃等待者句柄等价于取消等待，对底层状态无任何副作用。
//!   谓词同样被 `catch_unwind` 隔离，panic 的等待者被注销并以
//!   `ConnectionLost` 解除。
//!
//! 每个监听器对每个事件至多收到一次。总线关闭时所有未决等待者
//! 以 `ConnectionLost` 解除，不会永远挂起。

use crate::metrics::EngineMetrics;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use rovi_protocol::{Event, EventCategory};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// 等待失败原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// 等待窗口内无匹配事件（正常结果，非会话故障）
    #[error("Wait timed out")]
    Timeout,

    /// 会话在等待期间断开
    #[error("Connection lost")]
    ConnectionLost,
}

/// 持久事件监听器
///
/// 回调在调度循环线程上执行，必须保持轻量非阻塞；
/// 慢监听器会推迟同一事件对后续监听器的送达。
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

// 闭包可直接用作监听器
impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// 监听器句柄（用于退订）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: u64,
    category: EventCategory,
    callback: Arc<dyn EventListener>,
}

struct WaiterEntry {
    id: u64,
    predicate: Box<dyn Fn(&Event) -> bool + Send>,
    tx: Sender<Result<Event, WaitError>>,
}

struct BusInner {
    next_id: u64,
    /// 按订阅顺序保存（扇出顺序 = 订阅顺序）
    listeners: Vec<ListenerEntry>,
    waiters: Vec<WaiterEntry>,
    closed: bool,
}

/// 事件总线
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                listeners: Vec::new(),
                waiters: Vec::new(),
                closed: false,
            })),
        }
    }

    /// 注册持久监听器，接收指定类别的所有后续事件
    pub fn add_listener(
        &self,
        category: EventCategory,
        callback: Arc<dyn EventListener>,
    ) -> ListenerId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.listeners.push(ListenerEntry {
            id,
            category,
            callback,
        });
        trace!(id, ?category, "listener added");
        ListenerId(id)
    }

    /// 退订监听器（重复退订是无操作）
    pub fn remove_listener(&self, id: ListenerId) {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|entry| entry.id != id.0);
    }

    /// 注册一次性等待者
    ///
    /// 返回的句柄在首个满足谓词的事件到达后可取走该事件；
    /// 总线已关闭时句柄立即以 `ConnectionLost` 解除。
    pub fn register_waiter(
        &self,
        predicate: impl Fn(&Event) -> bool + Send + 'static,
    ) -> EventWaiter {
        let (tx, rx) = bounded(1);
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        if inner.closed {
            // 关闭后注册的等待者立即解除，调用方不会挂起
            let _ = tx.send(Err(WaitError::ConnectionLost));
        } else {
            inner.waiters.push(WaiterEntry {
                id,
                predicate: Box::new(predicate),
                tx,
            });
        }
        EventWaiter {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// 扇出一个事件（仅由调度循环调用）
    ///
    /// 顺序：先解除匹配的等待者，再按订阅顺序调用持久监听器。
    /// 监听器在锁外调用，等待者送达用 `send` 到容量 1 的通道
    /// （等待者至多收一个事件，不会阻塞）。
    pub fn dispatch(&self, event: &Event, metrics: &EngineMetrics) {
        let callbacks: Vec<Arc<dyn EventListener>> = {
            let mut inner = self.inner.lock();

            // 一次性等待者：送达后注销；接收端已丢弃的一并清理。
            // 谓词与监听器同样是用户代码，panic 同样不得进入调度循环
            let mut delivered = 0usize;
            inner.waiters.retain(|waiter| {
                match catch_unwind(AssertUnwindSafe(|| (waiter.predicate)(event))) {
                    Ok(true) => {
                        delivered += 1;
                        // 失败仅意味着等待已被取消
                        let _ = waiter.tx.try_send(Ok(event.clone()));
                        false
                    }
                    Ok(false) => true,
                    Err(_) => {
                        EngineMetrics::incr(&metrics.waiter_panics);
                        warn!(category = ?event.category(), "waiter predicate panicked; waiter resolved");
                        let _ = waiter.tx.try_send(Err(WaitError::ConnectionLost));
                        false
                    }
                }
            });
            if delivered > 0 {
                trace!(delivered, category = ?event.category(), "waiters resolved");
            }

            let category = event.category();
            inner
                .listeners
                .iter()
                .filter(|entry| entry.category == category)
                .map(|entry| Arc::clone(&entry.callback))
                .collect()
        };

        for callback in callbacks {
            EngineMetrics::incr(&metrics.events_dispatched);
            // 隔离监听器故障：panic 被捕获上报，不进入调度循环
            let outcome = catch_unwind(AssertUnwindSafe(|| callback.on_event(event)));
            if outcome.is_err() {
                EngineMetrics::incr(&metrics.listener_panics);
                warn!(category = ?event.category(), "event listener panicked; listener skipped");
            }
        }
    }

    /// 关闭总线：解除全部未决等待者，后续注册立即解除
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        let waiters = std::mem::take(&mut inner.waiters);
        debug!(count = waiters.len(), "resolving outstanding waiters on close");
        for waiter in waiters {
            let _ = waiter.tx.try_send(Err(WaitError::ConnectionLost));
        }
        inner.listeners.clear();
    }

    /// 当前监听器数量（调试用）
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// 一次性事件等待者句柄
///
/// `wait` 只挂起调用线程；丢弃句柄即注销等待，对在途动作和
/// 世界模型无任何副作用。
pub struct EventWaiter {
    id: u64,
    rx: Receiver<Result<Event, WaitError>>,
    inner: Arc<Mutex<BusInner>>,
}

impl EventWaiter {
    /// 阻塞等待匹配事件，最多 `timeout`
    pub fn wait(self, timeout: Duration) -> Result<Event, WaitError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Err(WaitError::Timeout),
            // 发送端随总线整体消失：按连接丢失处理
            Err(RecvTimeoutError::Disconnected) => Err(WaitError::ConnectionLost),
        }
    }
}

impl Drop for EventWaiter {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.waiters.retain(|entry| entry.id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovi_protocol::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started(id_tag: u32) -> Event {
        Event::ActionStarted { id_tag }
    }

    /// 测试监听器按类别收到事件
    #[test]
    fn test_listener_receives_matching_category() {
        let bus = EventBus::new();
        let metrics = EngineMetrics::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        bus.add_listener(
            EventCategory::Action,
            Arc::new(move |_: &Event| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.dispatch(&started(1), &metrics);
        bus.dispatch(&Event::RobotDelocalized, &metrics);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// 测试退订后不再收到事件
    #[test]
    fn test_removed_listener_not_invoked() {
        let bus = EventBus::new();
        let metrics = EngineMetrics::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let id = bus.add_listener(
            EventCategory::Action,
            Arc::new(move |_: &Event| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.remove_listener(id);
        bus.dispatch(&started(1), &metrics);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    /// 测试监听器 panic 被隔离，后续监听器仍被调用
    #[test]
    fn test_listener_panic_isolated() {
        let bus = EventBus::new();
        let metrics = EngineMetrics::new();
        bus.add_listener(
            EventCategory::Action,
            Arc::new(|_: &Event| panic!("listener bug")),
        );
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        bus.add_listener(
            EventCategory::Action,
            Arc::new(move |_: &Event| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.dispatch(&started(1), &metrics);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().listener_panics, 1);
    }

    /// 测试等待者谓词 panic 被隔离：扇出继续，其余等待者照常送达
    #[test]
    fn test_waiter_predicate_panic_isolated() {
        let bus = EventBus::new();
        let metrics = EngineMetrics::new();
        let bad = bus.register_waiter(|_: &Event| panic!("predicate bug"));
        let good = bus.register_waiter(|e| matches!(e, Event::ActionStarted { .. }));

        bus.dispatch(&started(1), &metrics);

        assert_eq!(good.wait(Duration::from_millis(100)).unwrap(), started(1));
        assert_eq!(
            bad.wait(Duration::from_millis(100)).unwrap_err(),
            WaitError::ConnectionLost
        );
        assert_eq!(metrics.snapshot().waiter_panics, 1);
        // panic 的等待者已注销，后续扇出不再触碰它
        bus.dispatch(&started(2), &metrics);
        assert_eq!(metrics.snapshot().waiter_panics, 1);
    }

    /// 测试等待者收到首个匹配事件后注销
    #[test]
    fn test_waiter_receives_first_match_once() {
        let bus = EventBus::new();
        let metrics = EngineMetrics::new();
        let waiter = bus.register_waiter(|e| matches!(e, Event::ActionStarted { id_tag: 7 }));

        bus.dispatch(&started(3), &metrics);
        bus.dispatch(&started(7), &metrics);

        let event = waiter.wait(Duration::from_millis(100)).unwrap();
        assert_eq!(event, started(7));
    }

    /// 测试等待超时返回 Timeout
    #[test]
    fn test_waiter_timeout() {
        let bus = EventBus::new();
        let waiter = bus.register_waiter(|_| true);
        assert_eq!(
            waiter.wait(Duration::from_millis(20)).unwrap_err(),
            WaitError::Timeout
        );
    }

    /// 测试丢弃等待者即注销（事件不会积压）
    #[test]
    fn test_dropped_waiter_unregistered() {
        let bus = EventBus::new();
        let metrics = EngineMetrics::new();
        let waiter = bus.register_waiter(|_| true);
        drop(waiter);
        // 扇出不应 panic，也不应残留等待者
        bus.dispatch(&started(1), &metrics);
        assert_eq!(bus.inner.lock().waiters.len(), 0);
    }

    /// 测试关闭总线解除未决等待者
    #[test]
    fn test_close_resolves_waiters_with_connection_lost() {
        let bus = EventBus::new();
        let waiter = bus.register_waiter(|_| true);
        bus.close();
        assert_eq!(
            waiter.wait(Duration::from_millis(100)).unwrap_err(),
            WaitError::ConnectionLost
        );
        // 关闭后的新注册立即解除
        let late = bus.register_waiter(|_| true);
        assert_eq!(
            late.wait(Duration::from_millis(100)).unwrap_err(),
            WaitError::ConnectionLost
        );
    }
}
