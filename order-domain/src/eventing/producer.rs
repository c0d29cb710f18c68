//! 生产者（Producer）
//!
//! 序列化在调用方线程同步完成，记录随后交给后台批处理任务：
//! - 批内字节数达到 `batch_size` 或首条记录等待超过 `linger` 即发送；
//! - 瞬时错误按 `retries` 有限次重试，每次间隔 `retry_backoff`；
//! - `send` 仅在内部缓冲已满时等待，返回的 `DeliveryHandle` 可按需等待确认。
//!
//! 生产者可克隆，克隆体共享同一后台任务，适合并发使用。
//!
use super::log::MessageLog;
use super::record::{Headers, ProducerRecord, RecordMetadata};
use crate::codec::Serializer;
use crate::error::{DomainError, DomainResult as Result};
use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

/// 写入确认级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Acks {
    /// 不等待确认
    None,
    /// 分区 leader 写入即确认
    Leader,
    /// 全部副本写入后确认
    #[default]
    All,
}

/// 压缩算法（由实际的 broker 客户端执行，内存日志不压缩）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

/// 生产者配置
#[derive(Debug, Clone, Builder)]
pub struct ProducerConfig {
    #[builder(default)]
    pub acks: Acks,
    #[builder(default = 3)]
    pub retries: u32,
    #[builder(default = Duration::from_millis(100))]
    pub retry_backoff: Duration,
    #[builder(default = Duration::from_millis(10))]
    pub linger: Duration,
    /// 单批字节上限
    #[builder(default = 16_384)]
    pub batch_size: usize,
    #[builder(default)]
    pub compression: Compression,
    /// 待发送记录的缓冲上限
    #[builder(default = 1024)]
    pub buffer_capacity: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

struct Pending {
    record: ProducerRecord,
    ack: oneshot::Sender<Result<RecordMetadata>>,
}

enum Command {
    Send(Pending),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// 发送结果句柄
pub struct DeliveryHandle {
    acks: Acks,
    rx: oneshot::Receiver<Result<RecordMetadata>>,
}

impl DeliveryHandle {
    /// 等待写入确认；`Acks::None` 时立即返回 `None`
    pub async fn wait(self) -> Result<Option<RecordMetadata>> {
        if self.acks == Acks::None {
            return Ok(None);
        }
        match self.rx.await {
            Ok(result) => result.map(Some),
            Err(_) => Err(DomainError::Producer {
                reason: "producer stopped before acknowledging record".to_string(),
            }),
        }
    }
}

pub struct Producer<T: ?Sized> {
    serializer: Arc<dyn Serializer<T>>,
    tx: mpsc::Sender<Command>,
    config: ProducerConfig,
}

impl<T: ?Sized> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            serializer: Arc::clone(&self.serializer),
            tx: self.tx.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: ?Sized> Producer<T> {
    /// 创建生产者并启动后台批处理任务（需在 tokio 运行时内调用）
    pub fn new(
        message_log: Arc<dyn MessageLog>,
        serializer: impl Serializer<T> + 'static,
        config: ProducerConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_capacity.max(1));
        tracing::debug!(
            acks = ?config.acks,
            retries = config.retries,
            linger_ms = config.linger.as_millis() as u64,
            batch_size = config.batch_size,
            compression = ?config.compression,
            "producer started"
        );
        tokio::spawn(run_sender(message_log, config.clone(), rx));

        Self {
            serializer: Arc::new(serializer),
            tx,
            config,
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// 序列化并入队；序列化错误立即返回
    pub async fn send(&self, topic: &str, key: Option<&str>, value: &T) -> Result<DeliveryHandle> {
        let mut headers = Headers::new();
        let payload = self.serializer.serialize(topic, value, &mut headers)?;
        let record = ProducerRecord {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            value: payload,
            headers,
        };

        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Send(Pending { record, ack }))
            .await
            .map_err(|_| closed())?;

        Ok(DeliveryHandle {
            acks: self.config.acks,
            rx,
        })
    }

    /// 立即发送所有缓冲中的记录并等待完成
    pub async fn flush(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done))
            .await
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    /// 发送剩余记录后停止后台任务，之后所有克隆体的 `send` 都会失败
    pub async fn close(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Command::Close(done))
            .await
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }
}

fn closed() -> DomainError {
    DomainError::Producer {
        reason: "producer is closed".to_string(),
    }
}

async fn run_sender(
    message_log: Arc<dyn MessageLog>,
    config: ProducerConfig,
    mut rx: mpsc::Receiver<Command>,
) {
    let mut batch: Vec<Pending> = Vec::new();
    let mut batch_bytes = 0usize;
    let mut deadline: Option<Instant> = None;

    loop {
        let linger = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Send(pending)) => {
                    batch_bytes += pending.record.value.len();
                    batch.push(pending);
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + config.linger);
                    }
                    if batch_bytes >= config.batch_size {
                        send_batch(&message_log, &config, std::mem::take(&mut batch)).await;
                        batch_bytes = 0;
                        deadline = None;
                    }
                }
                Some(Command::Flush(done)) => {
                    send_batch(&message_log, &config, std::mem::take(&mut batch)).await;
                    batch_bytes = 0;
                    deadline = None;
                    let _ = done.send(());
                }
                Some(Command::Close(done)) => {
                    rx.close();
                    // 关闭前已入队的命令仍需处理
                    let mut waiters = vec![done];
                    while let Ok(cmd) = rx.try_recv() {
                        match cmd {
                            Command::Send(pending) => batch.push(pending),
                            Command::Flush(done) | Command::Close(done) => waiters.push(done),
                        }
                    }
                    send_batch(&message_log, &config, std::mem::take(&mut batch)).await;
                    for done in waiters {
                        let _ = done.send(());
                    }
                    break;
                }
                None => {
                    send_batch(&message_log, &config, std::mem::take(&mut batch)).await;
                    break;
                }
            },
            _ = linger => {
                send_batch(&message_log, &config, std::mem::take(&mut batch)).await;
                batch_bytes = 0;
                deadline = None;
            }
        }
    }

    tracing::debug!("producer stopped");
}

/// 按入队顺序逐条写入，保持同一分区内的相对顺序
async fn send_batch(message_log: &Arc<dyn MessageLog>, config: &ProducerConfig, batch: Vec<Pending>) {
    if batch.is_empty() {
        return;
    }
    tracing::trace!(records = batch.len(), "sending batch");

    for pending in batch {
        let result = append_with_retry(message_log, config, &pending.record).await;
        if let Err(e) = &result {
            tracing::warn!(topic = %pending.record.topic, error = %e, "record delivery failed");
        }
        let _ = pending.ack.send(result);
    }
}

async fn append_with_retry(
    message_log: &Arc<dyn MessageLog>,
    config: &ProducerConfig,
    record: &ProducerRecord,
) -> Result<RecordMetadata> {
    let mut attempt = 0;
    loop {
        match message_log.append(record.clone()).await {
            Ok(meta) => return Ok(meta),
            Err(e) if e.is_transient() && attempt < config.retries => {
                attempt += 1;
                tracing::debug!(attempt, error = %e, "retrying append");
                time::sleep(config.retry_backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
