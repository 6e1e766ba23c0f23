use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use crate::config::EventsOutConfig;

enum WriterMsg {
    Line(String),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
enum Chan {
    /// `drop_when_full`: lines that do not fit are counted and dropped.
    Bounded(mpsc::Sender<WriterMsg>),
    Unbounded(mpsc::UnboundedSender<WriterMsg>),
}

enum Rx {
    Bounded(mpsc::Receiver<WriterMsg>),
    Unbounded(mpsc::UnboundedReceiver<WriterMsg>),
}

impl Rx {
    async fn recv(&mut self) -> Option<WriterMsg> {
        match self {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }
}

#[derive(Clone)]
pub struct EventsOutTx {
    chan: Chan,
    dropped: Arc<AtomicU64>,
}

impl EventsOutTx {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a line without waiting. Returns false when the line was dropped.
    pub fn try_send_line(&self, line: String) -> bool {
        let sent = match &self.chan {
            Chan::Bounded(tx) => tx.try_send(WriterMsg::Line(line)).is_ok(),
            Chan::Unbounded(tx) => tx.send(WriterMsg::Line(line)).is_ok(),
        };
        if !sent {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Wait until every line queued before this call is written and flushed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let queued = match &self.chan {
            Chan::Bounded(tx) => tx.send(WriterMsg::Flush(ack_tx)).await.is_ok(),
            Chan::Unbounded(tx) => tx.send(WriterMsg::Flush(ack_tx)).is_ok(),
        };
        if queued {
            let _ = ack_rx.await;
        }
    }
}

/// Open the sink and spawn its writer task. `path = "stdout:"` writes to stdout.
/// Returns `None` when the sink is disabled.
pub async fn start_events_out(cfg: &EventsOutConfig) -> std::io::Result<Option<EventsOutTx>> {
    if !cfg.enabled || cfg.path.trim().is_empty() {
        return Ok(None);
    }

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if cfg.path == "stdout:" {
        Box::new(tokio::io::stdout())
    } else {
        if let Some(parent) = std::path::Path::new(&cfg.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.path)
            .await?;
        Box::new(file)
    };

    let (chan, mut rx) = if cfg.drop_when_full {
        let (tx, rx) = mpsc::channel::<WriterMsg>(cfg.channel_capacity.max(1));
        (Chan::Bounded(tx), Rx::Bounded(rx))
    } else {
        let (tx, rx) = mpsc::unbounded_channel::<WriterMsg>();
        (Chan::Unbounded(tx), Rx::Unbounded(rx))
    };
    let path = cfg.path.clone();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                WriterMsg::Line(mut line) => {
                    if !line.ends_with('\n') {
                        line.push('\n');
                    }
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        tracing::error!(
                            target: "flowpilot.events_out",
                            path = %path,
                            error.kind = "events_out.write",
                            error.message = %e
                        );
                        return;
                    }
                }
                WriterMsg::Flush(ack) => {
                    let _ = writer.flush().await;
                    let _ = ack.send(());
                }
            }
        }

        let _ = writer.flush().await;
    });

    Ok(Some(EventsOutTx {
        chan,
        dropped: Arc::new(AtomicU64::new(0)),
    }))
}
