//! The line-oriented request/response transport (component A of the design).
//!
//! A [`Channel`] owns one outbound port (and optionally a distinct inbound
//! port, for FPGA-style split TX/RX links). Writes are serialized and spaced
//! at least `min_spacing` apart; every write enqueues an expectation that a
//! background reader task matches against incoming lines in FIFO order.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::{Duration, Instant},
};

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};

use crate::descriptor::Prepared;
use crate::error::Error;

type Completion = Box<dyn FnOnce(Result<Vec<String>, Error>) + Send>;

struct InFlight {
    command: String,
    n_lines: usize,
    complete: Completion,
}

struct WriteState {
    last_write: Instant,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

struct Inner {
    component: &'static str,
    separator: u8,
    min_spacing: Duration,
    deadline: Duration,
    write_state: AsyncMutex<WriteState>,
    queue: StdMutex<VecDeque<InFlight>>,
    pending: AtomicUsize,
    notify: Notify,
    broken: AtomicBool,
    big_lock: AsyncMutex<()>,
}

/// A cheaply-cloneable handle to a running serial channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Construct a channel over an already-open reader/writer pair. This is
    /// the primitive every real constructor (and every test) goes through;
    /// it has no dependency on an actual OS serial port.
    pub fn new_with_io<R, W>(
        component: &'static str,
        separator: u8,
        min_spacing: Duration,
        deadline: Duration,
        reader: R,
        writer: W,
    ) -> Self
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let inner = Arc::new(Inner {
            component,
            separator,
            min_spacing,
            deadline,
            write_state: AsyncMutex::new(WriteState {
                last_write: Instant::now() - min_spacing,
                writer: Box::new(writer),
            }),
            queue: StdMutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            notify: Notify::new(),
            broken: AtomicBool::new(false),
            big_lock: AsyncMutex::new(()),
        });
        spawn_reader(inner.clone(), reader);
        Self { inner }
    }

    pub fn component(&self) -> &'static str {
        self.inner.component
    }

    /// A scoped mutex callers hold to compose multiple `send`s atomically
    /// against other users of this port (the "big lock" of the design).
    pub fn big_lock(&self) -> &AsyncMutex<()> {
        &self.inner.big_lock
    }

    /// Send a single prepared command and await its parsed response.
    ///
    /// Verify descriptors are retransmitted exactly once on a parse failure
    /// before the error is surfaced to the caller.
    pub async fn send<Out: Send + 'static>(&self, prepared: Prepared<Out>) -> Result<Out, Error> {
        let verify = prepared.verify;
        let text = prepared.text.clone();
        let n_lines = prepared.n_lines;
        let parser = prepared.parser;
        match self.send_once(text.clone(), n_lines, parser).await {
            Err(Error::Parse { raw, .. }) if verify => {
                tracing::warn!(
                    component = self.inner.component,
                    command = %text,
                    raw = ?raw,
                    "parse error on verify descriptor, retransmitting once"
                );
                self.send_once(text, n_lines, parser).await
            }
            other => other,
        }
    }

    /// Dispatch several prepared commands as a single atomic write window:
    /// no other sender's command can be interleaved between these writes.
    /// Resolves in input order.
    pub async fn send_batch<Out: Send + 'static>(
        &self,
        prepared: Vec<Prepared<Out>>,
    ) -> Vec<Result<Out, Error>> {
        if self.inner.broken.load(Ordering::SeqCst) {
            return prepared
                .iter()
                .map(|p| Err(self.broken_error(&p.text)))
                .collect();
        }

        let mut receivers = Vec::with_capacity(prepared.len());
        {
            let mut guard = self.inner.write_state.lock().await;
            for p in &prepared {
                let rx = self.enqueue(&mut guard, &p.text, p.n_lines, p.parser).await;
                receivers.push(rx);
            }
        }

        let mut out = Vec::with_capacity(receivers.len());
        for (p, rx) in prepared.into_iter().zip(receivers) {
            out.push(self.await_response(p.text, rx).await);
        }
        out
    }

    /// Complete when no response is outstanding on this channel. Used as the
    /// motion-idle barrier: every move command withholds its reply until the
    /// hardware finishes moving.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn send_once<Out: Send + 'static>(
        &self,
        text: String,
        n_lines: usize,
        parser: fn(&str) -> Option<Out>,
    ) -> Result<Out, Error> {
        if self.inner.broken.load(Ordering::SeqCst) {
            return Err(self.broken_error(&text));
        }
        let rx = {
            let mut guard = self.inner.write_state.lock().await;
            self.enqueue(&mut guard, &text, n_lines, parser).await
        };
        self.await_response(text, rx).await
    }

    async fn enqueue<Out: Send + 'static>(
        &self,
        guard: &mut WriteState,
        text: &str,
        n_lines: usize,
        parser: fn(&str) -> Option<Out>,
    ) -> oneshot::Receiver<Result<Out, Error>> {
        let elapsed = guard.last_write.elapsed();
        if elapsed < self.inner.min_spacing {
            tokio::time::sleep(self.inner.min_spacing - elapsed).await;
        }

        let mut bytes = text.as_bytes().to_vec();
        bytes.push(self.inner.separator);
        let write_result = guard.writer.write_all(&bytes).await;
        guard.last_write = Instant::now();

        let (tx, rx) = oneshot::channel();
        let component = self.inner.component;
        let command_for_err = text.to_string();
        let complete: Completion = Box::new(move |res: Result<Vec<String>, Error>| {
            let out = match res {
                Ok(lines) => {
                    let joined = lines.join("\n");
                    match parser(&joined) {
                        Some(v) => Ok(v),
                        None => Err(Error::Parse {
                            component,
                            command: command_for_err,
                            raw: joined.into_bytes(),
                        }),
                    }
                }
                Err(e) => Err(e),
            };
            let _ = tx.send(out);
        });

        if let Err(source) = write_result {
            tracing::error!(component, command = %text, %source, "write failed, channel broken");
            self.fail_channel(Arc::new(source));
            complete(Err(self.broken_error(text)));
            return rx;
        }

        tracing::debug!(component, command = %text, "sent");
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        self.inner
            .queue
            .lock()
            .unwrap()
            .push_back(InFlight {
                command: text.to_string(),
                n_lines,
                complete,
            });
        rx
    }

    async fn await_response<Out>(
        &self,
        command: String,
        rx: oneshot::Receiver<Result<Out, Error>>,
    ) -> Result<Out, Error> {
        match tokio::time::timeout(self.inner.deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(Error::Cancelled {
                component: self.inner.component,
            }),
            Err(_elapsed) => {
                tracing::warn!(
                    component = self.inner.component,
                    %command,
                    "timed out waiting for response"
                );
                Err(Error::Timeout {
                    component: self.inner.component,
                    command,
                })
            }
        }
    }

    fn broken_error(&self, command: &str) -> Error {
        Error::ChannelBroken {
            component: self.inner.component,
            source: Arc::new(std::io::Error::other(format!(
                "channel already broken before `{command}` could be sent"
            ))),
        }
    }

    fn fail_channel(&self, source: Arc<std::io::Error>) {
        self.inner.broken.store(true, Ordering::SeqCst);
        drain_queue(&self.inner, source);
    }
}

fn drain_queue(inner: &Inner, source: Arc<std::io::Error>) {
    let mut queue = inner.queue.lock().unwrap();
    let n = queue.len();
    while let Some(slot) = queue.pop_front() {
        (slot.complete)(Err(Error::ChannelBroken {
            component: inner.component,
            source: source.clone(),
        }));
    }
    drop(queue);
    if n > 0 {
        inner.pending.fetch_sub(n, Ordering::SeqCst);
        inner.notify.notify_waiters();
    }
}

fn spawn_reader<R>(inner: Arc<Inner>, reader: R)
where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let separator = inner.separator;
        let mut buf_reader = BufReader::new(reader);
        let mut current_lines: Vec<String> = Vec::new();

        loop {
            let mut raw = Vec::new();
            match buf_reader.read_until(separator, &mut raw).await {
                Ok(0) => {
                    tracing::error!(component = inner.component, "serial port closed");
                    let err = Arc::new(std::io::Error::other("serial port closed"));
                    inner.broken.store(true, Ordering::SeqCst);
                    drain_queue(&inner, err);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(component = inner.component, error = %e, "read error");
                    let err = Arc::new(e);
                    inner.broken.store(true, Ordering::SeqCst);
                    drain_queue(&inner, err);
                    return;
                }
            }

            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(|c| c == '\r' || c == '\n')
                .to_string();
            current_lines.push(line);

            let expected = {
                let queue = inner.queue.lock().unwrap();
                queue.front().map(|s| s.n_lines)
            };

            let Some(expected) = expected else {
                tracing::warn!(
                    component = inner.component,
                    line = %current_lines.last().unwrap(),
                    "unsolicited response line with no pending request"
                );
                current_lines.clear();
                continue;
            };

            if current_lines.len() >= expected {
                let lines = std::mem::take(&mut current_lines);
                let slot = inner.queue.lock().unwrap().pop_front();
                if let Some(slot) = slot {
                    tracing::debug!(component = inner.component, command = %slot.command, "response complete");
                    (slot.complete)(Ok(lines));
                    inner.pending.fetch_sub(1, Ordering::SeqCst);
                    inner.notify.notify_waiters();
                }
            }
        }
    });
}
