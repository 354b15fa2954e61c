use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc;

/// FIFO with a bounded fast path and an unbounded overflow buffer.
///
/// Two bounded channels glued together by a forwarder task: while the output
/// side keeps up, values go straight through; once it lags, they pile up in an
/// overflow buffer that is drained whenever the output side frees up again.
/// Closing the input side drains the overflow into the output and then closes
/// it, so a consumer sees every accepted value before `None`.
pub fn unbounded<T: Send + 'static>(capacity: usize) -> (UnboundedSender<T>, mpsc::Receiver<T>) {
    let (in_tx, mut in_rx) = mpsc::channel::<T>(capacity);
    let (out_tx, out_rx) = mpsc::channel::<T>(capacity);

    actix_rt::spawn(async move {
        let mut buffer: VecDeque<T> = VecDeque::with_capacity(capacity);

        'forward: loop {
            let Some(val) = in_rx.recv().await else {
                break 'forward;
            };

            match out_tx.try_send(val) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(val)) => buffer.push_back(val),
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }

            while !buffer.is_empty() {
                tokio::select! {
                    val = in_rx.recv() => {
                        match val {
                            Some(val) => buffer.push_back(val),
                            None => break 'forward,
                        }
                    }
                    permit = out_tx.reserve() => {
                        let Ok(permit) = permit else { return };
                        if let Some(val) = buffer.pop_front() {
                            permit.send(val);
                        }
                        if buffer.is_empty() {
                            // drop the grown backing storage
                            buffer = VecDeque::with_capacity(capacity);
                        }
                    }
                }
            }
        }

        while let Some(val) = buffer.pop_front() {
            if out_tx.send(val).await.is_err() {
                return;
            }
        }
    });

    (
        UnboundedSender {
            tx: Mutex::new(Some(in_tx)),
        },
        out_rx,
    )
}

/// Input side of an [`unbounded`] channel. Sends after [`close`] are dropped.
///
/// [`close`]: UnboundedSender::close
pub struct UnboundedSender<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
}

impl<T> UnboundedSender<T> {
    pub async fn send(&self, val: T) {
        let tx = self.tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(val).await;
        }
    }

    /// Closes the input side; the forwarder drains the overflow and then
    /// closes the output side.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }
}
