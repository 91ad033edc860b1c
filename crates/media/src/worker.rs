//! Background GIF decode thread
//!
//! GIF decoding walks every frame and composites it onto a full canvas, which
//! is too slow to run on the thread driving the loader. Jobs go to a single
//! long-lived worker over a channel and each job carries its own reply
//! channel. One worker serves every loader that shares it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::animation::{decode_gif, GifFrames};
use crate::MediaError;

type Reply = mpsc::Sender<Result<GifFrames, MediaError>>;

struct DecodeJob {
    url: String,
    bytes: Vec<u8>,
    reply: Reply,
}

/// Dedicated thread that decodes GIF bytes into frames
pub struct GifDecodeWorker {
    sender: Mutex<Option<mpsc::Sender<DecodeJob>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl GifDecodeWorker {
    /// Start the worker thread
    pub fn spawn() -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<DecodeJob>();

        let thread = thread::Builder::new()
            .name("gif-decode".to_string())
            .spawn(move || Self::run(receiver))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            shutdown: AtomicBool::new(false),
        })
    }

    fn run(receiver: mpsc::Receiver<DecodeJob>) {
        log::debug!("gif decode worker started");
        // Ends once every sender is gone
        for job in receiver {
            let result = decode_gif(&job.bytes).map_err(|e| MediaError::decode(&job.url, e));
            match &result {
                Ok(frames) => log::debug!(
                    "decoded {} gif frames ({}x{}) for {}",
                    frames.len(),
                    frames.width,
                    frames.height,
                    job.url
                ),
                Err(err) => log::warn!("{err}"),
            }
            // The requester may have given up; nothing to do then
            let _ = job.reply.send(result);
        }
        log::debug!("gif decode worker stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Decode `bytes` on the worker thread and wait for the frames
    pub fn decode(&self, url: &str, bytes: Vec<u8>) -> Result<GifFrames, MediaError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| MediaError::decode(url, "gif decode worker is shut down"))?;

        let (reply, response) = mpsc::channel();
        sender
            .send(DecodeJob {
                url: url.to_string(),
                bytes,
                reply,
            })
            .map_err(|_| MediaError::decode(url, "gif decode worker is not running"))?;

        response
            .recv()
            .map_err(|_| MediaError::decode(url, "gif decode worker exited mid-job"))?
    }

    /// Stop accepting jobs and wait for the thread to finish its queue
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("gif decode worker panicked");
            }
        }
    }
}

impl Drop for GifDecodeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::tests::encode_gif;
    use std::sync::Arc;

    #[test]
    fn test_decodes_on_worker_thread() {
        let worker = GifDecodeWorker::spawn().unwrap();
        let bytes = encode_gif(
            3,
            3,
            &[
                (0, 0, 3, 3, 1, 4, gif::DisposalMethod::Keep),
                (1, 1, 1, 1, 2, 4, gif::DisposalMethod::Keep),
                (0, 0, 1, 1, 2, 4, gif::DisposalMethod::Keep),
            ],
        );

        let frames = worker.decode("https://example.com/a.gif", bytes).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!((frames.width, frames.height), (3, 3));
    }

    #[test]
    fn test_bad_bytes_report_decode_error() {
        let worker = GifDecodeWorker::spawn().unwrap();
        let err = worker
            .decode("https://example.com/bad.gif", b"GIF89a".to_vec())
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::Decode { ref url, .. } if url == "https://example.com/bad.gif"
        ));
    }

    #[test]
    fn test_shared_between_threads() {
        let worker = Arc::new(GifDecodeWorker::spawn().unwrap());
        let bytes = encode_gif(2, 2, &[(0, 0, 2, 2, 1, 1, gif::DisposalMethod::Keep)]);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let worker = worker.clone();
                let bytes = bytes.clone();
                std::thread::spawn(move || {
                    worker.decode(&format!("https://example.com/{i}.gif"), bytes)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_decode_after_shutdown_fails() {
        let worker = GifDecodeWorker::spawn().unwrap();
        worker.shutdown();
        assert!(worker.is_shutting_down());
        assert!(worker.decode("https://example.com/a.gif", Vec::new()).is_err());
        // Second shutdown is a no-op
        worker.shutdown();
    }
}
