//! Sources of supplementary case information for `request_info` steps.

use crate::models::ClarificationRequest;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Answers an information request, or returns `None` when nothing more
/// is available.
#[async_trait]
pub trait InfoProvider: Send + Sync {
    async fn provide(&self, request: &ClarificationRequest) -> Option<String>;
}

/// Never supplies further information.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFurtherInfo;

#[async_trait]
impl InfoProvider for NoFurtherInfo {
    async fn provide(&self, _request: &ClarificationRequest) -> Option<String> {
        None
    }
}

/// Asks the user on stderr and reads one answer line per request.
///
/// The reader is kept for the whole evaluation so input buffered past the
/// first answer is still there for the next request.
pub struct LineInfoProvider<R> {
    reader: Mutex<R>,
}

/// Reads answers from stdin.
pub type StdinInfoProvider = LineInfoProvider<BufReader<Stdin>>;

impl<R> LineInfoProvider<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

impl StdinInfoProvider {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> InfoProvider for LineInfoProvider<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn provide(&self, request: &ClarificationRequest) -> Option<String> {
        eprintln!("\n❓ {}", request.message);
        for field in &request.missing_fields {
            eprintln!("   - {}", field);
        }
        eprint!("   Additional information (leave empty to skip): ");

        let mut line = String::new();
        let mut reader = self.reader.lock().await;
        match reader.read_line(&mut line).await {
            Ok(_) => normalize_answer(&line),
            Err(e) => {
                warn!("Failed to read additional information: {}", e);
                None
            }
        }
    }
}

/// Trim an answer; blank answers mean "no further information".
fn normalize_answer(line: &str) -> Option<String> {
    let answer = line.trim();
    if answer.is_empty() {
        debug!("No additional information supplied");
        None
    } else {
        Some(answer.to_string())
    }
}
